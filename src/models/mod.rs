pub mod bling_config;
pub mod platform;
pub mod snapshot;

pub use bling_config::*;
pub use platform::*;
pub use snapshot::*;
