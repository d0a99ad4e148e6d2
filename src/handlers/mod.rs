pub mod bling_config;
pub mod bling_oauth;
pub mod bling_sync;
pub mod bling_webhook;
