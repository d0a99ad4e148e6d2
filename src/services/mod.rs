pub mod bling;
pub mod encryption_service;
pub mod platform;
pub mod webhook_security;

pub use encryption_service::EncryptionService;
