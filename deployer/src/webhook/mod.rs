//! Webhook authentication and filtering

pub mod filter;
pub mod request;
pub mod signature;
