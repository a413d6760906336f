//! pushdeploy library
//!
//! Webhook-triggered push-to-deploy: verify a signed push delivery, pull the
//! tracked branch and restart the application through whatever supervises it.

pub mod app;
pub mod cli;
pub mod deploy;
pub mod errors;
pub mod logs;
pub mod models;
pub mod server;
pub mod settings;
pub mod utils;
pub mod webhook;
pub mod workers;
