// src/handlers/mod.rs

pub mod base;
pub mod client_error;
pub mod invalid_api_key;
pub mod processor;
pub mod rate_limit;
pub mod server_error;
pub mod success;

pub use base::{ResponseHandler, Verdict};
pub use processor::{HealthClassifier, Outcome};
