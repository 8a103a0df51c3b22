// src/config/mod.rs

pub mod app;
pub mod loader;
pub mod validation;

pub use app::{
    derive_key_id, preview_secret, AppConfig, KeyEntry, PoolConfig, ServerConfig, UpstreamConfig,
};
pub use loader::{
    keys_file_path, load_config, load_keys_file, log_config_summary, ConfigOverrides, KeysFile,
};
pub use validation::ConfigValidator;
