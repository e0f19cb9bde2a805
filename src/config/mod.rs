//! Configuration module - Modular configuration management
//!
//! - types/mod.rs: Core configuration types (Config, ServerConfig, LogConfig)
//! - types/pool.rs: Sandbox pool sizing and eviction
//! - types/sandbox.rs: Container image and resource limits
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

pub use types::{Config, LogConfig, LogFormat, ServerConfig};
pub use types::pool::PoolConfig;
pub use types::sandbox::ContainerConfig;

pub use io::{apply_env_overrides, load_config, load_config_from_path, save_config};
pub use paths::{config_dir, config_path, state_dir, workspace_dir};
pub use validation::{
    validate_config, validate_pool_config, ConfigValidationResult, ValidationIssue,
};
