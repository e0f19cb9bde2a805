//! # codesandbox
//!
//! Runs untrusted code snippets in pre-warmed Docker containers.
//!
//! ## Layout
//!
//! - **sandbox:** container runtime contract and the Docker implementation
//! - **pool:** bounded, elastic pool of ready containers with idle eviction
//!   and error-driven replacement
//! - **executor:** stage, compile and run one snippet on a pooled container
//! - **server:** HTTP surface over the executor
//! - **config:** layered configuration (defaults, file, environment)

pub mod config;
pub mod error;
pub mod executor;
pub mod pool;
pub mod sandbox;
pub mod server;

pub use config::Config;
pub use error::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
