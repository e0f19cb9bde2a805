//! Sandbox container configuration types
//!
//! Image, resource limits and command timeout for pooled containers.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Container (Docker) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Docker image to use
    #[serde(default = "default_image")]
    pub image: String,
    /// Memory limit
    #[serde(default = "default_memory")]
    pub memory_limit: String,
    /// Memory + swap limit
    #[serde(default = "default_memory_swap")]
    pub memory_swap: String,
    /// CPU limit (number of CPUs)
    #[serde(default = "default_cpu")]
    pub cpu_limit: f64,
    /// Disable container networking
    #[serde(default = "default_true")]
    pub network_disabled: bool,
    /// Time budget for a single compile or run command
    #[serde(with = "humantime_serde", default = "default_command_timeout")]
    pub command_timeout: Duration,
    /// Pull the image on startup when it is missing locally
    #[serde(default = "default_true")]
    pub pull_missing_image: bool,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        ContainerConfig {
            image: default_image(),
            memory_limit: default_memory(),
            memory_swap: default_memory_swap(),
            cpu_limit: default_cpu(),
            network_disabled: true,
            command_timeout: default_command_timeout(),
            pull_missing_image: true,
        }
    }
}

fn default_image() -> String {
    "codesandbox:latest".to_string()
}

fn default_memory() -> String {
    "50m".to_string()
}

fn default_memory_swap() -> String {
    "0".to_string()
}

fn default_cpu() -> f64 {
    1.0
}

fn default_true() -> bool {
    true
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(3)
}
