//! Sandbox pool configuration types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Sizing and eviction settings for the sandbox pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of sandboxes created at startup and kept through idle sweeps
    #[serde(default = "default_core_size")]
    pub core_size: usize,
    /// Hard upper bound on idle sandboxes held by the pool
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    /// Number of blocked callers that triggers an expansion attempt
    #[serde(default = "default_wait_queue_threshold")]
    pub wait_queue_threshold: usize,
    /// Idle time after which a sandbox above the core size may be evicted
    #[serde(with = "humantime_serde", default = "default_idle_timeout")]
    pub idle_timeout: Duration,
    /// Period of the idle sweep
    #[serde(with = "humantime_serde", default = "default_eviction_period")]
    pub eviction_period: Duration,
    /// Failed runs tolerated before a sandbox is destroyed and replaced
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
    /// Host directory holding per-sandbox staging workspaces
    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            core_size: default_core_size(),
            max_size: default_max_size(),
            wait_queue_threshold: default_wait_queue_threshold(),
            idle_timeout: default_idle_timeout(),
            eviction_period: default_eviction_period(),
            error_threshold: default_error_threshold(),
            workspace_root: default_workspace_root(),
        }
    }
}

impl PoolConfig {
    /// Number of sandboxes the pool may create beyond its core size
    pub fn expansion_budget(&self) -> usize {
        self.max_size.saturating_sub(self.core_size)
    }
}

fn available_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

fn default_core_size() -> usize {
    available_cpus() * 10
}

fn default_max_size() -> usize {
    available_cpus() * 20
}

fn default_wait_queue_threshold() -> usize {
    200
}

fn default_idle_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_eviction_period() -> Duration {
    Duration::from_secs(20)
}

fn default_error_threshold() -> u32 {
    3
}

fn default_workspace_root() -> PathBuf {
    crate::config::workspace_dir()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert!(config.core_size > 0);
        assert_eq!(config.max_size, config.core_size * 2);
        assert_eq!(config.expansion_budget(), config.core_size);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.eviction_period, Duration::from_secs(20));
        assert_eq!(config.error_threshold, 3);
    }

    #[test]
    fn test_pool_config_humantime() {
        let config: PoolConfig = toml::from_str(
            r#"
            core_size = 2
            max_size = 4
            idle_timeout = "1m 30s"
            eviction_period = "10s"
            "#,
        )
        .unwrap();
        assert_eq!(config.idle_timeout, Duration::from_secs(90));
        assert_eq!(config.eviction_period, Duration::from_secs(10));
        assert_eq!(config.wait_queue_threshold, 200);
        assert_eq!(config.expansion_budget(), 2);
    }
}
