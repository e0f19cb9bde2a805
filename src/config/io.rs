//! Configuration I/O - Loading and saving configuration
//!
//! Handles reading configuration from files and environment variables.

use std::path::Path;
use std::time::Duration;

use super::types::Config;
use crate::error::{Error, Result};

/// Load configuration with layered precedence:
/// 1. Config file (config.json / config.toml) if it exists, otherwise defaults
/// 2. Environment variable overrides (includes .env)
pub fn load_config() -> Result<Config> {
    // Load .env file first so CODESANDBOX_CONFIG may come from it
    dotenvy::dotenv().ok();

    let config_path = super::paths::config_path();

    let mut config = if config_path.exists() {
        load_config_from_path(&config_path)?
    } else {
        Config::default()
    };

    apply_env_overrides(&mut config)?;

    Ok(config)
}

/// Load configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;

    // Detect format by extension
    let config: Config = if path.extension().map_or(false, |ext| ext == "json") {
        // Parse as JSON5 (more lenient than strict JSON)
        json5::from_str(&content).map_err(|e| Error::Config(format!("Invalid JSON config: {}", e)))?
    } else if path.extension().map_or(false, |ext| ext == "toml") {
        toml::from_str(&content).map_err(|e| Error::Config(format!("Invalid TOML config: {}", e)))?
    } else {
        // Try JSON5 first, then TOML
        json5::from_str(&content)
            .or_else(|_| toml::from_str(&content).map_err(|e| Error::Config(e.to_string())))
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?
    };

    Ok(config)
}

/// Apply environment variable overrides to an existing config.
///
/// Env vars have the highest precedence: defaults < file < env.
/// A set but unparsable variable is a configuration error rather than
/// being silently ignored.
pub fn apply_env_overrides(config: &mut Config) -> Result<()> {
    // Pool overrides
    if let Some(v) = env_parse("SANDBOX_CORE_SIZE")? {
        config.pool.core_size = v;
    }
    if let Some(v) = env_parse("SANDBOX_MAX_SIZE")? {
        config.pool.max_size = v;
    }
    if let Some(v) = env_parse("SANDBOX_WAIT_QUEUE_THRESHOLD")? {
        config.pool.wait_queue_threshold = v;
    }
    if let Some(v) = env_duration("SANDBOX_IDLE_TIMEOUT")? {
        config.pool.idle_timeout = v;
    }
    if let Some(v) = env_duration("SANDBOX_EVICTION_PERIOD")? {
        config.pool.eviction_period = v;
    }
    if let Some(v) = env_parse("SANDBOX_ERROR_THRESHOLD")? {
        config.pool.error_threshold = v;
    }
    if let Ok(dir) = std::env::var("SANDBOX_WORKSPACE_ROOT") {
        config.pool.workspace_root = std::path::PathBuf::from(dir);
    }

    // Container overrides
    if let Ok(image) = std::env::var("SANDBOX_IMAGE") {
        config.container.image = image;
    }
    if let Ok(memory) = std::env::var("SANDBOX_MEMORY_LIMIT") {
        config.container.memory_limit = memory;
    }
    if let Ok(swap) = std::env::var("SANDBOX_MEMORY_SWAP") {
        config.container.memory_swap = swap;
    }
    if let Some(v) = env_parse("SANDBOX_CPU_LIMIT")? {
        config.container.cpu_limit = v;
    }
    if let Some(v) = env_duration("SANDBOX_COMMAND_TIMEOUT")? {
        config.container.command_timeout = v;
    }

    // Server overrides
    if let Ok(bind) = std::env::var("SERVER_BIND") {
        config.server.bind = bind;
    }
    if let Some(port) = env_parse("SERVER_PORT")? {
        config.server.port = port;
    }

    // Logging overrides
    if let Ok(level) = std::env::var("RUST_LOG") {
        config.log.level = level;
    }
    if let Ok(format) = std::env::var("LOG_FORMAT") {
        config.log.format = format.parse()?;
    }

    Ok(())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}: {} ({})", key, raw, e))),
        Err(_) => Ok(None),
    }
}

fn env_duration(key: &str) -> Result<Option<Duration>> {
    match std::env::var(key) {
        Ok(raw) => humantime_serde::re::humantime::parse_duration(raw.trim())
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid duration for {}: {} ({})", key, raw, e))),
        Err(_) => Ok(None),
    }
}

/// Save configuration to a file
pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    let content = if path.extension().map_or(false, |ext| ext == "toml") {
        toml::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    } else {
        serde_json::to_string_pretty(config).map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test_config.json");

        let mut config = Config::default();
        config.pool.core_size = 3;
        config.pool.idle_timeout = Duration::from_secs(42);
        save_config(&config, &path).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        assert_eq!(loaded.pool.core_size, 3);
        assert_eq!(loaded.pool.idle_timeout, Duration::from_secs(42));
        assert_eq!(loaded.container.image, config.container.image);
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
            [pool]
            core_size = 4
            max_size = 8
            wait_queue_threshold = 2

            [container]
            image = "judge:latest"
            command_timeout = "5s"

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        let config = load_config_from_path(&path).unwrap();
        assert_eq!(config.pool.max_size, 8);
        assert_eq!(config.pool.wait_queue_threshold, 2);
        assert_eq!(config.container.image, "judge:latest");
        assert_eq!(config.container.command_timeout, Duration::from_secs(5));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
    }

    #[test]
    fn test_invalid_config_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ pool: ").unwrap();

        let err = load_config_from_path(&path).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_env_overrides() {
        // Both cases live in one test: env vars are process-global
        std::env::set_var("SANDBOX_WAIT_QUEUE_THRESHOLD", "7");
        std::env::set_var("SANDBOX_COMMAND_TIMEOUT", "250ms");
        std::env::set_var("SANDBOX_IMAGE", "override:1");

        let mut config = Config::default();
        apply_env_overrides(&mut config).unwrap();

        assert_eq!(config.pool.wait_queue_threshold, 7);
        assert_eq!(config.container.command_timeout, Duration::from_millis(250));
        assert_eq!(config.container.image, "override:1");

        std::env::set_var("SANDBOX_COMMAND_TIMEOUT", "soon");
        let result = apply_env_overrides(&mut Config::default());

        std::env::remove_var("SANDBOX_WAIT_QUEUE_THRESHOLD");
        std::env::remove_var("SANDBOX_COMMAND_TIMEOUT");
        std::env::remove_var("SANDBOX_IMAGE");

        assert!(matches!(result, Err(Error::Config(_))));
    }
}
