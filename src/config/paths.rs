//! Configuration paths
//!
//! Utilities for resolving configuration file paths.

use std::path::PathBuf;

/// Get the configuration directory
pub fn config_dir() -> PathBuf {
    // Check for explicit override
    if let Ok(dir) = std::env::var("CODESANDBOX_CONFIG_DIR") {
        return PathBuf::from(dir);
    }

    // Use XDG config directory or fallback
    dirs::config_dir()
        .map(|d| d.join("codesandbox"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".config").join("codesandbox"))
                .unwrap_or_else(|| PathBuf::from(".codesandbox"))
        })
}

/// Get the main configuration file path
pub fn config_path() -> PathBuf {
    // Check for explicit override
    if let Ok(path) = std::env::var("CODESANDBOX_CONFIG") {
        return PathBuf::from(path);
    }

    config_dir().join("config.json")
}

/// Get the state directory
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("CODESANDBOX_STATE_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_dir()
        .map(|d| d.join("codesandbox"))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .map(|h| h.join(".local").join("share").join("codesandbox"))
                .unwrap_or_else(|| PathBuf::from(".codesandbox"))
        })
}

/// Get the root directory for sandbox staging workspaces
pub fn workspace_dir() -> PathBuf {
    state_dir().join("tempCode")
}
