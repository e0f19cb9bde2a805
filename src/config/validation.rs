//! Configuration validation
//!
//! Validates configuration and reports issues.

use super::types::pool::PoolConfig;
use super::types::Config;
use crate::error::{Error, Result};

/// Result of configuration validation
#[derive(Debug, Clone)]
pub struct ConfigValidationResult {
    /// Whether the config is valid
    pub valid: bool,
    /// Validation errors (critical)
    pub errors: Vec<ValidationIssue>,
    /// Validation warnings (non-critical)
    pub warnings: Vec<ValidationIssue>,
}

impl ConfigValidationResult {
    /// Create a valid result
    pub fn valid() -> Self {
        ConfigValidationResult {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error
    pub fn with_error(mut self, issue: ValidationIssue) -> Self {
        self.valid = false;
        self.errors.push(issue);
        self
    }

    /// Add a warning
    pub fn with_warning(mut self, issue: ValidationIssue) -> Self {
        self.warnings.push(issue);
        self
    }

    /// Collapse the errors into a single `Error::Config`, ignoring warnings
    pub fn into_result(self) -> Result<()> {
        if self.valid {
            return Ok(());
        }
        let message = self
            .errors
            .iter()
            .map(|issue| format!("{}: {}", issue.path, issue.message))
            .collect::<Vec<_>>()
            .join("; ");
        Err(Error::Config(message))
    }
}

/// A validation issue
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Path to the config field
    pub path: String,
    /// Issue message
    pub message: String,
    /// Suggested fix
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create a new issue
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        ValidationIssue {
            path: path.into(),
            message: message.into(),
            suggestion: None,
        }
    }

    /// Add a suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Validate the configuration
pub fn validate_config(config: &Config) -> ConfigValidationResult {
    let mut result = ConfigValidationResult::valid();

    result = validate_pool_section(&config.pool, result);
    result = validate_container_config(config, result);

    result
}

/// Validate pool settings on their own
pub fn validate_pool_config(pool: &PoolConfig) -> ConfigValidationResult {
    validate_pool_section(pool, ConfigValidationResult::valid())
}

fn validate_pool_section(pool: &PoolConfig, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if pool.max_size == 0 {
        result = result.with_error(
            ValidationIssue::new("pool.max_size", "max_size must be greater than 0")
                .with_suggestion("Set pool.max_size or SANDBOX_MAX_SIZE"),
        );
    }

    if pool.core_size > pool.max_size {
        result = result.with_error(
            ValidationIssue::new(
                "pool.core_size",
                format!(
                    "core_size ({}) must not exceed max_size ({})",
                    pool.core_size, pool.max_size
                ),
            )
            .with_suggestion("Lower pool.core_size or raise pool.max_size"),
        );
    }

    if pool.wait_queue_threshold == 0 {
        result = result.with_error(
            ValidationIssue::new(
                "pool.wait_queue_threshold",
                "wait_queue_threshold must be at least 1",
            )
            .with_suggestion("Use 1 to expand as soon as a caller has to wait"),
        );
    }

    if pool.eviction_period.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "pool.eviction_period",
            "eviction_period must be greater than zero",
        ));
    }

    if pool.core_size == 0 && pool.wait_queue_threshold > 1 {
        // Expansion only starts once the queue passes the threshold, and
        // with no idle slots nothing else can ever release one.
        result = result.with_error(
            ValidationIssue::new(
                "pool.wait_queue_threshold",
                format!(
                    "core_size is 0 but wait_queue_threshold is {}: a lone caller would wait forever",
                    pool.wait_queue_threshold
                ),
            )
            .with_suggestion("Set pool.wait_queue_threshold to 1 or keep pool.core_size above 0"),
        );
    } else if pool.core_size == 0 {
        result = result.with_warning(
            ValidationIssue::new(
                "pool.core_size",
                "core_size is 0: every request will pay for a cold container start",
            )
            .with_suggestion("Keep at least one pre-warmed sandbox"),
        );
    }

    result
}

fn validate_container_config(config: &Config, mut result: ConfigValidationResult) -> ConfigValidationResult {
    if config.container.image.trim().is_empty() {
        result = result.with_error(
            ValidationIssue::new("container.image", "No sandbox image specified")
                .with_suggestion("Set container.image to a valid Docker image"),
        );
    }

    if config.container.command_timeout.is_zero() {
        result = result.with_error(ValidationIssue::new(
            "container.command_timeout",
            "command_timeout must be greater than zero",
        ));
    }

    if config.container.cpu_limit <= 0.0 {
        result = result.with_error(ValidationIssue::new(
            "container.cpu_limit",
            "cpu_limit must be positive",
        ));
    }

    result
}
