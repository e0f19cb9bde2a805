//! Request and response shapes for code execution

use serde::{Deserialize, Serialize};

use crate::pool::TaskOutcome;
use crate::sandbox::CommandOutput;

pub const UNSUPPORTED_LANGUAGE_MSG: &str = "unsupported language";

/// Request to execute a snippet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteRequest {
    /// Language name as sent by the client; resolved against [`super::Language`]
    pub language: String,
    /// Source code to run
    pub code: String,
}

impl ExecuteRequest {
    pub fn new(language: impl Into<String>, code: impl Into<String>) -> Self {
        ExecuteRequest {
            language: language.into(),
            code: code.into(),
        }
    }
}

/// Result of one execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub success: bool,
    /// Standard output
    #[serde(default)]
    pub msg: String,
    /// Standard error, or why the run never happened
    #[serde(default)]
    pub error_msg: String,
}

impl ExecuteResponse {
    pub fn success(msg: impl Into<String>) -> Self {
        ExecuteResponse {
            success: true,
            msg: msg.into(),
            error_msg: String::new(),
        }
    }

    pub fn failure(error_msg: impl Into<String>) -> Self {
        ExecuteResponse {
            success: false,
            msg: String::new(),
            error_msg: error_msg.into(),
        }
    }

    pub fn unsupported_language() -> Self {
        Self::failure(UNSUPPORTED_LANGUAGE_MSG)
    }
}

impl From<CommandOutput> for ExecuteResponse {
    fn from(output: CommandOutput) -> Self {
        ExecuteResponse {
            success: output.success,
            msg: output.stdout,
            error_msg: output.stderr,
        }
    }
}

impl TaskOutcome for ExecuteResponse {
    fn is_success(&self) -> bool {
        self.success
    }

    fn rejected(reason: &str) -> Self {
        Self::failure(format!("sandbox pool is busy: {}", reason))
    }
}
