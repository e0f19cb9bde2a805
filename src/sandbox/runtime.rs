//! Sandbox runtime trait and shared types

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// Fixed in-container directory that receives staged source files
pub const SANDBOX_WORKDIR: &str = "/box";

/// Error text reported for a command that exceeded its time budget
pub const TIMED_OUT_MSG: &str = "timed out";

/// Opaque handle to a container owned by a runtime
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotHandle(String);

impl SlotHandle {
    pub fn new(id: impl Into<String>) -> Self {
        SlotHandle(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SlotHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Docker ids are 64 hex chars; the short form is what `docker ps` shows
        let short = self.0.get(..12).unwrap_or(&self.0);
        write!(f, "{}", short)
    }
}

/// Output of one command run inside a sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Channel of the most recent output chunk was stdout (or no output at all)
    pub success: bool,
    /// Collected standard output
    pub stdout: String,
    /// Collected standard error
    pub stderr: String,
    /// The command was cut off by the command timeout
    pub timed_out: bool,
}

impl CommandOutput {
    /// A command that produced only standard output
    pub fn stdout(text: impl Into<String>) -> Self {
        CommandOutput {
            success: true,
            stdout: text.into(),
            stderr: String::new(),
            timed_out: false,
        }
    }

    /// A command whose last output went to standard error
    pub fn stderr(text: impl Into<String>) -> Self {
        CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: text.into(),
            timed_out: false,
        }
    }

    /// A command cut off by the timeout; partial output is discarded
    pub fn timed_out() -> Self {
        CommandOutput {
            success: false,
            stdout: String::new(),
            stderr: TIMED_OUT_MSG.to_string(),
            timed_out: true,
        }
    }
}

/// Container runtime consumed by the sandbox pool.
///
/// One instance is constructed at startup and shared by every slot.
#[async_trait]
pub trait SandboxRuntime: Send + Sync {
    /// Get the runtime name
    fn name(&self) -> &str;

    /// Create and start a container bound to a host workspace
    async fn create_sandbox(&self, workspace: &Path) -> Result<SlotHandle>;

    /// Copy the contents of `host_path` into [`SANDBOX_WORKDIR`]
    async fn copy_into(&self, handle: &SlotHandle, host_path: &Path) -> Result<()>;

    /// Run a command inside the container, bounded by the command timeout
    async fn execute_in(&self, handle: &SlotHandle, argv: &[String]) -> Result<CommandOutput>;

    /// Stop and remove the container. Removing an unknown container is not an error.
    async fn destroy_sandbox(&self, handle: &SlotHandle) -> Result<()>;
}
