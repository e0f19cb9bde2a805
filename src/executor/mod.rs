//! Execution facade
//!
//! Turns one request into a pool task: stage the source into the slot's
//! workspace, copy it into the container, compile if needed, run, and map
//! the output. The pool owns acquire and release.

mod language;
mod types;

pub use language::Language;
pub use types::{ExecuteRequest, ExecuteResponse, UNSUPPORTED_LANGUAGE_MSG};

use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::pool::{PoolManager, SlotLease};
use crate::sandbox::{self, SandboxRuntime};

/// Runs code snippets on pooled sandboxes
pub struct CodeExecutor {
    pool: Arc<PoolManager>,
    runtime: Arc<dyn SandboxRuntime>,
}

impl CodeExecutor {
    pub fn new(pool: Arc<PoolManager>) -> Self {
        let runtime = pool.runtime();
        CodeExecutor { pool, runtime }
    }

    pub fn pool(&self) -> &Arc<PoolManager> {
        &self.pool
    }

    /// Resolve the request's language and execute it. An unknown language
    /// is an ordinary failed response.
    pub async fn execute_request(&self, request: &ExecuteRequest) -> Result<ExecuteResponse> {
        match request.language.parse::<Language>() {
            Ok(language) => self.execute(language, &request.code).await,
            Err(_) => {
                debug!("Rejecting unsupported language: {}", request.language);
                Ok(ExecuteResponse::unsupported_language())
            }
        }
    }

    /// Execute `code` on a pooled sandbox.
    ///
    /// Errors only when the pool is shutting down; everything else,
    /// including capacity rejection, is reported in the response.
    pub async fn execute(&self, language: Language, code: &str) -> Result<ExecuteResponse> {
        let started = Instant::now();
        let runtime = Arc::clone(&self.runtime);
        let code = code.to_string();

        let response = self
            .pool
            .run_task(move |lease| async move {
                match run_in_slot(runtime.as_ref(), &lease, language, &code).await {
                    Ok(response) => response,
                    Err(e) => {
                        warn!("Execution on sandbox {} failed: {}", lease.handle, e);
                        ExecuteResponse::failure(e.to_string())
                    }
                }
            })
            .await?;

        info!(
            language = %language,
            success = response.success,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Execution finished"
        );

        Ok(response)
    }
}

async fn run_in_slot(
    runtime: &dyn SandboxRuntime,
    lease: &SlotLease,
    language: Language,
    code: &str,
) -> Result<ExecuteResponse> {
    // The workspace is emptied on every release
    tokio::fs::create_dir_all(&lease.workspace).await?;
    tokio::fs::write(lease.workspace.join(language.file_name()), code).await?;
    runtime.copy_into(&lease.handle, &lease.workspace).await?;

    if let Some(compile) = language.compile_command() {
        let output = runtime.execute_in(&lease.handle, &compile).await?;
        if !output.success {
            debug!("Compilation failed on sandbox {}", lease.handle);
            return Ok(output.into());
        }
    }

    let output = runtime.execute_in(&lease.handle, &language.run_command()).await?;
    Ok(output.into())
}

/// Connect to Docker, warm the pool and wrap it in an executor
pub async fn start_executor(config: &Config) -> Result<CodeExecutor> {
    let runtime = sandbox::connect_runtime(&config.container).await?;
    let pool = PoolManager::initialize(config.pool.clone(), runtime).await?;
    Ok(CodeExecutor::new(pool))
}
