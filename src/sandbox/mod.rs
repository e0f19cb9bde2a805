//! Sandbox module - container runtimes for pooled code execution
//!
//! - runtime.rs: the `SandboxRuntime` contract consumed by the pool
//! - output.rs: stream-order stdout/stderr classification
//! - docker.rs: Docker implementation via bollard

mod docker;
mod output;
mod runtime;

#[cfg(test)]
pub(crate) mod testing;

pub use docker::DockerRuntime;
pub use output::{Channel, OutputCollector};
pub use runtime::{CommandOutput, SandboxRuntime, SlotHandle, SANDBOX_WORKDIR, TIMED_OUT_MSG};

use std::sync::Arc;

use crate::config::ContainerConfig;
use crate::error::Result;

/// Connect the runtime shared by every slot of the pool
pub async fn connect_runtime(config: &ContainerConfig) -> Result<Arc<DockerRuntime>> {
    let runtime = DockerRuntime::connect(config).await?;
    runtime.reap_orphans().await?;
    Ok(Arc::new(runtime))
}
