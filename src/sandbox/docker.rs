//! Docker runtime for pooled sandboxes
//!
//! Containers are long-lived: each one is started once with a TTY, kept
//! idle in the pool, and every compile/run step is a `docker exec` inside
//! it. Source files are uploaded as an in-memory tar archive.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, LogOutput, RemoveContainerOptions,
    StartContainerOptions, StopContainerOptions, UploadToContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ContainerConfig;
use crate::error::{Error, Result};
use crate::sandbox::output::{Channel, OutputCollector};
use crate::sandbox::runtime::{CommandOutput, SandboxRuntime, SlotHandle, SANDBOX_WORKDIR};

/// Label put on every container this runtime creates
const POOL_LABEL: &str = "codesandbox.pool";

/// Docker-backed sandbox runtime
pub struct DockerRuntime {
    /// Docker client
    docker: Docker,
    /// Container configuration
    config: ContainerConfig,
}

impl DockerRuntime {
    /// Connect to the local Docker daemon and make sure the image exists
    pub async fn connect(config: &ContainerConfig) -> Result<Self> {
        let docker = Docker::connect_with_local_defaults().map_err(|e| {
            Error::RuntimeUnavailable(format!("Failed to connect to Docker: {}", e))
        })?;

        // Verify connection
        docker
            .ping()
            .await
            .map_err(|e| Error::RuntimeUnavailable(format!("Docker ping failed: {}", e)))?;

        info!("Sandbox runtime connected to Docker");

        let runtime = DockerRuntime {
            docker,
            config: config.clone(),
        };

        runtime.ensure_image().await?;

        Ok(runtime)
    }

    /// Ensure the sandbox image is available locally
    async fn ensure_image(&self) -> Result<()> {
        let image = &self.config.image;
        if self.docker.inspect_image(image).await.is_ok() {
            debug!("Image {} present", image);
            return Ok(());
        }

        if !self.config.pull_missing_image {
            return Err(Error::RuntimeUnavailable(format!(
                "Image {} not found and pulling is disabled",
                image
            )));
        }

        info!("Pulling Docker image: {}", image);

        let options = CreateImageOptions {
            from_image: image.clone(),
            ..Default::default()
        };

        let mut stream = self.docker.create_image(Some(options), None, None);

        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(status) = info.status {
                        debug!("Pull status: {}", status);
                    }
                }
                Err(e) => {
                    return Err(Error::RuntimeUnavailable(format!(
                        "Failed to pull image: {}",
                        e
                    )));
                }
            }
        }

        info!("Image pulled successfully");
        Ok(())
    }

    /// Remove pool containers left behind by a previous process
    pub async fn reap_orphans(&self) -> Result<usize> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![format!("{}=true", POOL_LABEL)]);

        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };

        let containers = self.docker.list_containers(Some(options)).await?;
        let mut reaped = 0;
        for id in containers.into_iter().filter_map(|c| c.id) {
            let handle = SlotHandle::new(id);
            match self.destroy_sandbox(&handle).await {
                Ok(()) => reaped += 1,
                Err(e) => warn!("Failed to reap orphaned sandbox {}: {}", handle, e),
            }
        }

        if reaped > 0 {
            info!("Reaped {} orphaned sandbox containers", reaped);
        }
        Ok(reaped)
    }

    fn container_config(&self, workspace: &Path) -> Config<String> {
        let mut labels = HashMap::new();
        labels.insert(POOL_LABEL.to_string(), "true".to_string());
        labels.insert(
            format!("{}.workspace", POOL_LABEL),
            workspace.display().to_string(),
        );

        Config {
            image: Some(self.config.image.clone()),
            tty: Some(true),
            open_stdin: Some(true),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(self.config.network_disabled),
            labels: Some(labels),
            host_config: Some(bollard::service::HostConfig {
                memory: parse_memory_limit(&self.config.memory_limit),
                memory_swap: parse_memory_limit(&self.config.memory_swap),
                nano_cpus: Some((self.config.cpu_limit * 1_000_000_000.0) as i64),
                network_mode: self.config.network_disabled.then(|| "none".to_string()),
                auto_remove: Some(false),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Best-effort kill of everything but init after a timed-out command
    async fn kill_strays(&self, handle: &SlotHandle) {
        let options = CreateExecOptions {
            cmd: Some(vec!["kill", "-9", "-1"]),
            ..Default::default()
        };
        let started = match self.docker.create_exec(handle.as_str(), options).await {
            Ok(exec) => self.docker.start_exec(&exec.id, None).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = started {
            debug!("Failed to kill leftover processes in sandbox {}: {}", handle, e);
        }
    }
}

/// Collect exec output until the stream ends or `limit` elapses.
///
/// On timeout any partial output is dropped and the result reads
/// `"timed out"`.
async fn drain_exec_output<S, E>(mut output: S, limit: Duration) -> Result<CommandOutput>
where
    S: Stream<Item = std::result::Result<LogOutput, E>> + Unpin,
    Error: From<E>,
{
    let mut collector = OutputCollector::new();
    let drained = tokio::time::timeout(limit, async {
        while let Some(chunk) = output.next().await {
            match chunk? {
                LogOutput::StdErr { message } => collector.push(Channel::Stderr, &message),
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    collector.push(Channel::Stdout, &message)
                }
                LogOutput::StdIn { .. } => {}
            }
        }
        Ok::<(), Error>(())
    })
    .await;

    match drained {
        Ok(Ok(())) => Ok(collector.finish()),
        Ok(Err(e)) => Err(e),
        Err(_) => Ok(CommandOutput::timed_out()),
    }
}

/// Build an in-memory tar archive of a directory's contents
fn build_archive(dir: &Path) -> std::io::Result<Vec<u8>> {
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_dir_all(".", dir)?;
    builder.into_inner()
}

fn is_status(err: &bollard::errors::Error, code: u16) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == code
    )
}

/// Parse a memory limit string (e.g., "512m", "1g") to bytes
fn parse_memory_limit(limit: &str) -> Option<i64> {
    let limit = limit.trim().to_lowercase();
    let (num_str, multiplier) = if let Some(n) = limit.strip_suffix("gb").or_else(|| limit.strip_suffix('g')) {
        (n, 1024 * 1024 * 1024)
    } else if let Some(n) = limit.strip_suffix("mb").or_else(|| limit.strip_suffix('m')) {
        (n, 1024 * 1024)
    } else if let Some(n) = limit.strip_suffix("kb").or_else(|| limit.strip_suffix('k')) {
        (n, 1024)
    } else {
        (limit.strip_suffix('b').unwrap_or(&limit), 1)
    };

    let num: i64 = num_str.trim().parse().ok()?;
    Some(num * multiplier)
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    fn name(&self) -> &str {
        "docker"
    }

    async fn create_sandbox(&self, workspace: &Path) -> Result<SlotHandle> {
        let container_name = format!("codesandbox-{}", uuid::Uuid::new_v4());

        let create_options = CreateContainerOptions {
            name: container_name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(create_options), self.container_config(workspace))
            .await
            .map_err(|e| Error::RuntimeUnavailable(format!("Failed to create container: {}", e)))?;

        let handle = SlotHandle::new(created.id);

        if let Err(e) = self
            .docker
            .start_container(handle.as_str(), None::<StartContainerOptions<String>>)
            .await
        {
            // Do not leak a created-but-stopped container
            let _ = self.destroy_sandbox(&handle).await;
            return Err(Error::RuntimeUnavailable(format!(
                "Failed to start container: {}",
                e
            )));
        }

        debug!("Started sandbox {} ({})", handle, container_name);
        Ok(handle)
    }

    async fn copy_into(&self, handle: &SlotHandle, host_path: &Path) -> Result<()> {
        // The release path wipes the work directory, so recreate it first
        let mkdir = vec![
            "mkdir".to_string(),
            "-p".to_string(),
            SANDBOX_WORKDIR.to_string(),
        ];
        let output = self.execute_in(handle, &mkdir).await?;
        if !output.success {
            return Err(Error::Container(format!(
                "Failed to create {}: {}",
                SANDBOX_WORKDIR, output.stderr
            )));
        }

        let dir = host_path.to_path_buf();
        let archive = tokio::task::spawn_blocking(move || build_archive(&dir))
            .await
            .map_err(|e| Error::Internal(format!("Archive task failed: {}", e)))??;

        let options = UploadToContainerOptions {
            path: SANDBOX_WORKDIR.to_string(),
            ..Default::default()
        };

        self.docker
            .upload_to_container(handle.as_str(), Some(options), bytes::Bytes::from(archive))
            .await?;

        Ok(())
    }

    async fn execute_in(&self, handle: &SlotHandle, argv: &[String]) -> Result<CommandOutput> {
        let options = CreateExecOptions {
            cmd: Some(argv.to_vec()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(handle.as_str(), options).await?;

        let output = match self.docker.start_exec(&exec.id, None).await? {
            StartExecResults::Attached { output, .. } => {
                drain_exec_output(output, self.config.command_timeout).await?
            }
            StartExecResults::Detached => {
                return Err(Error::Container("Exec started detached".to_string()));
            }
        };

        if output.timed_out {
            warn!(
                "Command {:?} in sandbox {} timed out after {:?}",
                argv, handle, self.config.command_timeout
            );
            self.kill_strays(handle).await;
        }

        Ok(output)
    }

    async fn destroy_sandbox(&self, handle: &SlotHandle) -> Result<()> {
        match self
            .docker
            .stop_container(handle.as_str(), Some(StopContainerOptions { t: 1 }))
            .await
        {
            Ok(()) => {}
            // 304: already stopped, 404: already gone
            Err(e) if is_status(&e, 304) || is_status(&e, 404) => {}
            Err(e) => warn!("Failed to stop sandbox {}: {}", handle, e),
        }

        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self
            .docker
            .remove_container(handle.as_str(), Some(options))
            .await
        {
            Ok(()) => {
                debug!("Removed sandbox {}", handle);
                Ok(())
            }
            Err(e) if is_status(&e, 404) => Ok(()),
            Err(e) => Err(Error::Container(format!(
                "Failed to remove container {}: {}",
                handle, e
            ))),
        }
    }
}
