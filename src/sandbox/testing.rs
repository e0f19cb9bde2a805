//! In-memory runtime used by unit tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sandbox::runtime::{CommandOutput, SandboxRuntime, SlotHandle};

/// Scriptable fake runtime. Responses are keyed by the program name (`argv[0]`).
#[derive(Default)]
pub(crate) struct FakeRuntime {
    next_id: AtomicUsize,
    live: Mutex<HashSet<SlotHandle>>,
    destroyed: Mutex<Vec<SlotHandle>>,
    commands: Mutex<Vec<(SlotHandle, Vec<String>)>>,
    copied: Mutex<Vec<(SlotHandle, Vec<String>)>>,
    responses: Mutex<HashMap<String, CommandOutput>>,
    fail_create: AtomicBool,
    command_delay: Mutex<Duration>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn respond(&self, program: &str, output: CommandOutput) {
        self.responses.lock().insert(program.to_string(), output);
    }

    pub(crate) fn fail_creates(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    /// Make every command take `delay` before answering
    pub(crate) fn delay_commands(&self, delay: Duration) {
        *self.command_delay.lock() = delay;
    }

    pub(crate) fn created(&self) -> usize {
        self.next_id.load(Ordering::SeqCst)
    }

    pub(crate) fn live(&self) -> usize {
        self.live.lock().len()
    }

    pub(crate) fn destroyed(&self) -> Vec<SlotHandle> {
        self.destroyed.lock().clone()
    }

    /// Programs run so far, excluding pool housekeeping
    pub(crate) fn programs(&self) -> Vec<String> {
        self.commands_where(|program| program != "sh")
    }

    /// Shell commands the pool ran between tasks
    pub(crate) fn housekeeping(&self) -> Vec<String> {
        self.commands_where(|program| program == "sh")
    }

    fn commands_where(&self, keep: impl Fn(&str) -> bool) -> Vec<String> {
        self.commands
            .lock()
            .iter()
            .filter(|(_, argv)| argv.first().map_or(false, |p| keep(p)))
            .map(|(_, argv)| argv.join(" "))
            .collect()
    }

    pub(crate) fn copied_files(&self) -> Vec<String> {
        self.copied
            .lock()
            .iter()
            .flat_map(|(_, files)| files.clone())
            .collect()
    }
}

#[async_trait]
impl SandboxRuntime for FakeRuntime {
    fn name(&self) -> &str {
        "fake"
    }

    async fn create_sandbox(&self, _workspace: &Path) -> Result<SlotHandle> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(Error::RuntimeUnavailable("fake runtime refused".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let handle = SlotHandle::new(format!("fake-{}", id));
        self.live.lock().insert(handle.clone());
        Ok(handle)
    }

    async fn copy_into(&self, handle: &SlotHandle, host_path: &Path) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(host_path)? {
            files.push(entry?.file_name().to_string_lossy().into_owned());
        }
        self.copied.lock().push((handle.clone(), files));
        Ok(())
    }

    async fn execute_in(&self, handle: &SlotHandle, argv: &[String]) -> Result<CommandOutput> {
        let delay = *self.command_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if !self.live.lock().contains(handle) {
            return Err(Error::Container(format!("no such container: {}", handle)));
        }
        self.commands.lock().push((handle.clone(), argv.to_vec()));
        let program = argv.first().cloned().unwrap_or_default();
        Ok(self
            .responses
            .lock()
            .get(&program)
            .cloned()
            .unwrap_or_else(|| CommandOutput::stdout("")))
    }

    async fn destroy_sandbox(&self, handle: &SlotHandle) -> Result<()> {
        if self.live.lock().remove(handle) {
            self.destroyed.lock().push(handle.clone());
        }
        Ok(())
    }
}
