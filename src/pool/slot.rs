//! Pooled sandbox slot

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::sandbox::SlotHandle;

/// One ready-to-use container plus its host-side staging directory.
///
/// A slot is owned either by the pool's idle queue or by exactly one
/// caller between acquire and release.
#[derive(Debug)]
pub struct Slot {
    handle: SlotHandle,
    workspace: PathBuf,
    last_activity: Instant,
    error_count: u32,
}

impl Slot {
    pub(crate) fn new(handle: SlotHandle, workspace: PathBuf) -> Self {
        Slot {
            handle,
            workspace,
            last_activity: Instant::now(),
            error_count: 0,
        }
    }

    pub fn handle(&self) -> &SlotHandle {
        &self.handle
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Time of the last healthy return to the pool
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    /// Failed runs over the slot's whole life. Never reset.
    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub(crate) fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_activity)
    }

    pub(crate) fn record_failure(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub(crate) fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// What a task gets to see of the slot
    pub fn lease(&self) -> SlotLease {
        SlotLease {
            handle: self.handle.clone(),
            workspace: self.workspace.clone(),
        }
    }
}

/// Owned view of an acquired slot handed to a task
#[derive(Debug, Clone)]
pub struct SlotLease {
    pub handle: SlotHandle,
    pub workspace: PathBuf,
}
