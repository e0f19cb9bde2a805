//! Sandbox pool manager
//!
//! Idle slots live in a mutex-guarded deque that is never locked across an
//! `.await`; blocked callers park on a `Notify`. The waiting counter and the
//! expansion budget are independent atomics, so expansion may fire slightly
//! early or late under contention.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use super::eviction;
use super::slot::{Slot, SlotLease};
use super::workspace;
use super::TaskOutcome;
use crate::config::{validate_pool_config, PoolConfig};
use crate::error::{Error, Result};
use crate::sandbox::{SandboxRuntime, SANDBOX_WORKDIR};

#[derive(Debug, Default)]
struct Counters {
    created: AtomicU64,
    destroyed: AtomicU64,
    replaced: AtomicU64,
    evicted: AtomicU64,
}

/// Point-in-time view of the pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolStats {
    /// Idle slots ready to be acquired
    pub available: usize,
    /// Callers currently blocked in acquire
    pub waiting: usize,
    /// Remaining creations allowed beyond the core size
    pub expansion_budget: usize,
    pub core_size: usize,
    pub max_size: usize,
    /// Sandboxes created since startup
    pub created: u64,
    /// Sandboxes destroyed since startup
    pub destroyed: u64,
    /// Sandboxes replaced after too many failed runs
    pub replaced: u64,
    /// Sandboxes removed by idle sweeps
    pub evicted: u64,
    pub shut_down: bool,
    pub taken_at: chrono::DateTime<chrono::Utc>,
}

/// Bounded, elastic pool of pre-warmed sandboxes
pub struct PoolManager {
    config: PoolConfig,
    runtime: Arc<dyn SandboxRuntime>,
    available: Mutex<VecDeque<Slot>>,
    slot_returned: Notify,
    waiting: AtomicUsize,
    expansion_budget: AtomicUsize,
    counters: Counters,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    /// Release, replacement and destroy work still in flight
    housekeeping: TaskTracker,
}

/// Keeps the waiting counter honest on every exit path, including a
/// dropped acquire future.
struct WaitingGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> WaitingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> (Self, usize) {
        let waiting = counter.fetch_add(1, Ordering::SeqCst) + 1;
        (WaitingGuard { counter }, waiting)
    }
}

impl Drop for WaitingGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A slot held by `run_task`. Released as failed if the task future is
/// dropped before it finishes.
struct HeldSlot<'a> {
    pool: &'a Arc<PoolManager>,
    slot: Option<Slot>,
}

impl HeldSlot<'_> {
    fn release(&mut self, succeeded: bool) {
        if let Some(slot) = self.slot.take() {
            drop(self.pool.release(slot, succeeded));
        }
    }
}

impl Drop for HeldSlot<'_> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        if tokio::runtime::Handle::try_current().is_ok() {
            warn!("Task for sandbox {} was cancelled, releasing it", slot.handle());
            drop(self.pool.release(slot, false));
        } else {
            error!("Sandbox {} dropped outside a runtime and leaked", slot.handle());
        }
    }
}

impl PoolManager {
    /// Warm `core_size` sandboxes and start the idle sweeper
    pub async fn initialize(config: PoolConfig, runtime: Arc<dyn SandboxRuntime>) -> Result<Arc<Self>> {
        validate_pool_config(&config).into_result()?;
        tokio::fs::create_dir_all(&config.workspace_root).await?;

        let pool = Arc::new(PoolManager {
            available: Mutex::new(VecDeque::with_capacity(config.max_size)),
            slot_returned: Notify::new(),
            waiting: AtomicUsize::new(0),
            expansion_budget: AtomicUsize::new(config.expansion_budget()),
            counters: Counters::default(),
            shutdown: CancellationToken::new(),
            sweeper: Mutex::new(None),
            housekeeping: TaskTracker::new(),
            runtime,
            config,
        });

        for _ in 0..pool.config.core_size {
            match pool.create_slot().await {
                Ok(slot) => pool.enqueue(slot),
                Err(e) => {
                    error!("Failed to warm sandbox pool: {}", e);
                    pool.shutdown().await;
                    return Err(e);
                }
            }
        }

        let sweeper = eviction::spawn(
            Arc::downgrade(&pool),
            pool.config.eviction_period,
            pool.shutdown.child_token(),
        );
        *pool.sweeper.lock() = Some(sweeper);

        info!(
            core_size = pool.config.core_size,
            max_size = pool.config.max_size,
            wait_queue_threshold = pool.config.wait_queue_threshold,
            runtime = pool.runtime.name(),
            "Sandbox pool ready"
        );

        Ok(pool)
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// The runtime shared by every slot
    pub fn runtime(&self) -> Arc<dyn SandboxRuntime> {
        Arc::clone(&self.runtime)
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Take an idle slot, growing the pool or waiting when none is idle.
    ///
    /// Waits without a timeout. Returns [`Error::CapacityExceeded`] when the
    /// wait queue reached its threshold and the pool cannot grow, and
    /// [`Error::Interrupted`] when the pool shuts down during the wait.
    pub async fn acquire(&self) -> Result<Slot> {
        if self.is_shut_down() {
            return Err(Error::Interrupted("sandbox pool is shut down".to_string()));
        }

        if let Some(slot) = self.try_take() {
            return Ok(slot);
        }

        let (_waiting, queued) = WaitingGuard::enter(&self.waiting);

        if queued >= self.config.wait_queue_threshold {
            match self.expand().await {
                Ok(true) => {}
                Ok(false) => {
                    return Err(Error::CapacityExceeded(format!(
                        "{} callers waiting and the pool is at its maximum of {}",
                        queued, self.config.max_size
                    )));
                }
                // Held slots will still come back, so keep waiting
                Err(e) => warn!("Pool expansion failed: {}", e),
            }
        }

        debug!(waiting = queued, "No idle sandbox, waiting");

        loop {
            let notified = self.slot_returned.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(slot) = self.try_take() {
                return Ok(slot);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = self.shutdown.cancelled() => {
                    return Err(Error::Interrupted(
                        "sandbox pool shut down while waiting".to_string(),
                    ));
                }
            }
        }
    }

    /// Spend one unit of expansion budget on a new slot.
    ///
    /// Returns `Ok(false)` without side effects when the budget is spent.
    pub async fn expand(&self) -> Result<bool> {
        let claimed = self
            .expansion_budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |budget| budget.checked_sub(1));
        if claimed.is_err() {
            warn!("Expansion budget exhausted, cannot grow the pool");
            return Ok(false);
        }

        match self.create_slot().await {
            Ok(slot) => {
                info!("Expanded sandbox pool with {}", slot.handle());
                self.enqueue(slot);
                Ok(true)
            }
            Err(e) => {
                self.expansion_budget.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    /// Hand a slot back. Housekeeping runs in the background and is awaited
    /// by `shutdown`; the returned handle may be ignored.
    pub fn release(self: &Arc<Self>, slot: Slot, succeeded: bool) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        self.housekeeping
            .spawn(async move { pool.recycle(slot, succeeded).await })
    }

    /// Acquire a slot, run `task` against it and release it in the background.
    ///
    /// A capacity rejection becomes `O::rejected` without running the task.
    /// Only an interrupted acquisition surfaces as an error.
    pub async fn run_task<F, Fut, O>(self: &Arc<Self>, task: F) -> Result<O>
    where
        F: FnOnce(SlotLease) -> Fut,
        Fut: Future<Output = O>,
        O: TaskOutcome,
    {
        let slot = match self.acquire().await {
            Ok(slot) => slot,
            Err(Error::CapacityExceeded(reason)) => {
                warn!("Rejecting task: {}", reason);
                return Ok(O::rejected(&reason));
            }
            Err(e) => return Err(e),
        };

        let lease = slot.lease();
        let mut held = HeldSlot {
            pool: self,
            slot: Some(slot),
        };

        let outcome = task(lease).await;
        held.release(outcome.is_success());
        Ok(outcome)
    }

    /// Remove slots idle for longer than `idle_timeout`, never taking the
    /// pool below `core_size`. Returns how many were evicted.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();

        let evicted: Vec<Slot> = {
            let mut available = self.available.lock();
            let excess = available.len().saturating_sub(self.config.core_size);
            if excess == 0 {
                return 0;
            }

            // Front of the deque is the least recently returned
            let mut evicted = Vec::new();
            let mut i = 0;
            while i < available.len() && evicted.len() < excess {
                if available[i].idle_for(now) > self.config.idle_timeout {
                    if let Some(slot) = available.remove(i) {
                        evicted.push(slot);
                    }
                } else {
                    i += 1;
                }
            }
            evicted
        };

        let count = evicted.len();
        for slot in evicted {
            debug!("Evicting idle sandbox {}", slot.handle());
            self.expansion_budget.fetch_add(1, Ordering::SeqCst);
            self.counters.evicted.fetch_add(1, Ordering::Relaxed);
            self.discard(slot);
        }

        if count > 0 {
            info!(evicted = count, available = self.available.lock().len(), "Evicted idle sandboxes");
        }
        count
    }

    /// Stop the sweeper, interrupt blocked callers, destroy idle slots and
    /// wait for in-flight releases to finish. Slots still held by callers
    /// are destroyed when they are released.
    pub async fn shutdown(&self) {
        let first = !self.shutdown.is_cancelled();
        // Once cancelled, `enqueue` refuses every slot
        self.shutdown.cancel();

        let sweeper = self.sweeper.lock().take();
        if let Some(handle) = sweeper {
            let _ = handle.await;
        }

        let drained: Vec<Slot> = self.available.lock().drain(..).collect();
        let count = drained.len();
        for slot in drained {
            self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
            destroy_slot(Arc::clone(&self.runtime), slot).await;
        }

        self.housekeeping.close();
        self.housekeeping.wait().await;

        if first {
            info!("Sandbox pool shut down, destroyed {} idle sandboxes", count);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            available: self.available.lock().len(),
            waiting: self.waiting.load(Ordering::SeqCst),
            expansion_budget: self.expansion_budget.load(Ordering::SeqCst),
            core_size: self.config.core_size,
            max_size: self.config.max_size,
            created: self.counters.created.load(Ordering::Relaxed),
            destroyed: self.counters.destroyed.load(Ordering::Relaxed),
            replaced: self.counters.replaced.load(Ordering::Relaxed),
            evicted: self.counters.evicted.load(Ordering::Relaxed),
            shut_down: self.is_shut_down(),
            taken_at: chrono::Utc::now(),
        }
    }

    fn try_take(&self) -> Option<Slot> {
        self.available.lock().pop_front()
    }

    async fn create_slot(&self) -> Result<Slot> {
        let dir = workspace::allocate(&self.config.workspace_root).await?;
        match self.runtime.create_sandbox(&dir).await {
            Ok(handle) => {
                self.counters.created.fetch_add(1, Ordering::Relaxed);
                debug!("Created sandbox {}", handle);
                Ok(Slot::new(handle, dir))
            }
            Err(e) => {
                workspace::remove(&dir).await;
                Err(e)
            }
        }
    }

    /// Insert into the idle queue, respecting `max_size`. After shutdown
    /// every slot is destroyed instead.
    fn enqueue(&self, slot: Slot) {
        let refused = {
            let mut available = self.available.lock();
            if self.shutdown.is_cancelled() {
                Some((slot, "pool is shut down"))
            } else if available.len() >= self.config.max_size {
                Some((slot, "pool is full"))
            } else {
                available.push_back(slot);
                None
            }
        };

        match refused {
            None => self.slot_returned.notify_one(),
            Some((slot, reason)) => {
                warn!("Discarding sandbox {}: {}", slot.handle(), reason);
                self.discard(slot);
            }
        }
    }

    /// Destroy a slot in the background
    fn discard(&self, slot: Slot) {
        self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
        self.housekeeping
            .spawn(destroy_slot(Arc::clone(&self.runtime), slot));
    }

    async fn recycle(&self, mut slot: Slot, succeeded: bool) {
        match self.runtime.execute_in(slot.handle(), &reset_command()).await {
            Ok(output) if output.success => {}
            Ok(output) => warn!(
                "Failed to reset sandbox {}: {}",
                slot.handle(),
                output.stderr
            ),
            Err(e) => warn!("Failed to reset sandbox {}: {}", slot.handle(), e),
        }

        workspace::remove(slot.workspace()).await;

        if !succeeded {
            slot.record_failure();
        }

        if self.is_shut_down() {
            debug!("Pool is shut down, destroying released sandbox {}", slot.handle());
            self.counters.destroyed.fetch_add(1, Ordering::Relaxed);
            destroy_slot(Arc::clone(&self.runtime), slot).await;
            return;
        }

        if slot.error_count() > self.config.error_threshold {
            self.replace(slot).await;
            return;
        }

        slot.touch();
        self.enqueue(slot);
    }

    /// Swap an unhealthy slot for a fresh one. Does not touch the budget
    /// unless the replacement cannot be created.
    async fn replace(&self, slot: Slot) {
        warn!(
            "Sandbox {} failed {} times, replacing it",
            slot.handle(),
            slot.error_count()
        );
        self.counters.replaced.fetch_add(1, Ordering::Relaxed);
        self.discard(slot);

        match self.create_slot().await {
            Ok(fresh) => self.enqueue(fresh),
            Err(e) => {
                // Let a later expansion make up for the lost slot
                self.expansion_budget.fetch_add(1, Ordering::SeqCst);
                error!("Failed to create replacement sandbox: {}", e);
            }
        }
    }
}

/// Kill whatever a timed-out run left behind, then empty the work directory.
/// `kill -1` spares the calling shell and the container's init.
fn reset_command() -> Vec<String> {
    vec![
        "sh".to_string(),
        "-c".to_string(),
        format!("kill -9 -1 2>/dev/null; rm -rf {}", SANDBOX_WORKDIR),
    ]
}

async fn destroy_slot(runtime: Arc<dyn SandboxRuntime>, slot: Slot) {
    if let Err(e) = runtime.destroy_sandbox(slot.handle()).await {
        warn!("Failed to destroy sandbox {}: {}", slot.handle(), e);
    }
    workspace::remove(slot.workspace()).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecuteResponse;
    use crate::sandbox::testing::FakeRuntime;
    use crate::sandbox::SlotHandle;
    use std::path::Path;
    use std::sync::atomic::AtomicBool;
    use std::time::Duration;
    use tempfile::TempDir;

    fn test_config(root: &Path, core_size: usize, max_size: usize, threshold: usize) -> PoolConfig {
        PoolConfig {
            core_size,
            max_size,
            wait_queue_threshold: threshold,
            idle_timeout: Duration::from_secs(5),
            eviction_period: Duration::from_secs(3600),
            error_threshold: 3,
            workspace_root: root.to_path_buf(),
        }
    }

    async fn pool_with(
        core_size: usize,
        max_size: usize,
        threshold: usize,
    ) -> (Arc<PoolManager>, Arc<FakeRuntime>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let pool = PoolManager::initialize(
            test_config(dir.path(), core_size, max_size, threshold),
            runtime.clone(),
        )
        .await
        .unwrap();
        (pool, runtime, dir)
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..1000 {
            if cond() {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("condition never became true");
    }

    fn idle_handles(pool: &PoolManager) -> Vec<SlotHandle> {
        pool.available
            .lock()
            .iter()
            .map(|slot| slot.handle().clone())
            .collect()
    }

    #[tokio::test]
    async fn test_initialize_warms_core_slots() {
        let (pool, runtime, dir) = pool_with(2, 4, 1).await;

        let stats = pool.stats();
        assert_eq!(stats.available, 2);
        assert_eq!(stats.expansion_budget, 2);
        assert_eq!(stats.waiting, 0);
        assert_eq!(runtime.created(), 2);

        // One workspace directory per slot
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[tokio::test]
    async fn test_initialize_fails_when_runtime_refuses() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        runtime.fail_creates(true);

        let result = PoolManager::initialize(test_config(dir.path(), 2, 4, 1), runtime).await;
        assert!(matches!(result, Err(Error::RuntimeUnavailable(_))));
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_config() {
        let dir = tempfile::tempdir().unwrap();
        let result = PoolManager::initialize(
            test_config(dir.path(), 4, 2, 1),
            Arc::new(FakeRuntime::new()),
        )
        .await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_acquire_takes_idle_slot() {
        let (pool, _runtime, _dir) = pool_with(2, 4, 1).await;

        let a = pool.acquire().await.unwrap();
        let b = pool.acquire().await.unwrap();
        assert_ne!(a.handle(), b.handle());
        assert_eq!(pool.stats().available, 0);
        assert_eq!(pool.stats().expansion_budget, 2);
    }

    #[tokio::test]
    async fn test_third_acquire_expands_without_blocking() {
        let (pool, runtime, _dir) = pool_with(2, 4, 1).await;

        let _a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();

        let c = tokio::time::timeout(Duration::from_secs(1), pool.acquire())
            .await
            .expect("expansion should not block")
            .unwrap();

        assert_eq!(c.handle().as_str(), "fake-3");
        assert_eq!(runtime.created(), 3);
        let stats = pool.stats();
        assert_eq!(stats.expansion_budget, 1);
        assert_eq!(stats.waiting, 0);
    }

    #[tokio::test]
    async fn test_capacity_exceeded_when_budget_spent() {
        let (pool, _runtime, _dir) = pool_with(1, 1, 1).await;

        let _held = pool.acquire().await.unwrap();
        let result = pool.acquire().await;

        assert!(matches!(result, Err(Error::CapacityExceeded(_))));
        assert_eq!(pool.stats().waiting, 0);
        assert_eq!(pool.stats().expansion_budget, 0);
    }

    #[tokio::test]
    async fn test_run_task_rejects_without_running() {
        let (pool, _runtime, _dir) = pool_with(1, 1, 1).await;
        let _held = pool.acquire().await.unwrap();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        let response: ExecuteResponse = pool
            .run_task(|_lease| async move {
                flag.store(true, Ordering::SeqCst);
                ExecuteResponse::success("unreachable")
            })
            .await
            .unwrap();

        assert!(!response.success);
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_blocked_acquire_receives_released_slot() {
        let (pool, _runtime, _dir) = pool_with(1, 2, 5).await;
        let held = pool.acquire().await.unwrap();
        let handle = held.handle().clone();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        wait_until(|| pool.stats().waiting == 1).await;

        pool.release(held, true).await.unwrap();

        let slot = waiter.await.unwrap().unwrap();
        assert_eq!(slot.handle(), &handle);
        assert_eq!(pool.stats().waiting, 0);
        // Threshold never reached, so no expansion happened
        assert_eq!(pool.stats().expansion_budget, 1);
    }

    #[tokio::test]
    async fn test_dropped_acquire_restores_waiting_count() {
        let (pool, _runtime, _dir) = pool_with(1, 2, 5).await;
        let _held = pool.acquire().await.unwrap();

        let result = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(result.is_err());
        assert_eq!(pool.stats().waiting, 0);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_waiters_and_destroys_slots() {
        let (pool, runtime, _dir) = pool_with(2, 2, 5).await;
        let a = pool.acquire().await.unwrap();
        let _b = pool.acquire().await.unwrap();

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        wait_until(|| pool.stats().waiting == 1).await;

        pool.shutdown().await;
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(Error::Interrupted(_))));

        // A slot released after shutdown is destroyed, not pooled
        pool.release(a, true).await.unwrap();
        assert_eq!(pool.stats().available, 0);
        assert_eq!(runtime.live(), 1);

        assert!(matches!(pool.acquire().await, Err(Error::Interrupted(_))));
        pool.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_release_keeps_error_count() {
        let (pool, runtime, _dir) = pool_with(1, 1, 1).await;

        let slot = pool.acquire().await.unwrap();
        let before = slot.last_activity();
        tokio::time::advance(Duration::from_secs(2)).await;
        pool.release(slot, true).await.unwrap();

        let slot = pool.acquire().await.unwrap();
        assert_eq!(slot.error_count(), 0);
        assert!(slot.last_activity() >= before + Duration::from_secs(2));

        assert!(runtime.destroyed().is_empty());
        assert!(runtime.programs().is_empty());
        assert!(!slot.workspace().exists());
    }

    #[tokio::test]
    async fn test_release_kills_leftover_processes() {
        let (pool, runtime, _dir) = pool_with(1, 1, 1).await;

        let slot = pool.acquire().await.unwrap();
        pool.release(slot, false).await.unwrap();

        assert_eq!(
            runtime.housekeeping(),
            vec!["sh -c kill -9 -1 2>/dev/null; rm -rf /box"]
        );
    }

    #[tokio::test]
    async fn test_fourth_failure_replaces_slot() {
        let (pool, runtime, _dir) = pool_with(1, 1, 1).await;
        let first = idle_handles(&pool)[0].clone();

        for _ in 0..3 {
            let slot = pool.acquire().await.unwrap();
            assert_eq!(slot.handle(), &first);
            pool.release(slot, false).await.unwrap();
        }

        // Three failures are tolerated
        let slot = pool.acquire().await.unwrap();
        assert_eq!(slot.handle(), &first);
        assert_eq!(slot.error_count(), 3);
        pool.release(slot, false).await.unwrap();
        wait_until(|| runtime.destroyed().len() == 1).await;

        let idle = idle_handles(&pool);
        assert_eq!(idle.len(), 1);
        assert_ne!(idle[0], first);
        assert_eq!(runtime.destroyed(), vec![first]);
        assert_eq!(pool.stats().replaced, 1);
        // Replacement does not consume expansion budget
        assert_eq!(pool.stats().expansion_budget, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_never_goes_below_core() {
        let (pool, runtime, _dir) = pool_with(2, 4, 1).await;
        assert!(pool.expand().await.unwrap());
        assert!(pool.expand().await.unwrap());
        assert!(!pool.expand().await.unwrap());
        assert_eq!(pool.stats().available, 4);

        tokio::time::advance(Duration::from_secs(10)).await;

        assert_eq!(pool.evict_idle(), 2);
        assert_eq!(pool.stats().available, 2);
        assert_eq!(pool.stats().expansion_budget, 2);
        assert_eq!(pool.evict_idle(), 0);

        wait_until(|| runtime.live() == 2).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_spares_recently_used() {
        let (pool, _runtime, _dir) = pool_with(1, 3, 1).await;
        pool.expand().await.unwrap();
        pool.expand().await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        let slot = pool.acquire().await.unwrap();
        let recent = slot.handle().clone();
        pool.release(slot, true).await.unwrap();

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(pool.evict_idle(), 2);
        assert_eq!(idle_handles(&pool), vec![recent]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evict_idle_noop_at_core_size() {
        let (pool, _runtime, _dir) = pool_with(2, 4, 1).await;
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_eq!(pool.evict_idle(), 0);
        assert_eq!(pool.stats().available, 2);
    }

    #[tokio::test]
    async fn test_expand_failure_refunds_budget() {
        let (pool, runtime, _dir) = pool_with(1, 2, 1).await;
        runtime.fail_creates(true);

        assert!(pool.expand().await.is_err());
        assert_eq!(pool.stats().expansion_budget, 1);
        assert_eq!(pool.stats().available, 1);
    }

    #[tokio::test]
    async fn test_acquire_keeps_waiting_when_expansion_fails() {
        let (pool, runtime, _dir) = pool_with(1, 2, 1).await;
        let held = pool.acquire().await.unwrap();
        let handle = held.handle().clone();
        runtime.fail_creates(true);

        let waiter = {
            let pool = pool.clone();
            tokio::spawn(async move { pool.acquire().await })
        };
        wait_until(|| pool.stats().waiting == 1).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!waiter.is_finished());
        assert_eq!(pool.stats().waiting, 1);
        assert_eq!(pool.stats().expansion_budget, 1);

        pool.release(held, true).await.unwrap();
        let slot = waiter.await.unwrap().unwrap();
        assert_eq!(slot.handle(), &handle);
        assert_eq!(pool.stats().waiting, 0);
    }

    #[tokio::test]
    async fn test_failed_replacement_refunds_budget() {
        let (pool, runtime, _dir) = pool_with(1, 2, 1).await;

        for _ in 0..3 {
            let slot = pool.acquire().await.unwrap();
            pool.release(slot, false).await.unwrap();
        }

        let slot = pool.acquire().await.unwrap();
        assert_eq!(slot.error_count(), 3);
        runtime.fail_creates(true);
        pool.release(slot, false).await.unwrap();

        assert_eq!(pool.stats().expansion_budget, 2);
        assert_eq!(pool.stats().available, 0);
        assert_eq!(pool.stats().replaced, 1);
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_inflight_release() {
        let (pool, runtime, _dir) = pool_with(1, 2, 5).await;
        runtime.delay_commands(Duration::from_millis(100));

        let response: ExecuteResponse = pool
            .run_task(|_lease| async { ExecuteResponse::success("done") })
            .await
            .unwrap();
        assert!(response.success);

        // The release is still resetting the sandbox at this point
        pool.shutdown().await;

        assert_eq!(runtime.live(), 0);
        assert_eq!(pool.stats().available, 0);
    }

    #[tokio::test]
    async fn test_enqueue_after_shutdown_destroys_slot() {
        let (pool, runtime, _dir) = pool_with(1, 2, 5).await;
        pool.shutdown().await;

        let late = pool.create_slot().await.unwrap();
        let handle = late.handle().clone();
        pool.enqueue(late);
        wait_until(|| runtime.live() == 0).await;

        assert_eq!(pool.stats().available, 0);
        assert!(runtime.destroyed().contains(&handle));
    }

    #[tokio::test]
    async fn test_cancelled_task_still_releases_slot() {
        let (pool, _runtime, _dir) = pool_with(1, 1, 1).await;

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            pool.run_task(|_lease| async {
                std::future::pending::<()>().await;
                ExecuteResponse::success("never")
            }),
        )
        .await;
        assert!(result.is_err());

        wait_until(|| pool.stats().available == 1).await;
        let slot = pool.acquire().await.unwrap();
        assert_eq!(slot.error_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_available_never_exceeds_max_under_load() {
        let dir = tempfile::tempdir().unwrap();
        let runtime = Arc::new(FakeRuntime::new());
        let mut config = test_config(dir.path(), 2, 4, 1);
        config.idle_timeout = Duration::ZERO;
        let pool = PoolManager::initialize(config, runtime.clone()).await.unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let watcher = {
            let pool = pool.clone();
            let stop = stop.clone();
            tokio::spawn(async move {
                let mut max_seen = 0;
                while !stop.load(Ordering::SeqCst) {
                    pool.evict_idle();
                    max_seen = max_seen.max(pool.stats().available);
                    tokio::task::yield_now().await;
                }
                max_seen
            })
        };

        let mut tasks = Vec::new();
        for i in 0..32 {
            let pool = pool.clone();
            tasks.push(tokio::spawn(async move {
                pool.run_task(|_lease| async move {
                    tokio::task::yield_now().await;
                    if i % 5 == 0 {
                        ExecuteResponse::failure("boom")
                    } else {
                        ExecuteResponse::success("ok")
                    }
                })
                .await
            }));
        }

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        stop.store(true, Ordering::SeqCst);
        let max_seen = watcher.await.unwrap();
        assert!(max_seen <= 4, "saw {} idle slots", max_seen);
        assert!(pool.stats().available <= 4);
        assert_eq!(pool.stats().waiting, 0);

        pool.shutdown().await;
    }
}
