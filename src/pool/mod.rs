//! Pool module - pre-warmed sandbox slots
//!
//! - slot.rs: a pooled container plus its host workspace
//! - manager.rs: acquire/release, elastic expansion, shutdown
//! - eviction.rs: periodic idle sweep
//! - workspace.rs: host staging directories

mod eviction;
mod manager;
mod slot;
mod workspace;

pub use manager::{PoolManager, PoolStats};
pub use slot::{Slot, SlotLease};

/// Result of a task run against a slot.
///
/// Decides whether the slot counts the run as a failure, and how a task
/// rejected for lack of capacity is reported.
pub trait TaskOutcome: Send + 'static {
    fn is_success(&self) -> bool;

    fn rejected(reason: &str) -> Self;
}
