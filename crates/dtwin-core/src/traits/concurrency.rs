// # Concurrency Binding Trait
//
// Defines the locking and sleeping capability the core uses.
//
// ## Purpose
//
// Thread-safe deployments receive transport callbacks on arbitrary threads
// and need a real mutual-exclusion primitive. Cooperative deployments run
// everything on one thread from inside `do_work`, so locking is a no-op.
// The core is written once against this trait and works in both.
//
// ## Lock lifecycle
//
// - init: [`ConcurrencyBinding::create_lock`]
// - acquire/release: [`BindingLock::acquire`] / [`BindingLock::release`],
//   normally through the RAII [`BindingGuard`]
// - deinit: dropping the boxed lock

use crate::error::Result;
use std::time::Duration;
use tracing::error;

/// A mutual-exclusion primitive supplied by a [`ConcurrencyBinding`]
///
/// Acquire and release are separate calls so that implementations can be
/// plain semaphores or no-ops.
pub trait BindingLock: Send + Sync {
    /// Block until the lock is held by the caller
    fn acquire(&self) -> Result<()>;

    /// Release a lock previously acquired by the caller
    fn release(&self) -> Result<()>;
}

/// Trait for concurrency bindings
///
/// # Thread Safety
///
/// Implementations must be shareable across threads even when the locks
/// they hand out are no-ops.
pub trait ConcurrencyBinding: Send + Sync {
    /// Create a new, unlocked lock
    fn create_lock(&self) -> Result<Box<dyn BindingLock>>;

    /// Put the calling thread to sleep
    fn sleep(&self, duration: Duration);
}

/// Holds a [`BindingLock`] until dropped
pub struct BindingGuard<'a> {
    lock: &'a dyn BindingLock,
}

impl<'a> BindingGuard<'a> {
    /// Acquire `lock` and return a guard that releases it on drop
    pub fn acquire(lock: &'a dyn BindingLock) -> Result<Self> {
        lock.acquire()?;
        Ok(Self { lock })
    }
}

impl Drop for BindingGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            error!("Failed to release binding lock: {}", e);
        }
    }
}

impl std::fmt::Debug for BindingGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingGuard").finish_non_exhaustive()
    }
}
