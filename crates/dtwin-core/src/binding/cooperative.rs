// # Cooperative Binding
//
// Concurrency binding for single-threaded deployments where every callback
// is delivered from inside `do_work` on the application's own thread.
//
// Locks are no-ops and sleeping returns immediately: with one thread there
// is never anyone to wait for.

use crate::error::Result;
use crate::traits::{BindingLock, ConcurrencyBinding};
use std::time::Duration;

/// Lock that never blocks
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLock;

impl BindingLock for NoopLock {
    fn acquire(&self) -> Result<()> {
        Ok(())
    }

    fn release(&self) -> Result<()> {
        Ok(())
    }
}

/// Concurrency binding for cooperative (`do_work` driven) deployments
#[derive(Debug, Clone, Copy, Default)]
pub struct CooperativeBinding;

impl CooperativeBinding {
    /// Create a new cooperative binding
    pub fn new() -> Self {
        Self
    }
}

impl ConcurrencyBinding for CooperativeBinding {
    fn create_lock(&self) -> Result<Box<dyn BindingLock>> {
        Ok(Box::new(NoopLock))
    }

    fn sleep(&self, _duration: Duration) {}
}
