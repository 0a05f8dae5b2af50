// # Thread-Safe Binding
//
// Concurrency binding for transports that deliver callbacks on their own
// dispatcher threads.
//
// ## Lock
//
// [`SemaphoreLock`] is a binary semaphore built on `parking_lot`. Acquire
// and release are independent calls, so the lock can be handed around as a
// trait object without tying a guard's lifetime to the caller's stack.

use crate::error::{Error, Result};
use crate::traits::{BindingLock, ConcurrencyBinding};
use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Binary semaphore used as a binding lock
#[derive(Debug, Default)]
pub struct SemaphoreLock {
    held: Mutex<bool>,
    released: Condvar,
}

impl SemaphoreLock {
    /// Create an unlocked semaphore
    pub fn new() -> Self {
        Self::default()
    }
}

impl BindingLock for SemaphoreLock {
    fn acquire(&self) -> Result<()> {
        let mut held = self.held.lock();
        while *held {
            self.released.wait(&mut held);
        }
        *held = true;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let mut held = self.held.lock();
        if !*held {
            return Err(Error::Generic);
        }
        *held = false;
        self.released.notify_one();
        Ok(())
    }
}

/// Concurrency binding backed by real locks and thread sleeps
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSafeBinding;

impl ThreadSafeBinding {
    /// Create a new thread-safe binding
    pub fn new() -> Self {
        Self
    }
}

impl ConcurrencyBinding for ThreadSafeBinding {
    fn create_lock(&self) -> Result<Box<dyn BindingLock>> {
        Ok(Box::new(SemaphoreLock::new()))
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}
