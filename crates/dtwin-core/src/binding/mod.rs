// # Concurrency Bindings
//
// Implementations of [`ConcurrencyBinding`](crate::traits::ConcurrencyBinding)
// plus the guarded-state helper the core and interfaces use.
//
// - [`ThreadSafeBinding`]: real locks, real sleeps
// - [`CooperativeBinding`]: no-op locks for single-threaded `do_work` loops
//
// ## Guarded state
//
// [`Guarded`] pairs a binding lock with a `parking_lot::Mutex` around the
// protected state. The binding lock defines the critical section that the
// protocol reasons about. The inner mutex keeps the state sound even when
// the binding lock is a no-op. Both are always taken in the same order
// (binding lock first) and released in reverse.

pub mod cooperative;
pub mod thread_safe;

pub use cooperative::{CooperativeBinding, NoopLock};
pub use thread_safe::{SemaphoreLock, ThreadSafeBinding};

use crate::error::Result;
use crate::traits::{BindingGuard, BindingLock};
use parking_lot::{Mutex, MutexGuard};
use std::ops::{Deref, DerefMut};

/// State protected by a binding lock
pub(crate) struct Guarded<T> {
    lock: Box<dyn BindingLock>,
    state: Mutex<T>,
}

impl<T> Guarded<T> {
    pub(crate) fn new(lock: Box<dyn BindingLock>, state: T) -> Self {
        Self {
            lock,
            state: Mutex::new(state),
        }
    }

    /// Enter the critical section
    pub(crate) fn enter(&self) -> Result<Section<'_, T>> {
        let binding = BindingGuard::acquire(self.lock.as_ref())?;
        Ok(Section::new(self.state.lock(), Some(binding)))
    }

    /// Reach the state without the binding lock
    ///
    /// Only for bookkeeping that must happen even after a failed acquire.
    pub(crate) fn enter_unbound(&self) -> Section<'_, T> {
        Section::new(self.state.lock(), None)
    }
}

/// An entered critical section; releases everything on drop
pub(crate) struct Section<'a, T> {
    // Field order is drop order: state first, then the binding lock.
    state: MutexGuard<'a, T>,
    _binding: Option<BindingGuard<'a>>,
}

impl<'a, T> Section<'a, T> {
    pub(crate) fn new(state: MutexGuard<'a, T>, binding: Option<BindingGuard<'a>>) -> Self {
        Self {
            state,
            _binding: binding,
        }
    }
}

impl<T> Deref for Section<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.state
    }
}

impl<T> DerefMut for Section<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.state
    }
}
