//! Safe global initialization.
//!
//! Provides a safe alternative to `static mut` for the module-scope
//! singletons this kernel relies on (GIC, frame allocator, scheduler array,
//! virtqueues). Everything here lives in-line inside a `spin::Mutex`, so
//! there is no heap allocation and these can be initialized before the
//! kernel heap exists.

use spin::Mutex;

/// Safe global state with a mutex.
///
/// `GlobalState<T>` is initialized exactly once via [`GlobalState::init`]
/// and never torn down, matching the init-once lifecycle every singleton in
/// this kernel follows (see `DESIGN.md`).
pub struct GlobalState<T> {
    inner: Mutex<Option<T>>,
}

impl<T> GlobalState<T> {
    /// Create new uninitialized global state.
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Initialize the global state. Returns the value back on double-init.
    pub fn init(&self, value: T) -> Result<(), T> {
        let mut lock = self.inner.lock();
        if lock.is_some() {
            Err(value)
        } else {
            *lock = Some(value);
            Ok(())
        }
    }

    /// Get reference with closure.
    pub fn with<R, F: FnOnce(&T) -> R>(&self, f: F) -> Option<R> {
        let lock = self.inner.lock();
        lock.as_ref().map(f)
    }

    /// Get mutable reference with closure.
    pub fn with_mut<R, F: FnOnce(&mut T) -> R>(&self, f: F) -> Option<R> {
        let mut lock = self.inner.lock();
        lock.as_mut().map(f)
    }

    /// True if initialized.
    pub fn is_init(&self) -> bool {
        self.inner.lock().is_some()
    }
}

impl<T> Default for GlobalState<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: the inner spin::Mutex serializes all access to the Option<T>, so
// sharing GlobalState across execution contexts only requires T: Send.
unsafe impl<T: Send> Send for GlobalState<T> {}
// SAFETY: see above -- the mutex prevents concurrent access, so T need not
// be Sync itself.
unsafe impl<T: Send> Sync for GlobalState<T> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_then_double_init_fails() {
        let state = GlobalState::new();
        assert!(state.init(1u32).is_ok());
        assert_eq!(state.init(2u32), Err(2u32));
    }

    #[test]
    fn with_mut_observes_prior_write() {
        let state: GlobalState<u32> = GlobalState::new();
        assert!(state.with(|_| ()).is_none());
        state.init(10).unwrap();
        state.with_mut(|v| *v += 5);
        assert_eq!(state.with(|v| *v), Some(15));
    }
}
