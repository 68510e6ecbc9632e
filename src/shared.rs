use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A value shared by task bodies, only changed under its lock.
///
/// Clones share the same value. A modifier that panics leaves the previous
/// value in place and does not wedge the lock for later callers.
pub struct SharedState<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> SharedState<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replaces the current value with `modifier(&current)`.
    pub fn modify<F>(&self, modifier: F)
    where
        F: FnOnce(&T) -> T,
    {
        let mut guard = self.lock();
        let next = modifier(&guard);
        *guard = next;
    }

    /// Like [`modify`](Self::modify), but keeps the current value when the
    /// modifier fails.
    pub fn try_modify<F, E>(&self, modifier: F) -> Result<(), E>
    where
        F: FnOnce(&T) -> Result<T, E>,
    {
        let mut guard = self.lock();
        *guard = modifier(&guard)?;
        Ok(())
    }

    /// Runs `f` against the current value while holding the lock.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.lock())
    }

    /// Recovers the value once no other clone is alive.
    pub fn into_inner(self) -> Result<T, Self> {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => Ok(mutex.into_inner().unwrap_or_else(PoisonError::into_inner)),
            Err(inner) => Err(Self { inner }),
        }
    }
}

impl<T: Clone> SharedState<T> {
    pub fn read(&self) -> T {
        self.lock().clone()
    }
}

impl<T> Clone for SharedState<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default> Default for SharedState<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedState").field(&*self.lock()).finish()
    }
}
