//! Reference-counted handle with explicit copy-on-write.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

/// Shared, immutable-by-default handle to a `T`.
///
/// Cloning the handle shares the value. Mutation goes through
/// [`make_mut`](SharedRef::make_mut), which clones the value first unless this
/// handle is the only one referencing it.
pub struct SharedRef<T>(Arc<T>);

impl<T> SharedRef<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Number of handles currently sharing the value.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    /// True if no other handle shares the value.
    pub fn is_exclusive(&self) -> bool {
        Arc::strong_count(&self.0) == 1 && Arc::weak_count(&self.0) == 0
    }

    /// Identity comparison.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    pub fn as_ptr(&self) -> *const T {
        Arc::as_ptr(&self.0)
    }
}

impl<T: Clone> SharedRef<T> {
    /// Mutable access, cloning the value if it is shared.
    ///
    /// Calling this twice without sharing the handle in between returns the
    /// same instance both times.
    pub fn make_mut(&mut self) -> &mut T {
        if !self.is_exclusive() {
            tracing::trace!("Copy-on-write clone (ref count {})", self.ref_count());
        }
        Arc::make_mut(&mut self.0)
    }

    /// Owned value, cloning only if shared.
    pub fn into_inner(self) -> T {
        Arc::try_unwrap(self.0).unwrap_or_else(|shared| (*shared).clone())
    }
}

impl<T> Clone for SharedRef<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T> Deref for SharedRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> From<T> for SharedRef<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for SharedRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}
