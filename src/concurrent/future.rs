//! One-shot promise/future pair whose result can be shared by many consumers.

use crate::pipeline::error::{PipelineError, PipelineResult};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

struct FutureInner<T> {
    slot: Mutex<Option<PipelineResult<T>>>,
    ready: Condvar,
    canceled: AtomicBool,
}

impl<T> FutureInner<T> {
    fn fulfill(&self, result: PipelineResult<T>) -> bool {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return false;
        }
        *slot = Some(result);
        self.ready.notify_all();
        true
    }
}

/// Consumer side. Cheap to clone; all clones observe the same result.
pub struct SharedFuture<T> {
    inner: Arc<FutureInner<T>>,
}

/// Producer side. Dropping an unfulfilled promise resolves the future as canceled.
pub struct Promise<T> {
    inner: Arc<FutureInner<T>>,
}

impl<T> Promise<T> {
    pub fn new() -> (Promise<T>, SharedFuture<T>) {
        let inner = Arc::new(FutureInner {
            slot: Mutex::new(None),
            ready: Condvar::new(),
            canceled: AtomicBool::new(false),
        });
        (
            Promise {
                inner: inner.clone(),
            },
            SharedFuture { inner },
        )
    }

    /// Resolve the future. Later calls are ignored.
    pub fn set(self, result: PipelineResult<T>) {
        self.inner.fulfill(result);
    }

    /// True once a consumer asked for cancellation.
    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    pub fn future(&self) -> SharedFuture<T> {
        SharedFuture {
            inner: self.inner.clone(),
        }
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        self.inner.fulfill(Err(PipelineError::Canceled));
    }
}

impl<T> SharedFuture<T> {
    /// Future that is already resolved.
    pub fn ready(result: PipelineResult<T>) -> Self {
        let (promise, future) = Promise::new();
        promise.set(result);
        future
    }

    pub fn is_finished(&self) -> bool {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Request cooperative cancellation of the producing work.
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same underlying future.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl<T: Clone> SharedFuture<T> {
    /// Result if already available.
    pub fn try_result(&self) -> Option<PipelineResult<T>> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Block the calling thread for at most `timeout` waiting for the result.
    ///
    /// Only useful for futures resolved by other threads. Futures produced by a
    /// pipeline are resolved on its owner thread; use `Pipeline::wait` for those.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<PipelineResult<T>> {
        let slot = self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner);
        let (slot, _) = self
            .inner
            .ready
            .wait_timeout_while(slot, timeout, |s| s.is_none())
            .unwrap_or_else(PoisonError::into_inner);
        slot.clone()
    }
}

impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedFuture")
            .field("finished", &self.is_finished())
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
