//! Settle-once completion handles.
//!
//! A [`Completion`] is a cloneable handle to a value that is produced exactly
//! once. Any number of holders can poll it with [`Completion::try_get`] or
//! await it with [`Completion::wait`]; all of them observe the same value.
//! Clones share identity, which [`Completion::ptr_eq`] exposes so callers can
//! tell whether two requests were coalesced onto the same operation.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

struct Inner<T> {
    value: Mutex<Option<T>>,
    notify: Notify,
}

/// Cloneable handle to a value that settles exactly once.
pub struct Completion<T> {
    inner: Arc<Inner<T>>,
}

impl<T: Clone> Completion<T> {
    /// Create an unsettled completion.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(None),
                notify: Notify::new(),
            }),
        }
    }

    /// Create a completion that is already settled with `value`.
    pub fn settled(value: T) -> Self {
        let completion = Self::new();
        completion.settle(value);
        completion
    }

    /// Settle with `value`.
    ///
    /// Returns `false` (and drops `value`) if the completion was already
    /// settled; the first value always wins.
    pub fn settle(&self, value: T) -> bool {
        {
            let mut slot = self.inner.value.lock();
            if slot.is_some() {
                return false;
            }
            *slot = Some(value);
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Returns the settled value, if any.
    pub fn try_get(&self) -> Option<T> {
        self.inner.value.lock().clone()
    }

    /// Returns true once a value is present.
    pub fn is_settled(&self) -> bool {
        self.inner.value.lock().is_some()
    }

    /// Wait for the value.
    pub async fn wait(&self) -> T {
        loop {
            // Register before checking so a settle between the check and the
            // await is not missed.
            let notified = self.inner.notify.notified();
            if let Some(value) = self.try_get() {
                return value;
            }
            notified.await;
        }
    }

    /// True if both handles refer to the same operation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: Clone> Default for Completion<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Completion<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("value", &*self.inner.value.lock())
            .finish()
    }
}
