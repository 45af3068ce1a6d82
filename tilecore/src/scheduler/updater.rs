//! Render update requests.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Asks the render loop for another frame.
///
/// Implemented by the rendering context. The scheduler calls it when a pass
/// leaves work behind; loaders call it when a tile's data or geometry becomes
/// available.
pub trait RenderUpdater: Send + Sync {
    fn request_update(&self);
}

/// Updater that ignores every request.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopUpdater;

impl RenderUpdater for NoopUpdater {
    fn request_update(&self) {}
}

/// Updater that counts requests. Useful for headless drivers and tests.
#[derive(Debug, Default)]
pub struct UpdateCounter {
    count: AtomicUsize,
}

impl UpdateCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests received so far.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Return the count and reset it to zero.
    pub fn take(&self) -> usize {
        self.count.swap(0, Ordering::SeqCst)
    }
}

impl RenderUpdater for UpdateCounter {
    fn request_update(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
