//! The data source boundary and the per-load completion context.

use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use super::state::TileLoaderState;
use super::tile_loader::LoaderShared;
use crate::decoded::DecodedTile;
use crate::tile::TileKey;

/// Fetches and decodes tile data.
///
/// `load` must not block the calling thread for long: it is called from the
/// render loop. Hand the work to a thread pool or runtime and report through
/// the context when done. Completing synchronously inside `load` is allowed.
pub trait TileDataSource: Send + Sync {
    /// Start loading `ctx.key()`. Exactly one of the context's completion
    /// methods should eventually be called; dropping the context without
    /// calling one fails the load.
    fn load(&self, ctx: LoadContext);

    /// Release anything held for an in-flight load of `key`. Called on
    /// cancel after the context's token has been triggered.
    fn cancel(&self, _key: &TileKey) {}
}

/// Handle a data source uses to report one load attempt.
///
/// Each context belongs to one attempt. After the loader is canceled or
/// restarts, reports through an older context are ignored.
pub struct LoadContext {
    shared: Arc<LoaderShared>,
    generation: u64,
    token: CancellationToken,
    completed: bool,
}

impl LoadContext {
    pub(super) fn new(shared: Arc<LoaderShared>, generation: u64, token: CancellationToken) -> Self {
        Self {
            shared,
            generation,
            token,
            completed: false,
        }
    }

    pub fn key(&self) -> TileKey {
        self.shared.key
    }

    /// Token triggered when this attempt is canceled.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// True once the attempt has been canceled or superseded.
    pub fn is_canceled(&self) -> bool {
        self.token.is_cancelled() || !self.shared.is_current(self.generation)
    }

    /// Report intermediate progress (`Loaded` or `Decoding`).
    ///
    /// Returns false if the state was not applied.
    pub fn set_state(&self, state: TileLoaderState) -> bool {
        self.shared.report_progress(self.generation, state)
    }

    /// Finish with a decoded payload, or `None` if the tile has no data.
    pub fn on_decoded(mut self, decoded: Option<DecodedTile>) {
        self.completed = true;
        self.shared
            .complete(self.generation, TileLoaderState::Ready, decoded);
    }

    /// Finish in `state` without a payload.
    ///
    /// `Ready` and `Canceled` are taken as given; any other state fails the
    /// load with [`super::LoadError::Unexpected`].
    pub fn on_done(mut self, state: TileLoaderState) {
        self.completed = true;
        self.shared.complete(self.generation, state, None);
    }

    /// Fail the load.
    pub fn on_error(mut self, error: impl fmt::Display) {
        self.completed = true;
        self.shared.fail(self.generation, error.to_string());
    }
}

impl Drop for LoadContext {
    fn drop(&mut self) {
        if !self.completed {
            self.shared
                .fail(self.generation, "load dropped without completion".to_string());
        }
    }
}

impl fmt::Debug for LoadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadContext")
            .field("key", &self.shared.key)
            .field("generation", &self.generation)
            .field("canceled", &self.token.is_cancelled())
            .finish()
    }
}
