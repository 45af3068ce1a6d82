//! Tile loader states.

use std::fmt;

/// State of a [`super::TileLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileLoaderState {
    Initialized,
    Loading,
    Loaded,
    Decoding,
    Ready,
    Canceled,
    Failed,
}

impl TileLoaderState {
    /// True for `Ready`, `Canceled` and `Failed`.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TileLoaderState::Ready | TileLoaderState::Canceled | TileLoaderState::Failed
        )
    }

    /// True while a load is outstanding.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            TileLoaderState::Loading | TileLoaderState::Loaded | TileLoaderState::Decoding
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileLoaderState::Initialized => "initialized",
            TileLoaderState::Loading => "loading",
            TileLoaderState::Loaded => "loaded",
            TileLoaderState::Decoding => "decoding",
            TileLoaderState::Ready => "ready",
            TileLoaderState::Canceled => "canceled",
            TileLoaderState::Failed => "failed",
        }
    }
}

impl fmt::Display for TileLoaderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
