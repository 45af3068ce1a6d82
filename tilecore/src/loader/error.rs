//! Tile loading errors.

use thiserror::Error;

use super::state::TileLoaderState;

/// Why a load did not produce a ready tile.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The load was canceled.
    #[error("tile load canceled")]
    Canceled,

    /// The data source reported an error.
    #[error("tile load failed: {0}")]
    Failed(String),

    /// The data source finished in a state that is not a valid outcome.
    #[error("tile load ended in unexpected state {0}")]
    Unexpected(TileLoaderState),
}
