//! The geometry creation boundary.
//!
//! Building meshes, label batches and the like is the embedding renderer's
//! job. It plugs in through [`GeometryCreator`]; this crate only decides when
//! the creator runs and what happens to its output.

use std::any::Any;
use std::fmt;

use thiserror::Error;

use super::kind::{filter_admits, GeometryKind, GeometryKindSet, KindFilter};
use crate::decoded::DecodedTile;
use crate::tile::TileKey;

/// Errors surfaced by geometry creation and its completion handle.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GeometryError {
    /// Creation was canceled before it finished.
    #[error("geometry creation canceled")]
    Canceled,

    /// The loader was disposed.
    #[error("geometry loader disposed")]
    Disposed,

    /// The creation routine failed.
    #[error("geometry creation failed: {0}")]
    Creation(String),
}

/// A renderable object built for a tile.
pub struct RenderObject {
    /// Kind of content the object renders.
    pub kind: GeometryKind,
    /// Approximate memory held by the object, for resource accounting.
    pub byte_size: usize,
    payload: Box<dyn Any + Send + Sync>,
}

impl RenderObject {
    pub fn new(kind: GeometryKind, byte_size: usize, payload: impl Any + Send + Sync) -> Self {
        Self {
            kind,
            byte_size,
            payload: Box::new(payload),
        }
    }

    /// The renderer-specific payload, if it has type `T`.
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref()
    }
}

impl fmt::Debug for RenderObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderObject")
            .field("kind", &self.kind)
            .field("byte_size", &self.byte_size)
            .finish_non_exhaustive()
    }
}

/// Everything a creator needs to build one tile's geometry.
#[derive(Debug)]
pub struct CreationRequest<'a> {
    pub key: TileKey,
    /// Display zoom level at the time the tile was last updated.
    pub zoom_level: f64,
    pub decoded: &'a DecodedTile,
    /// Kinds present in `decoded`.
    pub kinds: &'a GeometryKindSet,
    pub enabled: &'a KindFilter,
    pub disabled: &'a KindFilter,
}

impl CreationRequest<'_> {
    /// Whether content of `kind` should produce geometry under the active
    /// filters.
    pub fn admits(&self, kind: &GeometryKind) -> bool {
        filter_admits(self.enabled, self.disabled, kind)
    }
}

/// Builds renderable objects from a decoded tile.
///
/// Called synchronously from the scheduler pass, on the thread that calls
/// [`crate::scheduler::TaskScheduler::process_pending`].
pub trait GeometryCreator: Send + Sync {
    /// Build the tile's objects.
    fn create(&self, request: &CreationRequest<'_>) -> Result<Vec<RenderObject>, GeometryError>;

    /// Estimated creation time in milliseconds, used for frame budgeting.
    fn estimate_cost(&self, _decoded: &DecodedTile) -> Option<f64> {
        None
    }
}
