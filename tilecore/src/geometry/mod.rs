//! Geometry classification and the per-tile geometry state machine.
//!
//! Once a tile's data has been decoded, its [`TileGeometryLoader`] classifies
//! the content into [`GeometryKind`]s and queues a `Create` task with the
//! shared scheduler. The task runs the application's [`GeometryCreator`] and
//! stores the resulting [`RenderObject`]s on the tile.
//!
//! # State Machine
//!
//! ```text
//! Initialized ──update──► CreationQueued ──task runs──► CreatingGeometry ──► Finished
//!      ▲                        │                              │
//!      │                      cancel                         cancel (result discarded)
//!      │                        ▼                              ▼
//!      └────reset──────────  Canceled ◄────────────────────────┘
//!
//! any state ──dispose──► Disposed
//! ```

mod creator;
mod kind;
mod loader;

pub use creator::{CreationRequest, GeometryCreator, GeometryError, RenderObject};
pub use kind::{filter_admits, kind_filters_equal, GeometryKind, GeometryKindSet, KindFilter};
pub use loader::{TileGeometryLoader, TileGeometryLoaderState};
