//! Tilecore - per-tile load and geometry scheduling for tiled 3D maps
//!
//! This library sequences the work a map renderer does for each visible tile:
//! fetching and decoding raw tile data, classifying what the decoded data
//! contains, and building renderable geometry from it. Every tile runs its own
//! pair of state machines while a single shared [`scheduler::TaskScheduler`]
//! decides which units of work run in each frame so the render loop stays
//! inside its frame budget.
//!
//! # Architecture
//!
//! ```text
//!  render loop ──► Tile::update(zoom) ──► TileGeometryLoader::update
//!       │                 │                        │
//!       │           Tile::load()                   ▼
//!       │                 │                 TaskScheduler::add (Create)
//!       │                 ▼                        │
//!       │        TileLoader ──► TileDataSource     │
//!       │                                          ▼
//!       └──────────────► TaskScheduler::process_pending(frame_start)
//!                              │
//!                              ▼
//!                      GeometryCreator::create ──► TileContent
//! ```
//!
//! The data source and geometry creator are supplied by the embedding
//! application; this crate only decides when they run.

pub mod completion;
pub mod config;
pub mod decoded;
pub mod geometry;
pub mod loader;
pub mod logging;
pub mod scheduler;
pub mod telemetry;
pub mod tile;

pub use completion::Completion;
pub use config::{ConfigError, EngineConfig, LoggingConfig, SchedulerConfig};
pub use decoded::{ContentItem, DecodedTile, Technique, TechniqueName};
pub use geometry::{
    CreationRequest, GeometryCreator, GeometryError, GeometryKind, GeometryKindSet, KindFilter,
    RenderObject, TileGeometryLoader, TileGeometryLoaderState,
};
pub use loader::{
    LoadContext, LoadError, LoadOutcome, TileDataSource, TileLoader, TileLoaderState,
};
pub use logging::{init_logging, LoggingError, LoggingGuard};
pub use scheduler::{
    DrainReport, FnTask, NoopUpdater, RenderUpdater, Task, TaskGroup, TaskScheduler,
    UpdateCounter,
};
pub use telemetry::{EngineMetrics, TelemetrySnapshot};
pub use tile::{DisposeCallback, ParseTileKeyError, SharedContent, Tile, TileContent, TileKey};
