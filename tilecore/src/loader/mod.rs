//! Tile data loading.
//!
//! A [`TileLoader`] drives fetching and decoding for one tile through an
//! application-supplied [`TileDataSource`]. The source may do its work
//! anywhere (a worker thread, an async runtime, synchronously) and reports
//! back through the [`LoadContext`] it was handed.
//!
//! # State Machine
//!
//! ```text
//!                 load_and_decode
//! Initialized ─────────────────────► Loading ──► Loaded ──► Decoding ──► Ready
//!                                       │           │           │
//!                                       └───────────┴───────────┴──► Failed
//!
//! any state ──cancel──► Canceled
//! Ready | Failed | Canceled ──load_and_decode──► Loading (restart)
//! ```
//!
//! Completions that arrive after a cancel, or from a load that has since
//! been restarted, are ignored.
//!
//! [`TileLoader::schedule_load`] defers the start to the shared scheduler as
//! `FetchAndDecode` work, so fetching competes with geometry creation for the
//! frame budget.

mod error;
mod source;
mod state;
mod tile_loader;

pub use error::LoadError;
pub use source::{LoadContext, TileDataSource};
pub use state::TileLoaderState;
pub use tile_loader::{LoadOutcome, TileLoader};
