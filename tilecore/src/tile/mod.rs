//! Tiles and their lifecycle.
//!
//! A [`Tile`] owns one [`crate::TileLoader`] and, when the application
//! renders geometry, one [`crate::TileGeometryLoader`]. The render loop calls
//! [`Tile::update`] once per frame for each active tile; the tile moves the
//! decoded payload from loader to geometry loader and queues geometry
//! creation when it is due.

mod content;
mod core;
mod key;

pub use self::core::{DisposeCallback, Tile};
pub use content::{SharedContent, TileContent};
pub use key::{ParseTileKeyError, TileKey};
