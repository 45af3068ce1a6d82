//! Per-tile content shared between a tile and its geometry loader.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::decoded::DecodedTile;
use crate::geometry::RenderObject;

/// Content handle shared by a [`crate::Tile`] and its geometry loader.
pub type SharedContent = Arc<Mutex<TileContent>>;

/// Decoded payload and built render objects of one tile.
///
/// The decoded payload is kept until geometry has been built from it, then
/// released. The resource size is cached and recomputed only after the
/// content changes.
#[derive(Debug, Default)]
pub struct TileContent {
    decoded: Option<Arc<DecodedTile>>,
    objects: Vec<RenderObject>,
    resource_size: Option<usize>,
}

impl TileContent {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap new content for sharing.
    pub fn shared() -> SharedContent {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn decoded(&self) -> Option<Arc<DecodedTile>> {
        self.decoded.clone()
    }

    pub fn has_decoded(&self) -> bool {
        self.decoded.is_some()
    }

    /// Replace the decoded payload.
    pub fn set_decoded(&mut self, decoded: Arc<DecodedTile>) {
        self.decoded = Some(decoded);
        self.resource_size = None;
    }

    /// Drop the decoded payload.
    pub fn release_decoded(&mut self) -> Option<Arc<DecodedTile>> {
        self.resource_size = None;
        self.decoded.take()
    }

    pub fn objects(&self) -> &[RenderObject] {
        &self.objects
    }

    /// Install freshly built objects and release the payload they came from.
    pub fn finish_geometry(&mut self, objects: Vec<RenderObject>) {
        self.objects = objects;
        self.decoded = None;
        self.resource_size = None;
    }

    /// Drop built objects, keeping the payload.
    pub fn clear_objects(&mut self) {
        if !self.objects.is_empty() {
            self.objects.clear();
            self.resource_size = None;
        }
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.decoded = None;
        self.objects.clear();
        self.resource_size = Some(0);
    }

    /// Approximate bytes held by the payload and the objects.
    pub fn resource_size(&mut self) -> usize {
        *self.resource_size.get_or_insert_with(|| {
            let decoded = self.decoded.as_ref().map_or(0, |d| d.byte_size());
            let objects: usize = self.objects.iter().map(|o| o.byte_size).sum();
            decoded + objects
        })
    }

    /// Force the next [`resource_size`](Self::resource_size) call to recompute.
    pub fn invalidate_resource_size(&mut self) {
        self.resource_size = None;
    }
}
