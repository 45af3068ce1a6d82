//! The tile.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::content::{SharedContent, TileContent};
use super::key::TileKey;
use crate::completion::Completion;
use crate::decoded::DecodedTile;
use crate::geometry::{
    GeometryCreator, KindFilter, RenderObject, TileGeometryLoader, TileGeometryLoaderState,
};
use crate::loader::{LoadError, LoadOutcome, TileDataSource, TileLoader, TileLoaderState};
use crate::scheduler::{RenderUpdater, TaskScheduler};
use crate::telemetry::EngineMetrics;

/// Called once with the tile's key when the tile is disposed.
pub type DisposeCallback = Box<dyn FnOnce(TileKey) + Send>;

/// One tile of the map.
///
/// Tiles are owned and driven by the render loop, hence `&mut self` on the
/// lifecycle methods. Dropping a tile disposes it.
pub struct Tile {
    key: TileKey,
    loader: TileLoader,
    geometry_loader: Option<TileGeometryLoader>,
    content: SharedContent,
    scheduler: Arc<TaskScheduler>,
    updater: Arc<dyn RenderUpdater>,
    metrics: Arc<EngineMetrics>,
    visible: bool,
    visible_area: f64,
    zoom_level: f64,
    enabled_kinds: KindFilter,
    disabled_kinds: KindFilter,
    disposed: bool,
    dispose_callbacks: Vec<DisposeCallback>,
}

impl Tile {
    /// Create a tile that loads through `source`. Without a geometry creator
    /// the tile only holds its decoded payload.
    pub fn new(key: TileKey, source: Arc<dyn TileDataSource>, scheduler: Arc<TaskScheduler>) -> Self {
        let updater = Arc::clone(scheduler.updater());
        let metrics = Arc::clone(scheduler.metrics());
        Self {
            key,
            loader: TileLoader::new(key, source, Arc::clone(&updater), Arc::clone(&metrics)),
            geometry_loader: None,
            content: TileContent::shared(),
            scheduler,
            updater,
            metrics,
            visible: true,
            visible_area: 0.0,
            zoom_level: f64::from(key.level()),
            enabled_kinds: None,
            disabled_kinds: None,
            disposed: false,
            dispose_callbacks: Vec::new(),
        }
    }

    /// Attach a geometry loader that builds objects with `creator`.
    pub fn with_geometry_creator(mut self, creator: Arc<dyn GeometryCreator>) -> Self {
        self.geometry_loader = Some(TileGeometryLoader::new(
            self.key,
            Arc::clone(&self.scheduler),
            creator,
            Arc::clone(&self.content),
        ));
        self
    }

    pub fn key(&self) -> TileKey {
        self.key
    }

    pub fn loader(&self) -> &TileLoader {
        &self.loader
    }

    pub fn geometry_loader(&self) -> Option<&TileGeometryLoader> {
        self.geometry_loader.as_ref()
    }

    pub fn loader_state(&self) -> TileLoaderState {
        self.loader.state()
    }

    pub fn geometry_state(&self) -> Option<TileGeometryLoaderState> {
        self.geometry_loader.as_ref().map(TileGeometryLoader::state)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    /// True once loading has finished and geometry, if any, is settled.
    pub fn is_settled(&self) -> bool {
        self.loader.is_finished()
            && self
                .geometry_loader
                .as_ref()
                .map_or(true, TileGeometryLoader::is_settled)
    }

    // =========================================================================
    // Visibility and priority
    // =========================================================================

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide the tile. Hiding cancels geometry work that has not
    /// finished.
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        if visible {
            return;
        }
        if let Some(geometry) = &self.geometry_loader {
            if !geometry.is_settled() {
                debug!(tile = %self.key, "Tile hidden, canceling geometry");
                geometry.cancel();
            }
        }
    }

    pub fn visible_area(&self) -> f64 {
        self.visible_area
    }

    /// Estimated on-screen area, used for scheduling.
    pub fn set_visible_area(&mut self, area: f64) {
        self.visible_area = area;
        self.loader.set_priority(self.priority());
        if let Some(geometry) = &self.geometry_loader {
            geometry.set_priority(self.priority());
        }
    }

    /// Scheduling priority. Lower runs sooner, so larger tiles win.
    pub fn priority(&self) -> f64 {
        -self.visible_area
    }

    // =========================================================================
    // Kind filters
    // =========================================================================

    pub fn enabled_kinds(&self) -> &KindFilter {
        &self.enabled_kinds
    }

    pub fn disabled_kinds(&self) -> &KindFilter {
        &self.disabled_kinds
    }

    /// Replace the kind filters. Takes effect on the next [`update`](Self::update).
    pub fn set_kind_filters(&mut self, enabled: KindFilter, disabled: KindFilter) {
        self.enabled_kinds = enabled;
        self.disabled_kinds = disabled;
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start loading the tile's data, or join the load in flight.
    pub fn load(&mut self) -> Completion<LoadOutcome> {
        if self.disposed {
            return Completion::settled(Err(LoadError::Canceled));
        }
        self.loader.load_and_decode()
    }

    /// Queue the load with the shared scheduler as `FetchAndDecode` work.
    /// Returns false if the tile is disposed or a load is already in flight
    /// or queued.
    pub fn schedule_load(&mut self) -> bool {
        if self.disposed {
            return false;
        }
        self.loader.set_priority(self.priority());
        self.loader.schedule_load(&self.scheduler)
    }

    /// Per-frame update. Returns false if the tile has been disposed or has
    /// no geometry loader.
    ///
    /// Moves a freshly decoded payload to the geometry loader, disposes the
    /// tile if its load failed and queues geometry creation once data is
    /// ready. Kind filters that changed after geometry was built reset the
    /// geometry, reloading the data if the payload was already released.
    pub fn update(&mut self, zoom_level: f64) -> bool {
        if self.disposed {
            return false;
        }
        self.zoom_level = zoom_level;

        if self.loader.state() == TileLoaderState::Failed {
            warn!(
                tile = %self.key,
                error = ?self.loader.error(),
                "Disposing tile after failed load"
            );
            self.dispose();
            return false;
        }

        if let Some(decoded) = self.loader.take_decoded_tile() {
            self.set_decoded_tile(decoded);
        }

        let Some(geometry) = self.geometry_loader.as_ref() else {
            return false;
        };

        if geometry.is_settled() {
            if geometry.is_disposed()
                || !geometry.filters_changed(&self.enabled_kinds, &self.disabled_kinds)
            {
                return true;
            }
            geometry.reset();
            if !self.content.lock().has_decoded() {
                debug!(tile = %self.key, "Kind filters changed after payload release, reloading");
                self.loader.load_and_decode();
                return true;
            }
        }

        if !self.loader.is_finished() {
            return true;
        }

        if !self.content.lock().has_decoded() {
            if matches!(
                geometry.state(),
                TileGeometryLoaderState::Initialized | TileGeometryLoaderState::Canceled
            ) {
                trace!(tile = %self.key, "Tile has no data, finishing geometry");
                geometry.finish_without_data();
            }
            return true;
        }

        geometry.set_priority(self.priority());
        geometry.set_zoom_level(zoom_level);
        geometry.update(self.enabled_kinds.clone(), self.disabled_kinds.clone());
        true
    }

    fn set_decoded_tile(&mut self, decoded: Arc<DecodedTile>) {
        trace!(tile = %self.key, bytes = decoded.byte_size(), "Decoded payload received");
        match &self.geometry_loader {
            Some(geometry) => geometry.set_decoded_tile(decoded),
            None => self.content.lock().set_decoded(decoded),
        }
        self.updater.request_update();
    }

    /// Register a callback for disposal. Runs immediately if the tile is
    /// already disposed.
    pub fn add_dispose_callback(&mut self, callback: impl FnOnce(TileKey) + Send + 'static) {
        if self.disposed {
            callback(self.key);
        } else {
            self.dispose_callbacks.push(Box::new(callback));
        }
    }

    /// Cancel loading, release all content and run dispose callbacks.
    /// Later calls do nothing.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;
        debug!(tile = %self.key, "Disposing tile");

        self.loader.cancel();
        if let Some(geometry) = &self.geometry_loader {
            geometry.dispose();
        }
        self.content.lock().clear();
        self.metrics.tile_disposed();

        for callback in self.dispose_callbacks.drain(..) {
            callback(self.key);
        }
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Approximate memory held by the tile. Cached until the content changes.
    pub fn resource_size(&self) -> usize {
        self.content.lock().resource_size()
    }

    /// Force the resource size to be recomputed.
    pub fn invalidate_resource_size(&self) {
        self.content.lock().invalidate_resource_size();
    }

    /// Number of render objects built for the tile.
    pub fn object_count(&self) -> usize {
        self.content.lock().objects().len()
    }

    /// Run `f` over the tile's render objects.
    pub fn with_render_objects<R>(&self, f: impl FnOnce(&[RenderObject]) -> R) -> R {
        f(self.content.lock().objects())
    }

    /// Display zoom level from the last update.
    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }
}

impl Drop for Tile {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for Tile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tile")
            .field("key", &self.key)
            .field("loader", &self.loader.state())
            .field("geometry", &self.geometry_state())
            .field("visible", &self.visible)
            .field("visible_area", &self.visible_area)
            .field("disposed", &self.disposed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SchedulerConfig;
    use crate::decoded::{ContentItem, Technique, TechniqueName};
    use crate::geometry::{CreationRequest, GeometryError, GeometryKind, GeometryKindSet};
    use crate::loader::LoadContext;
    use crate::scheduler::UpdateCounter;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct ManualSource {
        pending: Mutex<Vec<LoadContext>>,
        loads: AtomicUsize,
    }

    impl ManualSource {
        fn complete(&self, decoded: Option<DecodedTile>) {
            let ctx = self.pending.lock().pop().expect("no pending load");
            ctx.on_decoded(decoded);
        }
    }

    impl TileDataSource for ManualSource {
        fn load(&self, ctx: LoadContext) {
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.pending.lock().push(ctx);
        }
    }

    struct PerItemCreator;

    impl GeometryCreator for PerItemCreator {
        fn create(
            &self,
            request: &CreationRequest<'_>,
        ) -> Result<Vec<RenderObject>, GeometryError> {
            Ok(request
                .decoded
                .items()
                .iter()
                .map(|item| request.decoded.item_kind(item))
                .filter(|kind| request.admits(kind))
                .map(|kind| RenderObject::new(kind, 10, ()))
                .collect())
        }
    }

    struct Fixture {
        scheduler: Arc<TaskScheduler>,
        source: Arc<ManualSource>,
        tile: Tile,
    }

    fn fixture() -> Fixture {
        let scheduler = Arc::new(TaskScheduler::new(
            SchedulerConfig::default(),
            Arc::new(UpdateCounter::new()),
        ));
        let source = Arc::new(ManualSource::default());
        let tile = Tile::new(
            TileKey::new(2, 3, 4),
            Arc::clone(&source) as Arc<dyn TileDataSource>,
            Arc::clone(&scheduler),
        )
        .with_geometry_creator(Arc::new(PerItemCreator));
        Fixture {
            scheduler,
            source,
            tile,
        }
    }

    fn payload() -> DecodedTile {
        DecodedTile::new(
            vec![
                Technique::new(TechniqueName::ExtrudedPolygon),
                Technique::new(TechniqueName::Fill),
            ],
            vec![ContentItem::new(0, 100), ContentItem::new(1, 100)],
        )
    }

    #[test]
    fn test_full_lifecycle() {
        let mut f = fixture();
        f.tile.load();
        assert!(f.tile.update(4.0));
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Initialized));

        f.source.complete(Some(payload()));
        assert!(f.tile.update(4.0));
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::CreationQueued));
        assert_eq!(f.tile.resource_size(), 200);

        f.scheduler.drain_all();
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
        assert_eq!(f.tile.object_count(), 2);
        assert_eq!(f.tile.resource_size(), 20);
        assert!(f.tile.is_settled());
    }

    #[test]
    fn test_priority_follows_visible_area() {
        let mut f = fixture();
        f.tile.set_visible_area(1500.0);
        assert_eq!(f.tile.priority(), -1500.0);
        assert_eq!(f.tile.geometry_loader().unwrap().priority(), -1500.0);
    }

    #[test]
    fn test_hiding_cancels_queued_geometry() {
        let mut f = fixture();
        f.tile.load();
        f.source.complete(Some(payload()));
        f.tile.update(4.0);

        f.tile.set_visible(false);
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Canceled));

        let report = f.scheduler.drain_all();
        assert_eq!(report.executed, 0);
        assert_eq!(report.expired, 1);

        // Showing and updating again queues afresh.
        f.tile.set_visible(true);
        f.tile.update(4.0);
        f.scheduler.drain_all();
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
    }

    #[test]
    fn test_hiding_keeps_finished_geometry() {
        let mut f = fixture();
        f.tile.load();
        f.source.complete(Some(payload()));
        f.tile.update(4.0);
        f.scheduler.drain_all();

        f.tile.set_visible(false);
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
        assert_eq!(f.tile.object_count(), 2);
    }

    #[test]
    fn test_failed_load_disposes_tile() {
        let mut f = fixture();
        f.tile.load();
        f.source.pending.lock().pop().unwrap().on_error("HTTP 404");

        assert!(!f.tile.update(4.0));
        assert!(f.tile.is_disposed());
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Disposed));
        assert!(!f.tile.update(4.0));
    }

    #[test]
    fn test_tile_without_data_finishes() {
        let mut f = fixture();
        f.tile.load();
        f.source.complete(None);
        f.tile.update(4.0);

        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
        assert_eq!(f.scheduler.pending_count(), 0);
        assert_eq!(f.tile.object_count(), 0);
    }

    #[test]
    fn test_canceled_load_settles_without_geometry() {
        let mut f = fixture();
        f.tile.load();
        f.tile.loader().cancel();

        assert!(f.tile.update(4.0));
        f.scheduler.drain_all();
        assert_eq!(f.tile.loader_state(), TileLoaderState::Canceled);
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
        assert!(f.tile.is_settled());
        assert!(!f.tile.is_disposed());
    }

    #[test]
    fn test_unloaded_tile_waits_upstream() {
        let mut f = fixture();
        assert!(f.tile.update(4.0));
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Initialized));
        assert!(!f.tile.is_settled());
    }

    #[test]
    fn test_scheduled_load_runs_through_scheduler() {
        let mut f = fixture();
        f.tile.set_visible_area(800.0);
        assert!(f.tile.schedule_load());
        assert!(!f.tile.schedule_load());
        assert_eq!(f.tile.loader().priority(), -800.0);
        assert_eq!(f.tile.loader_state(), TileLoaderState::Initialized);

        f.scheduler.drain_all();
        assert_eq!(f.tile.loader_state(), TileLoaderState::Loading);

        f.source.complete(Some(payload()));
        f.tile.update(4.0);
        f.scheduler.drain_all();
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
        assert_eq!(f.tile.object_count(), 2);
    }

    #[test]
    fn test_dispose_expires_scheduled_load() {
        let mut f = fixture();
        f.tile.schedule_load();
        f.tile.dispose();

        let report = f.scheduler.drain_all();
        assert_eq!(report.executed, 0);
        assert_eq!(report.expired, 1);
        assert_eq!(f.source.loads.load(Ordering::SeqCst), 0);
        assert!(!f.tile.schedule_load());
    }

    #[test]
    fn test_filter_change_after_release_reloads() {
        let mut f = fixture();
        f.tile.load();
        f.source.complete(Some(payload()));
        f.tile.update(4.0);
        f.scheduler.drain_all();
        assert_eq!(f.source.loads.load(Ordering::SeqCst), 1);

        let disabled = Some(Arc::new(GeometryKindSet::from([GeometryKind::Building])));
        f.tile.set_kind_filters(None, disabled);
        f.tile.update(4.0);
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Initialized));
        assert_eq!(f.tile.loader_state(), TileLoaderState::Loading);
        assert_eq!(f.source.loads.load(Ordering::SeqCst), 2);

        f.source.complete(Some(payload()));
        f.tile.update(4.0);
        f.scheduler.drain_all();
        assert_eq!(f.tile.object_count(), 1);
        f.tile.with_render_objects(|objects| {
            assert_eq!(objects[0].kind, GeometryKind::Area);
        });
    }

    #[test]
    fn test_unchanged_filters_keep_geometry() {
        let mut f = fixture();
        f.tile.load();
        f.source.complete(Some(payload()));
        f.tile.update(4.0);
        f.scheduler.drain_all();

        f.tile.set_kind_filters(Some(Arc::new(GeometryKindSet::new())), None);
        f.tile.update(4.0);
        assert_eq!(f.tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
        assert_eq!(f.source.loads.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_runs_callbacks_once() {
        let mut f = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        f.tile.add_dispose_callback({
            let calls = Arc::clone(&calls);
            move |key| {
                assert_eq!(key, TileKey::new(2, 3, 4));
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        f.tile.dispose();
        f.tile.dispose();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.scheduler.metrics().snapshot().tiles_disposed, 1);

        // Late registration runs immediately.
        f.tile.add_dispose_callback({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_disposes() {
        let f = fixture();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut tile = f.tile;
        tile.add_dispose_callback({
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });
        drop(tile);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dispose_cancels_load() {
        let mut f = fixture();
        let handle = f.tile.load();
        f.tile.dispose();

        assert_eq!(handle.try_get(), Some(Err(LoadError::Canceled)));
        assert_eq!(f.tile.load().try_get(), Some(Err(LoadError::Canceled)));
    }

    #[test]
    fn test_tile_without_creator_keeps_payload() {
        let scheduler = Arc::new(TaskScheduler::new(
            SchedulerConfig::default(),
            Arc::new(UpdateCounter::new()),
        ));
        let source = Arc::new(ManualSource::default());
        let mut tile = Tile::new(
            TileKey::new(0, 0, 1),
            Arc::clone(&source) as Arc<dyn TileDataSource>,
            scheduler,
        );
        tile.load();
        source.complete(Some(payload()));

        assert!(!tile.update(1.0));
        assert!(!tile.is_disposed());
        assert_eq!(tile.geometry_state(), None);
        assert_eq!(tile.resource_size(), 200);
        assert!(tile.is_settled());
    }
}
