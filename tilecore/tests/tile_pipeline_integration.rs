//! Integration tests for the tile pipeline.
//!
//! These tests drive tiles the way a render loop does:
//! - `Tile::load` → data source on worker threads → `Tile::update`
//! - Geometry creation through the shared scheduler under a frame budget
//! - Cancellation, visibility changes and disposal mid-flight
//!
//! Run with: `cargo test --test tile_pipeline_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use tilecore::{
    ContentItem, CreationRequest, DecodedTile, FnTask, GeometryCreator, GeometryError,
    GeometryKind, GeometryKindSet, LoadContext, LoadError, RenderObject, RenderUpdater,
    SchedulerConfig, TaskGroup, TaskScheduler, Technique, TechniqueName, Tile, TileDataSource,
    TileGeometryLoaderState, TileKey, TileLoaderState, UpdateCounter,
};

// ============================================================================
// Test Doubles
// ============================================================================

/// Loads on a fresh thread after a short delay, honouring cancellation.
struct ThreadedSource {
    delay: Duration,
    loads: AtomicUsize,
}

impl ThreadedSource {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            loads: AtomicUsize::new(0),
        }
    }
}

impl TileDataSource for ThreadedSource {
    fn load(&self, ctx: LoadContext) {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let delay = self.delay;
        thread::spawn(move || {
            thread::sleep(delay);
            if ctx.is_canceled() {
                ctx.on_done(TileLoaderState::Canceled);
                return;
            }
            ctx.set_state(TileLoaderState::Loaded);
            ctx.set_state(TileLoaderState::Decoding);
            ctx.on_decoded(Some(city_block()));
        });
    }
}

/// Holds contexts until the test releases them.
#[derive(Default)]
struct GatedSource {
    pending: Mutex<Vec<LoadContext>>,
}

impl GatedSource {
    fn release_all(&self, decoded: impl Fn() -> Option<DecodedTile>) {
        for ctx in self.pending.lock().drain(..) {
            ctx.on_decoded(decoded());
        }
    }
}

impl TileDataSource for GatedSource {
    fn load(&self, ctx: LoadContext) {
        self.pending.lock().push(ctx);
    }
}

/// Records which tiles it built, in order.
#[derive(Default)]
struct RecordingCreator {
    built: Mutex<Vec<TileKey>>,
    estimate_ms: Option<f64>,
}

impl GeometryCreator for RecordingCreator {
    fn create(&self, request: &CreationRequest<'_>) -> Result<Vec<RenderObject>, GeometryError> {
        self.built.lock().push(request.key);
        Ok(request
            .decoded
            .items()
            .iter()
            .map(|item| request.decoded.item_kind(item))
            .filter(|kind| request.admits(kind))
            .map(|kind| RenderObject::new(kind, 32, ()))
            .collect())
    }

    fn estimate_cost(&self, _decoded: &DecodedTile) -> Option<f64> {
        self.estimate_ms
    }
}

fn city_block() -> DecodedTile {
    DecodedTile::new(
        vec![
            Technique::new(TechniqueName::Fill),
            Technique::new(TechniqueName::ExtrudedPolygon),
            Technique::new(TechniqueName::Text),
        ],
        vec![
            ContentItem::new(0, 1_000),
            ContentItem::new(1, 4_000),
            ContentItem::new(2, 200),
        ],
    )
}

fn scheduler(updates: &Arc<UpdateCounter>) -> Arc<TaskScheduler> {
    Arc::new(TaskScheduler::new(
        SchedulerConfig::default(),
        Arc::clone(updates) as Arc<dyn RenderUpdater>,
    ))
}

fn make_tile(
    row: u32,
    column: u32,
    source: &Arc<impl TileDataSource + 'static>,
    scheduler: &Arc<TaskScheduler>,
    creator: &Arc<RecordingCreator>,
) -> Tile {
    Tile::new(
        TileKey::new(row, column, 14),
        Arc::clone(source) as Arc<dyn TileDataSource>,
        Arc::clone(scheduler),
    )
    .with_geometry_creator(Arc::clone(creator) as Arc<dyn GeometryCreator>)
}

// ============================================================================
// Integration Tests
// ============================================================================

/// Tiles loaded on worker threads reach `Finished` through a budgeted render
/// loop.
#[test]
fn test_render_loop_settles_all_tiles() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(ThreadedSource::new(Duration::from_millis(2)));
    let creator = Arc::new(RecordingCreator::default());

    let mut tiles: Vec<Tile> = (0..6)
        .map(|i| make_tile(100, 200 + i, &source, &scheduler, &creator))
        .collect();
    for (i, tile) in tiles.iter_mut().enumerate() {
        tile.set_visible_area(1_000.0 * (i + 1) as f64);
        tile.load();
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    while !tiles.iter().all(Tile::is_settled) {
        assert!(Instant::now() < deadline, "tiles did not settle");
        for tile in tiles.iter_mut() {
            tile.update(14.0);
        }
        scheduler.process_with_budget(16.0);
        thread::sleep(Duration::from_millis(1));
    }

    for tile in &tiles {
        assert_eq!(tile.geometry_state(), Some(TileGeometryLoaderState::Finished));
        assert_eq!(tile.object_count(), 3);
        assert_eq!(tile.resource_size(), 96);
    }
    assert_eq!(creator.built.lock().len(), 6);
    assert_eq!(source.loads.load(Ordering::SeqCst), 6);

    let snapshot = scheduler.metrics().snapshot();
    assert_eq!(snapshot.loads_ready, 6);
    assert_eq!(snapshot.geometry_created, 6);
    assert_eq!(snapshot.loads_in_flight(), 0);
}

/// Larger on-screen tiles get their geometry first.
#[test]
fn test_geometry_built_largest_tile_first() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(GatedSource::default());
    let creator = Arc::new(RecordingCreator::default());

    let areas = [(0, 10.0), (1, 500.0), (2, 100.0)];
    let mut tiles: Vec<Tile> = areas
        .iter()
        .map(|(column, area)| {
            let mut tile = make_tile(7, *column, &source, &scheduler, &creator);
            tile.set_visible_area(*area);
            tile.load();
            tile
        })
        .collect();

    source.release_all(|| Some(city_block()));
    for tile in tiles.iter_mut() {
        tile.update(14.0);
    }
    assert_eq!(scheduler.group_len(TaskGroup::Create), 3);

    // A zero budget still runs one task per pass.
    for _ in 0..3 {
        assert_eq!(scheduler.process_with_budget(0.0).executed, 1);
    }

    let built: Vec<u32> = creator.built.lock().iter().map(TileKey::column).collect();
    assert_eq!(built, vec![1, 2, 0]);
}

/// Priorities are re-read at selection time, so a tile that grows while
/// queued overtakes the others.
#[test]
fn test_priority_change_while_queued() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(GatedSource::default());
    let creator = Arc::new(RecordingCreator::default());

    let mut small = make_tile(1, 1, &source, &scheduler, &creator);
    let mut large = make_tile(1, 2, &source, &scheduler, &creator);
    small.set_visible_area(10.0);
    large.set_visible_area(1_000.0);
    small.load();
    large.load();
    source.release_all(|| Some(city_block()));
    small.update(14.0);
    large.update(14.0);

    small.set_visible_area(5_000.0);
    scheduler.process_with_budget(0.0);

    assert_eq!(creator.built.lock().as_slice(), &[small.key()]);
}

/// B=16ms with five 5ms create tasks runs three and asks for another frame.
#[test]
fn test_frame_budget_with_estimated_tiles() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(GatedSource::default());
    let creator = Arc::new(RecordingCreator {
        estimate_ms: Some(5.0),
        ..Default::default()
    });

    let mut tiles: Vec<Tile> = (0..5)
        .map(|i| {
            let mut tile = make_tile(3, i, &source, &scheduler, &creator);
            tile.load();
            tile
        })
        .collect();
    source.release_all(|| Some(city_block()));
    for tile in tiles.iter_mut() {
        tile.update(14.0);
    }
    updates.take();

    let report = scheduler.process_with_budget(16.0);
    assert_eq!(report.executed, 3);
    assert_eq!(report.remaining, 2);
    assert!(report.follow_up_requested);
    assert_eq!(updates.count(), 1 + 3);

    let report = scheduler.process_with_budget(16.0);
    assert_eq!(report.executed, 2);
    assert!(!report.follow_up_requested);
    assert!(tiles.iter().all(Tile::is_settled));
}

/// `Create` work drains before `FetchAndDecode` work within one pass.
#[test]
fn test_create_drains_before_fetch() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let order = Arc::new(Mutex::new(Vec::new()));

    for (group, name) in [
        (TaskGroup::FetchAndDecode, "fetch"),
        (TaskGroup::Create, "create"),
    ] {
        let order = Arc::clone(&order);
        scheduler.add(Box::new(
            FnTask::new(group, move || order.lock().push(name)).with_estimate(1.0),
        ));
    }

    scheduler.process_with_budget(16.0);
    assert_eq!(order.lock().as_slice(), &["create", "fetch"]);
}

/// A decoded tile's geometry beats another tile's queued load, even when the
/// waiting tile is larger on screen.
#[test]
fn test_decoded_tile_builds_before_queued_load() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(GatedSource::default());
    let creator = Arc::new(RecordingCreator::default());

    let mut decoded = make_tile(4, 1, &source, &scheduler, &creator);
    decoded.set_visible_area(10.0);
    decoded.load();
    source.release_all(|| Some(city_block()));
    decoded.update(14.0);

    let mut waiting = make_tile(4, 2, &source, &scheduler, &creator);
    waiting.set_visible_area(10_000.0);
    assert!(waiting.schedule_load());
    assert_eq!(scheduler.group_len(TaskGroup::Create), 1);
    assert_eq!(scheduler.group_len(TaskGroup::FetchAndDecode), 1);

    let report = scheduler.process_with_budget(0.0);
    assert_eq!(report.executed, 1);
    assert!(report.follow_up_requested);
    assert_eq!(creator.built.lock().as_slice(), &[decoded.key()]);
    assert_eq!(waiting.loader_state(), TileLoaderState::Initialized);

    scheduler.process_with_budget(0.0);
    assert_eq!(waiting.loader_state(), TileLoaderState::Loading);

    source.release_all(|| Some(city_block()));
    waiting.update(14.0);
    scheduler.process_with_budget(16.0);
    assert!(waiting.is_settled());
    assert!(decoded.is_settled());
}

/// A late completion after cancel leaves the tile canceled and unbuilt.
#[test]
fn test_cancel_while_loading() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(GatedSource::default());
    let creator = Arc::new(RecordingCreator::default());

    let mut tile = make_tile(9, 9, &source, &scheduler, &creator);
    let handle = tile.load();
    tile.loader().cancel();

    source.release_all(|| Some(city_block()));
    assert_eq!(tile.loader_state(), TileLoaderState::Canceled);
    assert_eq!(handle.try_get(), Some(Err(LoadError::Canceled)));

    tile.update(14.0);
    assert_eq!(scheduler.pending_count(), 0);
    assert!(creator.built.lock().is_empty());
    assert!(tile.is_settled());
}

/// Hiding a tile with queued geometry makes the task expire.
#[test]
fn test_hidden_tile_task_expires() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(GatedSource::default());
    let creator = Arc::new(RecordingCreator::default());

    let mut tile = make_tile(4, 4, &source, &scheduler, &creator);
    tile.load();
    source.release_all(|| Some(city_block()));
    tile.update(14.0);
    assert_eq!(tile.geometry_state(), Some(TileGeometryLoaderState::CreationQueued));

    tile.set_visible(false);
    let report = scheduler.process_with_budget(16.0);
    assert_eq!(report.executed, 0);
    assert_eq!(report.expired, 1);
    assert_eq!(tile.geometry_state(), Some(TileGeometryLoaderState::Canceled));
    assert!(creator.built.lock().is_empty());
}

/// Disabling a kind after geometry was built rebuilds without it.
#[test]
fn test_disabling_kind_rebuilds_geometry() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(GatedSource::default());
    let creator = Arc::new(RecordingCreator::default());

    let mut tile = make_tile(5, 5, &source, &scheduler, &creator);
    tile.load();
    source.release_all(|| Some(city_block()));
    tile.update(14.0);
    scheduler.drain_all();
    assert_eq!(tile.object_count(), 3);

    let disabled = Arc::new(GeometryKindSet::from([GeometryKind::Building]));
    tile.set_kind_filters(None, Some(disabled));
    tile.update(14.0);
    source.release_all(|| Some(city_block()));
    tile.update(14.0);
    scheduler.drain_all();

    assert_eq!(tile.object_count(), 2);
    tile.with_render_objects(|objects| {
        assert!(objects.iter().all(|o| o.kind != GeometryKind::Building));
    });
    assert_eq!(creator.built.lock().len(), 2);
}

/// A failed load disposes the tile and runs its dispose callbacks.
#[test]
fn test_failed_load_disposes_tile() {
    struct FailingSource;

    impl TileDataSource for FailingSource {
        fn load(&self, ctx: LoadContext) {
            ctx.on_error("HTTP 503");
        }
    }

    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let disposed = Arc::new(AtomicUsize::new(0));

    let mut tile = Tile::new(
        TileKey::new(0, 0, 3),
        Arc::new(FailingSource),
        Arc::clone(&scheduler),
    )
    .with_geometry_creator(Arc::new(RecordingCreator::default()));
    tile.add_dispose_callback({
        let disposed = Arc::clone(&disposed);
        move |_| {
            disposed.fetch_add(1, Ordering::SeqCst);
        }
    });

    let handle = tile.load();
    assert_eq!(
        handle.try_get(),
        Some(Err(LoadError::Failed("HTTP 503".to_string())))
    );

    assert!(!tile.update(3.0));
    assert!(tile.is_disposed());
    drop(tile);
    assert_eq!(disposed.load(Ordering::SeqCst), 1);
    assert_eq!(scheduler.metrics().snapshot().loads_failed, 1);
}

/// Completion handles resolve across threads.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_wait_for_load_and_geometry() {
    let updates = Arc::new(UpdateCounter::new());
    let scheduler = scheduler(&updates);
    let source = Arc::new(ThreadedSource::new(Duration::from_millis(5)));
    let creator = Arc::new(RecordingCreator::default());

    let mut tile = make_tile(2, 2, &source, &scheduler, &creator);
    let loaded = tile.load();
    assert!(loaded.ptr_eq(&tile.load()));
    assert_eq!(loaded.wait().await, Ok(TileLoaderState::Ready));

    tile.update(14.0);
    let finished = tile.geometry_loader().map(|g| g.wait_finished());
    scheduler.drain_all();

    match finished {
        Some(finished) => assert_eq!(finished.await, Ok(())),
        None => panic!("tile has no geometry loader"),
    }
}
