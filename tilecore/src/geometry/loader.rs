//! Per-tile geometry state machine.
//!
//! A [`TileGeometryLoader`] turns a decoded payload into render objects by
//! queueing one `Create` task with the shared scheduler. Every queued task
//! carries the loader's cycle number; a reset, cancel or dispose moves the
//! loader on, which makes any task from an earlier cycle expire in the queue
//! and discard its result if it is already running.
//!
//! # Thread Safety
//!
//! State lives behind a `parking_lot::Mutex`. When both the state lock and
//! the tile content lock are needed, the state lock is taken first.

use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{debug, trace, warn};

use super::creator::{CreationRequest, GeometryCreator, GeometryError};
use super::kind::{kind_filters_equal, GeometryKindSet, KindFilter};
use crate::decoded::DecodedTile;
use crate::scheduler::{RenderUpdater, Task, TaskGroup, TaskScheduler};
use crate::telemetry::EngineMetrics;
use crate::tile::{SharedContent, TileKey};

/// State of a [`TileGeometryLoader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileGeometryLoaderState {
    Initialized,
    CreationQueued,
    CreatingGeometry,
    Finished,
    Canceled,
    Disposed,
}

impl TileGeometryLoaderState {
    /// True for states [`TileGeometryLoader::wait_finished`] resolves on.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TileGeometryLoaderState::Finished
                | TileGeometryLoaderState::Canceled
                | TileGeometryLoaderState::Disposed
        )
    }

    /// True while a creation task is queued or running.
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            TileGeometryLoaderState::CreationQueued | TileGeometryLoaderState::CreatingGeometry
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TileGeometryLoaderState::Initialized => "initialized",
            TileGeometryLoaderState::CreationQueued => "creation_queued",
            TileGeometryLoaderState::CreatingGeometry => "creating_geometry",
            TileGeometryLoaderState::Finished => "finished",
            TileGeometryLoaderState::Canceled => "canceled",
            TileGeometryLoaderState::Disposed => "disposed",
        }
    }
}

impl std::fmt::Display for TileGeometryLoaderState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug)]
struct LoaderInner {
    state: TileGeometryLoaderState,
    /// Bumped whenever queued or running work must be abandoned.
    cycle: u64,
    priority: f64,
    zoom_level: f64,
    /// Kinds present in the current payload.
    kinds: Option<GeometryKindSet>,
    enabled: KindFilter,
    disabled: KindFilter,
}

struct Shared {
    key: TileKey,
    inner: Mutex<LoaderInner>,
    state_tx: watch::Sender<TileGeometryLoaderState>,
    content: SharedContent,
    creator: Arc<dyn GeometryCreator>,
    updater: Arc<dyn RenderUpdater>,
    metrics: Arc<EngineMetrics>,
}

impl Shared {
    fn transition(&self, inner: &mut LoaderInner, to: TileGeometryLoaderState) {
        if inner.state != to {
            trace!(tile = %self.key, from = %inner.state, to = %to, "Geometry state change");
            inner.state = to;
            self.state_tx.send_replace(to);
        }
    }

    fn is_current(&self, cycle: u64, expected: TileGeometryLoaderState) -> bool {
        let inner = self.inner.lock();
        inner.cycle == cycle && inner.state == expected
    }

    /// Body of the `Create` task.
    fn create_geometry(&self, cycle: u64) {
        let (enabled, disabled, zoom_level) = {
            let mut inner = self.inner.lock();
            if inner.cycle != cycle || inner.state != TileGeometryLoaderState::CreationQueued {
                trace!(tile = %self.key, "Skipping stale geometry task");
                return;
            }
            self.transition(&mut inner, TileGeometryLoaderState::CreatingGeometry);
            (inner.enabled.clone(), inner.disabled.clone(), inner.zoom_level)
        };

        let decoded = {
            let mut content = self.content.lock();
            content.clear_objects();
            content.decoded()
        };

        let started = Instant::now();
        let result = match decoded.as_deref() {
            Some(decoded) => self.creator.create(&CreationRequest {
                key: self.key,
                zoom_level,
                decoded,
                kinds: decoded.geometry_kinds(),
                enabled: &enabled,
                disabled: &disabled,
            }),
            None => Ok(Vec::new()),
        };
        let elapsed = started.elapsed();

        let mut inner = self.inner.lock();
        if inner.cycle != cycle || inner.state != TileGeometryLoaderState::CreatingGeometry {
            debug!(tile = %self.key, "Discarding geometry built for a canceled or reset tile");
            return;
        }

        match result {
            Ok(objects) => {
                debug!(
                    tile = %self.key,
                    objects = objects.len(),
                    elapsed_ms = format!("{:.1}", elapsed.as_secs_f64() * 1000.0),
                    "Geometry created"
                );
                self.content.lock().finish_geometry(objects);
                self.metrics.geometry_created(elapsed);
            }
            Err(e) => {
                warn!(tile = %self.key, error = %e, "Geometry creation failed");
                self.content.lock().release_decoded();
                self.metrics.geometry_failed();
            }
        }
        self.transition(&mut inner, TileGeometryLoaderState::Finished);
        drop(inner);

        self.updater.request_update();
    }
}

// =============================================================================
// Creation Task
// =============================================================================

/// The `Create` task queued for one loader cycle.
struct GeometryCreationTask {
    name: String,
    shared: Weak<Shared>,
    cycle: u64,
    estimate: Option<f64>,
}

impl Task for GeometryCreationTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> TaskGroup {
        TaskGroup::Create
    }

    fn priority(&self) -> f64 {
        self.shared
            .upgrade()
            .map_or(0.0, |shared| shared.inner.lock().priority)
    }

    fn is_expired(&self) -> bool {
        self.shared.upgrade().map_or(true, |shared| {
            !shared.is_current(self.cycle, TileGeometryLoaderState::CreationQueued)
        })
    }

    fn estimated_process_time(&self) -> Option<f64> {
        self.estimate
    }

    fn execute(self: Box<Self>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.create_geometry(self.cycle);
        }
    }
}

// =============================================================================
// Tile Geometry Loader
// =============================================================================

/// Drives geometry creation for one tile.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tilecore::{
///     CreationRequest, DecodedTile, GeometryCreator, GeometryError, NoopUpdater,
///     RenderObject, SchedulerConfig, TaskScheduler, TileContent, TileGeometryLoader,
///     TileGeometryLoaderState, TileKey,
/// };
///
/// struct Empty;
///
/// impl GeometryCreator for Empty {
///     fn create(&self, _: &CreationRequest<'_>) -> Result<Vec<RenderObject>, GeometryError> {
///         Ok(Vec::new())
///     }
/// }
///
/// let scheduler = Arc::new(TaskScheduler::new(
///     SchedulerConfig::default(),
///     Arc::new(NoopUpdater),
/// ));
/// let loader = TileGeometryLoader::new(
///     TileKey::new(0, 0, 1),
///     Arc::clone(&scheduler),
///     Arc::new(Empty),
///     TileContent::shared(),
/// );
///
/// loader.set_decoded_tile(Arc::new(DecodedTile::default()));
/// assert!(loader.update(None, None));
/// assert_eq!(loader.state(), TileGeometryLoaderState::CreationQueued);
///
/// scheduler.drain_all();
/// assert_eq!(loader.state(), TileGeometryLoaderState::Finished);
/// ```
pub struct TileGeometryLoader {
    shared: Arc<Shared>,
    scheduler: Arc<TaskScheduler>,
}

impl TileGeometryLoader {
    /// Create a loader that writes into `content`.
    ///
    /// The scheduler's updater and metrics are shared with the loader.
    pub fn new(
        key: TileKey,
        scheduler: Arc<TaskScheduler>,
        creator: Arc<dyn GeometryCreator>,
        content: SharedContent,
    ) -> Self {
        let (state_tx, _) = watch::channel(TileGeometryLoaderState::Initialized);
        let shared = Arc::new(Shared {
            key,
            inner: Mutex::new(LoaderInner {
                state: TileGeometryLoaderState::Initialized,
                cycle: 0,
                priority: 0.0,
                zoom_level: f64::from(key.level()),
                kinds: None,
                enabled: None,
                disabled: None,
            }),
            state_tx,
            content,
            creator,
            updater: Arc::clone(scheduler.updater()),
            metrics: Arc::clone(scheduler.metrics()),
        });
        Self { shared, scheduler }
    }

    pub fn key(&self) -> TileKey {
        self.shared.key
    }

    pub fn state(&self) -> TileGeometryLoaderState {
        self.shared.inner.lock().state
    }

    /// True once the loader is `Finished` or `Disposed`.
    pub fn is_settled(&self) -> bool {
        matches!(
            self.state(),
            TileGeometryLoaderState::Finished | TileGeometryLoaderState::Disposed
        )
    }

    pub fn is_finished(&self) -> bool {
        self.state() == TileGeometryLoaderState::Finished
    }

    pub fn is_canceled(&self) -> bool {
        self.state() == TileGeometryLoaderState::Canceled
    }

    pub fn is_disposed(&self) -> bool {
        self.state() == TileGeometryLoaderState::Disposed
    }

    /// Priority reported by the queued task. Lower runs sooner.
    pub fn priority(&self) -> f64 {
        self.shared.inner.lock().priority
    }

    pub fn set_priority(&self, priority: f64) {
        self.shared.inner.lock().priority = priority;
    }

    /// Display zoom level passed to the creator.
    pub fn set_zoom_level(&self, zoom_level: f64) {
        self.shared.inner.lock().zoom_level = zoom_level;
    }

    /// Kinds found in the current payload, once it has been classified.
    pub fn geometry_kinds(&self) -> Option<GeometryKindSet> {
        self.shared.inner.lock().kinds.clone()
    }

    /// Hand over a decoded payload and classify it.
    pub fn set_decoded_tile(&self, decoded: Arc<DecodedTile>) {
        let kinds = decoded.geometry_kinds().clone();
        self.shared.content.lock().set_decoded(decoded);
        self.shared.inner.lock().kinds = Some(kinds);
    }

    /// True if `enabled`/`disabled` differ from the filters the current
    /// geometry was built or queued with.
    pub fn filters_changed(&self, enabled: &KindFilter, disabled: &KindFilter) -> bool {
        let inner = self.shared.inner.lock();
        !kind_filters_equal(&inner.enabled, &inner.disabled, enabled, disabled)
    }

    /// Queue geometry creation with the given filters.
    ///
    /// From `Initialized` or `Canceled` this queues a `Create` task, provided
    /// a decoded payload is present. While queued, creating or finished the
    /// call is a no-op unless the filters differ, in which case the loader
    /// resets and queues afresh. Returns true if a task was queued.
    pub fn update(&self, enabled: KindFilter, disabled: KindFilter) -> bool {
        let shared = &self.shared;
        let mut inner = shared.inner.lock();

        match inner.state {
            TileGeometryLoaderState::Disposed => return false,
            TileGeometryLoaderState::CreationQueued
            | TileGeometryLoaderState::CreatingGeometry
            | TileGeometryLoaderState::Finished => {
                if kind_filters_equal(&inner.enabled, &inner.disabled, &enabled, &disabled) {
                    return false;
                }
                debug!(tile = %shared.key, "Kind filters changed, resetting geometry");
                self.reset_locked(&mut inner);
            }
            TileGeometryLoaderState::Initialized | TileGeometryLoaderState::Canceled => {}
        }

        let Some(decoded) = shared.content.lock().decoded() else {
            trace!(tile = %shared.key, "No decoded payload to build geometry from");
            return false;
        };

        inner.kinds = Some(decoded.geometry_kinds().clone());
        inner.enabled = enabled;
        inner.disabled = disabled;
        inner.cycle += 1;
        let cycle = inner.cycle;
        shared.transition(&mut inner, TileGeometryLoaderState::CreationQueued);
        drop(inner);

        let task = GeometryCreationTask {
            name: format!("create {}", shared.key),
            shared: Arc::downgrade(shared),
            cycle,
            estimate: shared.creator.estimate_cost(&decoded),
        };
        self.scheduler.add(Box::new(task));
        true
    }

    fn reset_locked(&self, inner: &mut LoaderInner) {
        inner.cycle += 1;
        inner.kinds = None;
        inner.enabled = None;
        inner.disabled = None;
        self.shared.content.lock().clear_objects();
        self.shared
            .transition(inner, TileGeometryLoaderState::Initialized);
    }

    /// Discard built geometry, cached classification and filters, and
    /// return to `Initialized`. The decoded payload, if still held, is kept.
    pub fn reset(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state != TileGeometryLoaderState::Disposed {
            self.reset_locked(&mut inner);
        }
    }

    /// Abandon pending work and move to `Canceled`.
    ///
    /// A queued task expires; a running one has its result discarded.
    pub fn cancel(&self) {
        let mut inner = self.shared.inner.lock();
        if matches!(
            inner.state,
            TileGeometryLoaderState::Canceled | TileGeometryLoaderState::Disposed
        ) {
            return;
        }
        if inner.state.is_pending() {
            self.shared.metrics.geometry_canceled();
        }
        inner.cycle += 1;
        debug!(tile = %self.shared.key, from = %inner.state, "Geometry canceled");
        self.shared
            .transition(&mut inner, TileGeometryLoaderState::Canceled);
    }

    /// Release everything and move to `Disposed`. Terminal.
    pub fn dispose(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.state == TileGeometryLoaderState::Disposed {
            return;
        }
        inner.cycle += 1;
        inner.kinds = None;
        inner.enabled = None;
        inner.disabled = None;
        self.shared.content.lock().clear();
        self.shared
            .transition(&mut inner, TileGeometryLoaderState::Disposed);
    }

    /// Complete without building anything, for tiles whose load produced no
    /// payload. Walks `CreationQueued`, `CreatingGeometry`, `Finished`.
    pub fn finish_without_data(&self) {
        let mut inner = self.shared.inner.lock();
        if !matches!(
            inner.state,
            TileGeometryLoaderState::Initialized | TileGeometryLoaderState::Canceled
        ) {
            return;
        }
        inner.cycle += 1;
        for state in [
            TileGeometryLoaderState::CreationQueued,
            TileGeometryLoaderState::CreatingGeometry,
            TileGeometryLoaderState::Finished,
        ] {
            self.shared.transition(&mut inner, state);
        }
        drop(inner);

        self.shared.content.lock().clear_objects();
        self.shared.updater.request_update();
    }

    /// Resolve once the loader reaches a terminal state.
    ///
    /// `Finished` yields `Ok`, `Canceled` yields [`GeometryError::Canceled`]
    /// and `Disposed` yields [`GeometryError::Disposed`]. The future does not
    /// borrow the loader.
    pub fn wait_finished(
        &self,
    ) -> impl Future<Output = Result<(), GeometryError>> + Send + 'static {
        let mut rx = self.shared.state_tx.subscribe();
        async move {
            let state = match rx.wait_for(TileGeometryLoaderState::is_terminal).await {
                Ok(state) => *state,
                Err(_) => TileGeometryLoaderState::Disposed,
            };
            match state {
                TileGeometryLoaderState::Finished => Ok(()),
                TileGeometryLoaderState::Canceled => Err(GeometryError::Canceled),
                _ => Err(GeometryError::Disposed),
            }
        }
    }
}

impl std::fmt::Debug for TileGeometryLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileGeometryLoader")
            .field("key", &self.shared.key)
            .field("state", &self.state())
            .finish()
    }
}
