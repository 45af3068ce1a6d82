//! Per-tile load state machine.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::error::LoadError;
use super::source::{LoadContext, TileDataSource};
use super::state::TileLoaderState;
use crate::completion::Completion;
use crate::decoded::DecodedTile;
use crate::scheduler::{RenderUpdater, Task, TaskGroup, TaskScheduler};
use crate::telemetry::EngineMetrics;
use crate::tile::TileKey;

/// Result delivered through a load's completion handle.
///
/// `Ok` carries the state the loader settled in (`Ready`, or the current
/// state when nothing was in flight).
pub type LoadOutcome = Result<TileLoaderState, LoadError>;

// =============================================================================
// Shared State
// =============================================================================

#[derive(Debug)]
struct LoaderInner {
    state: TileLoaderState,
    /// Identifies the current attempt; bumped on every start and cancel.
    generation: u64,
    token: CancellationToken,
    completion: Completion<LoadOutcome>,
    decoded: Option<Arc<DecodedTile>>,
    error: Option<LoadError>,
    priority: f64,
    /// Ticket of the load task waiting in the scheduler, if any.
    queued: Option<u64>,
    next_ticket: u64,
}

/// State shared between a [`TileLoader`] and its outstanding [`LoadContext`].
pub(super) struct LoaderShared {
    pub(super) key: TileKey,
    inner: Mutex<LoaderInner>,
    updater: Arc<dyn RenderUpdater>,
    metrics: Arc<EngineMetrics>,
}

impl LoaderShared {
    /// Begin a new attempt. The caller hands the returned context to the
    /// data source once the lock is released.
    fn begin(self: &Arc<Self>, inner: &mut LoaderInner) -> LoadContext {
        inner.generation += 1;
        inner.token = CancellationToken::new();
        inner.completion = Completion::new();
        inner.state = TileLoaderState::Loading;
        inner.decoded = None;
        inner.error = None;
        inner.queued = None;
        LoadContext::new(Arc::clone(self), inner.generation, inner.token.clone())
    }

    fn is_queued(&self, ticket: u64) -> bool {
        self.inner.lock().queued == Some(ticket)
    }

    /// Start the load queued under `ticket`, unless it was superseded.
    fn start_queued(self: &Arc<Self>, ticket: u64, source: &dyn TileDataSource) {
        let ctx = {
            let mut inner = self.inner.lock();
            if inner.queued != Some(ticket) {
                return;
            }
            self.begin(&mut inner)
        };

        debug!(tile = %self.key, "Queued tile load started");
        self.metrics.load_started();
        source.load(ctx);
    }

    /// True if `generation` is the attempt in flight.
    pub(super) fn is_current(&self, generation: u64) -> bool {
        let inner = self.inner.lock();
        inner.generation == generation && inner.state.is_in_flight()
    }

    pub(super) fn report_progress(&self, generation: u64, state: TileLoaderState) -> bool {
        if !matches!(state, TileLoaderState::Loaded | TileLoaderState::Decoding) {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.generation != generation || !inner.state.is_in_flight() {
            return false;
        }
        trace!(tile = %self.key, state = %state, "Load progress");
        inner.state = state;
        true
    }

    pub(super) fn complete(
        &self,
        generation: u64,
        state: TileLoaderState,
        decoded: Option<DecodedTile>,
    ) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || !inner.state.is_in_flight() {
            trace!(tile = %self.key, "Ignoring stale load completion");
            return;
        }

        match state {
            TileLoaderState::Ready => {
                debug!(tile = %self.key, has_data = decoded.is_some(), "Tile data ready");
                inner.state = TileLoaderState::Ready;
                inner.decoded = decoded.map(Arc::new);
                inner.completion.settle(Ok(TileLoaderState::Ready));
                self.metrics.load_ready();
            }
            TileLoaderState::Canceled => {
                debug!(tile = %self.key, "Data source canceled the load");
                inner.state = TileLoaderState::Canceled;
                inner.completion.settle(Err(LoadError::Canceled));
                self.metrics.load_canceled();
            }
            other => {
                let error = LoadError::Unexpected(other);
                warn!(tile = %self.key, error = %error, "Tile load failed");
                inner.state = TileLoaderState::Failed;
                inner.error = Some(error.clone());
                inner.completion.settle(Err(error));
                self.metrics.load_failed();
            }
        }
        drop(inner);

        self.updater.request_update();
    }

    pub(super) fn fail(&self, generation: u64, message: String) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || !inner.state.is_in_flight() {
            trace!(tile = %self.key, "Ignoring stale load error");
            return;
        }

        warn!(tile = %self.key, error = %message, "Tile load failed");
        let error = LoadError::Failed(message);
        inner.state = TileLoaderState::Failed;
        inner.error = Some(error.clone());
        inner.completion.settle(Err(error));
        self.metrics.load_failed();
        drop(inner);

        self.updater.request_update();
    }
}

// =============================================================================
// Load Task
// =============================================================================

/// `FetchAndDecode` work that starts a queued load when the scheduler
/// selects it.
struct LoadTask {
    name: String,
    shared: Weak<LoaderShared>,
    source: Arc<dyn TileDataSource>,
    ticket: u64,
}

impl Task for LoadTask {
    fn name(&self) -> &str {
        &self.name
    }

    fn group(&self) -> TaskGroup {
        TaskGroup::FetchAndDecode
    }

    fn priority(&self) -> f64 {
        self.shared
            .upgrade()
            .map_or(0.0, |shared| shared.inner.lock().priority)
    }

    fn is_expired(&self) -> bool {
        self.shared
            .upgrade()
            .map_or(true, |shared| !shared.is_queued(self.ticket))
    }

    fn execute(self: Box<Self>) {
        if let Some(shared) = self.shared.upgrade() {
            shared.start_queued(self.ticket, self.source.as_ref());
        }
    }
}

// =============================================================================
// Tile Loader
// =============================================================================

/// Loads and decodes the data of one tile.
///
/// Concurrent [`load_and_decode`](Self::load_and_decode) calls while a load
/// is in flight share a single completion handle; a call after the loader
/// has finished starts a new attempt.
pub struct TileLoader {
    shared: Arc<LoaderShared>,
    source: Arc<dyn TileDataSource>,
}

impl TileLoader {
    pub fn new(
        key: TileKey,
        source: Arc<dyn TileDataSource>,
        updater: Arc<dyn RenderUpdater>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        let shared = Arc::new(LoaderShared {
            key,
            inner: Mutex::new(LoaderInner {
                state: TileLoaderState::Initialized,
                generation: 0,
                token: CancellationToken::new(),
                completion: Completion::new(),
                decoded: None,
                error: None,
                priority: 0.0,
                queued: None,
                next_ticket: 0,
            }),
            updater,
            metrics,
        });
        Self { shared, source }
    }

    pub fn key(&self) -> TileKey {
        self.shared.key
    }

    pub fn state(&self) -> TileLoaderState {
        self.shared.inner.lock().state
    }

    /// True in `Ready`, `Canceled` or `Failed`.
    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Error of the last failed attempt.
    pub fn error(&self) -> Option<LoadError> {
        self.shared.inner.lock().error.clone()
    }

    pub fn has_decoded_tile(&self) -> bool {
        self.shared.inner.lock().decoded.is_some()
    }

    /// Take the decoded payload of a ready load. Returns `None` afterwards,
    /// and for loads that produced no data.
    pub fn take_decoded_tile(&self) -> Option<Arc<DecodedTile>> {
        self.shared.inner.lock().decoded.take()
    }

    /// Start a load, or join the one in flight.
    pub fn load_and_decode(&self) -> Completion<LoadOutcome> {
        let (ctx, completion) = {
            let mut inner = self.shared.inner.lock();
            if inner.state.is_in_flight() {
                return inner.completion.clone();
            }

            let ctx = self.shared.begin(&mut inner);
            (ctx, inner.completion.clone())
        };

        debug!(tile = %self.shared.key, "Tile load started");
        self.shared.metrics.load_started();
        self.source.load(ctx);
        completion
    }

    /// Scheduling priority of queued loads. Lower runs sooner.
    pub fn priority(&self) -> f64 {
        self.shared.inner.lock().priority
    }

    pub fn set_priority(&self, priority: f64) {
        self.shared.inner.lock().priority = priority;
    }

    /// True while a load task waits in the scheduler.
    pub fn is_load_queued(&self) -> bool {
        self.shared.inner.lock().queued.is_some()
    }

    /// Queue the load as `FetchAndDecode` work instead of starting it now.
    ///
    /// Returns false if a load is already in flight or queued. The task
    /// expires when the load is started directly, canceled, or the loader
    /// is dropped.
    pub fn schedule_load(&self, scheduler: &TaskScheduler) -> bool {
        let ticket = {
            let mut inner = self.shared.inner.lock();
            if inner.state.is_in_flight() || inner.queued.is_some() {
                return false;
            }
            inner.next_ticket += 1;
            inner.queued = Some(inner.next_ticket);
            inner.next_ticket
        };

        trace!(tile = %self.shared.key, ticket, "Tile load queued");
        scheduler.add(Box::new(LoadTask {
            name: format!("load {}", self.shared.key),
            shared: Arc::downgrade(&self.shared),
            source: Arc::clone(&self.source),
            ticket,
        }));
        true
    }

    /// Handle for the load in flight, or one already settled with the
    /// current state.
    pub fn wait_settled(&self) -> Completion<LoadOutcome> {
        let inner = self.shared.inner.lock();
        if inner.state.is_in_flight() {
            return inner.completion.clone();
        }
        match inner.state {
            TileLoaderState::Canceled => Completion::settled(Err(LoadError::Canceled)),
            TileLoaderState::Failed => Completion::settled(Err(inner
                .error
                .clone()
                .unwrap_or(LoadError::Unexpected(TileLoaderState::Failed)))),
            state => Completion::settled(Ok(state)),
        }
    }

    /// Cancel the load and move to `Canceled`.
    ///
    /// An in-flight attempt has its token triggered and its completion handle
    /// settled with [`LoadError::Canceled`]; later reports from it are
    /// ignored. Any payload not yet taken is dropped.
    pub fn cancel(&self) {
        let was_in_flight = {
            let mut inner = self.shared.inner.lock();
            let was_in_flight = inner.state.is_in_flight();
            if was_in_flight {
                inner.token.cancel();
                inner.generation += 1;
                inner.completion.settle(Err(LoadError::Canceled));
            }
            if inner.state != TileLoaderState::Canceled {
                debug!(tile = %self.shared.key, from = %inner.state, "Tile load canceled");
            }
            inner.state = TileLoaderState::Canceled;
            inner.decoded = None;
            inner.queued = None;
            was_in_flight
        };

        if was_in_flight {
            self.shared.metrics.load_canceled();
            self.source.cancel(&self.shared.key);
        }
    }
}

impl std::fmt::Debug for TileLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileLoader")
            .field("key", &self.shared.key)
            .field("state", &self.state())
            .finish()
    }
}
