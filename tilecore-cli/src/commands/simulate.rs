//! Synthetic render loop.
//!
//! Builds a square grid of tiles around a centre tile, loads them through a
//! rayon-backed data source that fabricates decoded payloads, and drives
//! frames until every tile settles, the frame limit is reached or Ctrl+C is
//! pressed.
//!
//! Tiles nearer the centre get a larger visible area and so are built first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Args;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, info};

use tilecore::{
    ContentItem, CreationRequest, DecodedTile, EngineConfig, GeometryCreator, GeometryError,
    GeometryKindSet, LoadContext, RenderObject, RenderUpdater, TaskScheduler, Technique,
    TechniqueName, Tile, TileDataSource, TileKey, TileLoaderState, UpdateCounter,
};

use crate::error::CliError;

/// Arguments for `tilecore simulate`.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of tiles to simulate
    #[arg(long, default_value_t = 64)]
    pub tiles: u32,

    /// Tile level of the grid
    #[arg(long, default_value_t = 14)]
    pub level: u8,

    /// Stop after this many frames
    #[arg(long, default_value_t = 600)]
    pub frames: u32,

    /// Override the configured frame rate cap
    #[arg(long)]
    pub max_fps: Option<f64>,

    /// Run every queued task each frame
    #[arg(long)]
    pub no_throttle: bool,

    /// Simulated fetch and decode latency per tile, in milliseconds
    #[arg(long, default_value_t = 8)]
    pub load_delay_ms: u64,

    /// Simulated geometry creation time per tile, in milliseconds
    #[arg(long, default_value_t = 2.0)]
    pub create_cost_ms: f64,

    /// Make every Nth tile fail to load
    #[arg(long)]
    pub fail_every: Option<u32>,

    /// Comma-separated geometry kinds to skip (e.g. "building,label")
    #[arg(long)]
    pub disable: Option<String>,

    /// Loader worker threads
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Print a line for every frame that ran work
    #[arg(long)]
    pub show_frames: bool,

    /// Print the final telemetry as JSON
    #[arg(long)]
    pub json: bool,
}

// =============================================================================
// Synthetic data source and creator
// =============================================================================

/// Fabricates payloads on a rayon pool after a fixed delay.
struct SyntheticSource {
    pool: ThreadPool,
    delay: Duration,
    fail_every: Option<u32>,
}

impl SyntheticSource {
    fn should_fail(&self, key: &TileKey) -> bool {
        self.fail_every
            .filter(|n| *n > 0)
            .is_some_and(|n| (key.row() + key.column()) % n == 0)
    }
}

impl TileDataSource for SyntheticSource {
    fn load(&self, ctx: LoadContext) {
        let delay = self.delay;
        let fail = self.should_fail(&ctx.key());
        self.pool.spawn(move || {
            thread::sleep(delay);
            if ctx.is_canceled() {
                ctx.on_done(TileLoaderState::Canceled);
                return;
            }
            if fail {
                let message = format!("synthetic failure for {}", ctx.key());
                ctx.on_error(message);
                return;
            }
            ctx.set_state(TileLoaderState::Loaded);
            let decoded = synthetic_payload(&ctx.key());
            ctx.set_state(TileLoaderState::Decoding);
            ctx.on_decoded(Some(decoded));
        });
    }

    fn cancel(&self, key: &TileKey) {
        debug!(tile = %key, "Synthetic load canceled");
    }
}

const TECHNIQUES: [&str; 6] = ["fill", "solid-line", "extruded-polygon", "text", "poi", "terrain"];

/// Deterministic payload: between one and six items depending on the key.
fn synthetic_payload(key: &TileKey) -> DecodedTile {
    let techniques = TECHNIQUES
        .iter()
        .map(|name| Technique::new(TechniqueName::from_name(name)))
        .collect();
    let count = (key.row().wrapping_mul(31) ^ key.column()) as usize % TECHNIQUES.len() + 1;
    let items = (0..count)
        .map(|i| ContentItem::new(i, 2_048 * (i + 1)))
        .collect();
    DecodedTile::new(techniques, items)
}

/// Spins for a fixed time per tile and emits one object per admitted item.
struct SyntheticCreator {
    cost: Duration,
}

impl GeometryCreator for SyntheticCreator {
    fn create(&self, request: &CreationRequest<'_>) -> Result<Vec<RenderObject>, GeometryError> {
        let started = Instant::now();
        while started.elapsed() < self.cost {
            std::hint::spin_loop();
        }
        Ok(request
            .decoded
            .items()
            .iter()
            .filter_map(|item| {
                let kind = request.decoded.item_kind(item);
                request
                    .admits(&kind)
                    .then(|| RenderObject::new(kind, item.byte_size / 2, ()))
            })
            .collect())
    }

    fn estimate_cost(&self, _decoded: &DecodedTile) -> Option<f64> {
        Some(self.cost.as_secs_f64() * 1000.0)
    }
}

// =============================================================================
// Render loop
// =============================================================================

/// Run the simulation.
pub fn run(args: SimulateArgs, config: &EngineConfig) -> Result<(), CliError> {
    if args.tiles == 0 {
        return Err(CliError::InvalidArgument("--tiles must be at least 1".to_string()));
    }
    if args.level >= 32 {
        return Err(CliError::InvalidArgument("--level must be below 32".to_string()));
    }

    let pool = ThreadPoolBuilder::new()
        .num_threads(args.workers.max(1))
        .thread_name(|i| format!("tile-loader-{}", i))
        .build()
        .map_err(|e| CliError::Simulation(e.to_string()))?;
    let source: Arc<dyn TileDataSource> = Arc::new(SyntheticSource {
        pool,
        delay: Duration::from_millis(args.load_delay_ms),
        fail_every: args.fail_every,
    });
    let creator: Arc<dyn GeometryCreator> = Arc::new(SyntheticCreator {
        cost: Duration::from_secs_f64(args.create_cost_ms.max(0.0) / 1000.0),
    });

    let updates = Arc::new(UpdateCounter::new());
    let scheduler = Arc::new(TaskScheduler::new(
        config.scheduler.clone(),
        Arc::clone(&updates) as Arc<dyn RenderUpdater>,
    ));
    if let Some(max_fps) = args.max_fps {
        scheduler.set_max_fps(max_fps);
    }
    if args.no_throttle {
        scheduler.set_throttling_enabled(false);
    }

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))
            .map_err(|e| CliError::Simulation(format!("failed to install Ctrl+C handler: {}", e)))?;
    }

    let disabled = args
        .disable
        .as_deref()
        .map(GeometryKindSet::parse_list)
        .filter(|set| !set.is_empty())
        .map(Arc::new);

    let mut tiles = build_grid(args.tiles, args.level, &source, &scheduler, &creator);
    for tile in tiles.iter_mut() {
        tile.set_kind_filters(None, disabled.clone());
        tile.schedule_load();
    }

    info!(
        tiles = tiles.len(),
        max_fps = scheduler.max_fps(),
        throttling = scheduler.throttling_enabled(),
        "Simulation started"
    );

    let zoom_level = f64::from(args.level);
    let frame_duration = Duration::from_secs_f64(1.0 / scheduler.max_fps());
    let started = Instant::now();
    let mut frames = 0;

    while frames < args.frames && !stop.load(Ordering::SeqCst) {
        let frame_start = Instant::now();
        frames += 1;

        for tile in tiles.iter_mut() {
            tile.update(zoom_level);
        }
        let report = scheduler.process_pending(frame_start);

        if args.show_frames && (report.executed > 0 || report.expired > 0) {
            println!(
                "frame {:>4}: executed {:>3}, expired {:>3}, queued {:>3}, budget {}",
                frames,
                report.executed,
                report.expired,
                report.remaining,
                report
                    .budget_ms
                    .map_or_else(|| "unthrottled".to_string(), |b| format!("{:.2} ms", b)),
            );
        }

        if tiles.iter().all(|t| t.is_disposed() || t.is_settled()) && report.remaining == 0 {
            break;
        }

        let elapsed = frame_start.elapsed();
        if elapsed < frame_duration {
            thread::sleep(frame_duration - elapsed);
        }
    }

    let settled = tiles.iter().filter(|t| !t.is_disposed() && t.is_settled()).count();
    let disposed = tiles.iter().filter(|t| t.is_disposed()).count();
    let objects: usize = tiles.iter().map(Tile::object_count).sum();
    let bytes: usize = tiles.iter().map(Tile::resource_size).sum();
    let snapshot = scheduler.metrics().snapshot();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!();
        println!(
            "{} frames in {:.2}s ({} render updates requested)",
            frames,
            started.elapsed().as_secs_f64(),
            updates.count()
        );
        println!(
            "{} tiles settled, {} disposed, {} pending",
            settled,
            disposed,
            tiles.len() - settled - disposed
        );
        println!("{} render objects, {} bytes held", objects, bytes);
        println!("{}", snapshot);
    }

    if stop.load(Ordering::SeqCst) {
        info!("Simulation interrupted");
    }
    Ok(())
}

/// Tiles in a square around the centre of the level, largest area first.
fn build_grid(
    count: u32,
    level: u8,
    source: &Arc<dyn TileDataSource>,
    scheduler: &Arc<TaskScheduler>,
    creator: &Arc<dyn GeometryCreator>,
) -> Vec<Tile> {
    let side = (f64::from(count).sqrt().ceil() as u32).max(1);
    let extent = 1u32 << level;
    let origin = (extent / 2).saturating_sub(side / 2);
    let centre = f64::from(side - 1) / 2.0;

    (0..count)
        .map(|i| {
            let (dr, dc) = (i / side, i % side);
            let row = (origin + dr).min(extent - 1);
            let column = (origin + dc).min(extent - 1);
            let distance = (f64::from(dr) - centre).hypot(f64::from(dc) - centre);

            let mut tile = Tile::new(
                TileKey::new(row, column, level),
                Arc::clone(source),
                Arc::clone(scheduler),
            )
            .with_geometry_creator(Arc::clone(creator));
            tile.set_visible_area(65_536.0 / (1.0 + distance));
            tile
        })
        .collect()
}
