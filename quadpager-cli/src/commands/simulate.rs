//! `simulate` command: fly a scripted camera over a synthetic tile source.
//!
//! Runs the real [`SchedulerDaemon`] on a tokio runtime, applies every
//! emitted change set to a [`SceneState`], and prints the scheduler
//! telemetry at the end.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use clap::Args;
use glam::DVec2;
use quadpager::changes::SceneState;
use quadpager::coord::CoordSystem;
use quadpager::error::FetchError;
use quadpager::quadtree::Node;
use quadpager::scheduler::{FetchFuture, SchedulerDaemon, TileFetcher, TilePayload};
use quadpager::view::ViewState;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::common::{load_config, Surface};
use crate::error::CliError;

/// Time allowed for outstanding fetches after the last step.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Arguments for the simulate command.
#[derive(Debug, Args)]
pub struct SimulateArgs {
    /// Number of camera positions along the path
    #[arg(long, default_value_t = 20)]
    pub steps: usize,

    /// Configuration file (defaults to the user config, then built-ins)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Simulated fetch latency in milliseconds
    #[arg(long, default_value_t = 20)]
    pub latency_ms: u64,

    /// Time between camera steps in milliseconds
    #[arg(long, default_value_t = 100)]
    pub step_ms: u64,

    /// Levels at or below this are served as local tiles
    #[arg(long, default_value_t = 2)]
    pub local_levels: i32,

    /// Display surface
    #[arg(long, value_enum, default_value_t = Surface::Flat)]
    pub surface: Surface,
}

/// Tile source that answers with the node name after a fixed latency.
struct SyntheticFetcher {
    latency: Duration,
    local_levels: i32,
}

impl TileFetcher for SyntheticFetcher {
    fn fetch(&self, node: Node, _priority: f64, cancel: CancellationToken) -> FetchFuture {
        let latency = if self.is_local(&node) {
            Duration::ZERO
        } else {
            self.latency
        };
        Box::pin(async move {
            tokio::select! {
                _ = cancel.cancelled() => Err(FetchError::Cancelled),
                _ = tokio::time::sleep(latency) => Ok(TilePayload::new(Bytes::from(node.to_string()))),
            }
        })
    }

    fn is_local(&self, node: &Node) -> bool {
        node.level <= self.local_levels
    }
}

/// Camera for step `i` of `steps`: a diagonal pass that descends as it goes.
fn camera_at(coord: &dyn CoordSystem, i: usize, steps: usize, frame: DVec2) -> ViewState {
    let t = if steps > 1 {
        i as f64 / (steps - 1) as f64
    } else {
        0.0
    };
    let center = DVec2::new(-1.5 + 3.0 * t, -0.5 + 1.5 * t);
    let height = 3.0 * (1.0 - t) + 0.05 * t;
    ViewState::top_down(coord, center, height, frame)
}

/// Run the simulate command.
pub fn run(args: SimulateArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(simulate(args, config))
}

async fn simulate(args: SimulateArgs, config: quadpager::PagerConfig) -> Result<(), CliError> {
    let coord = args.surface.coord_system();
    let fetcher = Arc::new(SyntheticFetcher {
        latency: Duration::from_millis(args.latency_ms),
        local_levels: args.local_levels,
    });
    let (daemon, handle, mut changes) = SchedulerDaemon::new(config, Arc::clone(&coord), fetcher)?;

    let shutdown = CancellationToken::new();
    let task = tokio::spawn(daemon.run(shutdown.clone()));
    let mut scene = SceneState::new();
    let frame = DVec2::new(1024.0, 768.0);

    for i in 0..args.steps {
        handle
            .update_view(camera_at(coord.as_ref(), i, args.steps, frame))
            .await?;
        tokio::time::sleep(Duration::from_millis(args.step_ms)).await;

        while let Ok(set) = changes.try_recv() {
            scene.apply(set);
        }
        let scheduler = handle.scheduler();
        println!(
            "step {:>3}: {:>4} tiles in scene, {:>3} in flight, target level {}",
            i,
            scene.tile_nodes().len(),
            scheduler.in_flight(),
            scheduler
                .target_level()
                .map_or_else(|| "-".to_string(), |l| l.to_string()),
        );
    }

    let deadline = tokio::time::Instant::now() + SETTLE_TIMEOUT;
    let scheduler = Arc::clone(handle.scheduler());
    while (scheduler.has_queued() || scheduler.in_flight() > 0) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    debug!(in_flight = scheduler.in_flight(), "Finished settling");

    shutdown.cancel();
    if let Err(e) = task.await {
        info!(error = %e, "Scheduler task ended abnormally");
    }
    while let Some(set) = changes.recv().await {
        scene.apply(set);
    }

    println!();
    println!("{}", handle.telemetry());
    println!("scene after shutdown: {} drawables", scene.len());
    Ok(())
}
