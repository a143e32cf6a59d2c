//! Background worker that owns tile bookkeeping.
//!
//! The [`SchedulerDaemon`] is a long-running task that:
//! - Receives view snapshots and reconciles coverage on a throttled cadence
//! - Dispatches fetches to the [`TileFetcher`], bounded by a semaphore
//! - Applies fetch completions as they arrive
//! - Emits scene changes as atomic [`ChangeSet`]s
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        SchedulerDaemon                           │
//! │                                                                  │
//! │  ViewState ──► ┌──────────┐   ┌──────────┐   ┌──────────────┐    │
//! │                │ Throttle │──►│ Coverage │──►│ TileScheduler│    │
//! │                └──────────┘   └──────────┘   └──────┬───────┘    │
//! │                                                     │            │
//! │                      ┌──────────────┐  FetchRequest │            │
//! │                      │  Semaphore   │◄──────────────┘            │
//! │                      └──────┬───────┘                            │
//! │                             ▼                                    │
//! │                      ┌──────────────┐   FetchCompletion          │
//! │                      │ TileFetcher  │──────────► TileScheduler   │
//! │                      └──────────────┘                │           │
//! │                                                      ▼           │
//! │                                            ChangeSet ──► renderer│
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use quadpager::scheduler::SchedulerDaemon;
//!
//! let (daemon, handle, mut changes) = SchedulerDaemon::new(config, coord, fetcher)?;
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(daemon.run(shutdown.clone()));
//!
//! handle.update_view(view).await?;
//! while let Some(change_set) = changes.recv().await {
//!     renderer.apply(change_set);
//! }
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::fetch::{FetchCompletion, FetchRequest, TileFetcher};
use super::table::TileScheduler;
use super::throttle::UpdateThrottle;
use crate::changes::ChangeSet;
use crate::config::PagerConfig;
use crate::coord::CoordSystem;
use crate::error::{FetchError, SchedulerError};
use crate::importance::ScreenImportance;
use crate::quadtree::{ImportantNodeSet, QuadTree};
use crate::telemetry::{SchedulerMetrics, TelemetrySnapshot};
use crate::view::ViewState;

// =============================================================================
// Configuration
// =============================================================================

/// Default capacity of the view-update channel.
pub const DEFAULT_VIEW_CHANNEL_CAPACITY: usize = 16;

/// Default housekeeping tick (throttled views, wait-for-local timeout).
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// Coverage
// =============================================================================

/// Computes the desired coverage for a view.
///
/// Uses single-level coverage when `config.single_level` is set, returning
/// the chosen target level, and pyramid coverage otherwise.
pub fn desired_coverage(
    coord: &dyn CoordSystem,
    tree: &QuadTree,
    config: &PagerConfig,
    view: &ViewState,
) -> (Option<i32>, ImportantNodeSet) {
    let source = ScreenImportance::new(coord, view, config.importance_scale);
    let thresholds = [config.min_importance];

    if config.single_level {
        let (target, nodes) = tree.calc_coverage_visible(
            &source,
            &thresholds,
            config.max_tiles,
            &config.multi_level_loads,
        );
        (Some(target), nodes)
    } else {
        let nodes = tree.calc_coverage_importance(
            &source,
            &thresholds,
            config.max_tiles,
            config.require_siblings,
        );
        (None, nodes)
    }
}

/// Builds the quad tree a configuration describes over a coordinate system.
pub fn tree_for(coord: &dyn CoordSystem, config: &PagerConfig) -> QuadTree {
    QuadTree::new(coord.bounds(), config.min_zoom as i32, config.max_zoom as i32)
}

/// Current time on the tokio clock, so paused test clocks apply.
fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

// =============================================================================
// Handle
// =============================================================================

/// Producer side of a running daemon.
#[derive(Clone)]
pub struct SchedulerHandle {
    view_tx: mpsc::Sender<ViewState>,
    scheduler: Arc<TileScheduler>,
}

impl SchedulerHandle {
    /// Sends a new view snapshot to the daemon.
    pub async fn update_view(&self, view: ViewState) -> Result<(), SchedulerError> {
        self.view_tx
            .send(view)
            .await
            .map_err(|_| SchedulerError::ChannelClosed)
    }

    /// The tile table, for diagnostics.
    pub fn scheduler(&self) -> &Arc<TileScheduler> {
        &self.scheduler
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.scheduler.metrics().snapshot()
    }
}

// =============================================================================
// Daemon
// =============================================================================

/// The tile scheduling daemon.
///
/// # Type Parameters
///
/// * `F` - Fetch collaborator
pub struct SchedulerDaemon<F>
where
    F: TileFetcher,
{
    coord: Arc<dyn CoordSystem>,
    scheduler: Arc<TileScheduler>,
    fetcher: Arc<F>,
    semaphore: Arc<Semaphore>,
    throttle: UpdateThrottle,
    tick_interval: Duration,
    pending_view: Option<ViewState>,
    view_rx: mpsc::Receiver<ViewState>,
    completion_tx: mpsc::UnboundedSender<FetchCompletion>,
    completion_rx: mpsc::UnboundedReceiver<FetchCompletion>,
    changes_tx: mpsc::UnboundedSender<ChangeSet>,
}

impl<F> SchedulerDaemon<F>
where
    F: TileFetcher,
{
    /// Creates a daemon with its channels.
    ///
    /// Returns the daemon, a handle for sending views, and the receiver for
    /// emitted change sets.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Config`] if the configuration is invalid.
    pub fn new(
        config: PagerConfig,
        coord: Arc<dyn CoordSystem>,
        fetcher: Arc<F>,
    ) -> Result<(Self, SchedulerHandle, mpsc::UnboundedReceiver<ChangeSet>), SchedulerError> {
        Self::with_metrics(config, coord, fetcher, Arc::new(SchedulerMetrics::new()))
    }

    /// Creates a daemon that records into existing metrics.
    pub fn with_metrics(
        config: PagerConfig,
        coord: Arc<dyn CoordSystem>,
        fetcher: Arc<F>,
        metrics: Arc<SchedulerMetrics>,
    ) -> Result<(Self, SchedulerHandle, mpsc::UnboundedReceiver<ChangeSet>), SchedulerError> {
        config.validate()?;

        let (view_tx, view_rx) = mpsc::channel(DEFAULT_VIEW_CHANNEL_CAPACITY);
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();
        let (changes_tx, changes_rx) = mpsc::unbounded_channel();

        let tree = tree_for(coord.as_ref(), &config);
        let throttle = UpdateThrottle::new(config.min_update_period, config.min_update_distance);
        let semaphore = Arc::new(Semaphore::new(config.max_simultaneous_fetches));
        let scheduler = Arc::new(TileScheduler::new(config, tree, metrics));

        let handle = SchedulerHandle {
            view_tx,
            scheduler: Arc::clone(&scheduler),
        };

        let daemon = Self {
            coord,
            scheduler,
            fetcher,
            semaphore,
            throttle,
            tick_interval: DEFAULT_TICK_INTERVAL,
            pending_view: None,
            view_rx,
            completion_tx,
            completion_rx,
            changes_tx,
        };

        Ok((daemon, handle, changes_rx))
    }

    /// Sets the housekeeping tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Runs until shutdown is signalled or every handle is dropped.
    ///
    /// On exit all fetches are cancelled and a final change set removes
    /// every tile drawable.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            max_fetches = self.scheduler.config().max_simultaneous_fetches,
            max_tiles = self.scheduler.config().max_tiles,
            single_level = self.scheduler.config().single_level,
            "Scheduler daemon starting"
        );

        let mut tick = tokio::time::interval(self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Scheduler daemon shutting down");
                    break;
                }

                Some(completion) = self.completion_rx.recv() => {
                    let now = clock_now();
                    self.scheduler.complete(completion, now);
                    self.dispatch(now);
                    self.flush(now);
                }

                view = self.view_rx.recv() => {
                    match view {
                        Some(view) => {
                            self.pending_view = Some(view);
                            self.reconcile(clock_now());
                        }
                        None => {
                            info!("All scheduler handles dropped");
                            break;
                        }
                    }
                }

                _ = tick.tick() => {
                    let now = clock_now();
                    self.reconcile(now);
                    self.dispatch(now);
                    self.flush(now);
                }
            }
        }

        let changes = self.scheduler.reset();
        if !changes.is_empty() {
            let _ = self.changes_tx.send(changes);
        }
        info!("Scheduler daemon stopped");
    }

    /// Runs a reconciliation pass for the latest view if the throttle allows.
    fn reconcile(&mut self, now: Instant) {
        let Some(view) = self.pending_view.as_ref() else {
            return;
        };
        if !self.throttle.should_update(view, now) {
            trace!(
                remaining_ms = self.throttle.remaining(now).as_millis() as u64,
                "Reconciliation throttled"
            );
            return;
        }
        let Some(view) = self.pending_view.take() else {
            return;
        };

        let (target, desired) = desired_coverage(
            self.coord.as_ref(),
            self.scheduler.tree(),
            self.scheduler.config(),
            &view,
        );
        self.scheduler.update(&desired, target, now);
        self.throttle.mark_updated(&view, now);

        self.dispatch(now);
        self.flush(now);
    }

    /// Starts as many queued fetches as there are free permits.
    fn dispatch(&self, now: Instant) {
        let available = self.semaphore.available_permits();
        let fetcher = Arc::clone(&self.fetcher);
        let requests = self
            .scheduler
            .begin_fetches(available, |node| fetcher.is_local(node), now);

        for request in requests {
            let Ok(permit) = Arc::clone(&self.semaphore).try_acquire_owned() else {
                // Slot taken in the meantime; the node requeues next pass.
                let _ = self
                    .completion_tx
                    .send(FetchCompletion::new(&request, Err(FetchError::Cancelled)));
                continue;
            };
            self.spawn_fetch(request, permit);
        }
    }

    fn spawn_fetch(&self, request: FetchRequest, permit: tokio::sync::OwnedSemaphorePermit) {
        let fetcher = Arc::clone(&self.fetcher);
        let completion_tx = self.completion_tx.clone();

        tokio::spawn(async move {
            let token = request.handle.token();
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => Err(FetchError::Cancelled),
                result = fetcher.fetch(request.source, request.priority, token.clone()) => result,
            };

            // Free the slot before reporting so the daemon can refill it.
            drop(permit);
            if completion_tx
                .send(FetchCompletion::new(&request, result))
                .is_err()
            {
                debug!(node = %request.node, "Daemon gone, completion dropped");
            }
        });
    }

    fn flush(&self, now: Instant) {
        if let Some(changes) = self.scheduler.take_changes(now) {
            trace!(changes = changes.len(), "Emitting change set");
            if self.changes_tx.send(changes).is_err() {
                debug!("Change set receiver dropped");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
