//! Tile load/unload scheduling.
//!
//! Turns a stream of view snapshots into fetch requests and scene changes.
//!
//! - [`TileScheduler`]: the tile table and its state machine
//! - [`SchedulerDaemon`]: async worker that drives the table
//! - [`TileFetcher`]: the external fetch collaborator
//! - [`UpdateThrottle`]: reconciliation cadence gate

mod daemon;
mod fetch;
mod state;
mod table;
mod throttle;

pub use daemon::{
    desired_coverage, tree_for, SchedulerDaemon, SchedulerHandle, DEFAULT_TICK_INTERVAL,
    DEFAULT_VIEW_CHANNEL_CAPACITY,
};
pub use fetch::{
    FetchCompletion, FetchFuture, FetchHandle, FetchRequest, FetchResult, TileFetcher, TilePayload,
};
pub use state::{LoadedTile, TileState};
pub use table::{ReconcileSummary, TileScheduler};
pub use throttle::UpdateThrottle;
