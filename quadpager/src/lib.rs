//! QuadPager - quad-tree tile paging and screen-space placement
//!
//! This library decides which tiles of a quad-tree pyramid a globe or map
//! viewer should have loaded for the current camera, drives their fetching
//! and eviction, and batches world-anchored labels and markers into a few
//! screen-space draw calls.
//!
//! # Architecture
//!
//! ```text
//!  ViewState ──► QuadTree coverage ──► TileScheduler ──► ChangeSet ──► renderer
//!   (camera)     (ScreenImportance)     │    ▲
//!                                       ▼    │ FetchCompletion
//!                                    TileFetcher (bounded pool)
//!
//!  ScreenSpaceObject ──► ScreenSpaceBuilder ──► ChangeSet
//!  touch point ────────► SelectionManager ───► SelectedObject
//! ```
//!
//! [`scheduler::SchedulerDaemon`] owns the tile table and runs on a tokio
//! runtime; everything else is synchronous and guarded per component.

pub mod changes;
pub mod config;
pub mod coord;
pub mod error;
pub mod geometry;
pub mod ids;
pub mod importance;
pub mod logging;
pub mod quadtree;
pub mod scheduler;
pub mod screen_space;
pub mod selection;
pub mod telemetry;
pub mod view;

pub use changes::{ChangeSet, SceneChange, SceneState};
pub use config::PagerConfig;
pub use error::{ConfigError, FetchError, GeometryError, SchedulerError};
pub use ids::{SimpleIdentity, EMPTY_IDENTITY};
pub use quadtree::{Node, QuadTree};
pub use view::ViewState;
