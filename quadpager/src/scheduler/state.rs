//! Per-node load state.

use std::fmt;
use std::time::Instant;

use super::fetch::FetchHandle;
use crate::error::FetchError;
use crate::ids::SimpleIdentity;
use crate::quadtree::Node;

/// Lifecycle of a node in the tile table.
///
/// ```text
/// Queued ──► InFlight ──► Loaded
///    │           ├──────► Failed ──► Queued (retry while desired)
///    └───────────┴──────► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TileState {
    /// Desired but not yet dispatched.
    Queued,
    /// Handed to the fetch collaborator.
    InFlight,
    /// Payload received and drawables registered.
    Loaded,
    /// The fetch reported an error.
    Failed,
    /// The fetch was abandoned before completing.
    Cancelled,
}

impl TileState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TileState::Queued => "queued",
            TileState::InFlight => "in-flight",
            TileState::Loaded => "loaded",
            TileState::Failed => "failed",
            TileState::Cancelled => "cancelled",
        }
    }

    /// True for states with no fetch outstanding or pending.
    pub fn is_settled(&self) -> bool {
        matches!(
            self,
            TileState::Loaded | TileState::Failed | TileState::Cancelled
        )
    }

    /// True while a fetch is pending or running.
    pub fn is_pending(&self) -> bool {
        matches!(self, TileState::Queued | TileState::InFlight)
    }
}

impl fmt::Display for TileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One row of the tile table.
#[derive(Debug, Clone)]
pub struct LoadedTile {
    pub node: Node,
    pub state: TileState,

    /// Handle of the outstanding fetch while `InFlight`.
    pub handle: Option<FetchHandle>,

    /// Drawables registered with the scene for this tile.
    pub drawables: Vec<SimpleIdentity>,

    /// Last state change.
    pub updated: Instant,

    /// Importance from the latest coverage pass.
    pub importance: f64,

    /// Frame index for animated sources.
    pub frame: Option<u32>,

    /// Error from the last failed attempt.
    pub last_error: Option<FetchError>,

    /// Number of dispatches so far.
    pub attempts: u32,

    /// Dispatched to a fetch the collaborator reports as local.
    pub local: bool,

    /// Still shown but no longer desired; removed once the new level is in.
    pub retiring: bool,
}

impl LoadedTile {
    pub fn queued(node: Node, importance: f64, now: Instant) -> Self {
        Self {
            node,
            state: TileState::Queued,
            handle: None,
            drawables: Vec::new(),
            updated: now,
            importance,
            frame: None,
            last_error: None,
            attempts: 0,
            local: false,
            retiring: false,
        }
    }

    pub(crate) fn transition(&mut self, state: TileState, now: Instant) {
        self.state = state;
        self.updated = now;
    }

    /// True if the node should be fetched again on the next pass.
    pub fn is_retryable(&self) -> bool {
        match self.state {
            TileState::Cancelled => true,
            TileState::Failed => self
                .last_error
                .as_ref()
                .map_or(true, FetchError::is_retryable),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_display() {
        assert_eq!(TileState::InFlight.to_string(), "in-flight");
        assert_eq!(format!("{}", TileState::Loaded), "loaded");
    }

    #[test]
    fn test_settled_and_pending() {
        assert!(TileState::Queued.is_pending());
        assert!(TileState::InFlight.is_pending());
        assert!(TileState::Loaded.is_settled());
        assert!(TileState::Failed.is_settled());
        assert!(!TileState::Queued.is_settled());
    }

    #[test]
    fn test_failed_not_found_is_not_retryable() {
        let now = Instant::now();
        let mut tile = LoadedTile::queued(Node::new(0, 0, 1), 1.0, now);
        tile.transition(TileState::Failed, now);
        tile.last_error = Some(FetchError::NotFound);
        assert!(!tile.is_retryable());

        tile.last_error = Some(FetchError::Failed("timeout".into()));
        assert!(tile.is_retryable());
    }
}
