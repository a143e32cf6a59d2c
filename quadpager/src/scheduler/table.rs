//! The tile table and its reconciliation rules.
//!
//! [`TileScheduler`] is synchronous and does no I/O. Each call takes the
//! table lock once, applies a batch of transitions, and appends the
//! resulting scene changes to a pending [`ChangeSet`]. The async daemon
//! drives it; tests can drive it directly.
//!
//! # Reconciliation
//!
//! ```text
//! desired coverage ──► update() ──► Queued / Cancelled / released / retiring
//!                                        │
//! free fetch slots ──► begin_fetches() ──► InFlight ──► FetchRequest
//!                                        │
//! fetch completion ──► complete() ──► Loaded / Failed / Cancelled
//!                                        │
//!                      take_changes() ──► ChangeSet (atomic)
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::fetch::{FetchCompletion, FetchHandle, FetchRequest};
use super::state::{LoadedTile, TileState};
use crate::changes::{ChangeSet, SceneChange, TileDrawable};
use crate::config::PagerConfig;
use crate::error::FetchError;
use crate::ids::next_identity;
use crate::quadtree::{to_node_set, ImportantNodeSet, Node, NodeSet, QuadTree};
use crate::telemetry::SchedulerMetrics;

/// Counts from one [`TileScheduler::update`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    /// Nodes newly queued, including retries.
    pub queued: usize,
    /// Queued or in-flight nodes abandoned.
    pub cancelled: usize,
    /// Loaded nodes released because they left the coverage.
    pub released: usize,
    /// Desired nodes dropped to stay under `max_tiles`.
    pub evicted: usize,
    /// Loaded nodes kept on screen until the new level is in.
    pub retiring: usize,
}

struct TableInner {
    tiles: BTreeMap<Node, LoadedTile>,
    target_level: Option<i32>,
    passes: u64,
    pending: ChangeSet,
    holding_since: Option<Instant>,
}

/// Owner of the loaded-tile table.
pub struct TileScheduler {
    config: PagerConfig,
    tree: QuadTree,
    metrics: Arc<SchedulerMetrics>,
    inner: Mutex<TableInner>,
}

impl TileScheduler {
    pub fn new(config: PagerConfig, tree: QuadTree, metrics: Arc<SchedulerMetrics>) -> Self {
        Self {
            config,
            tree,
            metrics,
            inner: Mutex::new(TableInner {
                tiles: BTreeMap::new(),
                target_level: None,
                passes: 0,
                pending: ChangeSet::new(),
                holding_since: None,
            }),
        }
    }

    pub fn config(&self) -> &PagerConfig {
        &self.config
    }

    pub fn tree(&self) -> &QuadTree {
        &self.tree
    }

    pub fn metrics(&self) -> &Arc<SchedulerMetrics> {
        &self.metrics
    }

    // =========================================================================
    // Reconciliation
    // =========================================================================

    /// Diffs a new desired coverage against the table.
    ///
    /// `target_level` is the level chosen by a single-level coverage pass,
    /// or `None` for pyramid coverage.
    pub fn update(
        &self,
        desired: &ImportantNodeSet,
        target_level: Option<i32>,
        now: Instant,
    ) -> ReconcileSummary {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        inner.passes += 1;
        self.metrics.reconciliation();

        let mut summary = ReconcileSummary::default();
        let admitted: BTreeMap<Node, f64> = desired
            .iter()
            .take(self.config.max_tiles)
            .map(|n| (n.node, n.importance))
            .collect();
        let wanted = to_node_set(desired);
        let hold_old = self.config.single_level && !self.config.single_level_loading;

        if inner.target_level != target_level {
            debug!(from = ?inner.target_level, to = ?target_level, "Target level changed");
            inner.target_level = target_level;
        }

        let leaving: Vec<Node> = inner
            .tiles
            .keys()
            .filter(|node| !admitted.contains_key(node))
            .copied()
            .collect();

        for node in leaving {
            let still_desired = wanted.contains(&node);
            let Some(tile) = inner.tiles.get_mut(&node) else {
                continue;
            };
            let state = tile.state;
            match state {
                TileState::Queued => {
                    tile.transition(TileState::Cancelled, now);
                    summary.cancelled += 1;
                }
                TileState::InFlight => {
                    if let Some(handle) = &tile.handle {
                        handle.cancel();
                    }
                    tile.transition(TileState::Cancelled, now);
                    self.metrics.fetch_cancelled();
                    summary.cancelled += 1;
                }
                TileState::Loaded if hold_old && !still_desired => {
                    if !tile.retiring {
                        tile.retiring = true;
                        summary.retiring += 1;
                    }
                }
                TileState::Loaded => {
                    if let Some(tile) = inner.tiles.remove(&node) {
                        Self::release(&mut inner.pending, &tile);
                    }
                    if still_desired {
                        summary.evicted += 1;
                    } else {
                        summary.released += 1;
                    }
                }
                TileState::Failed | TileState::Cancelled => {
                    inner.tiles.remove(&node);
                }
            }
        }

        for (node, importance) in &admitted {
            match inner.tiles.get_mut(node) {
                None => {
                    inner
                        .tiles
                        .insert(*node, LoadedTile::queued(*node, *importance, now));
                    summary.queued += 1;
                }
                Some(tile) => {
                    tile.importance = *importance;
                    tile.retiring = false;
                    if tile.is_retryable() {
                        trace!(node = %node, state = %tile.state, "Requeueing node");
                        tile.transition(TileState::Queued, now);
                        tile.handle = None;
                        summary.queued += 1;
                    }
                }
            }
        }

        summary.evicted += self.enforce_capacity(inner);
        if summary.evicted > 0 {
            self.metrics.evicted(summary.evicted as u64);
            debug!(
                evicted = summary.evicted,
                max_tiles = self.config.max_tiles,
                "Tile cap reached, evicted lowest importance tiles"
            );
        }

        Self::settle_retiring(inner);
        self.metrics.set_tiles_loaded(Self::count_loaded(inner));

        debug!(
            pass = inner.passes,
            desired = desired.len(),
            queued = summary.queued,
            cancelled = summary.cancelled,
            released = summary.released,
            retiring = summary.retiring,
            "Reconciled tile table"
        );
        summary
    }

    /// Drops retiring tiles beyond `max_tiles`, lowest importance first.
    fn enforce_capacity(&self, inner: &mut TableInner) -> usize {
        let live = inner
            .tiles
            .values()
            .filter(|t| t.state != TileState::Cancelled)
            .count();
        let excess = live.saturating_sub(self.config.max_tiles);
        if excess == 0 {
            return 0;
        }

        let mut retiring: Vec<(Node, f64)> = inner
            .tiles
            .values()
            .filter(|t| t.retiring)
            .map(|t| (t.node, t.importance))
            .collect();
        retiring.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

        let mut evicted = 0;
        for (node, _) in retiring.into_iter().take(excess) {
            if let Some(tile) = inner.tiles.remove(&node) {
                Self::release(&mut inner.pending, &tile);
                evicted += 1;
            }
        }
        evicted
    }

    /// Removes retiring tiles once nothing desired is still loading.
    fn settle_retiring(inner: &mut TableInner) {
        if !inner.tiles.values().any(|t| t.retiring) {
            return;
        }
        let waiting = inner
            .tiles
            .values()
            .any(|t| !t.retiring && t.state.is_pending());
        if waiting {
            return;
        }

        let retired: Vec<Node> = inner
            .tiles
            .values()
            .filter(|t| t.retiring)
            .map(|t| t.node)
            .collect();
        debug!(count = retired.len(), "New level loaded, removing previous level");
        for node in retired {
            if let Some(tile) = inner.tiles.remove(&node) {
                Self::release(&mut inner.pending, &tile);
            }
        }
    }

    fn release(pending: &mut ChangeSet, tile: &LoadedTile) {
        for id in &tile.drawables {
            pending.push(SceneChange::Remove(*id));
        }
    }

    fn count_loaded(inner: &TableInner) -> u64 {
        inner
            .tiles
            .values()
            .filter(|t| t.state == TileState::Loaded)
            .count() as u64
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Moves up to `available` queued nodes to `InFlight`.
    ///
    /// Coarser levels go first so the screen fills in quickly, then higher
    /// importance. `is_local` tags fetches that wait-for-local mode waits on.
    pub fn begin_fetches<L>(&self, available: usize, is_local: L, now: Instant) -> Vec<FetchRequest>
    where
        L: Fn(&Node) -> bool,
    {
        if available == 0 {
            return Vec::new();
        }
        let mut inner = self.inner.lock();

        let mut queued: Vec<(Node, f64)> = inner
            .tiles
            .values()
            .filter(|t| t.state == TileState::Queued)
            .map(|t| (t.node, t.importance))
            .collect();
        queued.sort_by(|a, b| {
            a.0.level
                .cmp(&b.0.level)
                .then(b.1.total_cmp(&a.1))
                .then(a.0.cmp(&b.0))
        });

        let mut requests = Vec::new();
        for (node, importance) in queued.into_iter().take(available) {
            let Some(tile) = inner.tiles.get_mut(&node) else {
                continue;
            };
            let source = if self.config.flip_y {
                node.flipped_y()
            } else {
                node
            };
            let handle = FetchHandle::new();
            tile.transition(TileState::InFlight, now);
            tile.handle = Some(handle.clone());
            tile.attempts += 1;
            tile.local = is_local(&source);
            self.metrics.fetch_started();
            requests.push(FetchRequest {
                node,
                source,
                priority: importance,
                handle,
            });
        }

        if !requests.is_empty() {
            trace!(count = requests.len(), available, "Dispatching fetches");
        }
        requests
    }

    // =========================================================================
    // Completion
    // =========================================================================

    /// Applies a fetch result.
    ///
    /// Returns false when the completion is stale: the node is unknown, was
    /// cancelled, or has been dispatched again since. Stale completions
    /// leave the table and pending changes untouched.
    pub fn complete(&self, completion: FetchCompletion, now: Instant) -> bool {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let node = completion.node;

        let Some(tile) = inner.tiles.get_mut(&node) else {
            self.metrics.late_completion();
            trace!(node = %node, "Completion for unknown node discarded");
            return false;
        };

        let current = tile.state == TileState::InFlight
            && tile.handle.as_ref().map(FetchHandle::id) == Some(completion.fetch_id);
        if !current {
            self.metrics.late_completion();
            trace!(node = %node, state = %tile.state, "Stale completion discarded");
            if tile.state == TileState::Cancelled {
                inner.tiles.remove(&node);
            }
            return false;
        }

        tile.handle = None;
        match completion.result {
            Ok(payload) => {
                let id = next_identity();
                tile.drawables = vec![id];
                tile.frame = payload.frame;
                tile.last_error = None;
                tile.transition(TileState::Loaded, now);
                self.metrics.fetch_succeeded();

                let drawable = TileDrawable {
                    id,
                    node,
                    bounds: self.tree.generate_mbr_for_node(&node),
                    importance: tile.importance,
                    border_texels: self.config.border_texel,
                    payload,
                };
                inner.pending.push(SceneChange::AddTile(drawable));
                trace!(node = %node, drawable = id, "Tile loaded");
            }
            Err(FetchError::Cancelled) => {
                tile.transition(TileState::Cancelled, now);
                self.metrics.fetch_cancelled();
            }
            Err(err) => {
                warn!(node = %node, attempts = tile.attempts, error = %err, "Tile fetch failed");
                tile.last_error = Some(err);
                tile.transition(TileState::Failed, now);
                self.metrics.fetch_failed();
            }
        }

        Self::settle_retiring(inner);
        self.metrics.set_tiles_loaded(Self::count_loaded(inner));
        true
    }

    // =========================================================================
    // Change emission
    // =========================================================================

    /// Takes the pending scene changes as one atomic batch.
    ///
    /// With wait-for-local enabled, changes are held while any local fetch is
    /// still running, up to the configured timeout.
    pub fn take_changes(&self, now: Instant) -> Option<ChangeSet> {
        let mut inner = self.inner.lock();
        if inner.pending.is_empty() {
            inner.holding_since = None;
            return None;
        }

        if self.config.wait_for_local {
            let waiting = inner
                .tiles
                .values()
                .any(|t| t.local && t.state == TileState::InFlight);
            if waiting {
                let since = *inner.holding_since.get_or_insert(now);
                if now.saturating_duration_since(since) < self.config.wait_for_local_timeout {
                    return None;
                }
                debug!(
                    pending = inner.pending.len(),
                    "Wait for local timed out, flushing ready tiles"
                );
            }
        }

        inner.holding_since = None;
        self.metrics.change_set_emitted();
        Some(inner.pending.take())
    }

    /// Cancels every fetch and unloads every tile.
    ///
    /// Returns pending changes followed by removals for all drawables.
    pub fn reset(&self) -> ChangeSet {
        let mut inner = self.inner.lock();
        let inner = &mut *inner;
        let mut changes = inner.pending.take();

        for tile in inner.tiles.values() {
            if let Some(handle) = &tile.handle {
                if tile.state == TileState::InFlight {
                    handle.cancel();
                    self.metrics.fetch_cancelled();
                }
            }
            Self::release(&mut changes, tile);
        }

        debug!(tiles = inner.tiles.len(), "Tile table reset");
        inner.tiles.clear();
        inner.target_level = None;
        inner.holding_since = None;
        self.metrics.set_tiles_loaded(0);
        changes
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Nodes with drawables in the scene, including retiring ones.
    pub fn loaded_nodes(&self) -> NodeSet {
        self.inner
            .lock()
            .tiles
            .values()
            .filter(|t| t.state == TileState::Loaded)
            .map(|t| t.node)
            .collect()
    }

    pub fn state_of(&self, node: &Node) -> Option<TileState> {
        self.inner.lock().tiles.get(node).map(|t| t.state)
    }

    /// Copy of a node's table row.
    pub fn tile(&self, node: &Node) -> Option<LoadedTile> {
        self.inner.lock().tiles.get(node).cloned()
    }

    pub fn in_flight(&self) -> usize {
        self.inner
            .lock()
            .tiles
            .values()
            .filter(|t| t.state == TileState::InFlight)
            .count()
    }

    pub fn has_queued(&self) -> bool {
        self.inner
            .lock()
            .tiles
            .values()
            .any(|t| t.state == TileState::Queued)
    }

    pub fn target_level(&self) -> Option<i32> {
        self.inner.lock().target_level
    }

    /// Number of reconciliation passes so far.
    pub fn passes(&self) -> u64 {
        self.inner.lock().passes
    }

    pub fn len(&self) -> usize {
        self.inner.lock().tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changes::SceneState;
    use crate::geometry::Mbr;
    use crate::quadtree::ImportantNode;
    use crate::scheduler::TilePayload;
    use bytes::Bytes;
    use glam::DVec2;
    use std::time::Duration;

    fn scheduler(config: PagerConfig) -> TileScheduler {
        let tree = QuadTree::new(Mbr::new(DVec2::ZERO, DVec2::ONE), 0, 10);
        TileScheduler::new(config, tree, Arc::new(SchedulerMetrics::new()))
    }

    fn desired(nodes: &[(Node, f64)]) -> ImportantNodeSet {
        nodes
            .iter()
            .map(|(n, i)| ImportantNode::new(*n, *i))
            .collect()
    }

    fn payload() -> TilePayload {
        TilePayload::new(Bytes::from_static(b"image"))
    }

    fn no_local(_: &Node) -> bool {
        false
    }

    fn load_all(sched: &TileScheduler, now: Instant) {
        for request in sched.begin_fetches(usize::MAX, no_local, now) {
            assert!(sched.complete(FetchCompletion::new(&request, Ok(payload())), now));
        }
    }

    #[test]
    fn test_new_nodes_are_queued() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let root = Node::new(0, 0, 0);
        let summary = sched.update(&desired(&[(root, 10.0)]), None, now);

        assert_eq!(summary.queued, 1);
        assert_eq!(sched.state_of(&root), Some(TileState::Queued));
        assert!(sched.has_queued());
    }

    #[test]
    fn test_dispatch_respects_available_slots() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let nodes: Vec<(Node, f64)> = Node::new(0, 0, 0)
            .children()
            .iter()
            .map(|c| (*c, 1.0))
            .collect();
        sched.update(&desired(&nodes), None, now);

        let requests = sched.begin_fetches(3, no_local, now);
        assert_eq!(requests.len(), 3);
        assert_eq!(sched.in_flight(), 3);
        assert_eq!(sched.begin_fetches(0, no_local, now).len(), 0);
    }

    #[test]
    fn test_dispatch_coarse_levels_first() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let fine = Node::new(5, 5, 3);
        let coarse = Node::new(0, 0, 1);
        sched.update(&desired(&[(fine, 1000.0), (coarse, 1.0)]), Some(3), now);

        let requests = sched.begin_fetches(1, no_local, now);
        assert_eq!(requests[0].node, coarse);
    }

    #[test]
    fn test_success_emits_tile_drawable() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let node = Node::new(1, 0, 1);
        sched.update(&desired(&[(node, 5.0)]), None, now);
        load_all(&sched, now);

        assert_eq!(sched.state_of(&node), Some(TileState::Loaded));
        let changes = sched.take_changes(now).unwrap();
        assert_eq!(changes.len(), 1);
        match changes.iter().next() {
            Some(SceneChange::AddTile(tile)) => {
                assert_eq!(tile.node, node);
                assert_eq!(tile.bounds.ll, DVec2::new(0.5, 0.0));
            }
            other => panic!("unexpected change {:?}", other),
        }
        assert!(sched.take_changes(now).is_none());
    }

    #[test]
    fn test_frame_index_recorded() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let node = Node::new(0, 0, 0);
        sched.update(&desired(&[(node, 5.0)]), None, now);
        let request = sched.begin_fetches(1, no_local, now).remove(0);
        sched.complete(
            FetchCompletion::new(&request, Ok(payload().with_frame(3))),
            now,
        );
        assert_eq!(sched.tile(&node).unwrap().frame, Some(3));
    }

    #[test]
    fn test_flip_y_applies_to_source_only() {
        let sched = scheduler(PagerConfig::default().with_flip_y(true));
        let now = Instant::now();
        let node = Node::new(1, 0, 2);
        sched.update(&desired(&[(node, 5.0)]), None, now);

        let request = sched.begin_fetches(1, no_local, now).remove(0);
        assert_eq!(request.node, node);
        assert_eq!(request.source, Node::new(1, 3, 2));

        sched.complete(FetchCompletion::new(&request, Ok(payload())), now);
        assert_eq!(sched.state_of(&node), Some(TileState::Loaded));
    }

    #[test]
    fn test_border_texels_reach_drawable() {
        let sched = scheduler(PagerConfig::default().with_border_texel(2));
        let now = Instant::now();
        sched.update(&desired(&[(Node::new(0, 0, 0), 5.0)]), None, now);
        load_all(&sched, now);

        let changes = sched.take_changes(now).unwrap();
        let tile = changes
            .iter()
            .find_map(|c| match c {
                SceneChange::AddTile(t) => Some(t.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(tile.border_texels, 2);
    }

    #[test]
    fn test_failed_node_retried_while_desired() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let node = Node::new(0, 0, 0);
        let want = desired(&[(node, 5.0)]);
        sched.update(&want, None, now);

        let request = sched.begin_fetches(1, no_local, now).remove(0);
        sched.complete(
            FetchCompletion::new(&request, Err(FetchError::Failed("timeout".into()))),
            now,
        );
        assert_eq!(sched.state_of(&node), Some(TileState::Failed));

        let summary = sched.update(&want, None, now);
        assert_eq!(summary.queued, 1);
        assert_eq!(sched.state_of(&node), Some(TileState::Queued));
        assert_eq!(sched.tile(&node).unwrap().attempts, 1);
    }

    #[test]
    fn test_not_found_is_not_retried() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let node = Node::new(0, 0, 0);
        let want = desired(&[(node, 5.0)]);
        sched.update(&want, None, now);

        let request = sched.begin_fetches(1, no_local, now).remove(0);
        sched.complete(FetchCompletion::new(&request, Err(FetchError::NotFound)), now);
        sched.update(&want, None, now);
        assert_eq!(sched.state_of(&node), Some(TileState::Failed));
    }

    #[test]
    fn test_failure_does_not_affect_siblings() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let kids = Node::new(0, 0, 0).children();
        sched.update(&desired(&[(kids[0], 1.0), (kids[1], 1.0)]), None, now);

        let requests = sched.begin_fetches(2, no_local, now);
        sched.complete(
            FetchCompletion::new(&requests[0], Err(FetchError::Failed("boom".into()))),
            now,
        );
        sched.complete(FetchCompletion::new(&requests[1], Ok(payload())), now);

        assert_eq!(sched.state_of(&requests[0].node), Some(TileState::Failed));
        assert_eq!(sched.state_of(&requests[1].node), Some(TileState::Loaded));
    }

    #[test]
    fn test_cancel_then_late_delivery_is_noop() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let node = Node::new(0, 0, 1);
        sched.update(&desired(&[(node, 5.0)]), None, now);
        let request = sched.begin_fetches(1, no_local, now).remove(0);

        sched.update(&ImportantNodeSet::new(), None, now);
        assert!(request.handle.is_cancelled());
        assert_eq!(sched.state_of(&node), Some(TileState::Cancelled));

        let mut before = SceneState::new();
        if let Some(changes) = sched.take_changes(now) {
            before.apply(changes);
        }
        let after_loaded = sched.loaded_nodes();

        assert!(!sched.complete(FetchCompletion::new(&request, Ok(payload())), now));

        let mut after = before.clone();
        if let Some(changes) = sched.take_changes(now) {
            after.apply(changes);
        }
        assert_eq!(before, after);
        assert_eq!(sched.loaded_nodes(), after_loaded);
        assert_eq!(sched.state_of(&node), None);
        assert_eq!(sched.metrics().snapshot().late_completions, 1);
    }

    #[test]
    fn test_reentered_node_ignores_stale_completion() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let node = Node::new(0, 0, 1);
        let want = desired(&[(node, 5.0)]);
        sched.update(&want, None, now);
        let stale = sched.begin_fetches(1, no_local, now).remove(0);

        sched.update(&ImportantNodeSet::new(), None, now);
        sched.update(&want, None, now);
        assert_eq!(sched.state_of(&node), Some(TileState::Queued));

        assert!(!sched.complete(FetchCompletion::new(&stale, Ok(payload())), now));
        assert_eq!(sched.state_of(&node), Some(TileState::Queued));

        let fresh = sched.begin_fetches(1, no_local, now).remove(0);
        assert_ne!(fresh.handle.id(), stale.handle.id());
        assert!(sched.complete(FetchCompletion::new(&fresh, Ok(payload())), now));
        assert_eq!(sched.state_of(&node), Some(TileState::Loaded));
    }

    #[test]
    fn test_loaded_node_leaving_is_released() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let node = Node::new(0, 0, 0);
        sched.update(&desired(&[(node, 5.0)]), None, now);
        load_all(&sched, now);

        let mut scene = SceneState::new();
        scene.apply(sched.take_changes(now).unwrap());
        assert_eq!(scene.len(), 1);

        let summary = sched.update(&ImportantNodeSet::new(), None, now);
        assert_eq!(summary.released, 1);
        scene.apply(sched.take_changes(now).unwrap());
        assert!(scene.is_empty());
        assert!(sched.is_empty());
    }

    #[test]
    fn test_max_tiles_evicts_lowest_importance() {
        let sched = scheduler(PagerConfig::default().with_max_tiles(2));
        let now = Instant::now();
        let kids = Node::new(0, 0, 0).children();
        sched.update(&desired(&[(kids[0], 3.0), (kids[1], 2.0)]), None, now);
        load_all(&sched, now);

        let summary = sched.update(
            &desired(&[(kids[0], 3.0), (kids[1], 2.0), (kids[2], 5.0)]),
            None,
            now,
        );
        assert_eq!(summary.evicted, 1);
        assert_eq!(sched.state_of(&kids[1]), None);
        assert_eq!(sched.state_of(&kids[0]), Some(TileState::Loaded));
        assert_eq!(sched.state_of(&kids[2]), Some(TileState::Queued));
        assert_eq!(sched.metrics().snapshot().evictions, 1);
    }

    #[test]
    fn test_single_level_holds_previous_level() {
        let sched = scheduler(PagerConfig::default().with_single_level(true));
        let now = Instant::now();
        let old: Vec<(Node, f64)> = Node::new(0, 0, 0)
            .children()
            .iter()
            .map(|c| (*c, 1.0))
            .collect();
        sched.update(&desired(&old), Some(1), now);
        load_all(&sched, now);
        sched.take_changes(now);

        let new: Vec<(Node, f64)> = old[0].0.children().iter().map(|c| (*c, 1.0)).collect();
        let summary = sched.update(&desired(&new), Some(2), now);
        assert_eq!(summary.retiring, 4);
        assert_eq!(sched.loaded_nodes().len(), 4);
        assert!(sched.take_changes(now).is_none());

        let requests = sched.begin_fetches(usize::MAX, no_local, now);
        for request in &requests[..3] {
            sched.complete(FetchCompletion::new(request, Ok(payload())), now);
        }
        assert_eq!(sched.loaded_nodes().len(), 7);

        sched.complete(FetchCompletion::new(&requests[3], Ok(payload())), now);
        let loaded = sched.loaded_nodes();
        assert_eq!(loaded.len(), 4);
        assert!(loaded.iter().all(|n| n.level == 2));

        let changes = sched.take_changes(now).unwrap();
        let removals = changes
            .iter()
            .filter(|c| matches!(c, SceneChange::Remove(_)))
            .count();
        assert_eq!(removals, 4);
    }

    #[test]
    fn test_single_level_loading_evicts_immediately() {
        let config = PagerConfig::default()
            .with_single_level(true)
            .with_single_level_loading(true);
        let sched = scheduler(config);
        let now = Instant::now();
        let root = Node::new(0, 0, 0);
        sched.update(&desired(&[(root, 1.0)]), Some(0), now);
        load_all(&sched, now);

        let child = root.children()[0];
        let summary = sched.update(&desired(&[(child, 1.0)]), Some(1), now);
        assert_eq!(summary.released, 1);
        assert!(sched.loaded_nodes().is_empty());
    }

    #[test]
    fn test_wait_for_local_holds_until_local_done() {
        let config = PagerConfig::default().with_wait_for_local(true, Duration::from_secs(4));
        let sched = scheduler(config);
        let start = Instant::now();
        let kids = Node::new(0, 0, 0).children();
        sched.update(&desired(&[(kids[0], 1.0), (kids[1], 1.0)]), None, start);

        let requests = sched.begin_fetches(2, |_| true, start);
        sched.complete(FetchCompletion::new(&requests[0], Ok(payload())), start);
        assert!(sched.take_changes(start).is_none());

        sched.complete(FetchCompletion::new(&requests[1], Ok(payload())), start);
        assert_eq!(sched.take_changes(start).unwrap().len(), 2);
    }

    #[test]
    fn test_wait_for_local_flushes_on_timeout() {
        let config = PagerConfig::default().with_wait_for_local(true, Duration::from_secs(1));
        let sched = scheduler(config);
        let start = Instant::now();
        let kids = Node::new(0, 0, 0).children();
        sched.update(&desired(&[(kids[0], 1.0), (kids[1], 1.0)]), None, start);

        let requests = sched.begin_fetches(2, |_| true, start);
        sched.complete(FetchCompletion::new(&requests[0], Ok(payload())), start);
        assert!(sched.take_changes(start).is_none());
        assert!(sched
            .take_changes(start + Duration::from_millis(500))
            .is_none());

        let flushed = sched.take_changes(start + Duration::from_secs(2)).unwrap();
        assert_eq!(flushed.len(), 1);
    }

    #[test]
    fn test_reset_cancels_and_unloads() {
        let sched = scheduler(PagerConfig::default());
        let now = Instant::now();
        let kids = Node::new(0, 0, 0).children();
        sched.update(&desired(&[(kids[0], 1.0), (kids[1], 1.0)]), None, now);
        let requests = sched.begin_fetches(2, no_local, now);
        sched.complete(FetchCompletion::new(&requests[0], Ok(payload())), now);

        let mut scene = SceneState::new();
        scene.apply(sched.reset());

        assert!(scene.is_empty());
        assert!(requests[1].handle.is_cancelled());
        assert!(sched.is_empty());
        assert_eq!(sched.target_level(), None);
    }
}
