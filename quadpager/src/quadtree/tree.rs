//! Coverage calculation over a stateless quad tree.
//!
//! The tree itself keeps no per-node state. Each call walks from the root
//! level down, asking a [`CoverageSource`] how important and how visible each
//! node is, and returns the set of nodes that should be displayed.
//!
//! # Coverage Modes
//!
//! - [`QuadTree::calc_coverage_importance`]: full pyramid. Nodes are added
//!   best-first by importance until `max_nodes` would be exceeded. Parents
//!   stay in the set alongside their children so levels can be blended.
//! - [`QuadTree::calc_coverage_visible`]: single target level. Finds the
//!   deepest level worth loading, then backs off one level at a time until
//!   the visible node count fits.
//!
//! # Expansion Rules
//!
//! A node qualifies when its importance is positive and at least the
//! threshold for its level. Only qualifying nodes are expanded. With
//! `require_siblings`, all four children of a parent enter the set together
//! or not at all; an expansion that would push the set past `max_nodes` is
//! rejected whole and the parent stays as the finest node for that area.

use std::cmp::Ordering;
use std::collections::{BTreeSet, BinaryHeap};

use tracing::{debug, trace};

use super::node::{ImportantNode, ImportantNodeSet, Node};
use crate::geometry::Mbr;

/// Per-node importance and visibility hooks.
///
/// Implemented once per projection or view model so the same coverage
/// algorithms serve globes, flat maps and arbitrary coordinate systems.
pub trait CoverageSource {
    /// Screen-space weight of the node. Zero or non-finite means "not worth
    /// displaying" and prunes the node.
    fn importance(&self, node: &Node, mbr: &Mbr) -> f64;

    /// True if any part of the node can currently be seen.
    fn visible(&self, node: &Node, mbr: &Mbr) -> bool;
}

/// Returns the importance threshold for a level.
///
/// Levels beyond the end of the vector reuse its last entry. An empty
/// vector means no threshold.
pub fn threshold_for_level(min_importance: &[f64], level: i32) -> f64 {
    if min_importance.is_empty() || level < 0 {
        return 0.0;
    }
    let idx = (level as usize).min(min_importance.len() - 1);
    min_importance[idx]
}

/// A group of nodes that must enter the coverage set together.
struct Expansion {
    priority: f64,
    sequence: u64,
    nodes: Vec<ImportantNode>,
}

impl PartialEq for Expansion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Expansion {}

impl PartialOrd for Expansion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Expansion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: most important first, then older expansions first
        self.priority
            .total_cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

/// Spatial quad tree over a bounding rectangle.
#[derive(Debug, Clone)]
pub struct QuadTree {
    mbr: Mbr,
    min_level: i32,
    max_level: i32,
}

impl QuadTree {
    /// Creates a tree covering `mbr` between the given levels.
    ///
    /// Negative levels are clamped to 0 and `max_level` is raised to
    /// `min_level` if it is lower.
    pub fn new(mbr: Mbr, min_level: i32, max_level: i32) -> Self {
        let min_level = min_level.clamp(0, 30);
        let max_level = max_level.clamp(min_level, 30);
        Self {
            mbr,
            min_level,
            max_level,
        }
    }

    pub fn mbr(&self) -> &Mbr {
        &self.mbr
    }

    pub fn min_level(&self) -> i32 {
        self.min_level
    }

    pub fn max_level(&self) -> i32 {
        self.max_level
    }

    /// Bounding rectangle of a node within the tree's rectangle.
    pub fn generate_mbr_for_node(&self, node: &Node) -> Mbr {
        let cells = Node::cells_at_level(node.level) as f64;
        let chunk_x = self.mbr.width() / cells;
        let chunk_y = self.mbr.height() / cells;
        let ll = self.mbr.ll + glam::DVec2::new(chunk_x * node.x as f64, chunk_y * node.y as f64);
        Mbr::new(ll, ll + glam::DVec2::new(chunk_x, chunk_y))
    }

    /// Nodes at the tree's minimum level that might be seen.
    ///
    /// Descends from the root and skips subtrees the source reports as
    /// invisible, so a deep minimum level costs only the visible part of the
    /// tree rather than every cell at that level.
    fn start_nodes<S>(&self, source: &S) -> Vec<Node>
    where
        S: CoverageSource + ?Sized,
    {
        let mut starts = Vec::new();
        let mut stack = vec![Node::new(0, 0, 0)];
        while let Some(node) = stack.pop() {
            if node.level >= self.min_level {
                starts.push(node);
                continue;
            }
            let mbr = self.generate_mbr_for_node(&node);
            if mbr.is_valid() && source.visible(&node, &mbr) {
                stack.extend(node.children());
            }
        }
        starts.sort();
        starts
    }

    fn eval_importance<S>(&self, source: &S, node: &Node) -> f64
    where
        S: CoverageSource + ?Sized,
    {
        let mbr = self.generate_mbr_for_node(node);
        if !mbr.is_valid() {
            return 0.0;
        }
        let importance = source.importance(node, &mbr);
        if importance.is_finite() && importance > 0.0 {
            importance
        } else {
            0.0
        }
    }

    fn qualifies(node: &ImportantNode, min_importance: &[f64]) -> bool {
        node.importance > 0.0
            && node.importance >= threshold_for_level(min_importance, node.node.level)
    }

    // =========================================================================
    // Importance coverage
    // =========================================================================

    /// Calculates the pyramid of nodes to load, most important first.
    ///
    /// # Arguments
    ///
    /// * `source` - Importance/visibility hooks
    /// * `min_importance` - Per-level minimum importance
    /// * `max_nodes` - Hard cap on the number of nodes returned
    /// * `require_siblings` - Load all four children of a parent or none
    pub fn calc_coverage_importance<S>(
        &self,
        source: &S,
        min_importance: &[f64],
        max_nodes: usize,
        require_siblings: bool,
    ) -> ImportantNodeSet
    where
        S: CoverageSource + ?Sized,
    {
        let mut result = ImportantNodeSet::new();
        if !self.mbr.is_valid() || max_nodes == 0 {
            return result;
        }

        let mut heap = BinaryHeap::new();
        let mut sequence = 0u64;
        let mut push = |heap: &mut BinaryHeap<Expansion>, nodes: Vec<ImportantNode>| {
            let priority = nodes.iter().map(|n| n.importance).fold(0.0, f64::max);
            heap.push(Expansion {
                priority,
                sequence,
                nodes,
            });
            sequence += 1;
        };

        for node in self.start_nodes(source) {
            let root = ImportantNode::new(node, self.eval_importance(source, &node));
            if Self::qualifies(&root, min_importance) {
                push(&mut heap, vec![root]);
            }
        }

        let mut rejected = 0usize;
        while let Some(expansion) = heap.pop() {
            if result.len() + expansion.nodes.len() > max_nodes {
                rejected += 1;
                continue;
            }
            result.extend(expansion.nodes.iter().copied());

            for parent in &expansion.nodes {
                if parent.node.level >= self.max_level || !Self::qualifies(parent, min_importance) {
                    continue;
                }
                let children: Vec<ImportantNode> = parent
                    .node
                    .children()
                    .iter()
                    .map(|c| ImportantNode::new(*c, self.eval_importance(source, c)))
                    .collect();

                if require_siblings {
                    if children.iter().any(|c| Self::qualifies(c, min_importance)) {
                        push(&mut heap, children);
                    }
                } else {
                    for child in children {
                        if Self::qualifies(&child, min_importance) {
                            push(&mut heap, vec![child]);
                        }
                    }
                }
            }
        }

        trace!(
            nodes = result.len(),
            max_nodes,
            rejected,
            require_siblings,
            "Importance coverage calculated"
        );
        result
    }

    // =========================================================================
    // Visible coverage
    // =========================================================================

    /// Calculates a single-level coverage.
    ///
    /// Finds the deepest level with a qualifying visible node, then tries to
    /// load every visible node at that level (plus the levels named by the
    /// relative `level_loads` offsets). If that is more than `max_nodes` it
    /// backs off one level and tries again.
    ///
    /// # Returns
    ///
    /// The chosen target level and the nodes to load.
    pub fn calc_coverage_visible<S>(
        &self,
        source: &S,
        min_importance: &[f64],
        max_nodes: usize,
        level_loads: &[i32],
    ) -> (i32, ImportantNodeSet)
    where
        S: CoverageSource + ?Sized,
    {
        if !self.mbr.is_valid() || max_nodes == 0 {
            return (self.min_level, ImportantNodeSet::new());
        }

        let Some(candidate) = self.deepest_important_level(source, min_importance) else {
            return (self.min_level, ImportantNodeSet::new());
        };

        let starts = self.start_nodes(source);
        let mut target = candidate;
        loop {
            let levels = self.levels_to_load(target, level_loads);
            let mut visible = ImportantNodeSet::new();
            let fits = starts
                .iter()
                .all(|&root| self.eval_node_visible(source, root, max_nodes, &levels, target, &mut visible));

            if fits {
                trace!(
                    target_level = target,
                    candidate_level = candidate,
                    nodes = visible.len(),
                    "Visible coverage calculated"
                );
                return (target, visible);
            }

            if target <= self.min_level {
                // Nothing fits. Keep the most important nodes at the coarsest level.
                let mut all = ImportantNodeSet::new();
                for &root in &starts {
                    self.eval_node_visible(source, root, usize::MAX, &levels, target, &mut all);
                }
                debug!(
                    visible = all.len(),
                    max_nodes, "Visible coverage overflows at minimum level, truncating"
                );
                return (target, all.into_iter().take(max_nodes).collect());
            }

            debug!(
                target_level = target,
                max_nodes, "Visible coverage overflow, backing off one level"
            );
            target -= 1;
        }
    }

    /// Deepest level reached by descending through qualifying visible nodes.
    fn deepest_important_level<S>(&self, source: &S, min_importance: &[f64]) -> Option<i32>
    where
        S: CoverageSource + ?Sized,
    {
        let mut deepest = None;
        let mut stack = self.start_nodes(source);
        while let Some(node) = stack.pop() {
            let mbr = self.generate_mbr_for_node(&node);
            if !mbr.is_valid() || !source.visible(&node, &mbr) {
                continue;
            }
            let important = ImportantNode::new(node, self.eval_importance(source, &node));
            if !Self::qualifies(&important, min_importance) {
                continue;
            }
            deepest = Some(deepest.map_or(node.level, |d: i32| d.max(node.level)));
            if node.level < self.max_level {
                stack.extend(node.children());
            }
        }
        deepest
    }

    fn levels_to_load(&self, target: i32, level_loads: &[i32]) -> BTreeSet<i32> {
        let mut levels: BTreeSet<i32> = level_loads
            .iter()
            .map(|offset| (target + offset).clamp(self.min_level, target))
            .collect();
        levels.insert(target);
        levels
    }

    /// Collects visible nodes at the requested levels.
    ///
    /// Returns false as soon as the set grows past `max_nodes`.
    fn eval_node_visible<S>(
        &self,
        source: &S,
        node: Node,
        max_nodes: usize,
        levels: &BTreeSet<i32>,
        target: i32,
        out: &mut ImportantNodeSet,
    ) -> bool
    where
        S: CoverageSource + ?Sized,
    {
        let mbr = self.generate_mbr_for_node(&node);
        if !mbr.is_valid() || !source.visible(&node, &mbr) {
            return true;
        }

        if levels.contains(&node.level) {
            out.insert(ImportantNode::new(node, self.eval_importance(source, &node)));
            if out.len() > max_nodes {
                return false;
            }
        }

        if node.level < target {
            for child in node.children() {
                if !self.eval_node_visible(source, child, max_nodes, levels, target, out) {
                    return false;
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadtree::node::to_node_set;
    use glam::DVec2;
    use std::cell::Cell;

    /// Every node is visible and equally important.
    struct UniformSource(f64);

    impl CoverageSource for UniformSource {
        fn importance(&self, _node: &Node, _mbr: &Mbr) -> f64 {
            self.0
        }

        fn visible(&self, _node: &Node, _mbr: &Mbr) -> bool {
            true
        }
    }

    /// Importance is the area of the node inside a view window.
    struct WindowSource {
        window: Mbr,
    }

    impl CoverageSource for WindowSource {
        fn importance(&self, _node: &Node, mbr: &Mbr) -> f64 {
            let ll = mbr.ll.max(self.window.ll);
            let ur = mbr.ur.min(self.window.ur);
            Mbr::new(ll, ur).area()
        }

        fn visible(&self, _node: &Node, mbr: &Mbr) -> bool {
            mbr.overlaps(&self.window)
        }
    }

    fn whole_map(min_level: i32, max_level: i32) -> QuadTree {
        QuadTree::new(
            Mbr::new(DVec2::new(-1.0, -1.0), DVec2::new(1.0, 1.0)),
            min_level,
            max_level,
        )
    }

    #[test]
    fn test_generate_mbr_for_node() {
        let tree = whole_map(0, 4);
        let mbr = tree.generate_mbr_for_node(&Node::new(1, 0, 1));
        assert_eq!(mbr.ll, DVec2::new(0.0, -1.0));
        assert_eq!(mbr.ur, DVec2::new(1.0, 0.0));
    }

    #[test]
    fn test_threshold_for_level_reuses_last_entry() {
        assert_eq!(threshold_for_level(&[], 3), 0.0);
        assert_eq!(threshold_for_level(&[1.0, 2.0], 0), 1.0);
        assert_eq!(threshold_for_level(&[1.0, 2.0], 7), 2.0);
    }

    #[test]
    fn test_full_pyramid_when_under_cap() {
        let tree = whole_map(0, 2);
        let nodes = tree.calc_coverage_importance(&UniformSource(10.0), &[1.0], 100, false);
        assert_eq!(nodes.len(), 21);
        for level in 0..=2 {
            let count = nodes.iter().filter(|n| n.node.level == level).count();
            assert_eq!(count, 1 << (2 * level));
        }
    }

    #[test]
    fn test_require_siblings_with_cap_of_five() {
        let tree = whole_map(0, 2);
        let nodes = tree.calc_coverage_importance(&UniformSource(10.0), &[1.0], 5, true);
        // Root plus its four children; any level-2 group would exceed the cap.
        assert_eq!(nodes.len(), 5);
        assert_eq!(nodes.iter().filter(|n| n.node.level == 1).count(), 4);
    }

    #[test]
    fn test_require_siblings_rejects_partial_expansion() {
        let tree = whole_map(0, 2);
        let nodes = tree.calc_coverage_importance(&UniformSource(10.0), &[1.0], 4, true);
        assert_eq!(to_node_set(&nodes).into_iter().collect::<Vec<_>>(), vec![Node::new(0, 0, 0)]);
    }

    #[test]
    fn test_without_siblings_fills_cap_exactly() {
        let tree = whole_map(0, 2);
        let nodes = tree.calc_coverage_importance(&UniformSource(10.0), &[1.0], 4, false);
        assert_eq!(nodes.len(), 4);
    }

    #[test]
    fn test_zero_max_nodes_is_empty() {
        let tree = whole_map(0, 2);
        assert!(tree
            .calc_coverage_importance(&UniformSource(10.0), &[1.0], 0, false)
            .is_empty());
        let (level, nodes) = tree.calc_coverage_visible(&UniformSource(10.0), &[1.0], 0, &[]);
        assert_eq!(level, 0);
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_degenerate_region_is_empty() {
        let tree = QuadTree::new(Mbr::new(DVec2::ZERO, DVec2::new(0.0, 1.0)), 0, 3);
        assert!(tree
            .calc_coverage_importance(&UniformSource(10.0), &[], 100, false)
            .is_empty());
        assert!(tree
            .calc_coverage_visible(&UniformSource(10.0), &[], 100, &[])
            .1
            .is_empty());
    }

    #[test]
    fn test_below_threshold_root_prunes_everything() {
        let tree = whole_map(0, 3);
        let nodes = tree.calc_coverage_importance(&UniformSource(0.5), &[1.0], 100, false);
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_nan_importance_is_pruned() {
        let tree = whole_map(0, 3);
        let nodes = tree.calc_coverage_importance(&UniformSource(f64::NAN), &[], 100, false);
        assert!(nodes.is_empty());
    }

    #[test]
    fn test_window_source_refines_inside_window_only() {
        let tree = whole_map(0, 6);
        let source = WindowSource {
            window: Mbr::new(DVec2::new(0.1, 0.1), DVec2::new(0.3, 0.3)),
        };
        let nodes = tree.calc_coverage_importance(&source, &[0.0], 1000, false);
        assert!(!nodes.is_empty());
        for n in &nodes {
            let mbr = tree.generate_mbr_for_node(&n.node);
            assert!(mbr.overlaps(&source.window), "{} is outside the window", n.node);
        }
    }

    /// Window source that counts how often each hook runs.
    struct CountingSource {
        inner: WindowSource,
        importance_calls: Cell<usize>,
        visible_calls: Cell<usize>,
    }

    impl CountingSource {
        fn new(window: Mbr) -> Self {
            Self {
                inner: WindowSource { window },
                importance_calls: Cell::new(0),
                visible_calls: Cell::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.importance_calls.get() + self.visible_calls.get()
        }
    }

    impl CoverageSource for CountingSource {
        fn importance(&self, node: &Node, mbr: &Mbr) -> f64 {
            self.importance_calls.set(self.importance_calls.get() + 1);
            self.inner.importance(node, mbr)
        }

        fn visible(&self, node: &Node, mbr: &Mbr) -> bool {
            self.visible_calls.set(self.visible_calls.get() + 1);
            self.inner.visible(node, mbr)
        }
    }

    #[test]
    fn test_deep_min_level_only_visits_visible_subtree() {
        let tree = whole_map(10, 10);
        let source = CountingSource::new(Mbr::new(DVec2::new(0.1, 0.1), DVec2::new(0.101, 0.101)));

        let nodes = tree.calc_coverage_importance(&source, &[0.0], 64, false);
        assert!(!nodes.is_empty());
        assert!(nodes.iter().all(|n| n.node.level == 10));
        // 4^10 cells exist at this level; only the window's neighbourhood is touched
        assert!(source.calls() < 500, "{} hook calls", source.calls());
    }

    #[test]
    fn test_deep_min_level_visible_mode_stays_local() {
        let tree = whole_map(10, 12);
        let source = CountingSource::new(Mbr::new(DVec2::new(0.1, 0.1), DVec2::new(0.101, 0.101)));

        let (level, nodes) = tree.calc_coverage_visible(&source, &[0.0], 64, &[]);
        assert!(level >= 10);
        assert!(!nodes.is_empty());
        assert!(source.calls() < 2000, "{} hook calls", source.calls());
    }

    #[test]
    fn test_min_level_above_zero_matches_full_grid() {
        let tree = whole_map(2, 2);
        let nodes = tree.calc_coverage_importance(&UniformSource(10.0), &[1.0], 100, false);
        assert_eq!(nodes.len(), 16);
        assert!(nodes.iter().all(|n| n.node.level == 2));
    }

    #[test]
    fn test_visible_coverage_targets_deepest_fitting_level() {
        let tree = whole_map(0, 4);
        let (level, nodes) = tree.calc_coverage_visible(&UniformSource(10.0), &[1.0], 16, &[]);
        assert_eq!(level, 2);
        assert_eq!(nodes.len(), 16);
        assert!(nodes.iter().all(|n| n.node.level == 2));
    }

    #[test]
    fn test_visible_coverage_includes_offset_levels() {
        let tree = whole_map(0, 4);
        let (level, nodes) = tree.calc_coverage_visible(&UniformSource(10.0), &[1.0], 100, &[-2, 0]);
        // Level 3 (64 nodes) plus level 1 (4 nodes) fits, level 4 does not.
        assert_eq!(level, 3);
        assert_eq!(nodes.len(), 68);
    }

    #[test]
    fn test_visible_coverage_truncates_at_min_level() {
        let tree = whole_map(2, 4);
        let (level, nodes) = tree.calc_coverage_visible(&UniformSource(10.0), &[1.0], 3, &[]);
        assert_eq!(level, 2);
        assert_eq!(nodes.len(), 3);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        /// Deterministic pseudo-random importance per node.
        struct HashedSource {
            seed: u64,
        }

        impl HashedSource {
            fn hash(&self, node: &Node) -> u64 {
                let mut h = self.seed ^ 0x9E37_79B9_7F4A_7C15;
                for v in [node.x as u64, node.y as u64, node.level as u64] {
                    h ^= v.wrapping_add(0x9E37_79B9_7F4A_7C15).wrapping_add(h << 6).wrapping_add(h >> 2);
                    h = h.wrapping_mul(0xBF58_476D_1CE4_E5B9);
                }
                h
            }
        }

        impl CoverageSource for HashedSource {
            fn importance(&self, node: &Node, _mbr: &Mbr) -> f64 {
                (self.hash(node) % 1000) as f64 / 10.0
            }

            fn visible(&self, node: &Node, _mbr: &Mbr) -> bool {
                self.hash(node) % 7 != 0
            }
        }

        proptest! {
            #[test]
            fn test_coverage_never_exceeds_max_nodes(
                seed in any::<u64>(),
                max_nodes in 0usize..200,
                max_level in 0i32..6,
                siblings in any::<bool>()
            ) {
                let tree = whole_map(0, max_level);
                let source = HashedSource { seed };
                let nodes = tree.calc_coverage_importance(&source, &[5.0], max_nodes, siblings);
                prop_assert!(nodes.len() <= max_nodes);
            }

            #[test]
            fn test_siblings_are_all_or_nothing(
                seed in any::<u64>(),
                max_nodes in 1usize..200,
                max_level in 1i32..6
            ) {
                let tree = whole_map(0, max_level);
                let source = HashedSource { seed };
                let nodes = to_node_set(&tree.calc_coverage_importance(&source, &[5.0], max_nodes, true));
                for node in &nodes {
                    if let Some(parent) = node.parent() {
                        prop_assert!(nodes.contains(&parent), "{} present without parent", node);
                        let present = parent.children().iter().filter(|c| nodes.contains(c)).count();
                        prop_assert_eq!(present, 4, "parent {} has {} children", parent, present);
                    }
                }
            }

            #[test]
            fn test_visible_target_level_is_monotonic(
                seed in any::<u64>(),
                a in 1usize..150,
                b in 1usize..150,
                max_level in 0i32..6
            ) {
                let (small, large) = if a <= b { (a, b) } else { (b, a) };
                let tree = whole_map(0, max_level);
                let source = HashedSource { seed };
                let (level_small, nodes_small) = tree.calc_coverage_visible(&source, &[5.0], small, &[]);
                let (level_large, nodes_large) = tree.calc_coverage_visible(&source, &[5.0], large, &[]);
                prop_assert!(level_small <= level_large);
                prop_assert!(nodes_small.len() <= small);
                prop_assert!(nodes_large.len() <= large);
            }
        }
    }
}
