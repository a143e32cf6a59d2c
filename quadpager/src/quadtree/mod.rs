//! Quad-tree coverage engine.
//!
//! Decides which tiles should be on screen for the current view. The tree
//! is stateless: callers supply importance and visibility per node through
//! [`CoverageSource`] and get back a set of [`ImportantNode`]s.
//!
//! # Example
//!
//! ```
//! use glam::DVec2;
//! use quadpager::geometry::Mbr;
//! use quadpager::quadtree::{CoverageSource, Node, QuadTree};
//!
//! struct Everything;
//!
//! impl CoverageSource for Everything {
//!     fn importance(&self, _node: &Node, _mbr: &Mbr) -> f64 { 1.0 }
//!     fn visible(&self, _node: &Node, _mbr: &Mbr) -> bool { true }
//! }
//!
//! let tree = QuadTree::new(Mbr::new(DVec2::new(-1.0, -1.0), DVec2::new(1.0, 1.0)), 0, 2);
//! let nodes = tree.calc_coverage_importance(&Everything, &[0.5], 100, false);
//! assert_eq!(nodes.len(), 21);
//! ```

mod node;
mod tree;

pub use node::{to_node_set, ImportantNode, ImportantNodeSet, Node, NodeSet};
pub use tree::{threshold_for_level, CoverageSource, QuadTree};
