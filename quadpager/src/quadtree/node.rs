//! Quad-tree cell identities.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

/// A single quad-tree cell.
///
/// `x` and `y` count cells from the lower-left corner of the tree's bounding
/// rectangle at the given `level`. Level 0 is the whole tree.
///
/// Ordering is total on `(x, y, level)` so nodes can key ordered sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Node {
    pub x: i32,
    pub y: i32,
    pub level: i32,
}

impl Node {
    pub const fn new(x: i32, y: i32, level: i32) -> Self {
        Self { x, y, level }
    }

    /// Number of cells along each axis at `level`.
    pub fn cells_at_level(level: i32) -> i32 {
        1 << level
    }

    /// True if the coordinates are inside the tree at this level.
    pub fn is_valid(&self) -> bool {
        if !(0..=30).contains(&self.level) {
            return false;
        }
        let n = Self::cells_at_level(self.level);
        (0..n).contains(&self.x) && (0..n).contains(&self.y)
    }

    /// The node one level up that contains this one.
    pub fn parent(&self) -> Option<Node> {
        (self.level > 0).then(|| Node::new(self.x / 2, self.y / 2, self.level - 1))
    }

    /// The four nodes one level down, lower-left first.
    pub fn children(&self) -> [Node; 4] {
        let (x, y, level) = (self.x * 2, self.y * 2, self.level + 1);
        [
            Node::new(x, y, level),
            Node::new(x + 1, y, level),
            Node::new(x, y + 1, level),
            Node::new(x + 1, y + 1, level),
        ]
    }

    /// The same cell with rows counted from the top instead of the bottom.
    ///
    /// Tile sources that number rows from the north edge need this.
    pub fn flipped_y(&self) -> Node {
        Node::new(self.x, Self::cells_at_level(self.level) - 1 - self.y, self.level)
    }

    /// True if `other` is this node or lies beneath it in the tree.
    pub fn contains(&self, other: &Node) -> bool {
        if other.level < self.level {
            return false;
        }
        let shift = other.level - self.level;
        other.x >> shift == self.x && other.y >> shift == self.y
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.level, self.x, self.y)
    }
}

/// Ordered set of nodes.
pub type NodeSet = BTreeSet<Node>;

/// A node carrying its screen-space importance.
///
/// Ordered by importance (highest first) with node identity as the
/// tiebreak, so iterating an [`ImportantNodeSet`] yields load priority order.
#[derive(Debug, Clone, Copy)]
pub struct ImportantNode {
    pub node: Node,
    pub importance: f64,
}

impl ImportantNode {
    pub fn new(node: Node, importance: f64) -> Self {
        Self { node, importance }
    }
}

impl PartialEq for ImportantNode {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ImportantNode {}

impl PartialOrd for ImportantNode {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ImportantNode {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .importance
            .total_cmp(&self.importance)
            .then_with(|| self.node.cmp(&other.node))
    }
}

/// Ordered set of important nodes, most important first.
pub type ImportantNodeSet = BTreeSet<ImportantNode>;

/// Strips importance, leaving identity-ordered nodes.
pub fn to_node_set(nodes: &ImportantNodeSet) -> NodeSet {
    nodes.iter().map(|n| n.node).collect()
}
