//! Batched scene-graph changes.
//!
//! The scheduler and the screen-space builder never touch renderer state
//! directly. They emit a [`ChangeSet`], which the render side applies in one
//! go so a frame never shows a half-updated level.

use std::collections::BTreeMap;

use crate::geometry::Mbr;
use crate::ids::SimpleIdentity;
use crate::quadtree::Node;
use crate::scheduler::TilePayload;
use crate::screen_space::ScreenSpaceDrawable;

/// Renderer-facing record for a loaded tile.
///
/// The payload stays opaque; turning it into textures and meshes belongs to
/// the render side.
#[derive(Debug, Clone, PartialEq)]
pub struct TileDrawable {
    pub id: SimpleIdentity,
    pub node: Node,
    pub bounds: Mbr,
    pub importance: f64,
    /// Texels of overlap the source draws around each tile edge.
    pub border_texels: u32,
    pub payload: TilePayload,
}

/// A single scene-graph mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneChange {
    AddTile(TileDrawable),
    AddScreenSpace(ScreenSpaceDrawable),
    Remove(SimpleIdentity),
    Enable { id: SimpleIdentity, enable: bool },
}

impl SceneChange {
    /// Identity of the drawable this change touches.
    pub fn drawable_id(&self) -> SimpleIdentity {
        match self {
            SceneChange::AddTile(tile) => tile.id,
            SceneChange::AddScreenSpace(drawable) => drawable.id,
            SceneChange::Remove(id) => *id,
            SceneChange::Enable { id, .. } => *id,
        }
    }
}

/// An ordered batch of changes applied atomically.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    changes: Vec<SceneChange>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, change: SceneChange) {
        self.changes.push(change);
    }

    /// Moves every change from `other` onto the end of this set.
    pub fn append(&mut self, other: &mut ChangeSet) {
        self.changes.append(&mut other.changes);
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SceneChange> {
        self.changes.iter()
    }

    /// Takes the accumulated changes, leaving this set empty.
    pub fn take(&mut self) -> ChangeSet {
        std::mem::take(self)
    }
}

impl IntoIterator for ChangeSet {
    type Item = SceneChange;
    type IntoIter = std::vec::IntoIter<SceneChange>;

    fn into_iter(self) -> Self::IntoIter {
        self.changes.into_iter()
    }
}

impl Extend<SceneChange> for ChangeSet {
    fn extend<T: IntoIterator<Item = SceneChange>>(&mut self, iter: T) {
        self.changes.extend(iter);
    }
}

// =============================================================================
// Scene model
// =============================================================================

/// A drawable as the render side sees it after applying changes.
#[derive(Debug, Clone, PartialEq)]
pub enum SceneEntry {
    Tile(TileDrawable),
    ScreenSpace(ScreenSpaceDrawable),
}

/// Minimal render-side model that applies change sets.
///
/// Stands in for the real scene graph in tools and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneState {
    entries: BTreeMap<SimpleIdentity, (SceneEntry, bool)>,
}

impl SceneState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies every change in order.
    pub fn apply(&mut self, changes: ChangeSet) {
        for change in changes {
            match change {
                SceneChange::AddTile(tile) => {
                    self.entries.insert(tile.id, (SceneEntry::Tile(tile), true));
                }
                SceneChange::AddScreenSpace(drawable) => {
                    let enable = drawable.state.enable;
                    self.entries
                        .insert(drawable.id, (SceneEntry::ScreenSpace(drawable), enable));
                }
                SceneChange::Remove(id) => {
                    self.entries.remove(&id);
                }
                SceneChange::Enable { id, enable } => {
                    if let Some(entry) = self.entries.get_mut(&id) {
                        entry.1 = enable;
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: SimpleIdentity) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn is_enabled(&self, id: SimpleIdentity) -> Option<bool> {
        self.entries.get(&id).map(|(_, enable)| *enable)
    }

    /// Nodes of every tile currently in the scene.
    pub fn tile_nodes(&self) -> Vec<Node> {
        self.entries
            .values()
            .filter_map(|(entry, _)| match entry {
                SceneEntry::Tile(tile) => Some(tile.node),
                SceneEntry::ScreenSpace(_) => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use glam::DVec2;

    fn tile(id: SimpleIdentity, node: Node) -> TileDrawable {
        TileDrawable {
            id,
            node,
            bounds: Mbr::new(DVec2::ZERO, DVec2::ONE),
            importance: 1.0,
            border_texels: 0,
            payload: TilePayload::new(Bytes::from_static(b"tile")),
        }
    }

    #[test]
    fn test_change_set_append_and_take() {
        let mut a = ChangeSet::new();
        a.push(SceneChange::Remove(1));
        let mut b = ChangeSet::new();
        b.push(SceneChange::Remove(2));
        a.append(&mut b);

        assert_eq!(a.len(), 2);
        assert!(b.is_empty());

        let taken = a.take();
        assert_eq!(taken.len(), 2);
        assert!(a.is_empty());
    }

    #[test]
    fn test_scene_state_applies_in_order() {
        let mut scene = SceneState::new();
        let mut changes = ChangeSet::new();
        changes.push(SceneChange::AddTile(tile(10, Node::new(0, 0, 0))));
        changes.push(SceneChange::AddTile(tile(11, Node::new(1, 0, 1))));
        changes.push(SceneChange::Enable { id: 11, enable: false });
        changes.push(SceneChange::Remove(10));
        scene.apply(changes);

        assert_eq!(scene.len(), 1);
        assert!(!scene.contains(10));
        assert_eq!(scene.is_enabled(11), Some(false));
        assert_eq!(scene.tile_nodes(), vec![Node::new(1, 0, 1)]);
    }

    #[test]
    fn test_drawable_id() {
        assert_eq!(SceneChange::Remove(5).drawable_id(), 5);
        assert_eq!(SceneChange::AddTile(tile(7, Node::new(0, 0, 0))).drawable_id(), 7);
    }
}
