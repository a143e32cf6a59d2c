//! Finished screen-space batches.

use glam::DVec3;

use super::state::{DrawableState, VertexAttributeValue};
use crate::ids::SimpleIdentity;

/// Per-vertex motion data for GPU-side interpolation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexMotion {
    /// Display-space velocity in units per second.
    pub dir: [f32; 3],

    /// Renderer time at which the vertex sits at its position.
    pub start_time: f32,
}

/// One vertex of a screen-space batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenVertex {
    /// Anchor position relative to the batch center.
    pub position: [f32; 3],

    /// Offset from the projected anchor in screen points.
    pub offset: [f32; 2],

    pub tex_coord: [f32; 2],
    pub color: [u8; 4],
    pub motion: Option<VertexMotion>,

    /// World-space direction the object's up axis points along.
    pub rotation: Option<[f32; 3]>,

    pub attrs: Vec<(String, VertexAttributeValue)>,
}

/// A batch of screen-space geometry sharing one render state.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSpaceDrawable {
    pub id: SimpleIdentity,
    pub state: DrawableState,

    /// Display-space origin the vertex positions are relative to.
    pub center: DVec3,

    pub vertices: Vec<ScreenVertex>,
    pub triangles: Vec<[u32; 3]>,

    /// Objects that contributed geometry, in insertion order.
    pub instances: Vec<SimpleIdentity>,
}

impl ScreenSpaceDrawable {
    pub fn new(id: SimpleIdentity, state: DrawableState, center: DVec3) -> Self {
        Self {
            id,
            state,
            center,
            vertices: Vec::new(),
            triangles: Vec::new(),
            instances: Vec::new(),
        }
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// True if `verts` more vertices and `tris` more triangles fit.
    pub fn has_room(&self, verts: usize, tris: usize, max_verts: usize, max_tris: usize) -> bool {
        self.vertices.len() + verts <= max_verts && self.triangles.len() + tris <= max_tris
    }

    /// Absolute display position of a vertex anchor.
    pub fn vertex_anchor(&self, index: usize) -> Option<DVec3> {
        self.vertices.get(index).map(|v| {
            self.center
                + DVec3::new(
                    f64::from(v.position[0]),
                    f64::from(v.position[1]),
                    f64::from(v.position[2]),
                )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vertex(position: [f32; 3]) -> ScreenVertex {
        ScreenVertex {
            position,
            offset: [0.0, 0.0],
            tex_coord: [0.0, 0.0],
            color: [255; 4],
            motion: None,
            rotation: None,
            attrs: Vec::new(),
        }
    }

    #[test]
    fn test_room_check() {
        let mut drawable = ScreenSpaceDrawable::new(1, DrawableState::default(), DVec3::ZERO);
        drawable.vertices.extend((0..3).map(|_| vertex([0.0; 3])));
        drawable.triangles.push([0, 1, 2]);

        assert!(drawable.has_room(1, 1, 4, 2));
        assert!(!drawable.has_room(2, 1, 4, 2));
        assert!(!drawable.has_room(1, 2, 4, 2));
    }

    #[test]
    fn test_vertex_anchor_adds_center() {
        let mut drawable = ScreenSpaceDrawable::new(1, DrawableState::default(), DVec3::new(10.0, 0.0, 0.0));
        drawable.vertices.push(vertex([1.0, 2.0, 0.0]));
        assert_eq!(drawable.vertex_anchor(0), Some(DVec3::new(11.0, 2.0, 0.0)));
        assert_eq!(drawable.vertex_anchor(1), None);
    }
}
