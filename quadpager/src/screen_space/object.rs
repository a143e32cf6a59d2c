//! World-anchored screen-space objects.

use glam::{DVec2, DVec3};

use super::state::{DrawableState, TimeWindow, VertexAttribute};
use crate::ids::{next_identity, SimpleIdentity};
use crate::view::VisibilityRange;

/// Opaque white.
pub const WHITE: [u8; 4] = [255, 255, 255, 255];

/// One convex piece of a screen-space object.
///
/// Coordinates are offsets from the anchor in screen points with Y up,
/// wound counter-clockwise.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexGeometry {
    /// Textures for this piece. Empty inherits the object's.
    pub tex_ids: Vec<SimpleIdentity>,

    /// Shader override. `None` inherits the object's.
    pub prog_id: Option<SimpleIdentity>,

    pub color: [u8; 4],

    /// Draw priority override. `None` inherits the object's.
    pub draw_priority: Option<i32>,

    pub vertex_attrs: Vec<VertexAttribute>,
    pub coords: Vec<DVec2>,
    pub tex_coords: Vec<DVec2>,
}

impl ConvexGeometry {
    pub fn new(coords: Vec<DVec2>, tex_coords: Vec<DVec2>, color: [u8; 4]) -> Self {
        Self {
            tex_ids: Vec::new(),
            prog_id: None,
            color,
            draw_priority: None,
            vertex_attrs: Vec::new(),
            coords,
            tex_coords,
        }
    }

    /// Axis-aligned rectangle with the full texture mapped onto it.
    pub fn rectangle(ll: DVec2, ur: DVec2, color: [u8; 4]) -> Self {
        Self::new(
            vec![ll, DVec2::new(ur.x, ll.y), ur, DVec2::new(ll.x, ur.y)],
            vec![
                DVec2::new(0.0, 0.0),
                DVec2::new(1.0, 0.0),
                DVec2::new(1.0, 1.0),
                DVec2::new(0.0, 1.0),
            ],
            color,
        )
    }

    pub fn with_tex_ids(mut self, tex_ids: Vec<SimpleIdentity>) -> Self {
        self.tex_ids = tex_ids;
        self
    }

    pub fn with_program(mut self, prog_id: SimpleIdentity) -> Self {
        self.prog_id = Some(prog_id);
        self
    }

    pub fn with_draw_priority(mut self, priority: i32) -> Self {
        self.draw_priority = Some(priority);
        self
    }

    pub fn with_attribute(mut self, attr: VertexAttribute) -> Self {
        self.vertex_attrs.push(attr);
        self
    }

    /// Triangles in a fan around the first vertex.
    pub fn triangle_count(&self) -> usize {
        self.coords.len().saturating_sub(2)
    }
}

/// Linear movement between two world locations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub end_loc: DVec3,
    pub start_time: f64,
    pub end_time: f64,
}

/// A label, marker or billboard anchored at a world location.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSpaceObject {
    pub id: SimpleIdentity,

    /// Anchor in display space.
    pub world_loc: DVec3,

    pub motion: Option<Motion>,

    /// Screen-space offset of every piece, in points.
    pub offset: DVec2,

    /// Rotation in radians counter-clockwise from north. Only used when
    /// `state.rotation` is set.
    pub rotation: f64,

    /// Object-wide render state. Geometry pieces may override parts of it.
    pub state: DrawableState,

    pub geometry: Vec<ConvexGeometry>,
}

impl ScreenSpaceObject {
    /// Creates an object with a fresh identity.
    pub fn new(world_loc: DVec3) -> Self {
        Self::with_id(next_identity(), world_loc)
    }

    pub fn with_id(id: SimpleIdentity, world_loc: DVec3) -> Self {
        Self {
            id,
            world_loc,
            motion: None,
            offset: DVec2::ZERO,
            rotation: 0.0,
            state: DrawableState::default(),
            geometry: Vec::new(),
        }
    }

    /// Moves from the anchor to `end_loc` between the two times.
    pub fn with_motion(mut self, end_loc: DVec3, start_time: f64, end_time: f64) -> Self {
        self.motion = Some(Motion {
            end_loc,
            start_time,
            end_time,
        });
        self.state.motion = end_time > start_time;
        self
    }

    pub fn with_offset(mut self, offset: DVec2) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_rotation(mut self, rotation: f64, keep_upright: bool) -> Self {
        self.rotation = rotation;
        self.state.rotation = true;
        self.state.keep_upright = keep_upright;
        self
    }

    pub fn with_enable(mut self, enable: bool) -> Self {
        self.state.enable = enable;
        self
    }

    pub fn with_enable_window(mut self, start: f64, end: f64) -> Self {
        self.state.enable_window = Some(TimeWindow::new(start, end));
        self
    }

    pub fn with_visibility(mut self, min_vis: f64, max_vis: f64) -> Self {
        self.state.visibility = Some(VisibilityRange::new(min_vis, max_vis));
        self
    }

    pub fn with_draw_priority(mut self, priority: i32) -> Self {
        self.state.draw_priority = priority;
        self
    }

    pub fn with_fade(mut self, fade_up: f64, fade_down: f64) -> Self {
        self.state.fade_up = fade_up;
        self.state.fade_down = fade_down;
        self
    }

    pub fn with_period(mut self, period: f64) -> Self {
        self.state.period = period;
        self
    }

    pub fn with_program(mut self, prog_id: SimpleIdentity) -> Self {
        self.state.prog_id = prog_id;
        self
    }

    pub fn with_tex_ids(mut self, tex_ids: Vec<SimpleIdentity>) -> Self {
        self.state.tex_ids = tex_ids;
        self
    }

    pub fn add_geometry(&mut self, geometry: ConvexGeometry) {
        self.geometry.push(geometry);
    }

    pub fn with_geometry(mut self, geometry: ConvexGeometry) -> Self {
        self.geometry.push(geometry);
        self
    }

    /// Program of the first piece that sets one, else the object's.
    pub fn typical_program(&self) -> SimpleIdentity {
        self.geometry
            .iter()
            .find_map(|g| g.prog_id)
            .unwrap_or(self.state.prog_id)
    }

    /// True if the object has a usable motion window.
    pub fn is_moving(&self) -> bool {
        self.motion.map_or(false, |m| m.end_time > m.start_time)
    }

    /// Display-space velocity while moving.
    pub fn velocity(&self) -> Option<DVec3> {
        let motion = self.motion?;
        let duration = motion.end_time - motion.start_time;
        if duration > 0.0 {
            Some((motion.end_loc - self.world_loc) / duration)
        } else {
            None
        }
    }

    /// Anchor position at `time`, clamped to the motion window.
    pub fn position_at(&self, time: f64) -> DVec3 {
        match self.motion {
            Some(m) if m.end_time > m.start_time => {
                let t = ((time - m.start_time) / (m.end_time - m.start_time)).clamp(0.0, 1.0);
                self.world_loc.lerp(m.end_loc, t)
            }
            _ => self.world_loc,
        }
    }

    /// True if enabled and inside its enable window at `time`.
    pub fn is_enabled_at(&self, time: f64) -> bool {
        self.state.enable && self.state.enable_window.map_or(true, |w| w.contains(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rectangle_geometry() {
        let geom = ConvexGeometry::rectangle(DVec2::new(-1.0, -1.0), DVec2::new(1.0, 1.0), WHITE);
        assert_eq!(geom.coords.len(), 4);
        assert_eq!(geom.tex_coords[2], DVec2::ONE);
        assert_eq!(geom.triangle_count(), 2);
    }

    #[test]
    fn test_objects_get_unique_ids() {
        let a = ScreenSpaceObject::new(DVec3::X);
        let b = ScreenSpaceObject::new(DVec3::X);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_position_interpolates() {
        let obj = ScreenSpaceObject::new(DVec3::ZERO).with_motion(DVec3::new(2.0, 0.0, 0.0), 10.0, 12.0);
        assert!(obj.is_moving());
        assert!(obj.state.motion);
        assert_eq!(obj.position_at(11.0), DVec3::new(1.0, 0.0, 0.0));
        assert_eq!(obj.position_at(0.0), DVec3::ZERO);
        assert_eq!(obj.position_at(100.0), DVec3::new(2.0, 0.0, 0.0));
        assert_eq!(obj.velocity(), Some(DVec3::new(1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_zero_length_motion_is_static() {
        let obj = ScreenSpaceObject::new(DVec3::ZERO).with_motion(DVec3::X, 5.0, 5.0);
        assert!(!obj.is_moving());
        assert!(!obj.state.motion);
        assert_eq!(obj.velocity(), None);
        assert_eq!(obj.position_at(5.0), DVec3::ZERO);
    }

    #[test]
    fn test_enable_window() {
        let obj = ScreenSpaceObject::new(DVec3::ZERO).with_enable_window(1.0, 2.0);
        assert!(obj.is_enabled_at(1.5));
        assert!(!obj.is_enabled_at(3.0));
        assert!(!obj.with_enable(false).is_enabled_at(1.5));
    }

    #[test]
    fn test_rotation_sets_state_flags() {
        let obj = ScreenSpaceObject::new(DVec3::ZERO).with_rotation(0.5, true);
        assert!(obj.state.rotation);
        assert!(obj.state.keep_upright);
        assert_ne!(obj.state, DrawableState::default());
    }

    #[test]
    fn test_typical_program() {
        let obj = ScreenSpaceObject::new(DVec3::ZERO)
            .with_program(4)
            .with_geometry(ConvexGeometry::rectangle(DVec2::ZERO, DVec2::ONE, WHITE))
            .with_geometry(ConvexGeometry::rectangle(DVec2::ZERO, DVec2::ONE, WHITE).with_program(9));
        assert_eq!(obj.typical_program(), 9);
    }
}
