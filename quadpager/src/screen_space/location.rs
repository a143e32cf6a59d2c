//! Where a screen-space object lands on screen.
//!
//! Layout and declutter run outside the engine. They receive one
//! [`ScreenSpaceObjectLocation`] per object (or per cluster) describing its
//! anchor, footprint and on-screen rotation for the current view.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::{DVec2, DVec3};

use super::builder::calc_rotation_vec;
use super::object::ScreenSpaceObject;
use crate::coord::CoordSystem;
use crate::geometry::Mbr;
use crate::ids::SimpleIdentity;
use crate::view::ViewState;

/// Normalizes an angle to `[0, 2π)`.
fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    if a >= TAU {
        0.0
    } else {
        a
    }
}

/// Flips a screen rotation by half a turn if it would render upside down.
pub fn keep_upright_angle(angle: f64) -> f64 {
    let a = normalize_angle(angle);
    if a > FRAC_PI_2 && a < 3.0 * FRAC_PI_2 {
        normalize_angle(a + PI)
    } else {
        a
    }
}

/// On-screen rotation, counter-clockwise from screen up, of an object
/// rotated `rotation` radians from north at `world_loc`.
///
/// `None` if the anchor or its rotation vector falls behind the eye.
pub fn screen_rotation(
    coord: &dyn CoordSystem,
    view: &ViewState,
    world_loc: DVec3,
    rotation: f64,
) -> Option<f64> {
    let dir = calc_rotation_vec(coord, world_loc, rotation);
    let step = (view.eye_pos - world_loc).length().max(1e-9) * 1e-3;
    let p0 = view.project_point(world_loc)?;
    let p1 = view.project_point(world_loc + dir * step)?;
    let d = p1 - p0;
    if d.length_squared() == 0.0 {
        return None;
    }
    Some(normalize_angle((-d.x).atan2(-d.y)))
}

/// Screen footprint of one object or a cluster of them.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenSpaceObjectLocation {
    /// One ID for a plain object, several for a cluster.
    pub shape_ids: Vec<SimpleIdentity>,
    pub is_cluster: bool,

    /// Anchor in display space.
    pub disp_loc: DVec3,

    /// Screen offset in points, Y up.
    pub offset: DVec2,

    /// Footprint around the anchor in points, Y up, before rotation.
    pub pts: Vec<DVec2>,

    /// Bounds of `pts`.
    pub mbr: Mbr,

    /// Screen rotation counter-clockwise from up.
    pub rotation: f64,
    pub keep_upright: bool,
}

impl ScreenSpaceObjectLocation {
    /// Location of `obj` at renderer time `time`.
    ///
    /// Rotated objects get their on-screen rotation resolved against `view`,
    /// flipped if they must stay upright.
    pub fn from_object(
        obj: &ScreenSpaceObject,
        coord: &dyn CoordSystem,
        view: &ViewState,
        time: f64,
    ) -> Self {
        let disp_loc = obj.position_at(time);
        let pts: Vec<DVec2> = obj
            .geometry
            .iter()
            .flat_map(|g| g.coords.iter().copied())
            .collect();
        let rotation = if obj.state.rotation {
            let rot = screen_rotation(coord, view, disp_loc, obj.rotation).unwrap_or(0.0);
            if obj.state.keep_upright {
                keep_upright_angle(rot)
            } else {
                rot
            }
        } else {
            0.0
        };

        Self {
            shape_ids: vec![obj.id],
            is_cluster: false,
            disp_loc,
            offset: obj.offset,
            mbr: Mbr::from_points(&pts),
            pts,
            rotation,
            keep_upright: obj.state.keep_upright,
        }
    }

    /// A cluster marker standing in for several objects.
    pub fn cluster(shape_ids: Vec<SimpleIdentity>, disp_loc: DVec3, pts: Vec<DVec2>) -> Self {
        Self {
            shape_ids,
            is_cluster: true,
            disp_loc,
            offset: DVec2::ZERO,
            mbr: Mbr::from_points(&pts),
            pts,
            rotation: 0.0,
            keep_upright: false,
        }
    }

    /// Footprint corners in screen pixels (Y down).
    ///
    /// `None` if the anchor is behind the eye.
    pub fn screen_points(&self, view: &ViewState, scale: f64) -> Option<Vec<DVec2>> {
        let anchor = view.project_point(self.disp_loc)?;
        let (sin, cos) = self.rotation.sin_cos();
        Some(
            self.pts
                .iter()
                .map(|p| {
                    let v = *p + self.offset;
                    let rotated = DVec2::new(v.x * cos - v.y * sin, v.x * sin + v.y * cos);
                    anchor + DVec2::new(rotated.x, -rotated.y) * scale
                })
                .collect(),
        )
    }

    /// Screen bounds of [`Self::screen_points`].
    pub fn screen_mbr(&self, view: &ViewState, scale: f64) -> Option<Mbr> {
        self.screen_points(view, scale).map(|pts| Mbr::from_points(&pts))
    }
}
