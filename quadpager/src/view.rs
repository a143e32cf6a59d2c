//! Immutable camera snapshots.
//!
//! The view-state collaborator (gesture handling, animation) owns the
//! camera. The engine only ever receives a [`ViewState`] copy and never
//! mutates it, so a snapshot can be handed across threads freely.

use glam::{DMat4, DVec2, DVec3};

use crate::coord::CoordSystem;
use crate::geometry::{ndc_to_screen, Mbr};

/// Default vertical field of view for [`ViewState::top_down`] (radians).
pub const DEFAULT_FOV_Y: f64 = std::f64::consts::FRAC_PI_3;

/// Point-in-time camera state.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    /// Display space to world space (globe rotation, map offset).
    pub model_matrix: DMat4,

    /// World space to eye space.
    pub view_matrix: DMat4,

    /// Eye space to clip space.
    pub proj_matrix: DMat4,

    /// Eye position in display space.
    pub eye_pos: DVec3,

    /// Height of the eye above the surface in display units.
    pub height_above_surface: f64,

    /// Size of the frame buffer in pixels.
    pub frame_size: DVec2,
}

impl ViewState {
    /// Creates a snapshot from explicit matrices.
    pub fn new(
        model_matrix: DMat4,
        view_matrix: DMat4,
        proj_matrix: DMat4,
        height_above_surface: f64,
        frame_size: DVec2,
    ) -> Self {
        let eye_pos = (view_matrix * model_matrix)
            .inverse()
            .transform_point3(DVec3::ZERO);
        Self {
            model_matrix,
            view_matrix,
            proj_matrix,
            eye_pos,
            height_above_surface,
            frame_size,
        }
    }

    /// A camera looking straight down at a local-space point.
    ///
    /// Works for flat maps and globes. `height` is measured in display units
    /// along the surface normal.
    pub fn top_down(
        coord: &dyn CoordSystem,
        local_center: DVec2,
        height: f64,
        frame_size: DVec2,
    ) -> Self {
        let target = coord.local_to_display(local_center.extend(0.0));
        let normal = coord.normal_at(target);
        let eye = target + normal * height;
        let up = if normal.z.abs() > 0.99 { DVec3::Y } else { DVec3::Z };

        let aspect = if frame_size.y > 0.0 {
            frame_size.x / frame_size.y
        } else {
            1.0
        };
        let near = (height * 0.01).max(1e-6);
        let far = height + 4.0;

        let view = DMat4::look_at_rh(eye, target, up);
        let proj = DMat4::perspective_rh_gl(DEFAULT_FOV_Y, aspect, near, far);
        Self::new(DMat4::IDENTITY, view, proj, height, frame_size)
    }

    /// Combined model and view transform.
    pub fn model_view(&self) -> DMat4 {
        self.view_matrix * self.model_matrix
    }

    /// Full display-to-clip transform.
    pub fn model_view_proj(&self) -> DMat4 {
        self.proj_matrix * self.model_view()
    }

    /// Projects a display-space point to screen pixels.
    ///
    /// Returns `None` for points behind the eye. Points outside the frame
    /// still project.
    pub fn project_point(&self, display: DVec3) -> Option<DVec2> {
        let clip = self.model_view_proj() * display.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        let ndc = DVec2::new(clip.x / clip.w, clip.y / clip.w);
        Some(ndc_to_screen(ndc, self.frame_size))
    }

    /// True if a surface point with the given normal faces the eye.
    pub fn is_facing(&self, display: DVec3, normal: DVec3) -> bool {
        (self.eye_pos - display).dot(normal) > 0.0
    }

    /// The frame as a screen rectangle.
    pub fn frame_mbr(&self) -> Mbr {
        Mbr::new(DVec2::ZERO, self.frame_size)
    }

    /// Straight-line distance the eye moved between two snapshots.
    pub fn eye_distance(&self, other: &ViewState) -> f64 {
        self.eye_pos.distance(other.eye_pos)
    }
}

/// Range of viewer heights over which something is drawn or selectable.
///
/// Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibilityRange {
    pub min: f64,
    pub max: f64,
}

impl VisibilityRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// True if a viewer at `height` should see the object.
    pub fn contains(&self, height: f64) -> bool {
        height >= self.min && height <= self.max
    }

    /// Total order used when visibility is part of a sort key.
    pub fn total_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.min
            .total_cmp(&other.min)
            .then_with(|| self.max.total_cmp(&other.max))
    }
}

/// True if `range` is unset or contains `height`.
pub fn is_visible_at(range: Option<&VisibilityRange>, height: f64) -> bool {
    range.map_or(true, |r| r.contains(height))
}
