//! Selectable shapes and their screen-space distance tests.

use glam::{DMat4, DVec2, DVec3};

use crate::geometry::{
    clip_and_project_polygon, clip_and_project_segment, closest_point_on_segment,
    closest_point_to_polygon, point_in_polygon, BoundingBox3, Mbr,
};
use crate::ids::SimpleIdentity;
use crate::screen_space::ScreenSpaceObjectLocation;
use crate::view::{is_visible_at, ViewState, VisibilityRange};

/// Linear position between two centers at `time`, clamped to the window.
pub(crate) fn center_at(start: DVec3, end: DVec3, start_time: f64, end_time: f64, time: f64) -> DVec3 {
    if end_time <= start_time {
        return start;
    }
    let t = ((time - start_time) / (end_time - start_time)).clamp(0.0, 1.0);
    start.lerp(end, t)
}

/// The closed set of shapes the selection manager understands.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectableShape {
    /// Quad in display space.
    Rect3D { pts: [DVec3; 4], norm: DVec3 },

    /// Screen-space quad around a display-space anchor, in points with Y up.
    Rect2D { center: DVec3, pts: [DVec2; 4] },

    /// [`SelectableShape::Rect2D`] whose anchor moves between two centers.
    MovingRect2D {
        start_center: DVec3,
        end_center: DVec3,
        start_time: f64,
        end_time: f64,
        pts: [DVec2; 4],
    },

    /// Closed solid given as faces offset from a center.
    Polytope { center: DVec3, polys: Vec<Vec<DVec3>> },

    /// [`SelectableShape::Polytope`] whose center moves over `duration`
    /// seconds.
    MovingPolytope {
        start_center: DVec3,
        end_center: DVec3,
        start_time: f64,
        duration: f64,
        polys: Vec<Vec<DVec3>>,
    },

    /// Polyline in display space.
    Linear { pts: Vec<DVec3> },

    /// Upright quad standing on `center`, turned toward the eye.
    Billboard {
        center: DVec3,
        normal: DVec3,
        size: DVec2,
    },
}

/// A registered shape with the fields every shape shares.
#[derive(Debug, Clone, PartialEq)]
pub struct Selectable {
    pub select_id: SimpleIdentity,
    pub enable: bool,

    /// Viewer heights over which the shape can be picked. `None` for all.
    pub visibility: Option<VisibilityRange>,

    pub shape: SelectableShape,
}

impl Selectable {
    pub fn new(
        select_id: SimpleIdentity,
        shape: SelectableShape,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) -> Self {
        Self {
            select_id,
            enable,
            visibility,
            shape,
        }
    }

    /// True if enabled and visible from `view`.
    pub fn is_pickable(&self, view: &ViewState) -> bool {
        self.enable && is_visible_at(self.visibility.as_ref(), view.height_above_surface)
    }

    /// Display-space reference point at `time`, used for eye distance.
    pub fn center_at(&self, time: f64) -> DVec3 {
        match &self.shape {
            SelectableShape::Rect3D { pts, .. } => pts.iter().copied().sum::<DVec3>() / 4.0,
            SelectableShape::Rect2D { center, .. } => *center,
            SelectableShape::MovingRect2D {
                start_center,
                end_center,
                start_time,
                end_time,
                ..
            } => center_at(*start_center, *end_center, *start_time, *end_time, time),
            SelectableShape::Polytope { center, .. } => *center,
            SelectableShape::MovingPolytope {
                start_center,
                end_center,
                start_time,
                duration,
                ..
            } => center_at(*start_center, *end_center, *start_time, start_time + duration, time),
            SelectableShape::Linear { pts } => {
                if pts.is_empty() {
                    DVec3::ZERO
                } else {
                    pts.iter().copied().sum::<DVec3>() / pts.len() as f64
                }
            }
            SelectableShape::Billboard { center, .. } => *center,
        }
    }

    /// Screen distance in pixels from `touch` to the shape at `time`.
    ///
    /// Zero when the touch is inside an area shape. `None` if the shape is
    /// not on screen at all.
    pub fn screen_distance(&self, view: &ViewState, touch: DVec2, time: f64, scale: f64) -> Option<f64> {
        match &self.shape {
            SelectableShape::Rect3D { pts, norm } => {
                let center = self.center_at(time);
                if *norm != DVec3::ZERO && !view.is_facing(center, *norm) {
                    return None;
                }
                polygon_distance(view, pts, DVec3::ZERO, touch)
            }
            SelectableShape::Rect2D { pts, .. } | SelectableShape::MovingRect2D { pts, .. } => {
                let loc = ScreenSpaceObjectLocation {
                    shape_ids: vec![self.select_id],
                    is_cluster: false,
                    disp_loc: self.center_at(time),
                    offset: DVec2::ZERO,
                    pts: pts.to_vec(),
                    mbr: Mbr::from_points(pts),
                    rotation: 0.0,
                    keep_upright: false,
                };
                let screen = loc.screen_points(view, scale)?;
                area_distance(&screen, touch)
            }
            SelectableShape::Polytope { polys, .. } | SelectableShape::MovingPolytope { polys, .. } => {
                let center = self.center_at(time);
                polys
                    .iter()
                    .filter_map(|poly| polygon_distance(view, poly, center, touch))
                    .min_by(f64::total_cmp)
            }
            SelectableShape::Linear { pts } => polyline_distance(view, pts, touch),
            SelectableShape::Billboard { center, normal, size } => {
                let up = normal.normalize_or_zero();
                let right = up.cross(view.eye_pos - *center).normalize_or_zero();
                if up == DVec3::ZERO || right == DVec3::ZERO {
                    return None;
                }
                let half = right * (size.x / 2.0);
                let top = up * size.y;
                let quad = [*center - half, *center + half, *center + half + top, *center - half + top];
                polygon_distance(view, &quad, DVec3::ZERO, touch)
            }
        }
    }
}

fn area_distance(screen: &[DVec2], touch: DVec2) -> Option<f64> {
    if screen.len() < 3 {
        return None;
    }
    if point_in_polygon(touch, screen) {
        return Some(0.0);
    }
    closest_point_to_polygon(screen, touch).map(|(dist, _)| dist)
}

/// Distance to a polyline, each segment clipped on its own so points
/// behind the eye never join their neighbours.
fn polyline_distance(view: &ViewState, pts: &[DVec3], touch: DVec2) -> Option<f64> {
    if let [only] = pts {
        return view.project_point(*only).map(|p| p.distance(touch));
    }
    let mvp = view.model_view_proj();
    pts.windows(2)
        .filter_map(|w| clip_and_project_segment(&mvp, view.frame_size, w[0], w[1]))
        .map(|(a, b)| closest_point_on_segment(a, b, touch).0.distance(touch))
        .min_by(f64::total_cmp)
}

fn polygon_distance(view: &ViewState, poly: &[DVec3], offset: DVec3, touch: DVec2) -> Option<f64> {
    let world: Vec<DVec3> = poly.iter().map(|p| *p + offset).collect();
    let screen = clip_and_project_polygon(&view.model_view(), &view.proj_matrix, view.frame_size, &world);
    area_distance(&screen, touch)
}

// =============================================================================
// Shape construction helpers
// =============================================================================

/// The six faces of a box given as bottom four then top four corners.
pub fn rect_solid_faces(pts: &[DVec3; 8]) -> Vec<Vec<DVec3>> {
    let mut faces = vec![
        vec![pts[0], pts[1], pts[2], pts[3]],
        vec![pts[4], pts[5], pts[6], pts[7]],
    ];
    for i in 0..4 {
        let j = (i + 1) % 4;
        faces.push(vec![pts[i], pts[j], pts[j + 4], pts[i + 4]]);
    }
    faces
}

/// Box faces after transforming the corners by `mat`.
pub fn box_faces(ll: DVec3, ur: DVec3, mat: &DMat4) -> Vec<Vec<DVec3>> {
    let corners = BoundingBox3::new(ll.min(ur), ll.max(ur)).corners();
    let transformed = corners.map(|c| mat.transform_point3(c));
    rect_solid_faces(&transformed)
}

/// Center of every vertex, and the faces re-expressed relative to it.
pub fn center_polys(surfaces: Vec<Vec<DVec3>>) -> (DVec3, Vec<Vec<DVec3>>) {
    let count: usize = surfaces.iter().map(Vec::len).sum();
    if count == 0 {
        return (DVec3::ZERO, surfaces);
    }
    let center = surfaces.iter().flatten().copied().sum::<DVec3>() / count as f64;
    let polys = surfaces
        .into_iter()
        .map(|poly| poly.into_iter().map(|p| p - center).collect())
        .collect();
    (center, polys)
}
