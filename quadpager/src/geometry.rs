//! Geometry primitives shared by coverage, placement and selection.
//!
//! All math is done in `f64` using `glam` types. Screen coordinates put the
//! origin at the top-left of the frame with Y growing downward, which is the
//! convention touch points arrive in.

use glam::{DMat4, DVec2, DVec3, DVec4};

use crate::error::GeometryError;

const EPSILON: f64 = 1e-12;

/// Smallest clip-space `w` treated as in front of the eye.
const MIN_CLIP_W: f64 = 1e-6;

// =============================================================================
// Bounding rectangles
// =============================================================================

/// Axis-aligned 2D bounding rectangle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mbr {
    /// Lower-left corner.
    pub ll: DVec2,
    /// Upper-right corner.
    pub ur: DVec2,
}

impl Mbr {
    /// Creates a rectangle from its corners.
    pub fn new(ll: DVec2, ur: DVec2) -> Self {
        Self { ll, ur }
    }

    /// An inverted rectangle that any added point will fix up.
    pub fn empty() -> Self {
        Self {
            ll: DVec2::splat(f64::MAX),
            ur: DVec2::splat(f64::MIN),
        }
    }

    /// Builds the smallest rectangle holding every point.
    pub fn from_points(pts: &[DVec2]) -> Self {
        let mut mbr = Self::empty();
        for pt in pts {
            mbr.add_point(*pt);
        }
        mbr
    }

    /// Grows the rectangle to include `pt`.
    pub fn add_point(&mut self, pt: DVec2) {
        self.ll = self.ll.min(pt);
        self.ur = self.ur.max(pt);
    }

    /// True if the rectangle has positive, finite area.
    pub fn is_valid(&self) -> bool {
        self.ll.is_finite() && self.ur.is_finite() && self.ur.x > self.ll.x && self.ur.y > self.ll.y
    }

    /// Returns an error describing why the rectangle is unusable.
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(GeometryError::Degenerate {
                reason: format!("rectangle {:?}..{:?} has no area", self.ll, self.ur),
            })
        }
    }

    pub fn width(&self) -> f64 {
        self.ur.x - self.ll.x
    }

    pub fn height(&self) -> f64 {
        self.ur.y - self.ll.y
    }

    pub fn area(&self) -> f64 {
        if self.is_valid() {
            self.width() * self.height()
        } else {
            0.0
        }
    }

    pub fn mid(&self) -> DVec2 {
        (self.ll + self.ur) * 0.5
    }

    /// True if `pt` lies inside or on the boundary.
    pub fn inside(&self, pt: DVec2) -> bool {
        pt.x >= self.ll.x && pt.x <= self.ur.x && pt.y >= self.ll.y && pt.y <= self.ur.y
    }

    /// True if the two rectangles share any area or boundary.
    pub fn overlaps(&self, other: &Mbr) -> bool {
        self.ll.x <= other.ur.x
            && other.ll.x <= self.ur.x
            && self.ll.y <= other.ur.y
            && other.ll.y <= self.ur.y
    }

    /// Corners in counter-clockwise order starting at lower-left.
    pub fn corners(&self) -> [DVec2; 4] {
        [
            self.ll,
            DVec2::new(self.ur.x, self.ll.y),
            self.ur,
            DVec2::new(self.ll.x, self.ur.y),
        ]
    }
}

/// Axis-aligned 3D bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox3 {
    pub min: DVec3,
    pub max: DVec3,
}

impl BoundingBox3 {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self { min, max }
    }

    pub fn from_points(pts: &[DVec3]) -> Self {
        let mut bbox = Self {
            min: DVec3::splat(f64::MAX),
            max: DVec3::splat(f64::MIN),
        };
        for pt in pts {
            bbox.min = bbox.min.min(*pt);
            bbox.max = bbox.max.max(*pt);
        }
        bbox
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.max.cmpge(self.min).all()
    }

    /// The eight corners: bottom four (min z) then top four (max z).
    pub fn corners(&self) -> [DVec3; 8] {
        let (lo, hi) = (self.min, self.max);
        [
            DVec3::new(lo.x, lo.y, lo.z),
            DVec3::new(hi.x, lo.y, lo.z),
            DVec3::new(hi.x, hi.y, lo.z),
            DVec3::new(lo.x, hi.y, lo.z),
            DVec3::new(lo.x, lo.y, hi.z),
            DVec3::new(hi.x, lo.y, hi.z),
            DVec3::new(hi.x, hi.y, hi.z),
            DVec3::new(lo.x, hi.y, hi.z),
        ]
    }
}

// =============================================================================
// 2D polygon tests
// =============================================================================

/// Even-odd crossing test for a closed ring.
pub fn point_in_polygon(pt: DVec2, ring: &[DVec2]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let (pi, pj) = (ring[i], ring[j]);
        if (pi.y > pt.y) != (pj.y > pt.y) {
            let x_cross = (pj.x - pi.x) * (pt.y - pi.y) / (pj.y - pi.y) + pi.x;
            if pt.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Separating-axis overlap test for two convex polygons.
pub fn convex_poly_intersect(pts0: &[DVec2], pts1: &[DVec2]) -> bool {
    if pts0.is_empty() || pts1.is_empty() {
        return false;
    }
    !has_separating_axis(pts0, pts1) && !has_separating_axis(pts1, pts0)
}

fn has_separating_axis(a: &[DVec2], b: &[DVec2]) -> bool {
    for i in 0..a.len() {
        let edge = a[(i + 1) % a.len()] - a[i];
        let axis = edge.perp();
        if axis.length_squared() < EPSILON {
            continue;
        }
        let (min_a, max_a) = project_onto(a, axis);
        let (min_b, max_b) = project_onto(b, axis);
        if max_a < min_b || max_b < min_a {
            return true;
        }
    }
    false
}

fn project_onto(pts: &[DVec2], axis: DVec2) -> (f64, f64) {
    pts.iter().fold((f64::MAX, f64::MIN), |(lo, hi), p| {
        let d = p.dot(axis);
        (lo.min(d), hi.max(d))
    })
}

/// Closest point on segment `p0..p1` to `pt`, with its parametric position.
pub fn closest_point_on_segment(p0: DVec2, p1: DVec2, pt: DVec2) -> (DVec2, f64) {
    let seg = p1 - p0;
    let len_sq = seg.length_squared();
    if len_sq < EPSILON {
        return (p0, 0.0);
    }
    let t = ((pt - p0).dot(seg) / len_sq).clamp(0.0, 1.0);
    (p0 + seg * t, t)
}

/// Distance from `pt` to the closest edge of a closed polygon, plus that point.
///
/// Returns `None` for an empty polygon.
pub fn closest_point_to_polygon(pts: &[DVec2], pt: DVec2) -> Option<(f64, DVec2)> {
    match pts.len() {
        0 => None,
        1 => Some((pts[0].distance(pt), pts[0])),
        n => (0..n)
            .map(|i| {
                let (close, _) = closest_point_on_segment(pts[i], pts[(i + 1) % n], pt);
                (close.distance(pt), close)
            })
            .min_by(|a, b| a.0.total_cmp(&b.0)),
    }
}

/// Unsigned area of a 2D polygon (shoelace formula).
pub fn polygon_area_2d(pts: &[DVec2]) -> f64 {
    if pts.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..pts.len() {
        let (a, b) = (pts[i], pts[(i + 1) % pts.len()]);
        sum += a.x * b.y - b.x * a.y;
    }
    (sum * 0.5).abs()
}

/// Area of a planar 3D polygon with the given normal.
pub fn polygon_area_3d(poly: &[DVec3], norm: DVec3) -> f64 {
    if poly.len() < 3 {
        return 0.0;
    }
    let mut sum = DVec3::ZERO;
    for i in 0..poly.len() {
        sum += poly[i].cross(poly[(i + 1) % poly.len()]);
    }
    (norm.normalize_or_zero().dot(sum) * 0.5).abs()
}

// =============================================================================
// Ray intersection
// =============================================================================

/// Intersects a ray with a sphere centered at the origin.
///
/// Returns the nearest hit in front of the origin and its ray parameter.
pub fn intersect_sphere(org: DVec3, dir: DVec3, radius: f64) -> Option<(DVec3, f64)> {
    let a = dir.length_squared();
    if a < EPSILON {
        return None;
    }
    let b = 2.0 * org.dot(dir);
    let c = org.length_squared() - radius * radius;
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 {
        return None;
    }
    let sq = disc.sqrt();
    let t0 = (-b - sq) / (2.0 * a);
    let t1 = (-b + sq) / (2.0 * a);
    let t = if t0 >= 0.0 { t0 } else { t1 };
    if t < 0.0 {
        return None;
    }
    Some((org + dir * t, t))
}

/// Slab test for a ray against an axis-aligned box.
///
/// Returns the entry and exit parameters.
pub fn bounding_box_ray_intersect(org: DVec3, dir: DVec3, bbox: &BoundingBox3) -> Option<(f64, f64)> {
    let mut t_min = f64::MIN;
    let mut t_max = f64::MAX;
    for axis in 0..3 {
        let (o, d) = (org[axis], dir[axis]);
        let (lo, hi) = (bbox.min[axis], bbox.max[axis]);
        if d.abs() < EPSILON {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let (mut t0, mut t1) = ((lo - o) / d, (hi - o) / d);
        if t0 > t1 {
            std::mem::swap(&mut t0, &mut t1);
        }
        t_min = t_min.max(t0);
        t_max = t_max.min(t1);
        if t_min > t_max {
            return None;
        }
    }
    if t_max < 0.0 {
        return None;
    }
    Some((t_min, t_max))
}

/// Möller–Trumbore ray/triangle intersection.
pub fn triangle_ray_intersect(org: DVec3, dir: DVec3, tri: &[DVec3; 3]) -> Option<(f64, DVec3)> {
    let e1 = tri[1] - tri[0];
    let e2 = tri[2] - tri[0];
    let p = dir.cross(e2);
    let det = e1.dot(p);
    if det.abs() < EPSILON {
        return None;
    }
    let inv = 1.0 / det;
    let s = org - tri[0];
    let u = s.dot(p) * inv;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }
    let q = s.cross(e1);
    let v = dir.dot(q) * inv;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }
    let t = e2.dot(q) * inv;
    (t >= 0.0).then(|| (t, org + dir * t))
}

// =============================================================================
// Projection
// =============================================================================

/// Clips a polygon in homogeneous clip space against the view volume.
///
/// Uses Sutherland–Hodgman against the six planes `-w <= x,y,z <= w`.
pub fn clip_homogeneous_polygon(pts: &[DVec4]) -> Vec<DVec4> {
    let planes: [fn(DVec4) -> f64; 6] = [
        |p| p.w + p.x,
        |p| p.w - p.x,
        |p| p.w + p.y,
        |p| p.w - p.y,
        |p| p.w + p.z,
        |p| p.w - p.z,
    ];

    let mut out: Vec<DVec4> = pts.to_vec();
    for dist in planes {
        if out.is_empty() {
            break;
        }
        let input = std::mem::take(&mut out);
        for i in 0..input.len() {
            let cur = input[i];
            let prev = input[(i + input.len() - 1) % input.len()];
            let (dc, dp) = (dist(cur), dist(prev));
            if dc >= 0.0 {
                if dp < 0.0 {
                    out.push(prev + (cur - prev) * (dp / (dp - dc)));
                }
                out.push(cur);
            } else if dp >= 0.0 {
                out.push(prev + (cur - prev) * (dp / (dp - dc)));
            }
        }
    }
    out
}

/// Converts normalized device coordinates to screen pixels.
pub fn ndc_to_screen(ndc: DVec2, frame_size: DVec2) -> DVec2 {
    DVec2::new(
        (ndc.x + 1.0) * 0.5 * frame_size.x,
        (1.0 - ndc.y) * 0.5 * frame_size.y,
    )
}

/// Projects a display-space segment to the screen.
///
/// The part behind the eye is cut away first, so a segment that passes
/// behind the camera keeps only its visible end. `None` if none of it is in
/// front of the eye.
pub fn clip_and_project_segment(mvp: &DMat4, frame_size: DVec2, a: DVec3, b: DVec3) -> Option<(DVec2, DVec2)> {
    let mut ca = *mvp * a.extend(1.0);
    let mut cb = *mvp * b.extend(1.0);
    if ca.w < MIN_CLIP_W && cb.w < MIN_CLIP_W {
        return None;
    }
    if ca.w < MIN_CLIP_W {
        ca = ca.lerp(cb, (MIN_CLIP_W - ca.w) / (cb.w - ca.w));
    } else if cb.w < MIN_CLIP_W {
        cb = cb.lerp(ca, (MIN_CLIP_W - cb.w) / (ca.w - cb.w));
    }
    let project = |c: DVec4| ndc_to_screen(DVec2::new(c.x / c.w, c.y / c.w), frame_size);
    Some((project(ca), project(cb)))
}

/// Projects a display-space polygon to the screen, clipping it to the view.
///
/// Returns an empty list when the polygon lies entirely outside the view.
pub fn clip_and_project_polygon(
    model_view: &DMat4,
    proj: &DMat4,
    frame_size: DVec2,
    poly: &[DVec3],
) -> Vec<DVec2> {
    let full = *proj * *model_view;
    let clip_pts: Vec<DVec4> = poly.iter().map(|p| full * p.extend(1.0)).collect();
    clip_homogeneous_polygon(&clip_pts)
        .into_iter()
        .filter(|p| p.w.abs() > EPSILON)
        .map(|p| ndc_to_screen(DVec2::new(p.x / p.w, p.y / p.w), frame_size))
        .collect()
}
