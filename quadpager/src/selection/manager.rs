//! Registry of selectable shapes and touch picking.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use glam::{DMat4, DVec2, DVec3};
use parking_lot::Mutex;
use tracing::{debug, trace};

use super::shape::{box_faces, center_polys, rect_solid_faces, Selectable, SelectableShape};
use crate::geometry::BoundingBox3;
use crate::ids::{SimpleIdSet, SimpleIdentity, EMPTY_IDENTITY};
use crate::view::{ViewState, VisibilityRange};

/// One hit from [`SelectionManager::pick_objects`].
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedObject {
    /// What was hit. More than one for a cluster.
    pub select_ids: Vec<SimpleIdentity>,

    /// Display-space distance from the eye.
    pub dist_3d: f64,

    /// Pixel distance from the touch point. Zero for a touch inside.
    pub screen_dist: f64,

    pub is_cluster: bool,
}

impl SelectedObject {
    fn cmp_distance(&self, other: &Self) -> Ordering {
        self.screen_dist
            .total_cmp(&other.screen_dist)
            .then_with(|| self.dist_3d.total_cmp(&other.dist_3d))
    }
}

/// Thread-safe set of selectable shapes.
///
/// Each ID maps to one shape; registering an ID again replaces its shape.
/// Every method takes the manager's own lock, so adds, removes and picks may
/// come from any thread.
///
/// # Example
///
/// ```
/// use glam::{DVec2, DVec3};
/// use quadpager::coord::FlatCoordSystem;
/// use quadpager::selection::SelectionManager;
/// use quadpager::view::ViewState;
///
/// let flat = FlatCoordSystem::web_mercator();
/// let view = ViewState::top_down(&flat, DVec2::ZERO, 1.0, DVec2::new(512.0, 512.0));
///
/// let manager = SelectionManager::new(1.0);
/// let square = [
///     DVec2::new(-10.0, -10.0),
///     DVec2::new(10.0, -10.0),
///     DVec2::new(10.0, 10.0),
///     DVec2::new(-10.0, 10.0),
/// ];
/// manager.add_selectable_screen_rect(42, DVec3::ZERO, square, None, true);
///
/// assert_eq!(manager.pick_object(DVec2::new(256.0, 256.0), 5.0, &view, 0.0), Some(42));
/// ```
pub struct SelectionManager {
    scale: f64,
    selectables: Mutex<BTreeMap<SimpleIdentity, Selectable>>,
}

impl SelectionManager {
    /// `scale` converts screen points to pixels for 2D shapes.
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            selectables: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.selectables.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.selectables.lock().is_empty()
    }

    pub fn contains(&self, select_id: SimpleIdentity) -> bool {
        self.selectables.lock().contains_key(&select_id)
    }

    /// A copy of the registered shape.
    pub fn get(&self, select_id: SimpleIdentity) -> Option<Selectable> {
        self.selectables.lock().get(&select_id).cloned()
    }

    /// Registers a prepared shape. [`EMPTY_IDENTITY`] is ignored.
    pub fn add_selectable(&self, selectable: Selectable) {
        if selectable.select_id == EMPTY_IDENTITY {
            return;
        }
        let id = selectable.select_id;
        if self.selectables.lock().insert(id, selectable).is_some() {
            debug!(select_id = id, "Replaced selectable");
        }
    }

    fn add(
        &self,
        select_id: SimpleIdentity,
        shape: SelectableShape,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add_selectable(Selectable::new(select_id, shape, visibility, enable));
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// A quad in display space, wound counter-clockwise seen from its front.
    pub fn add_selectable_rect(
        &self,
        select_id: SimpleIdentity,
        pts: [DVec3; 4],
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        let norm = (pts[1] - pts[0]).cross(pts[3] - pts[0]).normalize_or_zero();
        self.add(select_id, SelectableShape::Rect3D { pts, norm }, visibility, enable);
    }

    /// A quad in screen points around a display-space anchor.
    pub fn add_selectable_screen_rect(
        &self,
        select_id: SimpleIdentity,
        center: DVec3,
        pts: [DVec2; 4],
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add(select_id, SelectableShape::Rect2D { center, pts }, visibility, enable);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_selectable_moving_screen_rect(
        &self,
        select_id: SimpleIdentity,
        start_center: DVec3,
        end_center: DVec3,
        start_time: f64,
        end_time: f64,
        pts: [DVec2; 4],
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        let shape = SelectableShape::MovingRect2D {
            start_center,
            end_center,
            start_time,
            end_time,
            pts,
        };
        self.add(select_id, shape, visibility, enable);
    }

    /// A box from its bottom four then top four corners.
    pub fn add_selectable_rect_solid(
        &self,
        select_id: SimpleIdentity,
        pts: &[DVec3; 8],
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add_polytope(select_id, rect_solid_faces(pts), visibility, enable);
    }

    pub fn add_selectable_rect_solid_from_box(
        &self,
        select_id: SimpleIdentity,
        bbox: &BoundingBox3,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add_selectable_rect_solid(select_id, &bbox.corners(), visibility, enable);
    }

    /// A solid given by its surfaces in display space.
    pub fn add_polytope(
        &self,
        select_id: SimpleIdentity,
        surfaces: Vec<Vec<DVec3>>,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        let (center, polys) = center_polys(surfaces);
        self.add(select_id, SelectableShape::Polytope { center, polys }, visibility, enable);
    }

    /// A box from `ll` to `ur` placed by `mat`.
    pub fn add_polytope_from_box(
        &self,
        select_id: SimpleIdentity,
        ll: DVec3,
        ur: DVec3,
        mat: &DMat4,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add_polytope(select_id, box_faces(ll, ur, mat), visibility, enable);
    }

    /// A solid whose surfaces, given relative to its center and oriented by
    /// `mat`, travel from `start_center` to `end_center`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_moving_polytope(
        &self,
        select_id: SimpleIdentity,
        surfaces: Vec<Vec<DVec3>>,
        start_center: DVec3,
        end_center: DVec3,
        start_time: f64,
        duration: f64,
        mat: &DMat4,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        let polys = surfaces
            .into_iter()
            .map(|poly| poly.into_iter().map(|p| mat.transform_point3(p)).collect())
            .collect();
        let shape = SelectableShape::MovingPolytope {
            start_center,
            end_center,
            start_time,
            duration,
            polys,
        };
        self.add(select_id, shape, visibility, enable);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_moving_polytope_from_box(
        &self,
        select_id: SimpleIdentity,
        ll: DVec3,
        ur: DVec3,
        start_center: DVec3,
        end_center: DVec3,
        start_time: f64,
        duration: f64,
        mat: &DMat4,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add_moving_polytope(
            select_id,
            box_faces(ll, ur, &DMat4::IDENTITY),
            start_center,
            end_center,
            start_time,
            duration,
            mat,
            visibility,
            enable,
        );
    }

    pub fn add_selectable_linear(
        &self,
        select_id: SimpleIdentity,
        pts: Vec<DVec3>,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add(select_id, SelectableShape::Linear { pts }, visibility, enable);
    }

    /// A billboard standing on `center`, pointing along `normal`, sized in
    /// display units.
    pub fn add_selectable_billboard(
        &self,
        select_id: SimpleIdentity,
        center: DVec3,
        normal: DVec3,
        size: DVec2,
        visibility: Option<VisibilityRange>,
        enable: bool,
    ) {
        self.add(
            select_id,
            SelectableShape::Billboard { center, normal, size },
            visibility,
            enable,
        );
    }

    // =========================================================================
    // Removal and enable
    // =========================================================================

    pub fn remove_selectable(&self, select_id: SimpleIdentity) {
        self.selectables.lock().remove(&select_id);
    }

    pub fn remove_selectables(&self, select_ids: &SimpleIdSet) {
        let mut selectables = self.selectables.lock();
        for id in select_ids {
            selectables.remove(id);
        }
    }

    pub fn enable_selectable(&self, select_id: SimpleIdentity, enable: bool) {
        if let Some(sel) = self.selectables.lock().get_mut(&select_id) {
            sel.enable = enable;
        }
    }

    pub fn enable_selectables(&self, select_ids: &SimpleIdSet, enable: bool) {
        let mut selectables = self.selectables.lock();
        for id in select_ids {
            if let Some(sel) = selectables.get_mut(id) {
                sel.enable = enable;
            }
        }
    }

    // =========================================================================
    // Picking
    // =========================================================================

    /// The closest shape within `max_dist` pixels of `touch`, if any.
    ///
    /// `time` is the renderer clock used to place moving shapes.
    pub fn pick_object(&self, touch: DVec2, max_dist: f64, view: &ViewState, time: f64) -> Option<SimpleIdentity> {
        self.collect_hits(touch, max_dist, view, time)
            .into_iter()
            .min_by(SelectedObject::cmp_distance)
            .and_then(|hit| hit.select_ids.first().copied())
    }

    /// Every shape within `max_dist` pixels of `touch`, closest first.
    pub fn pick_objects(&self, touch: DVec2, max_dist: f64, view: &ViewState, time: f64) -> Vec<SelectedObject> {
        let mut hits = self.collect_hits(touch, max_dist, view, time);
        hits.sort_by(SelectedObject::cmp_distance);
        hits
    }

    fn collect_hits(&self, touch: DVec2, max_dist: f64, view: &ViewState, time: f64) -> Vec<SelectedObject> {
        let selectables = self.selectables.lock();
        let hits: Vec<SelectedObject> = selectables
            .values()
            .filter(|sel| sel.is_pickable(view))
            .filter_map(|sel| {
                let screen_dist = sel.screen_distance(view, touch, time, self.scale)?;
                (screen_dist <= max_dist).then(|| SelectedObject {
                    select_ids: vec![sel.select_id],
                    dist_3d: view.eye_pos.distance(sel.center_at(time)),
                    screen_dist,
                    is_cluster: false,
                })
            })
            .collect();
        trace!(candidates = selectables.len(), hits = hits.len(), "Pick");
        hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::FlatCoordSystem;

    const FRAME: f64 = 512.0;

    fn view_at_height(height: f64) -> ViewState {
        let flat = FlatCoordSystem::web_mercator();
        ViewState::top_down(&flat, DVec2::ZERO, height, DVec2::splat(FRAME))
    }

    fn view() -> ViewState {
        view_at_height(1.0)
    }

    fn square(half: f64) -> [DVec2; 4] {
        [
            DVec2::new(-half, -half),
            DVec2::new(half, -half),
            DVec2::new(half, half),
            DVec2::new(-half, half),
        ]
    }

    fn center() -> DVec2 {
        DVec2::splat(FRAME / 2.0)
    }

    #[test]
    fn test_pick_screen_rect() {
        let manager = SelectionManager::new(1.0);
        manager.add_selectable_screen_rect(1, DVec3::ZERO, square(10.0), None, true);

        assert_eq!(manager.pick_object(center(), 0.0, &view(), 0.0), Some(1));
        assert_eq!(manager.pick_object(center() + DVec2::new(15.0, 0.0), 10.0, &view(), 0.0), Some(1));
        assert_eq!(manager.pick_object(center() + DVec2::new(30.0, 0.0), 10.0, &view(), 0.0), None);
    }

    #[test]
    fn test_disabled_not_picked() {
        let manager = SelectionManager::new(1.0);
        manager.add_selectable_screen_rect(1, DVec3::ZERO, square(10.0), None, false);
        assert_eq!(manager.pick_object(center(), 5.0, &view(), 0.0), None);

        manager.enable_selectable(1, true);
        assert_eq!(manager.pick_object(center(), 5.0, &view(), 0.0), Some(1));

        manager.enable_selectables(&SimpleIdSet::from([1]), false);
        assert_eq!(manager.pick_object(center(), 5.0, &view(), 0.0), None);
    }

    #[test]
    fn test_visibility_range() {
        let manager = SelectionManager::new(1.0);
        let range = Some(VisibilityRange::new(0.5, 2.0));
        manager.add_selectable_screen_rect(1, DVec3::ZERO, square(10.0), range, true);

        assert_eq!(manager.pick_object(center(), 5.0, &view_at_height(1.0), 0.0), Some(1));
        assert_eq!(manager.pick_object(center(), 5.0, &view_at_height(3.0), 0.0), None);
    }

    #[test]
    fn test_remove() {
        let manager = SelectionManager::new(1.0);
        for id in 1..=3 {
            manager.add_selectable_screen_rect(id, DVec3::ZERO, square(10.0), None, true);
        }
        manager.remove_selectable(1);
        manager.remove_selectables(&SimpleIdSet::from([2, 9]));
        assert_eq!(manager.len(), 1);
        assert!(manager.contains(3));
    }

    #[test]
    fn test_empty_identity_ignored() {
        let manager = SelectionManager::new(1.0);
        manager.add_selectable_screen_rect(EMPTY_IDENTITY, DVec3::ZERO, square(1.0), None, true);
        assert!(manager.is_empty());
    }

    #[test]
    fn test_pick_objects_sorted() {
        let manager = SelectionManager::new(1.0);
        manager.add_selectable_screen_rect(1, DVec3::ZERO, square(2.0), None, true);
        manager.add_selectable_screen_rect(2, DVec3::ZERO, square(20.0), None, true);

        let hits = manager.pick_objects(center() + DVec2::new(10.0, 0.0), 50.0, &view(), 0.0);
        let ids: Vec<SimpleIdentity> = hits.iter().flat_map(|h| h.select_ids.clone()).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(hits[0].screen_dist, 0.0);
        assert!((hits[1].screen_dist - 8.0).abs() < 1e-6);
        assert!(!hits[0].is_cluster);
    }

    #[test]
    fn test_moving_rect_uses_time() {
        let manager = SelectionManager::new(1.0);
        manager.add_selectable_moving_screen_rect(
            1,
            DVec3::new(-0.3, 0.0, 0.0),
            DVec3::new(0.3, 0.0, 0.0),
            0.0,
            10.0,
            square(5.0),
            None,
            true,
        );

        assert_eq!(manager.pick_object(center(), 1.0, &view(), 5.0), Some(1));
        assert_eq!(manager.pick_object(center(), 1.0, &view(), 0.0), None);
    }

    #[test]
    fn test_pick_rect_3d() {
        let manager = SelectionManager::new(1.0);
        let pts = [
            DVec3::new(-0.1, -0.1, 0.0),
            DVec3::new(0.1, -0.1, 0.0),
            DVec3::new(0.1, 0.1, 0.0),
            DVec3::new(-0.1, 0.1, 0.0),
        ];
        manager.add_selectable_rect(1, pts, None, true);
        assert_eq!(manager.pick_object(center(), 0.0, &view(), 0.0), Some(1));
        assert_eq!(manager.pick_object(DVec2::new(5.0, 5.0), 1.0, &view(), 0.0), None);
    }

    #[test]
    fn test_back_facing_rect_3d_skipped() {
        let manager = SelectionManager::new(1.0);
        let pts = [
            DVec3::new(-0.1, -0.1, 0.0),
            DVec3::new(-0.1, 0.1, 0.0),
            DVec3::new(0.1, 0.1, 0.0),
            DVec3::new(0.1, -0.1, 0.0),
        ];
        manager.add_selectable_rect(1, pts, None, true);
        assert_eq!(manager.pick_object(center(), 0.0, &view(), 0.0), None);
    }

    #[test]
    fn test_pick_rect_solid_and_polytope() {
        let manager = SelectionManager::new(1.0);
        let bbox = BoundingBox3::new(DVec3::new(-0.1, -0.1, 0.0), DVec3::new(0.1, 0.1, 0.1));
        manager.add_selectable_rect_solid_from_box(1, &bbox, None, true);
        manager.add_polytope_from_box(
            2,
            DVec3::splat(-0.05),
            DVec3::splat(0.05),
            &DMat4::from_translation(DVec3::new(0.3, 0.0, 0.0)),
            None,
            true,
        );

        assert_eq!(manager.pick_object(center(), 0.0, &view(), 0.0), Some(1));
        let hits = manager.pick_objects(center(), 0.0, &view(), 0.0);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_moving_polytope() {
        let manager = SelectionManager::new(1.0);
        manager.add_moving_polytope_from_box(
            1,
            DVec3::splat(-0.05),
            DVec3::splat(0.05),
            DVec3::new(-0.4, 0.0, 0.0),
            DVec3::new(0.4, 0.0, 0.0),
            100.0,
            2.0,
            &DMat4::IDENTITY,
            None,
            true,
        );

        assert_eq!(manager.pick_object(center(), 0.0, &view(), 101.0), Some(1));
        assert_eq!(manager.pick_object(center(), 0.0, &view(), 100.0), None);
    }

    #[test]
    fn test_pick_linear() {
        let manager = SelectionManager::new(1.0);
        manager.add_selectable_linear(
            1,
            vec![DVec3::new(-0.2, 0.0, 0.0), DVec3::new(0.2, 0.0, 0.0)],
            None,
            true,
        );
        assert_eq!(manager.pick_object(center() + DVec2::new(0.0, 3.0), 5.0, &view(), 0.0), Some(1));
        assert_eq!(manager.pick_object(center() + DVec2::new(0.0, 40.0), 5.0, &view(), 0.0), None);
    }

    #[test]
    fn test_linear_point_behind_eye_breaks_line() {
        let manager = SelectionManager::new(1.0);
        // The middle point sits above the eye, so the line never crosses the view center
        manager.add_selectable_linear(
            1,
            vec![
                DVec3::new(-0.5, 0.0, 0.0),
                DVec3::new(0.0, 0.0, 2.0),
                DVec3::new(0.5, 0.0, 0.0),
            ],
            None,
            true,
        );
        assert_eq!(manager.pick_object(center(), 20.0, &view(), 0.0), None);
        // The visible stub leaving the first point still picks
        assert_eq!(manager.pick_object(center() - DVec2::new(230.0, 0.0), 5.0, &view(), 0.0), Some(1));
    }

    #[test]
    fn test_pick_billboard() {
        let manager = SelectionManager::new(1.0);
        let eye_above = view_at_height(1.0);
        manager.add_selectable_billboard(1, DVec3::ZERO, DVec3::Y, DVec2::new(0.2, 0.2), None, true);
        let hit = manager.pick_object(center() + DVec2::new(0.0, -10.0), 0.0, &eye_above, 0.0);
        assert_eq!(hit, Some(1));
    }

    #[test]
    fn test_readd_replaces() {
        let manager = SelectionManager::new(1.0);
        manager.add_selectable_screen_rect(1, DVec3::ZERO, square(1.0), None, true);
        manager.add_selectable_linear(1, vec![DVec3::ZERO, DVec3::X], None, true);
        assert_eq!(manager.len(), 1);
        assert!(matches!(manager.get(1).map(|s| s.shape), Some(SelectableShape::Linear { .. })));
    }
}
