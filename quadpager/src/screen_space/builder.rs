//! Batches screen-space objects into drawables.
//!
//! Objects whose [`DrawableState`] compares equal land in the same batch no
//! matter where they sit in the world, so a thousand identical markers cost
//! one draw call. A batch that would grow past the vertex or triangle cap is
//! finished and a fresh batch with the same state takes its place.
//! A single piece too big for any batch is dropped with a warning.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use glam::{DVec2, DVec3};
//! use quadpager::coord::FlatCoordSystem;
//! use quadpager::screen_space::{ConvexGeometry, ScreenSpaceBuilder, ScreenSpaceObject, WHITE};
//!
//! let builder = ScreenSpaceBuilder::new(Arc::new(FlatCoordSystem::web_mercator()), 1.0);
//! for x in [0.0, 0.5] {
//!     let marker = ScreenSpaceObject::new(DVec3::new(x, 0.0, 0.0))
//!         .with_tex_ids(vec![7])
//!         .with_geometry(ConvexGeometry::rectangle(DVec2::splat(-8.0), DVec2::splat(8.0), WHITE));
//!     builder.add_screen_object(&marker);
//! }
//!
//! let drawables = builder.build_drawables();
//! assert_eq!(drawables.len(), 1);
//! assert_eq!(drawables[0].instance_count(), 2);
//! ```

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

use glam::{DVec2, DVec3};
use parking_lot::Mutex;
use tracing::{debug, warn};

use super::drawable::{ScreenSpaceDrawable, ScreenVertex, VertexMotion};
use super::object::{ConvexGeometry, ScreenSpaceObject};
use super::state::{attribute_layout, DrawableState, TimeWindow};
use crate::changes::{ChangeSet, SceneChange};
use crate::coord::CoordSystem;
use crate::ids::{next_identity, SimpleIdSet, SimpleIdentity};
use crate::view::VisibilityRange;

/// Most vertices a single batch may hold.
pub const DEFAULT_MAX_VERTICES: usize = (1 << 16) - 1;

/// Most triangles a single batch may hold.
pub const DEFAULT_MAX_TRIANGLES: usize = DEFAULT_MAX_VERTICES / 3;

/// Rotation vector for an object rotated `rot` radians counter-clockwise
/// from north, in the tangent plane at `world_loc`.
pub fn calc_rotation_vec(coord: &dyn CoordSystem, world_loc: DVec3, rot: f64) -> DVec3 {
    let r = 2.0 * PI - rot;
    let (north, east) = if coord.is_flat() {
        (DVec3::Y, DVec3::X)
    } else {
        let up = world_loc.normalize_or_zero();
        let toward_pole = DVec3::new(-world_loc.x, -world_loc.y, 1.0 - world_loc.z);
        let east = toward_pole.cross(up).normalize_or_zero();
        let north = up.cross(east).normalize_or_zero();
        (north, east)
    };
    east * r.sin() + north * r.cos()
}

fn to_f32(v: DVec3) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

struct BuilderInner {
    cur_state: DrawableState,
    draw_priority_offset: i32,
    batches: BTreeMap<DrawableState, ScreenSpaceDrawable>,
    finished: Vec<ScreenSpaceDrawable>,
}

/// Accumulates screen-space geometry into state-keyed batches.
///
/// Safe to share between threads; all state sits behind one lock owned by
/// the builder.
pub struct ScreenSpaceBuilder {
    coord: Arc<dyn CoordSystem>,
    scale: f64,
    max_vertices: usize,
    max_triangles: usize,
    inner: Mutex<BuilderInner>,
}

impl ScreenSpaceBuilder {
    /// `scale` converts screen points to pixels.
    pub fn new(coord: Arc<dyn CoordSystem>, scale: f64) -> Self {
        Self {
            coord,
            scale,
            max_vertices: DEFAULT_MAX_VERTICES,
            max_triangles: DEFAULT_MAX_TRIANGLES,
            inner: Mutex::new(BuilderInner {
                cur_state: DrawableState::default(),
                draw_priority_offset: 0,
                batches: BTreeMap::new(),
                finished: Vec::new(),
            }),
        }
    }

    /// Overrides the per-batch vertex and triangle caps.
    pub fn with_capacity(mut self, max_vertices: usize, max_triangles: usize) -> Self {
        self.max_vertices = max_vertices.max(3);
        self.max_triangles = max_triangles.max(1);
        self
    }

    // =========================================================================
    // Current state for add_rectangle
    // =========================================================================

    /// Added to the draw priority of everything built from now on.
    pub fn set_draw_priority_offset(&self, offset: i32) {
        self.inner.lock().draw_priority_offset = offset;
    }

    pub fn set_tex_id(&self, tex_id: SimpleIdentity) {
        self.set_tex_ids(vec![tex_id], 0.0);
    }

    /// Textures cycled through once per `period` seconds.
    pub fn set_tex_ids(&self, tex_ids: Vec<SimpleIdentity>, period: f64) {
        let mut inner = self.inner.lock();
        inner.cur_state.tex_ids = tex_ids;
        inner.cur_state.period = period;
    }

    pub fn set_program(&self, prog_id: SimpleIdentity) {
        self.inner.lock().cur_state.prog_id = prog_id;
    }

    pub fn set_fade(&self, fade_up: f64, fade_down: f64) {
        let mut inner = self.inner.lock();
        inner.cur_state.fade_up = fade_up;
        inner.cur_state.fade_down = fade_down;
    }

    pub fn set_draw_priority(&self, priority: i32) {
        self.inner.lock().cur_state.draw_priority = priority;
    }

    pub fn set_visibility(&self, min_vis: f64, max_vis: f64) {
        self.inner.lock().cur_state.visibility = Some(VisibilityRange::new(min_vis, max_vis));
    }

    pub fn set_enable(&self, enable: bool) {
        self.inner.lock().cur_state.enable = enable;
    }

    pub fn set_enable_window(&self, start: f64, end: f64) {
        self.inner.lock().cur_state.enable_window = Some(TimeWindow::new(start, end));
    }

    // =========================================================================
    // Adding geometry
    // =========================================================================

    /// Adds an unrotated rectangle using the current state.
    pub fn add_rectangle(
        &self,
        world_loc: DVec3,
        coords: &[DVec2; 4],
        tex_coords: &[DVec2; 4],
        color: [u8; 4],
    ) {
        let mut inner = self.inner.lock();
        let mut obj = ScreenSpaceObject::new(world_loc);
        obj.state = inner.cur_state.clone();
        obj.add_geometry(ConvexGeometry::new(coords.to_vec(), tex_coords.to_vec(), color));
        self.add_locked(&mut inner, &obj);
    }

    /// Adds a rectangle rotated `rotation` radians from north using the
    /// current state.
    pub fn add_rotated_rectangle(
        &self,
        world_loc: DVec3,
        rotation: f64,
        keep_upright: bool,
        coords: &[DVec2; 4],
        tex_coords: &[DVec2; 4],
        color: [u8; 4],
    ) {
        let mut inner = self.inner.lock();
        let mut obj = ScreenSpaceObject::new(world_loc);
        obj.state = inner.cur_state.clone();
        obj = obj.with_rotation(rotation, keep_upright);
        obj.add_geometry(ConvexGeometry::new(coords.to_vec(), tex_coords.to_vec(), color));
        self.add_locked(&mut inner, &obj);
    }

    pub fn add_screen_object(&self, obj: &ScreenSpaceObject) {
        let mut inner = self.inner.lock();
        self.add_locked(&mut inner, obj);
    }

    pub fn add_screen_objects(&self, objs: &[ScreenSpaceObject]) {
        let mut inner = self.inner.lock();
        for obj in objs {
            self.add_locked(&mut inner, obj);
        }
    }

    fn add_locked(&self, inner: &mut BuilderInner, obj: &ScreenSpaceObject) {
        for geom in &obj.geometry {
            if geom.coords.len() < 3 {
                debug!(object = obj.id, points = geom.coords.len(), "Skipping degenerate geometry");
                continue;
            }
            let verts = geom.coords.len();
            let tris = geom.triangle_count();
            if verts > self.max_vertices || tris > self.max_triangles {
                warn!(
                    object = obj.id,
                    vertices = verts,
                    triangles = tris,
                    max_vertices = self.max_vertices,
                    "Geometry larger than a whole drawable, skipping"
                );
                continue;
            }
            let state = self.piece_state(inner.draw_priority_offset, obj, geom);

            let full = inner
                .batches
                .get(&state)
                .map_or(false, |b| !b.has_room(verts, tris, self.max_vertices, self.max_triangles));
            if full {
                if let Some(batch) = inner.batches.remove(&state) {
                    debug!(
                        drawable = batch.id,
                        vertices = batch.vertex_count(),
                        "Batch full, starting another"
                    );
                    inner.finished.push(batch);
                }
            }

            let batch = inner
                .batches
                .entry(state.clone())
                .or_insert_with(|| ScreenSpaceDrawable::new(next_identity(), state, obj.world_loc));
            self.append_piece(batch, obj, geom);
        }
    }

    /// Object state with the piece's overrides and the builder offset.
    fn piece_state(&self, offset: i32, obj: &ScreenSpaceObject, geom: &ConvexGeometry) -> DrawableState {
        let mut state = obj.state.clone();
        if !geom.tex_ids.is_empty() {
            state.tex_ids = geom.tex_ids.clone();
        }
        if let Some(prog_id) = geom.prog_id {
            state.prog_id = prog_id;
        }
        if let Some(priority) = geom.draw_priority {
            state.draw_priority = priority;
        }
        state.draw_priority = state.draw_priority.saturating_add(offset);
        state.motion = obj.is_moving();
        state.vertex_attrs = attribute_layout(&geom.vertex_attrs);
        state
    }

    fn append_piece(&self, batch: &mut ScreenSpaceDrawable, obj: &ScreenSpaceObject, geom: &ConvexGeometry) {
        let base = batch.vertices.len() as u32;
        let position = to_f32(obj.world_loc - batch.center);
        let motion = if batch.state.motion {
            match (obj.velocity(), obj.motion) {
                (Some(dir), Some(m)) => Some(VertexMotion {
                    dir: to_f32(dir),
                    start_time: m.start_time as f32,
                }),
                _ => None,
            }
        } else {
            None
        };
        let rotation = batch
            .state
            .rotation
            .then(|| to_f32(calc_rotation_vec(self.coord.as_ref(), obj.world_loc, obj.rotation)));
        let attrs: Vec<_> = geom
            .vertex_attrs
            .iter()
            .map(|a| (a.name.clone(), a.value))
            .collect();

        for (i, coord) in geom.coords.iter().enumerate() {
            let offset = (*coord + obj.offset) * self.scale;
            let tex = geom.tex_coords.get(i).copied().unwrap_or(DVec2::ZERO);
            batch.vertices.push(ScreenVertex {
                position,
                offset: [offset.x as f32, offset.y as f32],
                tex_coord: [tex.x as f32, tex.y as f32],
                color: geom.color,
                motion,
                rotation,
                attrs: attrs.clone(),
            });
        }
        for i in 1..geom.coords.len() as u32 - 1 {
            batch.triangles.push([base, base + i, base + i + 1]);
        }
        if batch.instances.last() != Some(&obj.id) {
            batch.instances.push(obj.id);
        }
    }

    // =========================================================================
    // Output
    // =========================================================================

    /// Hands over every batch built so far and empties the builder.
    ///
    /// Full batches come first, then open batches in draw-priority order.
    pub fn build_drawables(&self) -> Vec<ScreenSpaceDrawable> {
        let mut inner = self.inner.lock();
        let mut drawables = std::mem::take(&mut inner.finished);
        let open = std::mem::take(&mut inner.batches);
        drawables.extend(open.into_values().filter(|d| !d.is_empty()));
        drawables
    }

    /// Moves every built drawable into `changes`, returning their IDs.
    pub fn flush_changes(&self, changes: &mut ChangeSet) -> SimpleIdSet {
        let drawables = self.build_drawables();
        let mut ids = SimpleIdSet::new();
        for drawable in drawables {
            ids.insert(drawable.id);
            changes.push(SceneChange::AddScreenSpace(drawable));
        }
        if !ids.is_empty() {
            debug!(count = ids.len(), "Flushed screen-space drawables");
        }
        ids
    }

    /// Number of batches currently held, open and full.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock();
        inner.batches.len() + inner.finished.len()
    }
}
