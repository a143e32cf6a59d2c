//! Screen-space importance for tiles.
//!
//! A tile's importance is the number of screen pixels it covers, scaled by
//! the configured importance scale. A tile covering nothing is invisible.

use glam::{DVec2, DVec3};

use crate::coord::CoordSystem;
use crate::geometry::{clip_and_project_polygon, polygon_area_2d, Mbr};
use crate::quadtree::{CoverageSource, Node};
use crate::view::ViewState;

/// Sub-quads per axis used when sampling a globe tile at level 0.
///
/// Coarse globe tiles are too curved to project as a single quad; finer
/// levels halve the count down to a minimum of two.
const GLOBE_SAMPLES_AT_ROOT: u32 = 16;

/// Coverage source that ranks nodes by projected screen area.
pub struct ScreenImportance<'a> {
    coord: &'a dyn CoordSystem,
    view: &'a ViewState,
    importance_scale: f64,
}

impl<'a> ScreenImportance<'a> {
    pub fn new(coord: &'a dyn CoordSystem, view: &'a ViewState, importance_scale: f64) -> Self {
        Self {
            coord,
            view,
            importance_scale,
        }
    }

    fn samples_for_level(&self, level: i32) -> u32 {
        if self.coord.is_flat() {
            1
        } else {
            (GLOBE_SAMPLES_AT_ROOT >> level.clamp(0, 31)).max(2)
        }
    }

    /// Screen area in pixels covered by a local-space rectangle.
    pub fn screen_area(&self, mbr: &Mbr, level: i32) -> f64 {
        if !mbr.is_valid() {
            return 0.0;
        }
        let samples = self.samples_for_level(level);
        let step = DVec2::new(mbr.width(), mbr.height()) / samples as f64;
        let model_view = self.view.model_view();
        let flat = self.coord.is_flat();

        let mut area = 0.0;
        for ix in 0..samples {
            for iy in 0..samples {
                let ll = mbr.ll + step * DVec2::new(ix as f64, iy as f64);
                let quad: Vec<DVec3> = Mbr::new(ll, ll + step)
                    .corners()
                    .iter()
                    .map(|c| self.coord.local_to_display(c.extend(0.0)))
                    .collect();

                if !flat
                    && !quad
                        .iter()
                        .any(|p| self.view.is_facing(*p, self.coord.normal_at(*p)))
                {
                    continue;
                }

                let screen = clip_and_project_polygon(
                    &model_view,
                    &self.view.proj_matrix,
                    self.view.frame_size,
                    &quad,
                );
                area += polygon_area_2d(&screen);
            }
        }
        area
    }
}

impl CoverageSource for ScreenImportance<'_> {
    fn importance(&self, node: &Node, mbr: &Mbr) -> f64 {
        self.screen_area(mbr, node.level) * self.importance_scale
    }

    fn visible(&self, node: &Node, mbr: &Mbr) -> bool {
        self.screen_area(mbr, node.level) > 0.0
    }
}
