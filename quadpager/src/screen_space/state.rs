//! Render state shared by every object in a batch.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::ids::{SimpleIdentity, EMPTY_IDENTITY};
use crate::view::VisibilityRange;

/// Time window, in seconds on the renderer clock, during which an object is
/// enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time <= self.end
    }

    pub fn total_cmp(&self, other: &Self) -> Ordering {
        self.start
            .total_cmp(&other.start)
            .then_with(|| self.end.total_cmp(&other.end))
    }
}

// =============================================================================
// Vertex attributes
// =============================================================================

/// Type of an extra per-vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexAttributeKind {
    Float,
    Int,
    Vec2,
    Vec3,
    Color,
}

/// Value of an extra per-vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VertexAttributeValue {
    Float(f32),
    Int(i32),
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Color([u8; 4]),
}

impl VertexAttributeValue {
    pub fn kind(&self) -> VertexAttributeKind {
        match self {
            VertexAttributeValue::Float(_) => VertexAttributeKind::Float,
            VertexAttributeValue::Int(_) => VertexAttributeKind::Int,
            VertexAttributeValue::Vec2(_) => VertexAttributeKind::Vec2,
            VertexAttributeValue::Vec3(_) => VertexAttributeKind::Vec3,
            VertexAttributeValue::Color(_) => VertexAttributeKind::Color,
        }
    }
}

/// A named attribute value attached to every vertex of a geometry piece.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexAttribute {
    pub name: String,
    pub value: VertexAttributeValue,
}

impl VertexAttribute {
    pub fn new(name: impl Into<String>, value: VertexAttributeValue) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }

    pub fn info(&self) -> VertexAttributeInfo {
        VertexAttributeInfo {
            name: self.name.clone(),
            kind: self.value.kind(),
        }
    }
}

/// Name and type of an attribute; part of the batch key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexAttributeInfo {
    pub name: String,
    pub kind: VertexAttributeKind,
}

/// Attribute layout of a batch.
pub fn attribute_layout(attrs: &[VertexAttribute]) -> BTreeSet<VertexAttributeInfo> {
    attrs.iter().map(VertexAttribute::info).collect()
}

// =============================================================================
// DrawableState
// =============================================================================

/// Everything that must match for two objects to share a draw call.
///
/// Ordered by draw priority first, so iterating batches in key order yields
/// them in draw order. Float fields compare with `total_cmp`.
#[derive(Debug, Clone)]
pub struct DrawableState {
    pub tex_ids: Vec<SimpleIdentity>,

    /// Seconds per cycle through `tex_ids`. Zero for a static texture.
    pub period: f64,

    pub prog_id: SimpleIdentity,

    /// Fade-in duration in seconds.
    pub fade_up: f64,

    /// Fade-out duration in seconds.
    pub fade_down: f64,

    pub enable: bool,
    pub enable_window: Option<TimeWindow>,
    pub draw_priority: i32,
    pub visibility: Option<VisibilityRange>,

    /// Vertices carry a direction and start time.
    pub motion: bool,

    /// Vertices carry a world-space rotation vector.
    pub rotation: bool,

    /// Rotated glyphs are flipped rather than drawn upside down.
    pub keep_upright: bool,

    pub vertex_attrs: BTreeSet<VertexAttributeInfo>,
}

impl Default for DrawableState {
    fn default() -> Self {
        Self {
            tex_ids: Vec::new(),
            period: 0.0,
            prog_id: EMPTY_IDENTITY,
            fade_up: 0.0,
            fade_down: 0.0,
            enable: true,
            enable_window: None,
            draw_priority: 0,
            visibility: None,
            motion: false,
            rotation: false,
            keep_upright: false,
            vertex_attrs: BTreeSet::new(),
        }
    }
}

fn cmp_option<T>(a: &Option<T>, b: &Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => cmp(a, b),
    }
}

impl Ord for DrawableState {
    fn cmp(&self, other: &Self) -> Ordering {
        self.draw_priority
            .cmp(&other.draw_priority)
            .then_with(|| self.tex_ids.cmp(&other.tex_ids))
            .then_with(|| self.prog_id.cmp(&other.prog_id))
            .then_with(|| self.period.total_cmp(&other.period))
            .then_with(|| self.fade_up.total_cmp(&other.fade_up))
            .then_with(|| self.fade_down.total_cmp(&other.fade_down))
            .then_with(|| self.enable.cmp(&other.enable))
            .then_with(|| cmp_option(&self.enable_window, &other.enable_window, TimeWindow::total_cmp))
            .then_with(|| cmp_option(&self.visibility, &other.visibility, VisibilityRange::total_cmp))
            .then_with(|| self.motion.cmp(&other.motion))
            .then_with(|| self.rotation.cmp(&other.rotation))
            .then_with(|| self.keep_upright.cmp(&other.keep_upright))
            .then_with(|| self.vertex_attrs.cmp(&other.vertex_attrs))
    }
}

impl PartialOrd for DrawableState {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DrawableState {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for DrawableState {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_enabled() {
        let state = DrawableState::default();
        assert!(state.enable);
        assert_eq!(state.prog_id, EMPTY_IDENTITY);
    }

    #[test]
    fn test_equal_states() {
        let a = DrawableState {
            tex_ids: vec![3],
            draw_priority: 10,
            ..Default::default()
        };
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_draw_priority_orders_first() {
        let low = DrawableState {
            draw_priority: 1,
            tex_ids: vec![99],
            ..Default::default()
        };
        let high = DrawableState {
            draw_priority: 2,
            tex_ids: vec![1],
            ..Default::default()
        };
        assert!(low < high);
    }

    #[test]
    fn test_visibility_and_window_distinguish() {
        let base = DrawableState::default();
        let visible = DrawableState {
            visibility: Some(VisibilityRange::new(0.0, 1.0)),
            ..Default::default()
        };
        let windowed = DrawableState {
            enable_window: Some(TimeWindow::new(5.0, 6.0)),
            ..Default::default()
        };
        assert_ne!(base, visible);
        assert_ne!(base, windowed);
        assert_ne!(visible, windowed);
    }

    #[test]
    fn test_attribute_layout_ignores_values() {
        let a = [VertexAttribute::new("size", VertexAttributeValue::Float(1.0))];
        let b = [VertexAttribute::new("size", VertexAttributeValue::Float(7.0))];
        assert_eq!(attribute_layout(&a), attribute_layout(&b));

        let c = [VertexAttribute::new("size", VertexAttributeValue::Int(1))];
        assert_ne!(attribute_layout(&a), attribute_layout(&c));
    }

    #[test]
    fn test_time_window_contains() {
        let window = TimeWindow::new(1.0, 2.0);
        assert!(window.contains(1.5));
        assert!(!window.contains(2.5));
    }
}
