//! Screen-space objects and their batching into drawables.
//!
//! Labels, markers and billboards are anchored at a world location but drawn
//! at a fixed size in screen points. This module turns them into a small
//! number of GPU batches.
//!
//! # Architecture
//!
//! ```text
//! ScreenSpaceObject ──┐
//!   (anchor, motion,  │   ScreenSpaceBuilder          ChangeSet
//!    rotation, state, ├──► BTreeMap<DrawableState, ──► AddScreenSpace(..)
//!    geometry)        │     ScreenSpaceDrawable>
//! add_rectangle() ────┘        │ full batch
//!                              ▼
//!                         finished list
//!
//! ScreenSpaceObject + ViewState ──► ScreenSpaceObjectLocation (layout input)
//! ```
//!
//! Moving objects store a velocity and start time on each vertex, and
//! rotated objects store a world-space rotation vector, so neither needs
//! rebuilding from frame to frame.

mod builder;
mod drawable;
mod location;
mod object;
mod state;

pub use builder::{calc_rotation_vec, ScreenSpaceBuilder, DEFAULT_MAX_TRIANGLES, DEFAULT_MAX_VERTICES};
pub use drawable::{ScreenSpaceDrawable, ScreenVertex, VertexMotion};
pub use location::{keep_upright_angle, screen_rotation, ScreenSpaceObjectLocation};
pub use object::{ConvexGeometry, Motion, ScreenSpaceObject, WHITE};
pub use state::{
    attribute_layout, DrawableState, TimeWindow, VertexAttribute, VertexAttributeInfo,
    VertexAttributeKind, VertexAttributeValue,
};
