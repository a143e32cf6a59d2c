//! Touch picking against registered shapes.
//!
//! Layers register a shape for every feature the user can tap. A pick
//! projects each enabled, visible shape with the current [`ViewState`] and
//! measures the pixel distance from the touch point. Moving shapes are
//! placed at the query time first.
//!
//! [`ViewState`]: crate::view::ViewState

mod manager;
mod shape;

pub use manager::{SelectedObject, SelectionManager};
pub use shape::{box_faces, center_polys, rect_solid_faces, Selectable, SelectableShape};
