//! Utility types and functions

pub mod detection;
pub mod labels;

pub use detection::{apply_nms, BoundingBox, Detection};
pub use labels::{Label, LabelCatalog};
