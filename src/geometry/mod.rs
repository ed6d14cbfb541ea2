//! Geometry utilities: floorplan poses and boundary visibility.

pub mod pose;
pub mod visibility;

pub use pose::{heading_of, wrap_degrees, CameraPose, FloorPose};
pub use visibility::{boundary_aware_distance, polyline_length, Boundary};
