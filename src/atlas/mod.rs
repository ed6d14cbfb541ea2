//! Atlas module - static map data of a place and the shared segment cache.
//!
//! The atlas holds everything localization and routing read:
//! - [`MapGraph`] - per-floor anchors, boundaries, access graphs and connectors
//! - [`PlaceDatabase`] - global descriptors and the segment adjacency graph
//! - [`SegmentCache`] - reference-counted local-feature segments shared by sessions
//!
//! Static data is loaded once through [`crate::io`] and is read-only afterwards;
//! only the segment cache changes at runtime.

pub mod floor;
pub mod ids;
pub mod map_graph;
pub mod place_db;
pub mod segment;
pub mod segment_cache;

// Re-export commonly used types
pub use floor::{ConnectorId, Destination, FloorRecord, Interwaypoint, Waypoint};
pub use ids::{FloorKey, SegmentId, SessionId};
pub use map_graph::{MapGraph, ScaleTable};
pub use place_db::{CoarseResult, PlaceDatabase, COARSE_SUCCESS_RATIO};
pub use segment::{ClusterFrame, FloorMap, LocalFeatures, ReferenceFrame, Segment};
pub use segment_cache::SegmentCache;
