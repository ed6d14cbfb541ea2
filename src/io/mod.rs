//! Filesystem loaders for map data.
//!
//! Everything below `<io_root>/data/` is read here: the scale table, the
//! per-floor routing files, the place descriptor database and the segment
//! files served to the cache.

pub mod floor_data;
pub mod place_data;
pub mod segment_store;

pub use floor_data::{load_floor, load_map_graph};
pub use place_data::{load_place_database, load_scale_table, PlaceData};
pub use segment_store::{FileSegmentStore, SegmentStore};
