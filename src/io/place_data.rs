//! Place-wide files: descriptor database, segment connection graph, scale table.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use nalgebra::DMatrix;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{info, warn};

use super::floor_data::load_map_graph;
use crate::atlas::place_db::descriptor_matrix;
use crate::atlas::{MapGraph, PlaceDatabase, ScaleTable, SegmentId};
use crate::config::Config;

pub const GLOBAL_FEATURES_FILE: &str = "global_features.json";
pub const CONNECTION_GRAPH_FILE: &str = "connection_graph.json";
pub const SCALE_FILE: &str = "scale.json";

#[derive(Debug, Deserialize)]
struct GlobalFeaturesFile {
    descriptors: Vec<Vec<f32>>,
    segments: Vec<SegmentId>,
}

#[derive(Debug, Default, Deserialize)]
struct ConnectionEntry {
    #[serde(default)]
    adjacent_segment: Vec<SegmentId>,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

/// `scale.json` under the data directory. A missing file yields an empty table.
pub fn load_scale_table(data_dir: &Path) -> Result<ScaleTable> {
    let path = data_dir.join(SCALE_FILE);
    if !path.exists() {
        warn!("No {} in {}; floor scales unknown", SCALE_FILE, data_dir.display());
        return Ok(ScaleTable::default());
    }
    read_json(&path)
}

/// Segment adjacency from `connection_graph.json`.
pub fn load_connection_graph(path: &Path) -> Result<BTreeMap<SegmentId, BTreeSet<SegmentId>>> {
    let raw: BTreeMap<SegmentId, ConnectionEntry> = read_json(path)?;
    Ok(raw
        .into_iter()
        .map(|(seg, entry)| (seg, entry.adjacent_segment.into_iter().collect()))
        .collect())
}

/// Global descriptors and adjacency of one place.
///
/// A missing connection graph is tolerated (no neighbour smoothing).
pub fn load_place_database(place_dir: &Path) -> Result<PlaceDatabase> {
    let features: GlobalFeaturesFile = read_json(&place_dir.join(GLOBAL_FEATURES_FILE))?;
    if features.descriptors.len() != features.segments.len() {
        bail!(
            "{}: {} descriptors but {} segment ids",
            GLOBAL_FEATURES_FILE,
            features.descriptors.len(),
            features.segments.len()
        );
    }
    let descriptors = if features.descriptors.is_empty() {
        DMatrix::zeros(0, 0)
    } else {
        descriptor_matrix(features.descriptors.iter().map(Vec::as_slice))
            .with_context(|| format!("{}: descriptors differ in length", GLOBAL_FEATURES_FILE))?
    };

    let graph_path = place_dir.join(CONNECTION_GRAPH_FILE);
    let graph = if graph_path.exists() {
        load_connection_graph(&graph_path)?
    } else {
        warn!("No {} in {}; coarse voting without neighbours", CONNECTION_GRAPH_FILE, place_dir.display());
        BTreeMap::new()
    };

    info!(
        "Loaded place database: {} reference frames, {} segments in graph",
        features.segments.len(),
        graph.len()
    );
    Ok(PlaceDatabase::new(descriptors, features.segments, graph))
}

/// Everything the navigation system reads at startup.
#[derive(Debug)]
pub struct PlaceData {
    pub graph: MapGraph,
    pub places: PlaceDatabase,
}

impl PlaceData {
    pub fn load(config: &Config) -> Result<Self> {
        let place_dir = config.place_dir();
        let scales = load_scale_table(&config.data_dir())?;
        let graph = load_map_graph(&config.location.place, &place_dir, scales)?;
        let places = load_place_database(&place_dir)?;
        Ok(Self { graph, places })
    }

    /// Map graph only; enough for routing without localization.
    pub fn load_graph(config: &Config) -> Result<MapGraph> {
        let scales = load_scale_table(&config.data_dir())?;
        load_map_graph(&config.location.place, &config.place_dir(), scales)
    }
}
