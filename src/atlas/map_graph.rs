//! MapGraph - every floor of a place plus the connector index.
//!
//! The graph is built once at startup and shared read-only by the planner
//! and the orchestrator.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::floor::{ConnectorId, Destination, FloorRecord, Interwaypoint};
use super::ids::FloorKey;
use crate::error::{NavError, Result};

/// Floorplan scale (real-world units per pixel) keyed by place/building/floor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct ScaleTable(HashMap<String, HashMap<String, HashMap<String, f64>>>);

impl ScaleTable {
    pub fn scale(&self, place: &str, key: &FloorKey) -> Option<f64> {
        self.0
            .get(place)
            .and_then(|buildings| buildings.get(&key.building))
            .and_then(|floors| floors.get(&key.floor))
            .copied()
    }

    pub fn insert(&mut self, place: &str, key: &FloorKey, scale: f64) {
        self.0
            .entry(place.to_string())
            .or_default()
            .entry(key.building.clone())
            .or_default()
            .insert(key.floor.clone(), scale);
    }
}

/// All floors of one place.
#[derive(Debug, Clone)]
pub struct MapGraph {
    pub place: String,
    /// `data/<place>` directory the graph was loaded from.
    pub root: PathBuf,
    floors: BTreeMap<FloorKey, FloorRecord>,
    /// Connector id -> every floor-local end of that connector.
    connections: BTreeMap<ConnectorId, Vec<Interwaypoint>>,
    scales: ScaleTable,
}

impl MapGraph {
    pub fn new(
        place: impl Into<String>,
        root: impl Into<PathBuf>,
        floors: Vec<FloorRecord>,
        scales: ScaleTable,
    ) -> Self {
        let mut connections: BTreeMap<ConnectorId, Vec<Interwaypoint>> = BTreeMap::new();
        let floors: BTreeMap<FloorKey, FloorRecord> =
            floors.into_iter().map(|f| (f.key.clone(), f)).collect();
        for record in floors.values() {
            for iw in &record.interwaypoints {
                connections
                    .entry(iw.connector.clone())
                    .or_default()
                    .push(iw.clone());
            }
        }

        Self {
            place: place.into(),
            root: root.into(),
            floors,
            connections,
            scales,
        }
    }

    pub fn floor(&self, key: &FloorKey) -> Result<&FloorRecord> {
        self.floors.get(key).ok_or_else(|| NavError::UnknownFloor {
            building: key.building.clone(),
            floor: key.floor.clone(),
        })
    }

    pub fn floors(&self) -> impl Iterator<Item = &FloorRecord> {
        self.floors.values()
    }

    pub fn num_floors(&self) -> usize {
        self.floors.len()
    }

    /// Every end of `connector`, across floors and buildings.
    pub fn connection(&self, connector: &ConnectorId) -> &[Interwaypoint] {
        self.connections
            .get(connector)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn connections(&self) -> impl Iterator<Item = (&ConnectorId, &Vec<Interwaypoint>)> {
        self.connections.iter()
    }

    /// Interwaypoints located on `key`.
    pub fn interwaypoints_on(&self, key: &FloorKey) -> &[Interwaypoint] {
        self.floors
            .get(key)
            .map(|f| f.interwaypoints.as_slice())
            .unwrap_or(&[])
    }

    /// Destinations of a floor sorted by name.
    pub fn destinations(&self, key: &FloorKey) -> Result<Vec<Destination>> {
        let mut destinations = self.floor(key)?.destinations.clone();
        destinations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(destinations)
    }

    pub fn scale(&self, key: &FloorKey) -> Option<f64> {
        self.scales.scale(&self.place, key)
    }

    pub fn scale_for(&self, place: &str, key: &FloorKey) -> Option<f64> {
        self.scales.scale(place, key)
    }

    /// Path of the floorplan image of `key`.
    pub fn floorplan_path(&self, key: &FloorKey) -> PathBuf {
        floorplan_path(&self.root, key)
    }
}

pub(crate) fn floorplan_path(place_dir: &Path, key: &FloorKey) -> PathBuf {
    place_dir
        .join(&key.building)
        .join(&key.floor)
        .join("floorplan.png")
}
