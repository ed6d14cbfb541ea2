//! Per-floor routing data: `boundaries_interwaypoint.json` and `access_graph.csv`.
//!
//! Layout below the place directory:
//! - `<building>/<floor>/boundaries_interwaypoint.json`
//! - `<building>/<floor>/access_graph.csv` (headerless, `(A+1)` rows of `A+1` values)
//!
//! Anchors keep the key order of the JSON file (`serde_json` is built with
//! `preserve_order`), which is the order the access graph was built in.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use csv::ReaderBuilder;
use nalgebra::{DMatrix, Point2};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::atlas::{ConnectorId, Destination, FloorKey, FloorRecord, MapGraph, ScaleTable, Waypoint};
use crate::geometry::Boundary;

pub const BOUNDARIES_FILE: &str = "boundaries_interwaypoint.json";
pub const ACCESS_GRAPH_FILE: &str = "access_graph.csv";

#[derive(Debug, Deserialize)]
struct BoundariesFile {
    #[serde(default)]
    lines: Vec<Boundary>,
    #[serde(default)]
    add_lines: Vec<Boundary>,
    #[serde(default)]
    destination: Map<String, Value>,
    #[serde(default)]
    waypoints: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DestinationEntry {
    id: Value,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaypointEntry {
    location: [f64; 2],
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    index: Option<Value>,
}

/// Identifier fields may be strings or bare numbers in the floor files.
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Parse an `"x-y"` destination key.
fn parse_location_key(key: &str) -> Option<Point2<f64>> {
    let (x, y) = key.split_once('-')?;
    Some(Point2::new(x.trim().parse().ok()?, y.trim().parse().ok()?))
}

/// Floor anchors and boundaries read from the boundaries file.
#[derive(Debug, Default)]
pub struct FloorAnchors {
    pub boundaries: Vec<Boundary>,
    pub destinations: Vec<Destination>,
    pub waypoints: Vec<Waypoint>,
}

pub fn load_floor_anchors(path: &Path) -> Result<FloorAnchors> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let parsed: BoundariesFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let mut boundaries = parsed.lines;
    boundaries.extend(parsed.add_lines);

    let mut destinations = Vec::with_capacity(parsed.destination.len());
    for (key, value) in parsed.destination {
        let location = parse_location_key(&key)
            .with_context(|| format!("Bad destination location key {:?}", key))?;
        let entry: DestinationEntry = serde_json::from_value(value)
            .with_context(|| format!("Bad destination entry {:?}", key))?;
        let id = id_string(&entry.id)
            .with_context(|| format!("Destination {:?} has no usable id", key))?;
        destinations.push(Destination {
            name: entry.name.unwrap_or_else(|| id.clone()),
            id,
            location,
        });
    }

    let mut waypoints = Vec::with_capacity(parsed.waypoints.len());
    for (id, value) in parsed.waypoints {
        let entry: WaypointEntry = serde_json::from_value(value)
            .with_context(|| format!("Bad waypoint entry {:?}", id))?;
        let connector = match (entry.kind.as_deref(), entry.index.as_ref()) {
            (Some("interwaypoint"), Some(index)) => id_string(index).map(ConnectorId),
            (Some("interwaypoint"), None) => {
                warn!("Interwaypoint {} in {} has no connector index", id, path.display());
                None
            }
            _ => None,
        };
        waypoints.push(Waypoint {
            id,
            location: Point2::new(entry.location[0], entry.location[1]),
            connector,
        });
    }

    Ok(FloorAnchors {
        boundaries,
        destinations,
        waypoints,
    })
}

pub fn load_access_graph(path: &Path) -> Result<DMatrix<f64>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut values = Vec::new();
    let mut width = None;
    let mut rows = 0;
    for rec in rdr.records() {
        let rec = rec?;
        match width {
            None => width = Some(rec.len()),
            Some(w) if w != rec.len() => {
                bail!("{}: row {} has {} values, expected {}", path.display(), rows, rec.len(), w)
            }
            Some(_) => {}
        }
        for field in rec.iter() {
            let v: f64 = field
                .parse()
                .with_context(|| format!("{}: bad value {:?} in row {}", path.display(), field, rows))?;
            values.push(v);
        }
        rows += 1;
    }

    Ok(DMatrix::from_row_slice(rows, width.unwrap_or(0), &values))
}

/// Load one floor directory into a validated record.
pub fn load_floor(floor_dir: &Path, key: FloorKey) -> Result<FloorRecord> {
    let boundaries_path = floor_dir.join(BOUNDARIES_FILE);
    let anchors = if boundaries_path.exists() {
        load_floor_anchors(&boundaries_path)?
    } else {
        warn!("No {} for {}; floor has no anchors", BOUNDARIES_FILE, key);
        FloorAnchors::default()
    };

    let graph_path = floor_dir.join(ACCESS_GRAPH_FILE);
    let access_graph = if graph_path.exists() {
        Some(load_access_graph(&graph_path)?)
    } else {
        None
    };

    Ok(FloorRecord::new(
        key,
        anchors.boundaries,
        anchors.destinations,
        anchors.waypoints,
        access_graph,
    )?)
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<(String, PathBuf)>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("Failed to list {}", dir.display()))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                dirs.push((name.to_string(), entry.path()));
            }
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Load every `<building>/<floor>` below `place_dir`.
///
/// A floor that fails to load or validate is logged and skipped.
pub fn load_map_graph(place: &str, place_dir: &Path, scales: ScaleTable) -> Result<MapGraph> {
    let mut floors = Vec::new();
    for (building, building_dir) in sorted_subdirs(place_dir)? {
        for (floor, floor_dir) in sorted_subdirs(&building_dir)? {
            let key = FloorKey::new(building.clone(), floor);
            match load_floor(&floor_dir, key.clone()) {
                Ok(record) => floors.push(record),
                Err(e) => warn!("Skipping floor {}: {:#}", key, e),
            }
        }
    }

    let graph = MapGraph::new(place, place_dir, floors, scales);
    info!(
        "Loaded map graph for {}: {} floors, {} connectors",
        place,
        graph.num_floors(),
        graph.connections().count()
    );
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOOR_JSON: &str = r#"{
        "lines": [[0, 0, 0, 100]],
        "add_lines": [[50, 0, 50, 10]],
        "destination": {
            "30-40": {"id": "d7", "name": "Kitchen"},
            "10-20": {"id": 3, "name": "Atrium"}
        },
        "waypoints": {
            "w_1": {"location": [5, 5]},
            "E1": {"location": [90, 90], "type": "interwaypoint", "index": 12}
        }
    }"#;

    fn write_floor(root: &Path, building: &str, floor: &str, json: Option<&str>, csv: Option<&str>) {
        let dir = root.join(building).join(floor);
        fs::create_dir_all(&dir).unwrap();
        if let Some(json) = json {
            fs::write(dir.join(BOUNDARIES_FILE), json).unwrap();
        }
        if let Some(csv) = csv {
            fs::write(dir.join(ACCESS_GRAPH_FILE), csv).unwrap();
        }
    }

    fn zeros_csv(n: usize) -> String {
        (0..n)
            .map(|_| vec!["0"; n].join(","))
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[test]
    fn test_anchor_order_follows_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(BOUNDARIES_FILE);
        fs::write(&path, FLOOR_JSON).unwrap();

        let anchors = load_floor_anchors(&path).unwrap();
        assert_eq!(anchors.boundaries.len(), 2);
        let ids: Vec<&str> = anchors.destinations.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["d7", "3"]);
        assert_eq!(anchors.destinations[1].location, Point2::new(10.0, 20.0));
        assert_eq!(anchors.waypoints[0].id, "w_1");
        assert!(anchors.waypoints[0].connector.is_none());
        assert_eq!(anchors.waypoints[1].connector, Some(ConnectorId("12".into())));
    }

    #[test]
    fn test_access_graph_csv() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join(ACCESS_GRAPH_FILE);
        fs::write(&path, "0, 1.5\n2.5, 0\n").unwrap();
        let m = load_access_graph(&path).unwrap();
        assert_eq!(m.shape(), (2, 2));
        assert_eq!(m[(0, 1)], 1.5);
        assert_eq!(m[(1, 0)], 2.5);

        fs::write(&path, "0,1\n2\n").unwrap();
        assert!(load_access_graph(&path).is_err());
    }

    #[test]
    fn test_load_map_graph_skips_invalid_floor() {
        let tmp = tempfile::tempdir().unwrap();
        // 4 anchors -> 5x5 graph.
        write_floor(tmp.path(), "LightHouse", "6_floor", Some(FLOOR_JSON), Some(&zeros_csv(5)));
        write_floor(tmp.path(), "LightHouse", "3_floor", Some(FLOOR_JSON), Some(&zeros_csv(3)));
        write_floor(tmp.path(), "Annex", "1_floor", None, None);

        let graph = load_map_graph("NYC", tmp.path(), ScaleTable::default()).unwrap();
        assert_eq!(graph.num_floors(), 2);
        assert!(graph.floor(&FloorKey::new("LightHouse", "3_floor")).is_err());

        let six = graph.floor(&FloorKey::new("LightHouse", "6_floor")).unwrap();
        assert!(six.is_routable());
        assert_eq!(six.interwaypoints[0].anchor, 3);

        let annex = graph.floor(&FloorKey::new("Annex", "1_floor")).unwrap();
        assert_eq!(annex.num_anchors(), 0);
        assert!(!annex.is_routable());

        assert_eq!(graph.connection(&ConnectorId("12".into())).len(), 1);
    }
}
