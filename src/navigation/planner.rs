//! TrajectoryPlanner - pose-to-destination routes across floors and buildings.

use std::collections::BTreeMap;
use std::sync::Arc;

use nalgebra::Point2;
use serde::Serialize;
use tracing::{debug, info};

use super::path_table::{NodeId, PathTables};
use super::shortest_path::ShortestPaths;
use crate::atlas::{FloorKey, FloorRecord, MapGraph};
use crate::error::{NavError, Result};
use crate::geometry::visibility::is_blocked;
use crate::geometry::{boundary_aware_distance, polyline_length, FloorPose};

/// One walked section of a trajectory, on a single floor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Leg {
    /// Label of the anchor the leg ends at.
    pub name: String,
    pub building: String,
    pub floor: String,
    pub polyline: Vec<Point2<f64>>,
    /// Floorplan scale of `floor`, if known.
    pub scale: Option<f64>,
}

impl Leg {
    pub fn floor_key(&self) -> FloorKey {
        FloorKey::new(self.building.clone(), self.floor.clone())
    }

    pub fn length(&self) -> f64 {
        polyline_length(&self.polyline)
    }
}

/// Routes from every interwaypoint of the destination floor to the
/// selected destination, built when a destination is selected.
#[derive(Debug, Clone)]
pub struct DestinationPaths {
    pub floor: FloorKey,
    pub destination_id: String,
    /// Anchor index of the destination on its floor.
    pub anchor: usize,
    /// Interwaypoint anchor -> walk (anchor indices) to the destination.
    back_paths: BTreeMap<usize, Vec<usize>>,
}

impl DestinationPaths {
    pub fn back_path(&self, interwaypoint_anchor: usize) -> Option<&[usize]> {
        self.back_paths.get(&interwaypoint_anchor).map(Vec::as_slice)
    }

    /// Interwaypoint anchors with a route to the destination.
    pub fn reachable_from(&self) -> impl Iterator<Item = usize> + '_ {
        self.back_paths.keys().copied()
    }
}

/// Multi-floor trajectory planner.
pub struct TrajectoryPlanner {
    graph: Arc<MapGraph>,
    tables: PathTables,
}

impl TrajectoryPlanner {
    pub fn new(graph: Arc<MapGraph>) -> Self {
        let tables = PathTables::build(&graph);
        Self { graph, tables }
    }

    pub fn graph(&self) -> &MapGraph {
        &self.graph
    }

    pub fn tables(&self) -> &PathTables {
        &self.tables
    }

    /// Resolve a destination and cache the back-paths of its floor.
    pub fn select_destination(&self, key: &FloorKey, destination_id: &str) -> Result<DestinationPaths> {
        let record = self.graph.floor(key)?;
        let anchor = record
            .destination_index(destination_id)
            .ok_or_else(|| NavError::UnknownDestination {
                building: key.building.clone(),
                floor: key.floor.clone(),
                destination_id: destination_id.to_string(),
            })?;

        let mut back_paths = BTreeMap::new();
        if let Some(floor_paths) = self.tables.floor(key) {
            for iw in &record.interwaypoints {
                if let Some(walk) = floor_paths.paths.walk(iw.anchor, anchor) {
                    back_paths.insert(iw.anchor, walk);
                }
            }
        }

        debug!(
            "Destination {} on {}: {} interwaypoints reach it",
            destination_id,
            key,
            back_paths.len()
        );
        Ok(DestinationPaths {
            floor: key.clone(),
            destination_id: destination_id.to_string(),
            anchor,
            back_paths,
        })
    }

    /// Route from `pose` on `current` to the selected destination.
    ///
    /// An empty result means no path was found.
    pub fn calculate_path(
        &self,
        current: &FloorKey,
        pose: &FloorPose,
        destination: &DestinationPaths,
    ) -> Result<Vec<Leg>> {
        let record = self.graph.floor(current)?;
        let Some(live) = live_paths(record, pose) else {
            debug!("Floor {} is not routable", current);
            return Ok(Vec::new());
        };
        let pose_index = record.pose_index();

        if current == &destination.floor {
            return Ok(self
                .pose_leg(record, &live, pose_index, pose, destination.anchor)
                .map(|leg| vec![leg])
                .unwrap_or_default());
        }

        let mut best: Option<(f64, Vec<Leg>)> = None;
        for candidate in self.tables.candidates(current, &destination.floor) {
            let Some(legs) = self.stitch(record, &live, pose, candidate, destination) else {
                continue;
            };
            let total: f64 = legs.iter().map(Leg::length).sum();
            if best.as_ref().map_or(true, |(b, _)| total < *b) {
                best = Some((total, legs));
            }
        }

        match best {
            Some((total, legs)) => {
                info!("Route {} -> {}: {} legs, length {:.1}", current, destination.floor, legs.len(), total);
                Ok(legs)
            }
            None => {
                info!("No route from {} to {}", current, destination.floor);
                Ok(Vec::new())
            }
        }
    }

    /// Legs for one candidate, or `None` if any part is unreachable.
    fn stitch(
        &self,
        record: &FloorRecord,
        live: &ShortestPaths,
        pose: &FloorPose,
        candidate: &[NodeId],
        destination: &DestinationPaths,
    ) -> Option<Vec<Leg>> {
        let first = self.tables.node(*candidate.first()?);
        let mut legs = vec![self.pose_leg(record, live, record.pose_index(), pose, first.anchor)?];

        for pair in candidate.windows(2) {
            let (a, b) = (self.tables.node(pair[0]), self.tables.node(pair[1]));
            if a.floor != b.floor {
                // Ride between two ends of one connector.
                continue;
            }
            let floor = self.graph.floor(&a.floor).ok()?;
            let walk = self.tables.floor(&a.floor)?.leg(a.anchor, b.anchor)?;
            legs.push(self.anchor_leg(floor, walk)?);
        }

        let last = self.tables.node(*candidate.last()?);
        let dest_floor = self.graph.floor(&destination.floor).ok()?;
        let back = destination.back_path(last.anchor)?;
        legs.push(self.anchor_leg(dest_floor, back)?);
        Some(legs)
    }

    /// Walk from the live pose to anchor `target` on the current floor.
    fn pose_leg(
        &self,
        record: &FloorRecord,
        live: &ShortestPaths,
        pose_index: usize,
        pose: &FloorPose,
        target: usize,
    ) -> Option<Leg> {
        let walk = live.walk(pose_index, target)?;
        let mut polyline = Vec::with_capacity(walk.len());
        for &i in &walk {
            if i == pose_index {
                polyline.push(pose.location());
            } else {
                polyline.push(record.anchor_location(i)?);
            }
        }
        Some(self.make_leg(record, target, polyline))
    }

    /// Leg along a precomputed walk of anchor indices.
    fn anchor_leg(&self, record: &FloorRecord, walk: &[usize]) -> Option<Leg> {
        let end = *walk.last()?;
        let polyline = walk
            .iter()
            .map(|&i| record.anchor_location(i))
            .collect::<Option<Vec<_>>>()?;
        Some(self.make_leg(record, end, polyline))
    }

    fn make_leg(&self, record: &FloorRecord, end: usize, polyline: Vec<Point2<f64>>) -> Leg {
        Leg {
            name: record.anchor_label(end).unwrap_or_default().to_string(),
            building: record.key.building.clone(),
            floor: record.key.floor.clone(),
            polyline,
            scale: self.graph.scale(&record.key),
        }
    }
}

/// Pose-to-anchor weight when the pose sits exactly on a visible anchor.
const COINCIDENT_EDGE: f64 = 1e-9;

/// Shortest paths of the floor graph with the live pose written into its
/// row and column. `None` if the floor has no access graph.
fn live_paths(record: &FloorRecord, pose: &FloorPose) -> Option<ShortestPaths> {
    let mut m = record.access_graph()?.clone();
    let p = record.pose_index();
    let here = pose.location();
    for (i, anchor) in record.anchor_locations().iter().enumerate() {
        let mut d = boundary_aware_distance(&record.boundaries, &here, anchor);
        if d == 0.0 && !is_blocked(&record.boundaries, &here, anchor) {
            // Standing on the anchor: keep the edge.
            d = COINCIDENT_EDGE;
        }
        m[(i, p)] = d;
        m[(p, i)] = d;
    }
    Some(ShortestPaths::floyd_warshall(&m))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::floor::test_support::*;
    use crate::atlas::{FloorRecord, ScaleTable};
    use approx::assert_relative_eq;

    fn f1() -> FloorKey {
        FloorKey::new("B", "1_floor")
    }

    fn f2() -> FloorKey {
        FloorKey::new("B", "2_floor")
    }

    /// Floor 1: lobby (0,0), elevator E1 at (100,0).
    /// Floor 2: office at (100,50), elevator E1 at (100,0).
    fn two_floor_planner() -> TrajectoryPlanner {
        let floor1 = floor(
            "B",
            "1_floor",
            vec![destination("lobby", 0.0, 0.0)],
            vec![waypoint("E1", 100.0, 0.0, Some("1"))],
        );
        let floor2 = floor(
            "B",
            "2_floor",
            vec![destination("office", 100.0, 50.0)],
            vec![waypoint("E1", 100.0, 0.0, Some("1"))],
        );
        let mut scales = ScaleTable::default();
        scales.insert("P", &f1(), 0.02);
        let graph = MapGraph::new("P", "/data/P", vec![floor1, floor2], scales);
        TrajectoryPlanner::new(Arc::new(graph))
    }

    #[test]
    fn test_two_floor_route_through_elevator() {
        let planner = two_floor_planner();
        let dest = planner.select_destination(&f2(), "office").unwrap();
        let pose = FloorPose::new(50.0, 0.0, 0.0);

        let legs = planner.calculate_path(&f1(), &pose, &dest).unwrap();
        assert_eq!(legs.len(), 2);

        assert_eq!(legs[0].name, "E1");
        assert_eq!(legs[0].floor, "1_floor");
        assert_eq!(legs[0].polyline, vec![Point2::new(50.0, 0.0), Point2::new(100.0, 0.0)]);
        assert_eq!(legs[0].scale, Some(0.02));

        assert_eq!(legs[1].name, "Room office");
        assert_eq!(legs[1].floor, "2_floor");
        assert_eq!(legs[1].polyline, vec![Point2::new(100.0, 0.0), Point2::new(100.0, 50.0)]);
        assert_eq!(legs[1].scale, None);
        assert_relative_eq!(legs.iter().map(Leg::length).sum::<f64>(), 100.0);
    }

    #[test]
    fn test_same_floor_single_leg() {
        let planner = two_floor_planner();
        let dest = planner.select_destination(&f1(), "lobby").unwrap();
        let legs = planner
            .calculate_path(&f1(), &FloorPose::new(30.0, 40.0, 0.0), &dest)
            .unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].polyline, vec![Point2::new(30.0, 40.0), Point2::new(0.0, 0.0)]);
        assert_relative_eq!(legs[0].length(), 50.0);
    }

    #[test]
    fn test_pose_on_anchor_reaches_it_directly() {
        let planner = two_floor_planner();
        let dest = planner.select_destination(&f1(), "lobby").unwrap();
        let pose = FloorPose::new(0.0, 0.0, 0.0);

        let legs = planner.calculate_path(&f1(), &pose, &dest).unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].polyline, vec![Point2::new(0.0, 0.0), Point2::new(0.0, 0.0)]);
        assert_relative_eq!(legs[0].length(), 0.0);
    }

    #[test]
    fn test_blocked_line_of_sight_routes_around() {
        // A wall between the pose and the lobby forces a detour via w.
        let dests = vec![destination("lobby", 0.0, 0.0)];
        let wps = vec![waypoint("w", 10.0, 20.0, None)];
        let graph_m = complete_graph(&dests, &wps);
        let record = FloorRecord::new(
            f1(),
            vec![[10.0, -5.0, 10.0, 5.0]],
            dests,
            wps,
            Some(graph_m),
        )
        .unwrap();
        let graph = MapGraph::new("P", "/data/P", vec![record], ScaleTable::default());
        let planner = TrajectoryPlanner::new(Arc::new(graph));

        let dest = planner.select_destination(&f1(), "lobby").unwrap();
        let legs = planner
            .calculate_path(&f1(), &FloorPose::new(20.0, 0.0, 0.0), &dest)
            .unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(
            legs[0].polyline,
            vec![Point2::new(20.0, 0.0), Point2::new(10.0, 20.0), Point2::new(0.0, 0.0)]
        );
    }

    #[test]
    fn test_back_paths_cover_interwaypoints() {
        // Anchors: 3 destinations, then waypoints at anchors 3..=7 with
        // interwaypoints at anchors 3 and 7.
        let dests = vec![
            destination("d0", 0.0, 0.0),
            destination("d1", 10.0, 0.0),
            destination("d2", 20.0, 0.0),
        ];
        let wps = vec![
            waypoint("E1", 0.0, 10.0, Some("1")),
            waypoint("w4", 10.0, 10.0, None),
            waypoint("w5", 20.0, 10.0, None),
            waypoint("w6", 30.0, 10.0, None),
            waypoint("S2", 40.0, 10.0, Some("2")),
        ];
        let record = floor("B", "2_floor", dests, wps);
        let graph = MapGraph::new("P", "/data/P", vec![record], ScaleTable::default());
        let planner = TrajectoryPlanner::new(Arc::new(graph));

        let dest = planner.select_destination(&f2(), "d1").unwrap();
        assert_eq!(dest.anchor, 1);
        assert_eq!(dest.reachable_from().collect::<Vec<_>>(), vec![3, 7]);
        let back = dest.back_path(7).unwrap();
        assert_eq!(back.first(), Some(&7));
        assert_eq!(back.last(), Some(&1));
    }

    #[test]
    fn test_unknown_destination_and_floor() {
        let planner = two_floor_planner();
        assert!(matches!(
            planner.select_destination(&f1(), "nope"),
            Err(NavError::UnknownDestination { .. })
        ));
        assert!(matches!(
            planner.select_destination(&FloorKey::new("X", "1_floor"), "lobby"),
            Err(NavError::UnknownFloor { .. })
        ));
    }

    #[test]
    fn test_unreachable_destination_yields_empty_route() {
        let floor1 = floor("B", "1_floor", vec![destination("lobby", 0.0, 0.0)], vec![]);
        let floor2 = floor("B", "2_floor", vec![destination("office", 0.0, 0.0)], vec![]);
        let graph = MapGraph::new("P", "/data/P", vec![floor1, floor2], ScaleTable::default());
        let planner = TrajectoryPlanner::new(Arc::new(graph));
        let dest = planner.select_destination(&f2(), "office").unwrap();
        let legs = planner
            .calculate_path(&f1(), &FloorPose::new(5.0, 5.0, 0.0), &dest)
            .unwrap();
        assert!(legs.is_empty());
    }
}
