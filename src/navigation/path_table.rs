//! Precomputed routing tables.
//!
//! Built once from the [`MapGraph`]:
//! - per routable floor, shortest paths of the static access graph and the
//!   walks between every ordered pair of its interwaypoints
//! - per ordered pair of floors, every interwaypoint sequence leading from
//!   one to the other in which each connector is entered and left exactly
//!   once (visited twice)

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use tracing::{debug, info};

use super::shortest_path::ShortestPaths;
use crate::atlas::{ConnectorId, FloorKey, Interwaypoint, MapGraph};

/// Index of an interwaypoint instance in [`PathTables::nodes`].
pub type NodeId = usize;

/// Static shortest paths of one floor.
#[derive(Debug, Clone)]
pub struct FloorPaths {
    pub paths: ShortestPaths,
    /// `(from anchor, to anchor)` -> walk between two interwaypoints.
    legs: HashMap<(usize, usize), Vec<usize>>,
}

impl FloorPaths {
    /// Cached walk between two interwaypoint anchors of this floor.
    pub fn leg(&self, from: usize, to: usize) -> Option<&[usize]> {
        self.legs.get(&(from, to)).map(Vec::as_slice)
    }

    pub fn num_legs(&self) -> usize {
        self.legs.len()
    }
}

/// One BFS frontier entry.
struct Partial {
    nodes: Vec<NodeId>,
    visits: HashMap<ConnectorId, u8>,
    seen: HashSet<NodeId>,
}

/// All precomputed tables of a place.
#[derive(Debug, Clone, Default)]
pub struct PathTables {
    floors: BTreeMap<FloorKey, FloorPaths>,
    /// Every interwaypoint instance, unique per `(connector, floor)`.
    nodes: Vec<Interwaypoint>,
    /// Ordered `(source, destination)` floors -> candidate node sequences.
    candidates: BTreeMap<(FloorKey, FloorKey), Vec<Vec<NodeId>>>,
}

impl PathTables {
    pub fn build(graph: &MapGraph) -> Self {
        let mut floors = BTreeMap::new();
        for record in graph.floors() {
            let Some(m) = record.access_graph() else {
                continue;
            };
            let paths = ShortestPaths::floyd_warshall(m);
            let mut legs = HashMap::new();
            for a in &record.interwaypoints {
                for b in &record.interwaypoints {
                    if a.anchor == b.anchor {
                        continue;
                    }
                    if let Some(walk) = paths.walk(a.anchor, b.anchor) {
                        legs.insert((a.anchor, b.anchor), walk);
                    }
                }
            }
            floors.insert(record.key.clone(), FloorPaths { paths, legs });
        }

        let mut nodes: Vec<Interwaypoint> = Vec::new();
        let mut keys: HashSet<(ConnectorId, FloorKey)> = HashSet::new();
        for (_, ends) in graph.connections() {
            for iw in ends {
                if keys.insert((iw.connector.clone(), iw.floor.clone())) {
                    nodes.push(iw.clone());
                }
            }
        }

        let mut tables = Self {
            floors,
            nodes,
            candidates: BTreeMap::new(),
        };

        let floor_keys: Vec<FloorKey> = graph.floors().map(|f| f.key.clone()).collect();
        for source in &floor_keys {
            for target in &floor_keys {
                if source == target {
                    continue;
                }
                let found = tables.enumerate(source, target);
                if !found.is_empty() {
                    debug!("{} -> {}: {} candidate paths", source, target, found.len());
                    tables
                        .candidates
                        .insert((source.clone(), target.clone()), found);
                }
            }
        }

        info!(
            "Path tables: {} routable floors, {} interwaypoints, {} floor pairs connected",
            tables.floors.len(),
            tables.nodes.len(),
            tables.candidates.len()
        );
        tables
    }

    /// Neighbours of `node`: same-floor instances and the other ends of its connector.
    fn neighbors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let here = &self.nodes[node];
        self.nodes.iter().enumerate().filter_map(move |(i, other)| {
            let linked = i != node && (other.floor == here.floor || other.connector == here.connector);
            linked.then_some(i)
        })
    }

    /// BFS over interwaypoint instances from `source` to `target`.
    fn enumerate(&self, source: &FloorKey, target: &FloorKey) -> Vec<Vec<NodeId>> {
        let mut queue: VecDeque<Partial> = VecDeque::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if &node.floor == source {
                queue.push_back(Partial {
                    nodes: vec![i],
                    visits: HashMap::from([(node.connector.clone(), 1)]),
                    seen: HashSet::from([i]),
                });
            }
        }

        let mut accepted = Vec::new();
        while let Some(partial) = queue.pop_front() {
            let last = partial.nodes[partial.nodes.len() - 1];
            for next in self.neighbors(last) {
                if partial.seen.contains(&next) {
                    continue;
                }
                let connector = &self.nodes[next].connector;
                let count = partial.visits.get(connector).copied().unwrap_or(0) + 1;
                if count > 2 {
                    continue;
                }

                let mut extended = Partial {
                    nodes: partial.nodes.clone(),
                    visits: partial.visits.clone(),
                    seen: partial.seen.clone(),
                };
                extended.nodes.push(next);
                extended.visits.insert(connector.clone(), count);
                extended.seen.insert(next);

                if &self.nodes[next].floor == target {
                    if extended.visits.values().all(|&v| v == 2) {
                        accepted.push(extended.nodes);
                        continue;
                    }
                }
                queue.push_back(extended);
            }
        }
        accepted
    }

    pub fn floor(&self, key: &FloorKey) -> Option<&FloorPaths> {
        self.floors.get(key)
    }

    pub fn node(&self, id: NodeId) -> &Interwaypoint {
        &self.nodes[id]
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Candidate node sequences from `source` to `target`.
    pub fn candidates(&self, source: &FloorKey, target: &FloorKey) -> &[Vec<NodeId>] {
        self.candidates
            .get(&(source.clone(), target.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atlas::floor::test_support::*;
    use crate::atlas::ScaleTable;

    /// Three floors of one building: 1 <-E-> 2 <-S-> 3, plus an elevator
    /// E3 that links 1 and 3 directly.
    fn three_floor_graph() -> MapGraph {
        let f1 = floor(
            "B",
            "1_floor",
            vec![destination("a", 0.0, 0.0)],
            vec![
                waypoint("E", 10.0, 0.0, Some("E")),
                waypoint("E3", 20.0, 0.0, Some("E3")),
            ],
        );
        let f2 = floor(
            "B",
            "2_floor",
            vec![destination("b", 0.0, 0.0)],
            vec![
                waypoint("E", 10.0, 0.0, Some("E")),
                waypoint("S", 30.0, 0.0, Some("S")),
            ],
        );
        let f3 = floor(
            "B",
            "3_floor",
            vec![destination("c", 0.0, 0.0)],
            vec![
                waypoint("S", 30.0, 0.0, Some("S")),
                waypoint("E3", 20.0, 0.0, Some("E3")),
            ],
        );
        MapGraph::new("P", "/data/P", vec![f1, f2, f3], ScaleTable::default())
    }

    fn connectors(tables: &PathTables, path: &[NodeId]) -> Vec<String> {
        path.iter().map(|&n| tables.node(n).connector.0.clone()).collect()
    }

    #[test]
    fn test_every_candidate_visits_connectors_twice() {
        let graph = three_floor_graph();
        let tables = PathTables::build(&graph);
        let f1 = FloorKey::new("B", "1_floor");
        let f3 = FloorKey::new("B", "3_floor");

        let candidates = tables.candidates(&f1, &f3);
        assert!(!candidates.is_empty());
        for path in candidates {
            let mut counts: HashMap<String, usize> = HashMap::new();
            for c in connectors(&tables, path) {
                *counts.entry(c).or_default() += 1;
            }
            assert!(counts.values().all(|&c| c == 2), "bad parity in {:?}", path);
            assert_eq!(tables.node(path[0]).floor, f1);
            assert_eq!(tables.node(path[path.len() - 1]).floor, f3);
        }

        let sequences: Vec<Vec<String>> = candidates.iter().map(|p| connectors(&tables, p)).collect();
        assert!(sequences.contains(&vec!["E3".to_string(), "E3".to_string()]));
        assert!(sequences.contains(&vec![
            "E".to_string(),
            "E".to_string(),
            "S".to_string(),
            "S".to_string()
        ]));
    }

    #[test]
    fn test_interwaypoint_legs_cached_per_floor() {
        let graph = three_floor_graph();
        let tables = PathTables::build(&graph);
        let f2 = tables.floor(&FloorKey::new("B", "2_floor")).unwrap();
        // Anchors: b=0, E=1, S=2.
        assert_eq!(f2.leg(1, 2), Some(&[1, 2][..]));
        assert_eq!(f2.leg(2, 1), Some(&[2, 1][..]));
        assert_eq!(f2.num_legs(), 2);
    }

    #[test]
    fn test_unconnected_floor_has_no_candidates() {
        let f1 = floor("B", "1_floor", vec![destination("a", 0.0, 0.0)], vec![]);
        let f2 = floor("B", "2_floor", vec![destination("b", 0.0, 0.0)], vec![]);
        let graph = MapGraph::new("P", "/data/P", vec![f1, f2], ScaleTable::default());
        let tables = PathTables::build(&graph);
        assert!(tables
            .candidates(&FloorKey::new("B", "1_floor"), &FloorKey::new("B", "2_floor"))
            .is_empty());
        assert_eq!(tables.num_nodes(), 0);
    }
}
