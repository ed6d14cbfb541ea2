//! Per-floor static data: anchors, boundaries and the access graph.
//!
//! Anchors are indexed as `[destinations..., waypoints...]`; the access
//! graph has one extra trailing row/column for the live query pose. Both
//! invariants are checked in [`FloorRecord::new`].

use std::fmt;

use nalgebra::{DMatrix, Point2};
use serde::Serialize;

use super::ids::FloorKey;
use crate::error::{NavError, Result};
use crate::geometry::Boundary;

/// Identifier shared by all physical ends of one elevator / stair link.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ConnectorId(pub String);

impl fmt::Display for ConnectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A selectable destination.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Destination {
    pub id: String,
    pub name: String,
    pub location: Point2<f64>,
}

/// A named routing point; `connector` is set for interwaypoints.
#[derive(Debug, Clone, PartialEq)]
pub struct Waypoint {
    pub id: String,
    pub location: Point2<f64>,
    pub connector: Option<ConnectorId>,
}

/// One floor-local end of a connector.
#[derive(Debug, Clone, PartialEq)]
pub struct Interwaypoint {
    /// Waypoint id on its floor.
    pub waypoint: String,
    pub location: Point2<f64>,
    pub connector: ConnectorId,
    pub floor: FloorKey,
    /// Anchor index of the waypoint in its floor's access graph.
    pub anchor: usize,
}

/// Static routing data of one floor.
#[derive(Debug, Clone)]
pub struct FloorRecord {
    pub key: FloorKey,
    pub boundaries: Vec<Boundary>,
    pub destinations: Vec<Destination>,
    pub waypoints: Vec<Waypoint>,
    pub interwaypoints: Vec<Interwaypoint>,
    access_graph: Option<DMatrix<f64>>,
}

impl FloorRecord {
    /// Build a record, checking that the access graph is `(A+1)×(A+1)`.
    ///
    /// A floor without an access graph is valid but not routable.
    pub fn new(
        key: FloorKey,
        boundaries: Vec<Boundary>,
        destinations: Vec<Destination>,
        waypoints: Vec<Waypoint>,
        access_graph: Option<DMatrix<f64>>,
    ) -> Result<Self> {
        let num_anchors = destinations.len() + waypoints.len();
        if let Some(m) = &access_graph {
            if m.nrows() != num_anchors + 1 || m.ncols() != num_anchors + 1 {
                return Err(NavError::InvalidFloor {
                    building: key.building.clone(),
                    floor: key.floor.clone(),
                    reason: format!(
                        "access graph is {}x{}, expected {}x{} for {} anchors",
                        m.nrows(),
                        m.ncols(),
                        num_anchors + 1,
                        num_anchors + 1,
                        num_anchors
                    ),
                });
            }
        }

        let offset = destinations.len();
        let interwaypoints = waypoints
            .iter()
            .enumerate()
            .filter_map(|(i, w)| {
                w.connector.as_ref().map(|connector| Interwaypoint {
                    waypoint: w.id.clone(),
                    location: w.location,
                    connector: connector.clone(),
                    floor: key.clone(),
                    anchor: offset + i,
                })
            })
            .collect();

        Ok(Self {
            key,
            boundaries,
            destinations,
            waypoints,
            interwaypoints,
            access_graph,
        })
    }

    /// Number of anchors `A` (destinations + waypoints).
    pub fn num_anchors(&self) -> usize {
        self.destinations.len() + self.waypoints.len()
    }

    /// Index of the dynamic pose row/column.
    pub fn pose_index(&self) -> usize {
        self.num_anchors()
    }

    pub fn access_graph(&self) -> Option<&DMatrix<f64>> {
        self.access_graph.as_ref()
    }

    pub fn is_routable(&self) -> bool {
        self.access_graph.is_some()
    }

    /// Location of anchor `index`.
    pub fn anchor_location(&self, index: usize) -> Option<Point2<f64>> {
        let n_dest = self.destinations.len();
        if index < n_dest {
            Some(self.destinations[index].location)
        } else {
            self.waypoints.get(index - n_dest).map(|w| w.location)
        }
    }

    /// Human-readable label of anchor `index` (destination name or waypoint id).
    pub fn anchor_label(&self, index: usize) -> Option<&str> {
        let n_dest = self.destinations.len();
        if index < n_dest {
            Some(self.destinations[index].name.as_str())
        } else {
            self.waypoints.get(index - n_dest).map(|w| w.id.as_str())
        }
    }

    /// All anchor locations in access-graph order.
    pub fn anchor_locations(&self) -> Vec<Point2<f64>> {
        self.destinations
            .iter()
            .map(|d| d.location)
            .chain(self.waypoints.iter().map(|w| w.location))
            .collect()
    }

    /// Anchor index of a destination id.
    pub fn destination_index(&self, destination_id: &str) -> Option<usize> {
        self.destinations.iter().position(|d| d.id == destination_id)
    }

    /// Interwaypoint of this floor belonging to `connector`.
    pub fn interwaypoint(&self, connector: &ConnectorId) -> Option<&Interwaypoint> {
        self.interwaypoints.iter().find(|iw| &iw.connector == connector)
    }
}
