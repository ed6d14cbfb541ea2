//! Identifier types shared by the cache, the localizers and the planner.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{NavError, Result};

/// Client session identifier (opaque string from the transport layer).
pub type SessionId = String;

/// A `(building, floor)` pair, the key of every per-floor table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FloorKey {
    pub building: String,
    pub floor: String,
}

impl FloorKey {
    pub fn new(building: impl Into<String>, floor: impl Into<String>) -> Self {
        Self {
            building: building.into(),
            floor: floor.into(),
        }
    }
}

impl fmt::Display for FloorKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.building, self.floor)
    }
}

/// Name of a map segment, e.g. `LightHouse_6_floor_Segment_00021`.
///
/// The first token is the building, the next two form the floor name and
/// the remainder is the segment file stem inside the floor's `maps/`
/// directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SegmentId(pub String);

impl SegmentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn parts(&self) -> Result<Vec<&str>> {
        let parts: Vec<&str> = self.0.split('_').collect();
        if parts.len() < 4 || parts.iter().any(|p| p.is_empty()) {
            return Err(NavError::MalformedSegmentId(self.0.clone()));
        }
        Ok(parts)
    }

    /// Building and floor this segment belongs to.
    pub fn floor_key(&self) -> Result<FloorKey> {
        let parts = self.parts()?;
        Ok(FloorKey::new(parts[0], format!("{}_{}", parts[1], parts[2])))
    }

    /// File stem of the segment inside its floor directory.
    pub fn file_stem(&self) -> Result<String> {
        let parts = self.parts()?;
        Ok(parts[3..].join("_"))
    }

    /// Whether this segment lies on `key`.
    pub fn is_on(&self, key: &FloorKey) -> bool {
        self.floor_key().map(|k| &k == key).unwrap_or(false)
    }
}

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SegmentId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
