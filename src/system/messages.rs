//! Responses returned by the navigation system.

use serde::Serialize;

use crate::navigation::{Instruction, Leg};

/// Route from the session's last pose to its selected destination.
///
/// Empty `legs` (and `instructions`) means no path was found.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Navigation {
    pub legs: Vec<Leg>,
    pub instructions: Vec<Instruction>,
}

impl Navigation {
    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Total walking length in floorplan pixels.
    pub fn length(&self) -> f64 {
        self.legs.iter().map(Leg::length).sum()
    }
}
