//! Turn-by-turn instructions from a trajectory.
//!
//! Turns are clock positions relative to the current walking direction
//! (12 = straight ahead, 3 = right, 9 = left). The first turn is relative to
//! the device heading.

use std::fmt;

use serde::Serialize;

use super::planner::Leg;
use crate::geometry::{heading_of, wrap_degrees, FloorPose};

/// Polyline steps shorter than this (pixels) are ignored.
const MIN_STEP: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Instruction {
    /// Turn to `clock` and walk `distance` (scaled when the floor scale is known).
    Walk { clock: u8, distance: f64 },
    /// Ride a connector (elevator / stairs) to another floor.
    TakeConnector {
        connector: String,
        building: String,
        floor: String,
    },
    Arrive { destination: String },
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Walk { clock: 12, distance } => write!(f, "Go straight {:.1}", distance),
            Instruction::Walk { clock, distance } => {
                write!(f, "Turn to {} o'clock and go {:.1}", clock, distance)
            }
            Instruction::TakeConnector {
                connector,
                building,
                floor,
            } => write!(f, "Take {} to {} {}", connector, building, floor),
            Instruction::Arrive { destination } => write!(f, "Arrive at {}", destination),
        }
    }
}

/// Clock position of a relative turn in degrees (positive = right).
pub fn clock_position(relative_deg: f64) -> u8 {
    let hour = (wrap_degrees(relative_deg) / 30.0).round() as i64;
    match hour.rem_euclid(12) {
        0 => 12,
        h => h as u8,
    }
}

/// Instructions for `legs`, starting from `pose`'s heading.
pub fn instructions(pose: &FloorPose, legs: &[Leg]) -> Vec<Instruction> {
    let mut out: Vec<Instruction> = Vec::new();
    let mut heading = pose.heading_deg;

    for (i, leg) in legs.iter().enumerate() {
        let scale = leg.scale.unwrap_or(1.0);
        for step in leg.polyline.windows(2) {
            let delta = step[1] - step[0];
            let length = delta.norm();
            if length < MIN_STEP {
                continue;
            }
            let step_heading = heading_of(&delta);
            let clock = clock_position(heading - step_heading);
            heading = step_heading;

            let distance = length * scale;
            match out.last_mut() {
                Some(Instruction::Walk { distance: d, .. }) if clock == 12 => *d += distance,
                _ => out.push(Instruction::Walk { clock, distance }),
            }
        }

        if let Some(next) = legs.get(i + 1) {
            if next.building != leg.building || next.floor != leg.floor {
                out.push(Instruction::TakeConnector {
                    connector: leg.name.clone(),
                    building: next.building.clone(),
                    floor: next.floor.clone(),
                });
            }
        }
    }

    if let Some(last) = legs.last() {
        out.push(Instruction::Arrive {
            destination: last.name.clone(),
        });
    }
    out
}
