//! Navigation module - multi-floor route planning.
//!
//! - [`shortest_path`] - Floyd-Warshall over dense access graphs
//! - [`path_table`] - precomputed interwaypoint walks and cross-floor candidates
//! - [`planner`] - per-request routes from a live pose
//! - [`instructions`] - turn-by-turn steps from a route

pub mod instructions;
pub mod path_table;
pub mod planner;
pub mod shortest_path;

pub use instructions::{clock_position, instructions, Instruction};
pub use path_table::PathTables;
pub use planner::{DestinationPaths, Leg, TrajectoryPlanner};
pub use shortest_path::ShortestPaths;
