//! Tracking: per-session localization across segments.
//!
//! This module implements the session side of localization:
//! - Relocalization policy (consecutive failures, success timeout)
//! - Coarse place recognition when cold, fine localization when warm
//! - Segment switching driven by fine-localization predictions
//! - Per-frame pose updates for the client

pub mod result;
pub mod state;
pub mod tracker;

pub use result::PoseUpdate;
pub use state::{LocalizationPhase, LocalizationState};
pub use tracker::{Localizers, TrackOutcome, Tracker};
