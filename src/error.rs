//! Error types returned by the navigation API.
//!
//! Loading code (config, map graph, descriptor database) reports failures
//! through `anyhow` with file context. Everything a client can trigger at
//! runtime goes through [`NavError`] so the transport layer can tell a
//! client-correctable request apart from a server fault.

use thiserror::Error;

/// Errors surfaced to callers of the session and planner API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NavError {
    /// Navigation requested before `select_destination`.
    #[error("Selected destination ID is not set")]
    DestinationNotSet,

    /// Navigation requested before any successful localization.
    #[error("Please do localization first")]
    LocalizeFirst,

    /// The requested `(building, floor)` is not part of the loaded map graph.
    #[error("Unknown floor: {building}/{floor}")]
    UnknownFloor { building: String, floor: String },

    /// The destination id does not exist on the requested floor.
    #[error("Unknown destination {destination_id} on {building}/{floor}")]
    UnknownDestination {
        building: String,
        floor: String,
        destination_id: String,
    },

    /// A segment id that does not follow `<building>_<floor>_<segment>`.
    #[error("Malformed segment id: {0}")]
    MalformedSegmentId(String),

    /// A floor record whose access graph does not match its anchors.
    #[error("Invalid floor {building}/{floor}: {reason}")]
    InvalidFloor {
        building: String,
        floor: String,
        reason: String,
    },

    /// A segment file could not be read or parsed.
    #[error("Segment {segment_id} unavailable: {reason}")]
    SegmentUnavailable { segment_id: String, reason: String },

    /// An external model (extractor, matcher, verifier, solver) failed.
    #[error("Collaborator failure: {0}")]
    Collaborator(String),
}

impl NavError {
    /// Whether the client can fix the request and retry.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NavError::DestinationNotSet
                | NavError::LocalizeFirst
                | NavError::UnknownFloor { .. }
                | NavError::UnknownDestination { .. }
                | NavError::MalformedSegmentId(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NavError>;
