//! Localization module - coarse place recognition and fine pose estimation.
//!
//! - [`CoarseLocator`] votes for a segment over the whole place
//! - [`FineLocalizer`] estimates the floorplan pose inside a loaded cluster
//!
//! The learned models and the PnP solver are external; see [`collaborators`].

pub mod coarse;
pub mod collaborators;
pub mod hloc;
pub mod matching;
pub mod window;

pub use coarse::CoarseLocator;
pub use collaborators::{
    Correspondences, GeometricVerifier, GlobalExtractor, InitialPose, LocalExtractor, LocalMatcher,
    Models, PoseSolver, QueryImage,
};
pub use hloc::{BoundCluster, FineLocalizer, FineLocation};
pub use window::{TemporalWindow, WindowEntry};
