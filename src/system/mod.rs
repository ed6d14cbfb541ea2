//! Session orchestration.
//!
//! This module contains the top-level `NavSystem` that the transport layer
//! calls, the session registry it serializes requests through, and the
//! response types it returns.

pub mod messages;
mod nav_system;
pub mod sessions;

pub use messages::Navigation;
pub use nav_system::NavSystem;
pub use sessions::{Session, SessionRegistry};
