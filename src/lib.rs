pub mod atlas;
pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod localization;
pub mod navigation;
pub mod system;
pub mod tracking;
