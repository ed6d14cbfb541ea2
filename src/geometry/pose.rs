//! Floorplan pose and camera pose types.

use nalgebra::{Isometry3, Point2, Vector2};
use serde::Serialize;

/// Device pose on a floorplan: pixel position plus heading in degrees.
///
/// Heading 0 faces the top of the floorplan image (−y); positive angles turn
/// counter-clockwise as drawn on screen, so the facing direction is
/// `(−sin θ, −cos θ)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FloorPose {
    pub x: f64,
    pub y: f64,
    pub heading_deg: f64,
}

impl FloorPose {
    pub fn new(x: f64, y: f64, heading_deg: f64) -> Self {
        Self { x, y, heading_deg }
    }

    /// Position on the floorplan.
    pub fn location(&self) -> Point2<f64> {
        Point2::new(self.x, self.y)
    }

    /// Unit vector the device is facing, in floorplan pixel coordinates.
    pub fn facing(&self) -> Vector2<f64> {
        let theta = self.heading_deg.to_radians();
        Vector2::new(-theta.sin(), -theta.cos())
    }
}

/// Heading (same convention as [`FloorPose`]) of a displacement vector.
pub fn heading_of(direction: &Vector2<f64>) -> f64 {
    (-direction.x).atan2(-direction.y).to_degrees()
}

/// Wrap an angle in degrees to `(-180, 180]`.
pub fn wrap_degrees(angle: f64) -> f64 {
    let mut a = angle % 360.0;
    if a <= -180.0 {
        a += 360.0;
    } else if a > 180.0 {
        a -= 360.0;
    }
    a
}

/// Camera pose returned by the PnP collaborator (world-to-camera).
pub type CameraPose = Isometry3<f64>;
