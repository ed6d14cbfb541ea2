//! Line-of-sight tests against floorplan boundaries.
//!
//! Boundaries are wall segments stored as `[x1, y1, x2, y2]`. The dynamic
//! pose column of a floor's access graph is filled with
//! [`boundary_aware_distance`], which reports `0.0` when a wall blocks the
//! straight line. The shortest-path routine reads `0.0` off the diagonal as
//! a missing edge, so a blocked anchor is never directly reachable.

use nalgebra::Point2;

/// A wall segment `[x1, y1, x2, y2]` in floorplan pixels.
pub type Boundary = [f64; 4];

/// Counter-clockwise orientation test for the triple `(a, b, c)`.
#[inline]
fn ccw(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> bool {
    (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
}

/// Whether segment `c-d` properly crosses boundary `a-b`.
///
/// Touching and collinear configurations are not counted as crossings.
pub fn crosses(boundary: &Boundary, c: &Point2<f64>, d: &Point2<f64>) -> bool {
    let a = Point2::new(boundary[0], boundary[1]);
    let b = Point2::new(boundary[2], boundary[3]);
    ccw(&a, c, d) != ccw(&b, c, d) && ccw(&a, &b, c) != ccw(&a, &b, d)
}

/// Whether any boundary blocks the straight line between `c` and `d`.
pub fn is_blocked(boundaries: &[Boundary], c: &Point2<f64>, d: &Point2<f64>) -> bool {
    boundaries.iter().any(|boundary| crosses(boundary, c, d))
}

/// Euclidean distance, or `0.0` ("no edge") when a boundary blocks the line.
///
/// Coincident points also give `0.0`; callers building a graph must tell
/// that apart from a blocked line with [`is_blocked`].
pub fn boundary_aware_distance(boundaries: &[Boundary], c: &Point2<f64>, d: &Point2<f64>) -> f64 {
    if is_blocked(boundaries, c, d) {
        return 0.0;
    }
    nalgebra::distance(c, d)
}

/// Total Euclidean length of a polyline.
pub fn polyline_length(points: &[Point2<f64>]) -> f64 {
    points
        .windows(2)
        .map(|pair| nalgebra::distance(&pair[0], &pair[1]))
        .sum()
}
