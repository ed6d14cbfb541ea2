//! Temporal pose window used for multi-frame refinement.
//!
//! The window belongs to one session: it holds the inlier correspondences
//! and initial poses of the last `capacity` localized frames of that session
//! only, all expressed against the same floor map.

use std::collections::VecDeque;

use nalgebra::{Point2, Point3};

use super::collaborators::InitialPose;
use crate::geometry::CameraPose;

/// One localized frame kept for refinement.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    pub points_2d: Vec<Point2<f64>>,
    pub points_3d: Vec<Point3<f64>>,
    pub initial_pose: CameraPose,
    pub principal_point: Point2<f64>,
}

impl From<InitialPose> for WindowEntry {
    fn from(p: InitialPose) -> Self {
        Self {
            points_2d: p.inliers_2d,
            points_3d: p.inliers_3d,
            initial_pose: p.pose,
            principal_point: p.principal_point,
        }
    }
}

/// Bounded FIFO of [`WindowEntry`].
#[derive(Debug, Clone)]
pub struct TemporalWindow {
    entries: VecDeque<WindowEntry>,
    capacity: usize,
}

impl TemporalWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append an entry, dropping the oldest beyond capacity.
    pub fn push(&mut self, entry: WindowEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries oldest first, as one contiguous slice.
    pub fn as_slice(&mut self) -> &[WindowEntry] {
        self.entries.make_contiguous()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Isometry3;

    fn entry(n: usize) -> WindowEntry {
        WindowEntry {
            points_2d: vec![Point2::origin(); n],
            points_3d: vec![Point3::origin(); n],
            initial_pose: Isometry3::identity(),
            principal_point: Point2::new(320.0, 240.0),
        }
    }

    #[test]
    fn test_window_evicts_oldest() {
        let mut window = TemporalWindow::new(3);
        for n in 1..=5 {
            window.push(entry(n));
        }
        assert_eq!(window.len(), 3);
        let sizes: Vec<usize> = window.as_slice().iter().map(|e| e.points_2d.len()).collect();
        assert_eq!(sizes, vec![3, 4, 5]);

        window.clear();
        assert!(window.is_empty());
    }

    #[test]
    fn test_zero_capacity_keeps_latest() {
        let mut window = TemporalWindow::new(0);
        window.push(entry(1));
        window.push(entry(2));
        assert_eq!(window.capacity(), 1);
        assert_eq!(window.as_slice()[0].points_2d.len(), 2);
    }
}
