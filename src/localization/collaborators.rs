//! Interfaces of the learned models and the numerical pose solver.
//!
//! Feature extraction, matching, RANSAC verification and PnP refinement run
//! outside this crate (GPU models, native solvers). The localizers only see
//! these traits, so any implementation that is `Send + Sync` can be plugged
//! in and tests use small deterministic doubles.

use std::sync::Arc;

use nalgebra::{Matrix3, Point2, Point3};

use super::window::WindowEntry;
use crate::atlas::LocalFeatures;
use crate::error::Result;
use crate::geometry::{CameraPose, FloorPose};

/// A decoded camera frame.
#[derive(Debug, Clone)]
pub struct QueryImage {
    pub width: u32,
    pub height: u32,
    /// Pixel data in whatever layout the extractors expect.
    pub data: Arc<[u8]>,
}

impl QueryImage {
    pub fn new(width: u32, height: u32, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            width,
            height,
            data: data.into(),
        }
    }

    /// Image centre, used as the initial principal point.
    pub fn principal_point(&self) -> Point2<f64> {
        Point2::new(self.width as f64 / 2.0, self.height as f64 / 2.0)
    }
}

/// 2D-2D-3D correspondences between the query and one reference frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Correspondences {
    /// Query keypoints.
    pub query: Vec<Point2<f64>>,
    /// Matched reference keypoints.
    pub reference: Vec<Point2<f64>>,
    /// Landmarks of the matched reference keypoints.
    pub landmarks: Vec<Point3<f64>>,
}

impl Correspondences {
    pub fn len(&self) -> usize {
        self.query.len()
    }

    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
    }

    pub fn push(&mut self, query: Point2<f64>, reference: Point2<f64>, landmark: Point3<f64>) {
        self.query.push(query);
        self.reference.push(reference);
        self.landmarks.push(landmark);
    }
}

/// Single-frame PnP result.
#[derive(Debug, Clone)]
pub struct InitialPose {
    pub pose: CameraPose,
    /// Principal point after the solver's intrinsics estimate.
    pub principal_point: Point2<f64>,
    pub inliers_2d: Vec<Point2<f64>>,
    pub inliers_3d: Vec<Point3<f64>>,
}

/// Image -> global (retrieval) descriptor.
pub trait GlobalExtractor: Send + Sync {
    fn extract(&self, image: &QueryImage) -> Result<Vec<f32>>;
}

/// Image -> local keypoints and descriptors.
pub trait LocalExtractor: Send + Sync {
    fn extract(&self, image: &QueryImage) -> Result<LocalFeatures>;
}

/// Query features against reference features.
pub trait LocalMatcher: Send + Sync {
    /// One `matches0` vector per reference: for every query keypoint the
    /// index of the matched reference keypoint, or `-1`.
    fn match_features(
        &self,
        query: &LocalFeatures,
        references: &[&LocalFeatures],
    ) -> Result<Vec<Vec<i32>>>;
}

/// Batched RANSAC over candidate frames.
pub trait GeometricVerifier: Send + Sync {
    /// One inlier mask per candidate, aligned with its correspondences.
    fn verify(&self, candidates: &[Correspondences]) -> Result<Vec<Vec<bool>>>;
}

/// PnP and multi-frame refinement to floorplan coordinates.
pub trait PoseSolver: Send + Sync {
    fn initial_pose(
        &self,
        points_2d: &[Point2<f64>],
        points_3d: &[Point3<f64>],
        principal_point: Point2<f64>,
    ) -> Result<InitialPose>;

    /// Refine over the temporal window and express the result on the
    /// floorplan through `transform` / `rot_base`.
    fn refine(
        &self,
        window: &[WindowEntry],
        rot_base: f64,
        transform: &Matrix3<f64>,
    ) -> Result<FloorPose>;
}

/// The full set of external models used by the localizers.
#[derive(Clone)]
pub struct Models {
    pub global: Arc<dyn GlobalExtractor>,
    pub local: Arc<dyn LocalExtractor>,
    pub matcher: Arc<dyn LocalMatcher>,
    pub verifier: Arc<dyn GeometricVerifier>,
    pub solver: Arc<dyn PoseSolver>,
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Deterministic doubles for the localization tests.

    use super::*;
    use crate::error::NavError;
    use nalgebra::Isometry3;
    use parking_lot::Mutex;
    use std::collections::HashMap;

    /// Returns a fixed descriptor, or fails when `None`.
    pub struct FixedGlobal(pub Mutex<Option<Vec<f32>>>);

    impl FixedGlobal {
        pub fn new(descriptor: Vec<f32>) -> Self {
            Self(Mutex::new(Some(descriptor)))
        }

        pub fn set(&self, descriptor: Option<Vec<f32>>) {
            *self.0.lock() = descriptor;
        }
    }

    impl GlobalExtractor for FixedGlobal {
        fn extract(&self, _image: &QueryImage) -> Result<Vec<f32>> {
            self.0
                .lock()
                .clone()
                .ok_or_else(|| NavError::Collaborator("no descriptor".into()))
        }
    }

    /// Query with `n` keypoints at `(i, i)`.
    pub struct GridLocal(pub usize);

    impl LocalExtractor for GridLocal {
        fn extract(&self, _image: &QueryImage) -> Result<LocalFeatures> {
            Ok(LocalFeatures {
                keypoints: (0..self.0).map(|i| Point2::new(i as f64, i as f64)).collect(),
                descriptors: vec![vec![0.0; 4]; self.0],
                scores: vec![1.0; self.0],
                image_size: [640, 480],
            })
        }
    }

    /// Matches query keypoint `i` to reference keypoint `i` for the first
    /// `counts[frame_len]` keypoints; references are told apart by their
    /// keypoint count. Records the batch sizes it was called with.
    pub struct CountingMatcher {
        /// Reference keypoint count -> number of matches to emit.
        pub matches_by_len: HashMap<usize, usize>,
        pub calls: Mutex<Vec<usize>>,
    }

    impl CountingMatcher {
        pub fn new(matches_by_len: HashMap<usize, usize>) -> Self {
            Self {
                matches_by_len,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl LocalMatcher for CountingMatcher {
        fn match_features(
            &self,
            query: &LocalFeatures,
            references: &[&LocalFeatures],
        ) -> Result<Vec<Vec<i32>>> {
            self.calls.lock().push(references.len());
            Ok(references
                .iter()
                .map(|r| {
                    let n = self.matches_by_len.get(&r.len()).copied().unwrap_or(0);
                    (0..query.len())
                        .map(|i| if i < n && i < r.len() { i as i32 } else { -1 })
                        .collect()
                })
                .collect())
        }
    }

    /// Marks every correspondence as an inlier, or fails on demand.
    pub struct AcceptAll {
        pub fail: bool,
    }

    impl GeometricVerifier for AcceptAll {
        fn verify(&self, candidates: &[Correspondences]) -> Result<Vec<Vec<bool>>> {
            if self.fail {
                return Err(NavError::Collaborator("ransac diverged".into()));
            }
            Ok(candidates.iter().map(|c| vec![true; c.len()]).collect())
        }
    }

    /// Returns the window length as the x coordinate so tests can see the
    /// window size the refiner was given.
    pub struct WindowSizeSolver;

    impl PoseSolver for WindowSizeSolver {
        fn initial_pose(
            &self,
            points_2d: &[Point2<f64>],
            points_3d: &[Point3<f64>],
            principal_point: Point2<f64>,
        ) -> Result<InitialPose> {
            Ok(InitialPose {
                pose: Isometry3::identity(),
                principal_point,
                inliers_2d: points_2d.to_vec(),
                inliers_3d: points_3d.to_vec(),
            })
        }

        fn refine(
            &self,
            window: &[WindowEntry],
            rot_base: f64,
            _transform: &Matrix3<f64>,
        ) -> Result<FloorPose> {
            Ok(FloorPose::new(window.len() as f64, 0.0, rot_base.to_degrees()))
        }
    }

    pub fn image() -> QueryImage {
        QueryImage::new(640, 480, vec![0u8; 4])
    }
}
