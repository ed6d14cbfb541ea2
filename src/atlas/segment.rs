//! Segment map data: reference frames with local features and 3D landmarks.
//!
//! A [`Segment`] is the unit the cache loads and evicts. Segments are
//! immutable once built and shared behind `Arc`, so the localizers read them
//! without holding the cache lock. Segments of one floor share the same
//! floorplan transform and are merged into a [`FloorMap`] for matching.

use std::collections::HashMap;
use std::sync::Arc;

use nalgebra::{Matrix3, Point2, Point3};

use super::ids::{FloorKey, SegmentId};
use crate::error::Result;

/// Local features of one image (query or reference).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalFeatures {
    /// Keypoint pixel coordinates.
    pub keypoints: Vec<Point2<f64>>,
    /// One descriptor per keypoint.
    pub descriptors: Vec<Vec<f32>>,
    /// Detector score per keypoint.
    pub scores: Vec<f32>,
    /// `[width, height]` of the source image.
    pub image_size: [u32; 2],
}

impl LocalFeatures {
    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }
}

/// A mapped reference image.
#[derive(Debug, Clone)]
pub struct ReferenceFrame {
    pub name: String,
    pub global_descriptor: Vec<f32>,
    pub local_features: LocalFeatures,
    /// Pose of the reference camera at mapping time.
    pub frame_pose: Vec<f64>,
    /// Keypoint index -> 3D landmark, for keypoints with a triangulated point.
    landmarks: HashMap<usize, Point3<f64>>,
}

impl ReferenceFrame {
    /// Build a frame; `landmarks[i]` belongs to keypoint `valid_keypoints_index[i]`.
    pub fn new(
        name: impl Into<String>,
        global_descriptor: Vec<f32>,
        local_features: LocalFeatures,
        valid_keypoints_index: &[usize],
        landmarks: &[Point3<f64>],
        frame_pose: Vec<f64>,
    ) -> Self {
        let landmarks = valid_keypoints_index
            .iter()
            .copied()
            .zip(landmarks.iter().copied())
            .collect();
        Self {
            name: name.into(),
            global_descriptor,
            local_features,
            frame_pose,
            landmarks,
        }
    }

    /// 3D landmark of a keypoint, if it has one.
    pub fn landmark(&self, keypoint: usize) -> Option<&Point3<f64>> {
        self.landmarks.get(&keypoint)
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }
}

/// One loaded segment file.
#[derive(Debug, Clone)]
pub struct Segment {
    pub id: SegmentId,
    pub floor: FloorKey,
    /// Homogeneous 2D transform from map coordinates to floorplan pixels.
    pub transform: Matrix3<f64>,
    /// Rotation of `transform`, `atan2(T[1,0], T[0,0])`.
    pub rot_base: f64,
    pub frames: Vec<Arc<ReferenceFrame>>,
}

impl Segment {
    pub fn new(id: SegmentId, transform: Matrix3<f64>, frames: Vec<ReferenceFrame>) -> Result<Self> {
        let floor = id.floor_key()?;
        let rot_base = transform[(1, 0)].atan2(transform[(0, 0)]);
        Ok(Self {
            id,
            floor,
            transform,
            rot_base,
            frames: frames.into_iter().map(Arc::new).collect(),
        })
    }
}

/// A reference frame inside a merged floor map, tagged with its segment.
#[derive(Debug, Clone)]
pub struct ClusterFrame {
    pub segment: SegmentId,
    pub frame: Arc<ReferenceFrame>,
}

/// Union of the loaded segments of one floor.
#[derive(Debug, Clone)]
pub struct FloorMap {
    pub floor: FloorKey,
    pub transform: Matrix3<f64>,
    pub rot_base: f64,
    pub frames: Vec<ClusterFrame>,
    /// Segments merged into this map, in merge order.
    pub segments: Vec<SegmentId>,
}

impl FloorMap {
    /// Start a merged map from the first segment of a floor.
    pub fn from_segment(segment: &Segment) -> Self {
        let mut map = Self {
            floor: segment.floor.clone(),
            transform: segment.transform,
            rot_base: segment.rot_base,
            frames: Vec::new(),
            segments: Vec::new(),
        };
        map.merge(segment);
        map
    }

    /// Add the frames of another segment of the same floor.
    ///
    /// `transform` and `rot_base` are floor-invariant and stay those of the
    /// first segment.
    pub fn merge(&mut self, segment: &Segment) {
        debug_assert_eq!(segment.floor, self.floor);
        if self.segments.contains(&segment.id) {
            return;
        }
        self.segments.push(segment.id.clone());
        self.frames.extend(segment.frames.iter().map(|frame| ClusterFrame {
            segment: segment.id.clone(),
            frame: Arc::clone(frame),
        }));
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }
}
