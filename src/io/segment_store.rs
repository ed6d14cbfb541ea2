//! Segment files on disk.
//!
//! A segment lives at `<place>/<building>/<floor>/maps/<stem>.json`:
//!
//! ```json
//! {
//!   "T": [[a, b, tx], [c, d, ty], [0, 0, 1]],
//!   "frames": {
//!     "00042": {
//!       "global_descriptor": [..],
//!       "local_features": {
//!         "keypoints": [[x, y], ..], "descriptors": [[..], ..], "scores": [..],
//!         "image_size": [w, h], "valid_keypoints_index": [..]
//!       },
//!       "landmarks": [[x, y, z], ..],
//!       "frame_pose": [..]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use nalgebra::{Matrix3, Point2, Point3};
use serde::Deserialize;

use crate::atlas::{LocalFeatures, ReferenceFrame, Segment, SegmentId};
use crate::error::{NavError, Result};

/// Source of segment map data for the [`crate::atlas::SegmentCache`].
pub trait SegmentStore: Send + Sync {
    fn fetch(&self, id: &SegmentId) -> Result<Segment>;
}

#[derive(Debug, Deserialize)]
struct SegmentFile {
    #[serde(rename = "T")]
    transform: [[f64; 3]; 3],
    #[serde(default)]
    frames: BTreeMap<String, FrameFile>,
}

#[derive(Debug, Deserialize)]
struct FrameFile {
    global_descriptor: Vec<f32>,
    local_features: LocalFeaturesFile,
    #[serde(default)]
    landmarks: Vec<[f64; 3]>,
    #[serde(default)]
    frame_pose: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct LocalFeaturesFile {
    keypoints: Vec<[f64; 2]>,
    #[serde(default)]
    descriptors: Vec<Vec<f32>>,
    #[serde(default)]
    scores: Vec<f32>,
    image_size: [u32; 2],
    #[serde(default)]
    valid_keypoints_index: Vec<usize>,
}

/// Reads segment JSON files below a place directory.
#[derive(Debug, Clone)]
pub struct FileSegmentStore {
    place_dir: PathBuf,
}

impl FileSegmentStore {
    pub fn new<P: AsRef<Path>>(place_dir: P) -> Self {
        Self {
            place_dir: place_dir.as_ref().to_path_buf(),
        }
    }

    /// File backing `id`.
    pub fn segment_path(&self, id: &SegmentId) -> Result<PathBuf> {
        let floor = id.floor_key()?;
        Ok(self
            .place_dir
            .join(&floor.building)
            .join(&floor.floor)
            .join("maps")
            .join(format!("{}.json", id.file_stem()?)))
    }
}

impl SegmentStore for FileSegmentStore {
    fn fetch(&self, id: &SegmentId) -> Result<Segment> {
        let unavailable = |reason: String| NavError::SegmentUnavailable {
            segment_id: id.to_string(),
            reason,
        };

        let path = self.segment_path(id)?;
        let file = File::open(&path).map_err(|e| unavailable(format!("{}: {}", path.display(), e)))?;
        let parsed: SegmentFile = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| unavailable(format!("{}: {}", path.display(), e)))?;

        let floor = id.floor_key()?;
        let t = parsed.transform;
        let transform = Matrix3::new(
            t[0][0], t[0][1], t[0][2],
            t[1][0], t[1][1], t[1][2],
            t[2][0], t[2][1], t[2][2],
        );

        let mut frames = Vec::with_capacity(parsed.frames.len());
        for (name, frame) in parsed.frames {
            let lf = frame.local_features;
            if lf.valid_keypoints_index.len() != frame.landmarks.len() {
                return Err(unavailable(format!(
                    "frame {} has {} valid keypoints but {} landmarks",
                    name,
                    lf.valid_keypoints_index.len(),
                    frame.landmarks.len()
                )));
            }
            if let Some(bad) = lf.valid_keypoints_index.iter().find(|&&i| i >= lf.keypoints.len()) {
                return Err(unavailable(format!(
                    "frame {} references keypoint {} of {}",
                    name,
                    bad,
                    lf.keypoints.len()
                )));
            }

            let features = LocalFeatures {
                keypoints: lf.keypoints.iter().map(|k| Point2::new(k[0], k[1])).collect(),
                descriptors: lf.descriptors,
                scores: lf.scores,
                image_size: lf.image_size,
            };
            let landmarks: Vec<Point3<f64>> = frame
                .landmarks
                .iter()
                .map(|l| Point3::new(l[0], l[1], l[2]))
                .collect();

            frames.push(ReferenceFrame::new(
                format!("{}_{}_{}", floor.building, floor.floor, name),
                frame.global_descriptor,
                features,
                &lf.valid_keypoints_index,
                &landmarks,
                frame.frame_pose,
            ));
        }

        Segment::new(id.clone(), transform, frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::fs;

    const SEGMENT_JSON: &str = r#"{
        "T": [[0.0, -2.0, 5.0], [2.0, 0.0, 7.0], [0.0, 0.0, 1.0]],
        "frames": {
            "00002": {
                "global_descriptor": [0.0, 1.0],
                "local_features": {
                    "keypoints": [[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]],
                    "descriptors": [[0.1], [0.2], [0.3]],
                    "scores": [0.9, 0.8, 0.7],
                    "image_size": [640, 480],
                    "valid_keypoints_index": [0, 2]
                },
                "landmarks": [[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]],
                "frame_pose": [1.0, 2.0, 0.5]
            },
            "00001": {
                "global_descriptor": [1.0, 0.0],
                "local_features": {
                    "keypoints": [],
                    "image_size": [640, 480]
                }
            }
        }
    }"#;

    fn write_segment(root: &Path, body: &str) {
        let dir = root.join("LightHouse/6_floor/maps");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("Segment_00021.json"), body).unwrap();
    }

    #[test]
    fn test_fetch_parses_segment_file() {
        let tmp = tempfile::tempdir().unwrap();
        write_segment(tmp.path(), SEGMENT_JSON);
        let store = FileSegmentStore::new(tmp.path());

        let seg = store.fetch(&SegmentId::new("LightHouse_6_floor_Segment_00021")).unwrap();
        assert_relative_eq!(seg.rot_base, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_eq!(seg.transform[(0, 2)], 5.0);
        assert_eq!(seg.frames.len(), 2);
        // Frames come back sorted by name and prefixed with their floor.
        assert_eq!(seg.frames[0].name, "LightHouse_6_floor_00001");
        let f = &seg.frames[1];
        assert_eq!(f.num_landmarks(), 2);
        assert_eq!(f.landmark(2), Some(&Point3::new(2.0, 2.0, 2.0)));
        assert!(f.landmark(1).is_none());
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileSegmentStore::new(tmp.path());
        let err = store.fetch(&SegmentId::new("LightHouse_6_floor_Segment_00021")).unwrap_err();
        assert!(matches!(err, NavError::SegmentUnavailable { .. }));
    }

    #[test]
    fn test_inconsistent_landmarks_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let body = SEGMENT_JSON.replace("\"valid_keypoints_index\": [0, 2]", "\"valid_keypoints_index\": [0]");
        write_segment(tmp.path(), &body);
        let store = FileSegmentStore::new(tmp.path());
        assert!(store.fetch(&SegmentId::new("LightHouse_6_floor_Segment_00021")).is_err());
    }

    #[test]
    fn test_segment_path_layout() {
        let store = FileSegmentStore::new("/data/NYC");
        assert_eq!(
            store.segment_path(&SegmentId::new("LightHouse_6_floor_Segment_00021")).unwrap(),
            PathBuf::from("/data/NYC/LightHouse/6_floor/maps/Segment_00021.json")
        );
        assert!(store.segment_path(&SegmentId::new("bad")).is_err());
    }
}
