//! Fine localization over a loaded segment cluster.
//!
//! Pipeline per frame:
//! - global retrieval of the `retrieval_num` closest reference frames
//! - local matching, keeping frames with more than `ransac_thre` landmark matches
//! - batched geometric verification, same threshold on the inlier count
//! - PnP on the concatenated inliers, then multi-frame refinement over the
//!   session's temporal window
//!
//! Every failure along the way is a `None` result, never an error: the
//! orchestrator counts it towards relocalization.

use nalgebra::DMatrix;
use tracing::{debug, warn};

use super::collaborators::{Correspondences, Models, QueryImage};
use super::matching::{match_references, MatchedCandidate};
use super::window::TemporalWindow;
use crate::atlas::place_db::{descriptor_matrix, top_k};
use crate::atlas::{FloorKey, FloorMap, ReferenceFrame, SegmentId};
use crate::config::{HlocConfig, MatchStrategy};
use crate::geometry::FloorPose;

/// A merged floor map prepared for retrieval.
#[derive(Debug, Clone)]
pub struct BoundCluster {
    pub map: FloorMap,
    /// One row per frame of `map`, in the same order.
    descriptors: DMatrix<f32>,
}

impl BoundCluster {
    /// Stack the frame descriptors of `map`. Frames whose descriptor width
    /// differs from the first frame make the cluster unusable.
    pub fn new(map: FloorMap) -> Option<Self> {
        let descriptors =
            descriptor_matrix(map.frames.iter().map(|f| f.frame.global_descriptor.as_slice()))?;
        Some(Self { map, descriptors })
    }

    pub fn floor(&self) -> &FloorKey {
        &self.map.floor
    }

    /// Segments merged into this cluster.
    pub fn segments(&self) -> &[SegmentId] {
        &self.map.segments
    }

    pub fn num_frames(&self) -> usize {
        self.map.num_frames()
    }
}

/// Result of a successful fine localization.
#[derive(Debug, Clone, PartialEq)]
pub struct FineLocation {
    pub pose: FloorPose,
    /// Segment the query most likely lies in.
    pub segment: SegmentId,
    /// Verified 2D-3D correspondences used for the PnP solve.
    pub num_inliers: usize,
}

/// Retrieval + matching + verification + pose solve.
pub struct FineLocalizer {
    models: Models,
    retrieval_num: usize,
    ransac_thre: usize,
    strategy: MatchStrategy,
}

impl FineLocalizer {
    pub fn new(models: Models, config: &HlocConfig) -> Self {
        Self {
            models,
            retrieval_num: config.retrieval_num,
            ransac_thre: config.ransac_thre,
            strategy: config.match_strategy(),
        }
    }

    /// Localize `image` against `cluster`, pushing the new frame into `window`.
    pub fn get_location(
        &self,
        cluster: &BoundCluster,
        image: &QueryImage,
        window: &mut TemporalWindow,
    ) -> Option<FineLocation> {
        // 1. Global retrieval
        let query_desc = match self.models.global.extract(image) {
            Ok(d) => d,
            Err(e) => {
                warn!("Global descriptor extraction failed: {}", e);
                return None;
            }
        };
        let ranked = top_k(&cluster.descriptors, &query_desc, self.retrieval_num);
        if ranked.is_empty() {
            warn!("No reference frames retrieved in cluster {}", cluster.floor());
            return None;
        }
        let retrieved: Vec<usize> = ranked.iter().map(|(row, _)| *row).collect();
        let references: Vec<&ReferenceFrame> = retrieved
            .iter()
            .map(|&row| cluster.map.frames[row].frame.as_ref())
            .collect();

        // 2. Local matching
        let query_features = match self.models.local.extract(image) {
            Ok(f) => f,
            Err(e) => {
                warn!("Local feature extraction failed: {}", e);
                return None;
            }
        };
        let matched = match match_references(
            self.models.matcher.as_ref(),
            self.strategy,
            &query_features,
            &references,
            self.ransac_thre,
        ) {
            Ok(m) => m,
            Err(e) => {
                warn!("Local matching failed: {}", e);
                return None;
            }
        };
        debug!("{} of {} retrieved frames matched", matched.len(), references.len());

        // 3. Geometric verification
        let verified = self.verify(matched);
        let total: usize = verified.iter().map(|(_, c)| c.len()).sum();
        if total == 0 {
            warn!("Cannot localize at this point: no verified correspondences");
            return None;
        }

        // Next segment: the verified frame with the most inliers, ties to the
        // better retrieval rank.
        let (best_rank, _) = verified
            .iter()
            .map(|(rank, c)| (*rank, c.len()))
            .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))?;
        let segment = cluster.map.frames[retrieved[best_rank]].segment.clone();

        let mut points_2d = Vec::with_capacity(total);
        let mut points_3d = Vec::with_capacity(total);
        for (_, c) in verified {
            points_2d.extend(c.query);
            points_3d.extend(c.landmarks);
        }

        // 4. Pose solve and refinement
        let initial = match self
            .models
            .solver
            .initial_pose(&points_2d, &points_3d, image.principal_point())
        {
            Ok(p) => p,
            Err(e) => {
                warn!("PnP failed: {}", e);
                return None;
            }
        };
        window.push(initial.into());

        let pose = match self.models.solver.refine(
            window.as_slice(),
            cluster.map.rot_base,
            &cluster.map.transform,
        ) {
            Ok(p) => p,
            Err(e) => {
                warn!("Pose refinement failed: {}", e);
                return None;
            }
        };

        Some(FineLocation {
            pose,
            segment,
            num_inliers: total,
        })
    }

    /// Run the verifier over all candidates and keep the inliers of those
    /// with more than `ransac_thre` of them. Returns `(rank, inliers)`.
    fn verify(&self, matched: Vec<MatchedCandidate>) -> Vec<(usize, Correspondences)> {
        if matched.is_empty() {
            return Vec::new();
        }
        let sets: Vec<Correspondences> = matched.iter().map(|m| m.correspondences.clone()).collect();
        let masks = match self.models.verifier.verify(&sets) {
            Ok(masks) => masks,
            Err(e) => {
                warn!("Geometric verification failed: {}", e);
                return Vec::new();
            }
        };

        if masks.len() != matched.len() {
            warn!(
                "Verifier returned {} masks for {} candidates; unmatched candidates dropped",
                masks.len(),
                matched.len()
            );
        }

        matched
            .into_iter()
            .zip(masks)
            .filter_map(|(candidate, mask)| {
                let c = candidate.correspondences;
                let mut inliers = Correspondences::default();
                for (i, keep) in mask.iter().enumerate().take(c.len()) {
                    if *keep {
                        inliers.push(c.query[i], c.reference[i], c.landmarks[i]);
                    }
                }
                (inliers.len() > self.ransac_thre).then_some((candidate.rank, inliers))
            })
            .collect()
    }
}
