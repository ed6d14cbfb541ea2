//! Coarse place recognition: which segment cluster is the device in?

use std::sync::Arc;

use tracing::{info, warn};

use super::collaborators::{GlobalExtractor, QueryImage};
use crate::atlas::{CoarseResult, FloorKey, PlaceDatabase, SegmentId};

/// Global-descriptor voting over the place database.
pub struct CoarseLocator {
    places: Arc<PlaceDatabase>,
    extractor: Arc<dyn GlobalExtractor>,
    retrieval_num: usize,
}

impl CoarseLocator {
    pub fn new(
        places: Arc<PlaceDatabase>,
        extractor: Arc<dyn GlobalExtractor>,
        retrieval_num: usize,
    ) -> Self {
        Self {
            places,
            extractor,
            retrieval_num,
        }
    }

    /// Vote for the most likely segment of `image`.
    ///
    /// `None` when the descriptor cannot be computed or the database is empty;
    /// a result with `success == false` when the vote is too spread out.
    pub fn coarse_vpr(&self, image: &QueryImage) -> Option<CoarseResult> {
        let query = match self.extractor.extract(image) {
            Ok(d) => d,
            Err(e) => {
                warn!("Coarse descriptor extraction failed: {}", e);
                return None;
            }
        };
        let result = self.places.locate(&query, self.retrieval_num)?;
        info!(
            "Coarse VPR: {} (score {}/{}, success={})",
            result.winner,
            result.score,
            result.topk.len(),
            result.success
        );
        Some(result)
    }

    /// `segment` followed by its neighbours.
    pub fn cluster(&self, segment: &SegmentId) -> Vec<SegmentId> {
        self.places.cluster(segment)
    }

    pub fn segments_on_floor(&self, key: &FloorKey) -> Vec<SegmentId> {
        self.places.segments_on_floor(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::collaborators::test_support::{image, FixedGlobal};
    use nalgebra::DMatrix;
    use std::collections::BTreeMap;

    fn locator(extractor: Arc<FixedGlobal>) -> CoarseLocator {
        let descriptors = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.9, 0.1, 0.0, 1.0]);
        let segments = vec![
            SegmentId::new("B_1_floor_Segment_A"),
            SegmentId::new("B_1_floor_Segment_A"),
            SegmentId::new("B_2_floor_Segment_C"),
        ];
        let places = PlaceDatabase::new(descriptors, segments, BTreeMap::new());
        CoarseLocator::new(Arc::new(places), extractor, 2)
    }

    #[test]
    fn test_coarse_vpr_picks_voted_segment() {
        let loc = locator(Arc::new(FixedGlobal::new(vec![1.0, 0.0])));
        let result = loc.coarse_vpr(&image()).unwrap();
        assert_eq!(result.winner, SegmentId::new("B_1_floor_Segment_A"));
        assert!(result.success);
    }

    #[test]
    fn test_extractor_failure_is_none() {
        let extractor = Arc::new(FixedGlobal::new(vec![1.0, 0.0]));
        extractor.set(None);
        let loc = locator(extractor);
        assert!(loc.coarse_vpr(&image()).is_none());
    }
}
