//! Query-to-reference local matching and landmark filtering.
//!
//! A raw match `(n, m)` from the matcher survives only when `m` is a real
//! match (not `-1`) and reference keypoint `m` has a triangulated landmark.
//! A reference frame is kept as a candidate when more than `threshold`
//! matches survive.

use tracing::debug;

use super::collaborators::{Correspondences, LocalMatcher};
use crate::atlas::{LocalFeatures, ReferenceFrame};
use crate::config::MatchStrategy;
use crate::error::Result;

/// A retrieved reference frame that passed the match-count threshold.
#[derive(Debug, Clone)]
pub struct MatchedCandidate {
    /// Position of the frame in the retrieval ranking (0 = best).
    pub rank: usize,
    pub correspondences: Correspondences,
}

/// Keep the matches of `matches0` that land on a keypoint with a landmark.
pub fn filter_matches(
    matches0: &[i32],
    query: &LocalFeatures,
    reference: &ReferenceFrame,
) -> Correspondences {
    let mut out = Correspondences::default();
    for (n, &m) in matches0.iter().enumerate() {
        if m < 0 {
            continue;
        }
        let m = m as usize;
        let (Some(q), Some(r), Some(lm)) = (
            query.keypoints.get(n),
            reference.local_features.keypoints.get(m),
            reference.landmark(m),
        ) else {
            continue;
        };
        out.push(*q, *r, *lm);
    }
    out
}

/// Match `query` against `references` (best-ranked first).
pub fn match_references(
    matcher: &dyn LocalMatcher,
    strategy: MatchStrategy,
    query: &LocalFeatures,
    references: &[&ReferenceFrame],
    threshold: usize,
) -> Result<Vec<MatchedCandidate>> {
    let chunk = match strategy {
        MatchStrategy::Batched { mini_batch } => mini_batch.max(1),
        MatchStrategy::PerFrame => 1,
    };

    let mut candidates = Vec::new();
    for (chunk_idx, frames) in references.chunks(chunk).enumerate() {
        let features: Vec<&LocalFeatures> = frames.iter().map(|f| &f.local_features).collect();
        let matches = matcher.match_features(query, &features)?;

        for (offset, (frame, matches0)) in frames.iter().zip(matches.iter()).enumerate() {
            let correspondences = filter_matches(matches0, query, frame);
            let rank = chunk_idx * chunk + offset;
            if correspondences.len() > threshold {
                candidates.push(MatchedCandidate {
                    rank,
                    correspondences,
                });
            } else {
                debug!("Reference {} kept {} matches, dropped", frame.name, correspondences.len());
            }
        }
    }
    Ok(candidates)
}
