//! PlaceDatabase - global descriptors of every reference frame of a place,
//! tagged with their segment, plus the segment adjacency graph.
//!
//! Retrieval is a plain inner product against the descriptor matrix
//! (one row per reference frame). Results are sorted by decreasing score;
//! equal scores keep database order.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{DMatrix, DVector};

use super::ids::{FloorKey, SegmentId};

/// Fraction of the top-K that the winning segment (with its neighbours)
/// must cover for coarse localization to count as a success.
pub const COARSE_SUCCESS_RATIO: f64 = 0.3;

/// Rank the rows of `descriptors` against `query` and keep the best `k`.
///
/// Returns `(row, score)` pairs. A query whose length does not match the
/// descriptor width yields no candidates.
pub fn top_k(descriptors: &DMatrix<f32>, query: &[f32], k: usize) -> Vec<(usize, f32)> {
    if descriptors.nrows() == 0 || query.is_empty() || query.len() != descriptors.ncols() {
        return Vec::new();
    }
    let q = DVector::from_column_slice(query);
    let scores = descriptors * q;

    // NaN scores rank last.
    let mut ranked: Vec<(usize, f32)> = scores
        .iter()
        .map(|&s| if s.is_nan() { f32::NEG_INFINITY } else { s })
        .enumerate()
        .collect();
    // Stable sort: equal scores keep database order.
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k.min(descriptors.nrows()));
    ranked
}

/// Stack equally sized descriptors into a row matrix.
///
/// Returns `None` when the rows disagree on length.
pub fn descriptor_matrix<'a, I>(rows: I) -> Option<DMatrix<f32>>
where
    I: IntoIterator<Item = &'a [f32]>,
{
    let rows: Vec<&[f32]> = rows.into_iter().collect();
    let width = rows.first().map(|r| r.len()).unwrap_or(0);
    if rows.iter().any(|r| r.len() != width) {
        return None;
    }
    Some(DMatrix::from_fn(rows.len(), width, |i, j| rows[i][j]))
}

/// Outcome of a coarse place-recognition query.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseResult {
    /// Segment of each of the top-K reference frames, best first.
    pub topk: Vec<SegmentId>,
    pub winner: SegmentId,
    /// Neighbour-smoothed vote count of the winner.
    pub score: usize,
    pub success: bool,
}

/// Global descriptor database of one place.
#[derive(Debug, Clone)]
pub struct PlaceDatabase {
    descriptors: DMatrix<f32>,
    /// Segment of each descriptor row.
    segments: Vec<SegmentId>,
    graph: BTreeMap<SegmentId, BTreeSet<SegmentId>>,
}

impl PlaceDatabase {
    /// `segments[i]` owns row `i` of `descriptors`.
    pub fn new(
        descriptors: DMatrix<f32>,
        segments: Vec<SegmentId>,
        graph: BTreeMap<SegmentId, BTreeSet<SegmentId>>,
    ) -> Self {
        debug_assert_eq!(descriptors.nrows(), segments.len());
        Self {
            descriptors,
            segments,
            graph,
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Adjacent segments of `segment` (empty if unknown).
    pub fn neighbors(&self, segment: &SegmentId) -> Vec<SegmentId> {
        self.graph
            .get(segment)
            .map(|n| n.iter().filter(|s| *s != segment).cloned().collect())
            .unwrap_or_default()
    }

    /// `segment` followed by its sorted neighbours.
    pub fn cluster(&self, segment: &SegmentId) -> Vec<SegmentId> {
        let mut cluster = vec![segment.clone()];
        cluster.extend(self.neighbors(segment));
        cluster
    }

    /// Every known segment of one floor, sorted.
    pub fn segments_on_floor(&self, key: &FloorKey) -> Vec<SegmentId> {
        let all: BTreeSet<&SegmentId> = self
            .segments
            .iter()
            .chain(self.graph.keys())
            .filter(|s| s.is_on(key))
            .collect();
        all.into_iter().cloned().collect()
    }

    /// Segments of the `k` reference frames closest to `query`, best first.
    pub fn retrieve(&self, query: &[f32], k: usize) -> Vec<SegmentId> {
        top_k(&self.descriptors, query, k)
            .into_iter()
            .map(|(row, _)| self.segments[row].clone())
            .collect()
    }

    /// Retrieve the top-K frames and vote for a segment.
    ///
    /// Each segment scores its own occurrences plus those of its graph
    /// neighbours. Equal scores go to the segment that appears first in
    /// the ranked list. Returns `None` on an empty database or query.
    pub fn locate(&self, query: &[f32], k: usize) -> Option<CoarseResult> {
        let topk = self.retrieve(query, k);
        self.analyze_topk(topk)
    }

    fn analyze_topk(&self, topk: Vec<SegmentId>) -> Option<CoarseResult> {
        if topk.is_empty() {
            return None;
        }

        // First-appearance order, with raw counts.
        let mut counts: Vec<(SegmentId, usize)> = Vec::new();
        for seg in &topk {
            match counts.iter_mut().find(|(s, _)| s == seg) {
                Some((_, c)) => *c += 1,
                None => counts.push((seg.clone(), 1)),
            }
        }

        let count_of = |seg: &SegmentId| {
            counts
                .iter()
                .find(|(s, _)| s == seg)
                .map(|(_, c)| *c)
                .unwrap_or(0)
        };

        let mut best: Option<(&SegmentId, usize)> = None;
        for (seg, own) in &counts {
            let smoothed = own
                + self
                    .neighbors(seg)
                    .iter()
                    .map(|n| count_of(n))
                    .sum::<usize>();
            if best.map_or(true, |(_, b)| smoothed > b) {
                best = Some((seg, smoothed));
            }
        }

        let (winner, score) = best?;
        let winner = winner.clone();
        let success = score as f64 / topk.len() as f64 >= COARSE_SUCCESS_RATIO;
        Some(CoarseResult {
            topk,
            winner,
            score,
            success,
        })
    }
}
