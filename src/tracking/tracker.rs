//! Per-session localization tracker.
//!
//! Each session owns one [`Tracker`]: its localization state, the temporal
//! pose window and the cluster bound for fine localization. A frame goes
//! through one of two paths:
//! - Cold (no segment, too many failures, stale success): coarse place
//!   recognition picks a segment, its cluster is loaded, then fine localization
//! - Warm: the tracked segment's cluster is (idempotently) loaded and the
//!   frame goes straight to the fine localizer
//!
//! A successful fine localization predicts the next segment; when it differs
//! from the tracked one the tracker switches clusters and releases segments
//! of the old cluster that the new one does not need.
//!
//! In preloaded mode every segment of one floor is loaded on the first frame
//! and only the prediction-driven switches remain.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use super::result::PoseUpdate;
use super::state::{LocalizationPhase, LocalizationState};
use crate::atlas::{FloorKey, SegmentCache, SegmentId};
use crate::config::SessionConfig;
use crate::localization::{BoundCluster, CoarseLocator, FineLocalizer, QueryImage, TemporalWindow};

/// Shared localization services used by every session's tracker.
pub struct Localizers {
    pub cache: Arc<SegmentCache>,
    pub coarse: CoarseLocator,
    pub fine: FineLocalizer,
    pub policy: SessionConfig,
    /// Floor loaded in full for every session (`load_all_maps`).
    pub preload: Option<FloorKey>,
}

/// What a frame did to the session, before floorplan paths are resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackOutcome {
    pub floorplan_changed: bool,
}

/// Localization tracker of one session.
#[derive(Debug)]
pub struct Tracker {
    pub state: LocalizationState,
    window: TemporalWindow,
    cluster: Option<BoundCluster>,
    /// Segment ids requested for the bound cluster.
    held: Vec<SegmentId>,
    preloaded: bool,
}

impl Tracker {
    pub fn new(implicit_num: usize) -> Self {
        Self {
            state: LocalizationState::default(),
            window: TemporalWindow::new(implicit_num),
            cluster: None,
            held: Vec::new(),
            preloaded: false,
        }
    }

    pub fn phase(&self) -> LocalizationPhase {
        self.state.phase()
    }

    /// Segment ids of the bound cluster request.
    pub fn held(&self) -> &[SegmentId] {
        &self.held
    }

    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Localize one frame and update the session state.
    ///
    /// `session_id` is the key the session's segments are held under in
    /// the cache.
    pub fn process_frame(
        &mut self,
        loc: &Localizers,
        session_id: &str,
        image: &QueryImage,
        now: Instant,
    ) -> TrackOutcome {
        match &loc.preload {
            Some(floor) => self.process_preloaded(loc, session_id, image, now, floor),
            None => self.process_tracked(loc, session_id, image, now),
        }
    }

    fn process_tracked(
        &mut self,
        loc: &Localizers,
        session_id: &str,
        image: &QueryImage,
        now: Instant,
    ) -> TrackOutcome {
        let previous_floor = self.state.floor.clone();
        let relocalize = self.state.needs_relocalization(now, &loc.policy);

        if relocalize {
            let winner = loc
                .coarse
                .coarse_vpr(image)
                .filter(|r| r.success)
                .map(|r| r.winner);
            let Some(winner) = winner else {
                debug!("Session {}: coarse relocalization failed", session_id);
                self.unbind(loc, session_id);
                self.state.forget();
                self.state.record_failure();
                return TrackOutcome {
                    floorplan_changed: false,
                };
            };
            if self.state.segment.as_ref() != Some(&winner) {
                info!("Session {}: relocalized to {}", session_id, winner);
            }
            self.bind(loc, session_id, loc.coarse.cluster(&winner));
            self.state.track(winner);
        } else if let Some(segment) = self.state.segment.clone() {
            self.bind(loc, session_id, loc.coarse.cluster(&segment));
        }

        let mut floorplan_changed = relocalize && self.state.floor != previous_floor;
        if self.localize(loc, session_id, image, now, true) {
            floorplan_changed = true;
        }
        TrackOutcome { floorplan_changed }
    }

    fn process_preloaded(
        &mut self,
        loc: &Localizers,
        session_id: &str,
        image: &QueryImage,
        now: Instant,
        floor: &FloorKey,
    ) -> TrackOutcome {
        if !self.preloaded {
            let segments = loc.coarse.segments_on_floor(floor);
            info!("Session {}: preloading {} segments of {}", session_id, segments.len(), floor);
            self.bind(loc, session_id, segments);
            self.preloaded = true;
        }

        let previous_floor = self.state.floor.clone();
        self.localize(loc, session_id, image, now, false);
        TrackOutcome {
            floorplan_changed: self.state.pose.is_some() && self.state.floor != previous_floor,
        }
    }

    /// Run fine localization on the bound cluster. Returns whether the
    /// tracked segment switched.
    fn localize(
        &mut self,
        loc: &Localizers,
        session_id: &str,
        image: &QueryImage,
        now: Instant,
        switch_clusters: bool,
    ) -> bool {
        let Some(cluster) = self.cluster.as_ref() else {
            self.state.record_failure();
            return false;
        };
        let Some(fine) = loc.fine.get_location(cluster, image, &mut self.window) else {
            self.state.record_failure();
            return false;
        };

        self.state.record_success(fine.pose, now);
        if self.state.segment.as_ref() == Some(&fine.segment) {
            return false;
        }

        info!(
            "Session {}: switching segment {:?} -> {}",
            session_id,
            self.state.segment.as_ref().map(SegmentId::as_str),
            fine.segment
        );
        if switch_clusters {
            self.bind(loc, session_id, loc.coarse.cluster(&fine.segment));
        }
        self.state.track(fine.segment);
        switch_clusters
    }

    /// Load `ids` for the session, release the old cluster's leftovers and
    /// bind the merged map for fine localization.
    fn bind(&mut self, loc: &Localizers, session_id: &str, ids: Vec<SegmentId>) {
        if self.cluster.is_some() && self.held == ids {
            return;
        }

        let map = loc.cache.load(session_id, &ids);
        let stale: Vec<SegmentId> = self
            .held
            .iter()
            .filter(|id| !ids.contains(id))
            .cloned()
            .collect();
        if !stale.is_empty() {
            loc.cache.release(session_id, &stale);
        }
        self.held = ids;

        let cluster = map.and_then(BoundCluster::new);
        let floor_changed = match (&self.cluster, &cluster) {
            (Some(old), Some(new)) => old.floor() != new.floor(),
            _ => true,
        };
        if floor_changed {
            self.window.clear();
        }
        if let Some(c) = &cluster {
            debug!(
                "Session {}: bound {} frames from {} segments on {}",
                session_id,
                c.num_frames(),
                c.segments().len(),
                c.floor()
            );
        }
        self.cluster = cluster;
    }

    /// Release everything the tracker holds.
    fn unbind(&mut self, loc: &Localizers, session_id: &str) {
        if !self.held.is_empty() {
            loc.cache.release(session_id, &self.held);
        }
        self.held.clear();
        self.cluster = None;
        self.window.clear();
    }

    /// Pose update for the client from the current state.
    pub fn pose_update(&self, outcome: &TrackOutcome) -> PoseUpdate {
        PoseUpdate {
            pose: self.state.pose,
            building: self.state.floor.as_ref().map(|f| f.building.clone()),
            floor: self.state.floor.as_ref().map(|f| f.floor.clone()),
            segment: self.state.segment.clone(),
            floorplan_changed: outcome.floorplan_changed,
            floorplan: None,
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::localization::collaborators::test_support::image;

    fn seg(s: &str) -> SegmentId {
        SegmentId::new(s)
    }

    #[test]
    fn test_cold_start_relocalizes_and_switches_to_best_segment() {
        let fx = fixture(None);
        let mut tracker = Tracker::new(5);
        let now = Instant::now();

        // Query looks like A: coarse picks A, cluster {A, B}; fine sees both
        // frames and B has more inliers, so the tracker switches to B.
        let outcome = tracker.process_frame(&fx.loc, "s1", &image(), now);
        assert!(outcome.floorplan_changed);
        assert_eq!(tracker.state.segment, Some(seg(B)));
        assert_eq!(tracker.phase(), LocalizationPhase::Warm);
        assert!(tracker.state.pose.is_some());
        assert_eq!(tracker.held(), &[seg(B), seg(A)]);
        assert_eq!(fx.loc.cache.held_by("s1"), vec![seg(A), seg(B)]);
    }

    #[test]
    fn test_warm_frame_skips_coarse() {
        let fx = fixture(None);
        let mut tracker = Tracker::new(5);
        let now = Instant::now();
        tracker.process_frame(&fx.loc, "s1", &image(), now);

        // Query now looks like B; still B, no coarse round.
        fx.global.set(Some(vec![0.0, 1.0, 0.0]));
        let outcome = tracker.process_frame(&fx.loc, "s1", &image(), now);
        assert!(!outcome.floorplan_changed);
        assert_eq!(tracker.state.failures, 0);
        assert_eq!(tracker.window_len(), 2);
    }

    #[test]
    fn test_coarse_failure_releases_cluster() {
        let fx = fixture(None);
        let mut tracker = Tracker::new(5);
        let now = Instant::now();
        tracker.process_frame(&fx.loc, "s1", &image(), now);

        tracker.state.failures = fx.loc.policy.coarse_localize_threshold;
        fx.global.set(None);
        let outcome = tracker.process_frame(&fx.loc, "s1", &image(), now);
        assert!(!outcome.floorplan_changed);
        assert!(tracker.state.segment.is_none());
        assert!(tracker.state.floor.is_none());
        assert!(tracker.state.pose.is_none());
        assert!(fx.loc.cache.held_by("s1").is_empty());
        assert!(fx.loc.cache.is_empty());
    }

    #[test]
    fn test_relocalization_to_other_floor_releases_old_cluster() {
        let fx = fixture(None);
        let mut tracker = Tracker::new(5);
        let now = Instant::now();
        tracker.process_frame(&fx.loc, "s1", &image(), now);
        assert_eq!(tracker.state.floor, Some(FloorKey::new("B", "1_floor")));

        tracker.state.failures = fx.loc.policy.coarse_localize_threshold;
        fx.global.set(Some(vec![0.0, 0.0, 1.0]));
        let outcome = tracker.process_frame(&fx.loc, "s1", &image(), now);
        assert!(outcome.floorplan_changed);
        assert_eq!(tracker.state.segment, Some(seg(C)));
        assert_eq!(tracker.state.floor, Some(FloorKey::new("B", "2_floor")));
        assert_eq!(fx.loc.cache.held_by("s1"), vec![seg(C)]);
        assert_eq!(tracker.window_len(), 1);
    }

    #[test]
    fn test_preloaded_mode_loads_floor_once() {
        let fx = fixture(Some(FloorKey::new("B", "1_floor")));
        let mut tracker = Tracker::new(5);
        let now = Instant::now();

        let first = tracker.process_frame(&fx.loc, "s1", &image(), now);
        assert!(first.floorplan_changed);
        assert_eq!(fx.loc.cache.held_by("s1"), vec![seg(A), seg(B)]);
        assert_eq!(tracker.state.segment, Some(seg(B)));

        // Failures never trigger coarse relocalization or release.
        fx.global.set(None);
        for _ in 0..10 {
            let out = tracker.process_frame(&fx.loc, "s1", &image(), now);
            assert!(!out.floorplan_changed);
        }
        assert_eq!(tracker.state.failures, 10);
        assert_eq!(fx.loc.cache.held_by("s1"), vec![seg(A), seg(B)]);
    }

    #[test]
    fn test_pose_update_reflects_state() {
        let fx = fixture(None);
        let mut tracker = Tracker::new(5);
        let outcome = tracker.process_frame(&fx.loc, "s1", &image(), Instant::now());
        let update = tracker.pose_update(&outcome);
        assert_eq!(update.building.as_deref(), Some("B"));
        assert_eq!(update.floor.as_deref(), Some("1_floor"));
        assert!(update.is_localized());
        assert!(update.floorplan_changed);
    }
}
