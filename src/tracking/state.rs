//! Per-session localization state and the relocalization policy.

use std::time::{Duration, Instant};

use crate::atlas::{FloorKey, SegmentId};
use crate::config::SessionConfig;
use crate::geometry::FloorPose;

/// Whether the session currently trusts a segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LocalizationPhase {
    /// No trusted segment; the next frame goes through coarse relocalization.
    #[default]
    Cold,
    /// Tracking a segment; frames go straight to the fine localizer.
    Warm,
}

/// Localization state of one session.
#[derive(Debug, Clone, Default)]
pub struct LocalizationState {
    /// Consecutive failed frames.
    pub failures: u32,
    pub last_success: Option<Instant>,
    pub floor: Option<FloorKey>,
    pub segment: Option<SegmentId>,
    pub pose: Option<FloorPose>,
}

impl LocalizationState {
    pub fn phase(&self) -> LocalizationPhase {
        if self.segment.is_some() {
            LocalizationPhase::Warm
        } else {
            LocalizationPhase::Cold
        }
    }

    /// Relocalize on too many failures, a stale last success, or no segment.
    pub fn needs_relocalization(&self, now: Instant, policy: &SessionConfig) -> bool {
        if self.segment.is_none() || self.failures >= policy.coarse_localize_threshold {
            return true;
        }
        self.last_success
            .map(|t| now.saturating_duration_since(t) > policy.timeout())
            .unwrap_or(false)
    }

    pub fn record_success(&mut self, pose: FloorPose, now: Instant) {
        self.pose = Some(pose);
        self.failures = 0;
        self.last_success = Some(now);
    }

    pub fn record_failure(&mut self) {
        self.pose = None;
        self.failures = self.failures.saturating_add(1);
    }

    /// Track `segment` (and its floor).
    pub fn track(&mut self, segment: SegmentId) {
        self.floor = segment.floor_key().ok();
        self.segment = Some(segment);
    }

    /// Drop the tracked segment and floor.
    pub fn forget(&mut self) {
        self.segment = None;
        self.floor = None;
    }

    /// Time since the last success, if any.
    pub fn since_success(&self, now: Instant) -> Option<Duration> {
        self.last_success.map(|t| now.saturating_duration_since(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn warm_state() -> LocalizationState {
        let mut state = LocalizationState::default();
        state.track(SegmentId::new("B_1_floor_Segment_1"));
        state
    }

    #[test]
    fn test_cold_without_segment() {
        let state = LocalizationState::default();
        assert_eq!(state.phase(), LocalizationPhase::Cold);
        assert!(state.needs_relocalization(Instant::now(), &SessionConfig::default()));
    }

    #[test]
    fn test_failure_threshold_forces_relocalization() {
        let policy = SessionConfig::default();
        let now = Instant::now();
        let mut state = warm_state();
        state.record_success(FloorPose::new(0.0, 0.0, 0.0), now);
        assert_eq!(state.phase(), LocalizationPhase::Warm);
        assert_eq!(state.floor, Some(FloorKey::new("B", "1_floor")));

        for _ in 0..4 {
            state.record_failure();
            assert!(!state.needs_relocalization(now, &policy));
        }
        state.record_failure();
        assert!(state.pose.is_none());
        assert!(state.needs_relocalization(now, &policy));
    }

    #[test]
    fn test_timeout_forces_relocalization() {
        let policy = SessionConfig {
            timeout_seconds: 10,
            ..Default::default()
        };
        let start = Instant::now();
        let mut state = warm_state();
        state.record_success(FloorPose::new(0.0, 0.0, 0.0), start);
        assert!(!state.needs_relocalization(start + Duration::from_secs(10), &policy));
        assert!(state.needs_relocalization(start + Duration::from_secs(11), &policy));
        assert_eq!(state.since_success(start + Duration::from_secs(3)), Some(Duration::from_secs(3)));
    }

    #[test]
    fn test_forget_goes_cold() {
        let mut state = warm_state();
        state.forget();
        assert_eq!(state.phase(), LocalizationPhase::Cold);
        assert!(state.floor.is_none());
    }
}
