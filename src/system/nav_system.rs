//! Navigation system - the API the transport layer calls.
//!
//! `NavSystem` owns the shared read-only data (map graph, path tables,
//! place database, models) and the session registry. Every entry point
//! takes a session id; sessions are created on first use.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::messages::Navigation;
use super::sessions::{Session, SessionRegistry};
use crate::atlas::{Destination, FloorKey, MapGraph, SegmentCache};
use crate::config::{Config, LocationConfig};
use crate::error::{NavError, Result};
use crate::io::{FileSegmentStore, PlaceData, SegmentStore};
use crate::localization::{CoarseLocator, FineLocalizer, Models, QueryImage};
use crate::navigation::{instructions, TrajectoryPlanner};
use crate::tracking::{Localizers, PoseUpdate};

/// Top-level localization and navigation service.
pub struct NavSystem {
    planner: TrajectoryPlanner,
    localizers: Localizers,
    sessions: SessionRegistry,
    /// Default location, changed by `update_location`.
    location: RwLock<LocationConfig>,
}

impl NavSystem {
    /// Load every startup file under `config.io_root` and build the system.
    pub fn from_config(config: &Config, models: Models) -> anyhow::Result<Self> {
        let data = PlaceData::load(config)
            .with_context(|| format!("Failed to load place {}", config.location.place))?;
        let store = Arc::new(FileSegmentStore::new(config.place_dir()));
        Ok(Self::new(config, data, models, store))
    }

    pub fn new(config: &Config, data: PlaceData, models: Models, store: Arc<dyn SegmentStore>) -> Self {
        let preload = config
            .hloc
            .load_all_maps
            .then(|| FloorKey::new(&config.location.building, &config.location.floor));
        let localizers = Localizers {
            cache: Arc::new(SegmentCache::new(store)),
            coarse: CoarseLocator::new(
                Arc::new(data.places),
                models.global.clone(),
                config.hloc.coarse_retrieval_num,
            ),
            fine: FineLocalizer::new(models, &config.hloc),
            policy: config.session.clone(),
            preload,
        };
        Self::with_localizers(
            Arc::new(data.graph),
            config.location.clone(),
            localizers,
            config.hloc.implicit_num,
        )
    }

    pub fn with_localizers(
        graph: Arc<MapGraph>,
        location: LocationConfig,
        localizers: Localizers,
        implicit_num: usize,
    ) -> Self {
        let planner = TrajectoryPlanner::new(graph);
        info!(
            "Navigation system ready: {} floors, {} path nodes",
            planner.graph().num_floors(),
            planner.tables().num_nodes()
        );
        Self {
            planner,
            localizers,
            sessions: SessionRegistry::new(implicit_num),
            location: RwLock::new(location),
        }
    }

    pub fn cache(&self) -> &SegmentCache {
        &self.localizers.cache
    }

    pub fn num_sessions(&self) -> usize {
        self.sessions.len()
    }

    /// Localize one frame of `session_id`.
    ///
    /// Returns `None` when the frame was overtaken by a later frame of the
    /// same session or the session was terminated meanwhile.
    pub fn handle_localization(&self, session_id: &str, image: &QueryImage) -> Option<PoseUpdate> {
        let session = self.sessions.get_or_create(session_id);
        let arrival = session.next_arrival();
        self.apply_frame(&session, arrival, image, Instant::now())
    }

    fn apply_frame(
        &self,
        session: &Session,
        arrival: u64,
        image: &QueryImage,
        now: Instant,
    ) -> Option<PoseUpdate> {
        let mut inner = session.inner.lock();
        if session.is_terminated() {
            return None;
        }
        if arrival < inner.last_applied {
            debug!("Session {}: dropping stale frame {}", session.id, arrival);
            return None;
        }

        let outcome = inner
            .tracker
            .process_frame(&self.localizers, &session.cache_key, image, now);
        inner.last_applied = arrival;

        if session.is_terminated() {
            // Terminated while localizing: give back what this frame loaded.
            self.localizers.cache.release_session(&session.cache_key);
            return None;
        }

        let mut update = inner.tracker.pose_update(&outcome);
        if update.floorplan_changed {
            update.floorplan = update
                .floor_key()
                .map(|key| self.planner.graph().floorplan_path(&key));
        }
        Some(update)
    }

    /// Select the destination `session_id` navigates to.
    pub fn select_destination(
        &self,
        session_id: &str,
        place: &str,
        building: &str,
        floor: &str,
        destination_id: &str,
    ) -> Result<()> {
        if place != self.planner.graph().place {
            return Err(NavError::UnknownFloor {
                building: building.to_string(),
                floor: floor.to_string(),
            });
        }
        let key = FloorKey::new(building, floor);
        let destination = self.planner.select_destination(&key, destination_id)?;

        let session = self.sessions.get_or_create(session_id);
        session.inner.lock().destination = Some(destination);
        info!("Session {}: destination {} on {}", session_id, destination_id, key);
        Ok(())
    }

    /// Route from the session's last pose to its destination.
    pub fn handle_navigation(&self, session_id: &str) -> Result<Navigation> {
        let session = self.sessions.get(session_id).ok_or(NavError::DestinationNotSet)?;
        let inner = session.inner.lock();

        let destination = inner.destination.as_ref().ok_or(NavError::DestinationNotSet)?;
        let state = &inner.tracker.state;
        let (Some(pose), Some(floor)) = (state.pose, state.floor.as_ref()) else {
            return Err(NavError::LocalizeFirst);
        };

        let legs = self.planner.calculate_path(floor, &pose, destination)?;
        let instructions = instructions(&pose, &legs);
        Ok(Navigation { legs, instructions })
    }

    /// End `session_id` and release every segment it holds.
    pub fn terminate(&self, session_id: &str) {
        if let Some(session) = self.sessions.remove(session_id) {
            self.localizers.cache.release_session(&session.cache_key);
        }
    }

    /// Destinations of a floor, sorted by name.
    pub fn destinations(&self, building: &str, floor: &str) -> Result<Vec<Destination>> {
        self.planner.graph().destinations(&FloorKey::new(building, floor))
    }

    pub fn floorplan_path(&self, building: &str, floor: &str) -> Result<PathBuf> {
        let key = FloorKey::new(building, floor);
        self.planner.graph().floor(&key)?;
        Ok(self.planner.graph().floorplan_path(&key))
    }

    /// Store a new default location; returns the floor's scale if known.
    pub fn update_location(&self, place: &str, building: &str, floor: &str) -> Option<f64> {
        *self.location.write() = LocationConfig {
            place: place.to_string(),
            building: building.to_string(),
            floor: floor.to_string(),
        };
        self.planner
            .graph()
            .scale_for(place, &FloorKey::new(building, floor))
    }

    pub fn location(&self) -> LocationConfig {
        self.location.read().clone()
    }
}
