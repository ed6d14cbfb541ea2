//! Service configuration loaded from YAML.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root directory holding `data/<place>/...`.
    #[serde(default = "default_io_root")]
    pub io_root: PathBuf,

    /// Default location used by the preloaded mode and the CLI.
    #[serde(default)]
    pub location: LocationConfig,

    #[serde(default)]
    pub hloc: HlocConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Place / building / floor triple.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LocationConfig {
    pub place: String,
    pub building: String,
    pub floor: String,
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            place: "New_York_City".to_string(),
            building: "LightHouse".to_string(),
            floor: "6_floor".to_string(),
        }
    }
}

/// Local feature matcher family.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    LightGlue,
    SuperGlue,
}

/// How retrieved reference frames are fed to the local matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStrategy {
    /// References are matched in chunks of `mini_batch`.
    Batched { mini_batch: usize },
    /// One matcher call per reference frame.
    PerFrame,
}

/// Hierarchical localization parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct HlocConfig {
    /// Top-K reference frames retrieved inside a cluster.
    #[serde(default = "default_retrieval_num")]
    pub retrieval_num: usize,

    /// Top-K reference frames used by coarse place recognition.
    #[serde(default = "default_retrieval_num")]
    pub coarse_retrieval_num: usize,

    /// Capacity of the per-session temporal pose window.
    #[serde(default = "default_implicit_num")]
    pub implicit_num: usize,

    /// Minimum match / inlier count (exclusive) for a candidate frame.
    #[serde(default = "default_ransac_thre")]
    pub ransac_thre: usize,

    #[serde(default = "default_match_type")]
    pub match_type: MatchType,

    #[serde(default = "default_true")]
    pub batch_mode: bool,

    #[serde(default = "default_mini_batch")]
    pub mini_batch: usize,

    /// Load every segment of the configured floor once and skip relocalization.
    #[serde(default)]
    pub load_all_maps: bool,
}

impl HlocConfig {
    /// Matching strategy implied by the matcher family and `batch_mode`.
    pub fn match_strategy(&self) -> MatchStrategy {
        match (self.match_type, self.batch_mode) {
            (MatchType::LightGlue, true) => MatchStrategy::Batched {
                mini_batch: self.mini_batch.max(1),
            },
            _ => MatchStrategy::PerFrame,
        }
    }
}

impl Default for HlocConfig {
    fn default() -> Self {
        Self {
            retrieval_num: default_retrieval_num(),
            coarse_retrieval_num: default_retrieval_num(),
            implicit_num: default_implicit_num(),
            ransac_thre: default_ransac_thre(),
            match_type: default_match_type(),
            batch_mode: true,
            mini_batch: default_mini_batch(),
            load_all_maps: false,
        }
    }
}

/// Coarse-vs-fine relocalization policy.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Consecutive failures that force coarse relocalization.
    #[serde(default = "default_coarse_threshold")]
    pub coarse_localize_threshold: u32,

    /// Seconds since the last success that force coarse relocalization.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            coarse_localize_threshold: default_coarse_threshold(),
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_root: default_io_root(),
            location: LocationConfig::default(),
            hloc: HlocConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
        let config: Config = serde_yaml::from_reader(file)
            .with_context(|| format!("Failed to parse config {:?}", path))?;
        Ok(config)
    }

    /// `<io_root>/data`, home of `scale.json` and the place directories.
    pub fn data_dir(&self) -> PathBuf {
        self.io_root.join("data")
    }

    /// Directory holding the data of the configured place.
    pub fn place_dir(&self) -> PathBuf {
        self.data_dir().join(&self.location.place)
    }
}

fn default_io_root() -> PathBuf {
    PathBuf::from("/mnt/data/UNav-IO")
}
fn default_retrieval_num() -> usize {
    10
}
fn default_implicit_num() -> usize {
    5
}
fn default_ransac_thre() -> usize {
    10
}
fn default_match_type() -> MatchType {
    MatchType::LightGlue
}
fn default_true() -> bool {
    true
}
fn default_mini_batch() -> usize {
    15
}
fn default_coarse_threshold() -> u32 {
    5
}
fn default_timeout_seconds() -> u64 {
    600
}
