//! Configuration – reads/writes `~/.epuck/config.toml`.
//!
//! Every section is optional and falls back to the component defaults:
//!
//! ```toml
//! work_timeout_secs = 600
//!
//! [odometry]
//! calibration = 1.0
//! robot_radius = 27.0
//!
//! [motion]
//! cruise_speed = 400.0
//!
//! [arena]
//! width = 600.0
//! height = 400.0
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use epuck_hal::sim::ArenaConfig;
use epuck_kernel::{ObstacleConfig, SerializerConfig};
use epuck_perception::odometry::OdometryParams;
use epuck_perception::sensor::SensorGeometry;
use epuck_perception::tracker::TrackerConfig;
use epuck_perception::walls::WallsConfig;
use epuck_runtime::{ExplorerConfig, MotionConfig, SystemConfig};
use epuck_types::{ExplorerError, Verbosity};

/// Persisted configuration stored in `~/.epuck/config.toml`.
///
/// Plain values come before the sections so the file serializes cleanly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Upper bound on one activity, as waited for by the shell.
    pub work_timeout_secs: u64,
    /// Least important operator message still printed.
    pub min_verbosity: Verbosity,
    pub odometry: OdometryParams,
    pub sensor: SensorGeometry,
    pub walls: WallsConfig,
    pub tracker: TrackerConfig,
    pub motion: MotionConfig,
    pub serializer: SerializerConfig,
    pub obstacle: ObstacleConfig,
    pub explorer: ExplorerConfig,
    /// The simulated arena the shell drives.
    pub arena: ArenaConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            work_timeout_secs: 600,
            min_verbosity: Verbosity::Info,
            odometry: OdometryParams::default(),
            sensor: SensorGeometry::default(),
            walls: WallsConfig::default(),
            tracker: TrackerConfig::default(),
            motion: MotionConfig::default(),
            serializer: SerializerConfig::default(),
            obstacle: ObstacleConfig::default(),
            explorer: ExplorerConfig::default(),
            arena: ArenaConfig::default(),
        }
    }
}

impl Config {
    pub fn system(&self) -> SystemConfig {
        SystemConfig {
            odometry: self.odometry,
            sensor: self.sensor,
            walls: self.walls,
            tracker: self.tracker,
            motion: self.motion,
            serializer: self.serializer,
            obstacle: self.obstacle,
            explorer: self.explorer,
        }
    }

    pub fn work_timeout(&self) -> Duration {
        Duration::from_secs(self.work_timeout_secs)
    }
}

/// Return the path to `~/.epuck/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".epuck").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ExplorerError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ExplorerError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| ExplorerError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| ExplorerError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `EPUCK_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `EPUCK_CALIBRATION` | `odometry.calibration` |
/// | `EPUCK_ROBOT_RADIUS` | `odometry.robot_radius` |
/// | `EPUCK_SENSOR_OFFSET` | `sensor.offset` |
/// | `EPUCK_CRUISE_SPEED` | `motion.cruise_speed` |
/// | `EPUCK_OBSTACLE_WATCH` | `obstacle.enabled` |
/// | `EPUCK_WORK_TIMEOUT_SECS` | `work_timeout_secs` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Some(v) = env_parse("EPUCK_CALIBRATION") {
        cfg.odometry.calibration = v;
    }
    if let Some(v) = env_parse("EPUCK_ROBOT_RADIUS") {
        cfg.odometry.robot_radius = v;
    }
    if let Some(v) = env_parse("EPUCK_SENSOR_OFFSET") {
        cfg.sensor.offset = v;
    }
    if let Some(v) = env_parse("EPUCK_CRUISE_SPEED") {
        cfg.motion.cruise_speed = v;
    }
    if let Some(v) = env_parse("EPUCK_OBSTACLE_WATCH") {
        cfg.obstacle.enabled = v;
    }
    if let Some(v) = env_parse("EPUCK_WORK_TIMEOUT_SECS") {
        cfg.work_timeout_secs = v;
    }
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok()?.trim().parse().ok()
}

/// Save the config to disk, creating `~/.epuck/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ExplorerError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ExplorerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ExplorerError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(|e| {
                ExplorerError::Config(format!("failed to set config directory permissions: {e}"))
            })?;
        }
    }
    let raw = toml::to_string_pretty(cfg)
        .map_err(|e| ExplorerError::Config(format!("failed to serialize config: {e}")))?;
    let write_err = |e: std::io::Error| ExplorerError::Config(format!("failed to write {}: {e}", path.display()));

    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}
