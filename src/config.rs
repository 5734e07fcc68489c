// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{DegradePolicy, PoolMode, camera, control, engine, pool};
use crate::errors::ConfigError;
use crate::plugins::PluginSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Capture settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// V4L2 device index (`/dev/videoN`)
    pub device: u32,
    pub width: u32,
    pub height: u32,
    /// Target frame rate; also defines the per-frame time budget
    pub fps: u32,
    /// Scale frames that arrive in another size to width x height
    pub fit: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            device: camera::DEFAULT_DEVICE,
            width: camera::DEFAULT_WIDTH,
            height: camera::DEFAULT_HEIGHT,
            fps: camera::DEFAULT_FPS,
            fit: true,
        }
    }
}

/// Frame buffer pool settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub capacity: usize,
    pub mode: PoolMode,
    /// Longest wait for a free buffer in backpressure mode
    pub acquire_timeout_ms: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            capacity: pool::DEFAULT_CAPACITY,
            mode: PoolMode::default(),
            acquire_timeout_ms: pool::ACQUIRE_TIMEOUT_MS,
        }
    }
}

/// Compositing engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub degrade_policy: DegradePolicy,
    /// Consecutive in-budget frames needed to leave Degraded
    pub recovery_frames: u32,
    /// Stale frames released per iteration while Degraded
    pub max_drops: u32,
    /// Per-plugin time allowance; a slower stage is discarded as a timeout
    pub stage_timeout_ms: Option<u64>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            degrade_policy: DegradePolicy::default(),
            recovery_frames: engine::RECOVERY_FRAMES,
            max_drops: engine::MAX_DROPS_PER_FRAME,
            stage_timeout_ms: None,
        }
    }
}

/// Control plane settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    pub bus_capacity: usize,
    /// Config file polling interval; 0 disables watching
    pub watch_interval_ms: u64,
    pub join_timeout_ms: u64,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            bus_capacity: control::BUS_CAPACITY,
            watch_interval_ms: control::WATCH_INTERVAL_MS,
            join_timeout_ms: control::JOIN_TIMEOUT_MS,
        }
    }
}

impl ControlSettings {
    pub fn watch_interval(&self) -> Option<Duration> {
        (self.watch_interval_ms > 0).then(|| Duration::from_millis(self.watch_interval_ms))
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

fn default_shortcuts() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("quit".to_string(), "q".to_string()),
        ("pause".to_string(), "space".to_string()),
    ])
}

/// Whole configuration file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub camera: CameraSettings,
    pub pool: PoolSettings,
    pub engine: EngineSettings,
    pub control: ControlSettings,
    /// Key combination -> plugin name (toggle) or `plugin.option=value`
    pub hotkeys: BTreeMap<String, String>,
    /// Lifecycle shortcuts: `quit`, `pause`
    #[serde(alias = "keyboard_shortcuts")]
    pub shortcuts: BTreeMap<String, String>,
    #[serde(alias = "plugin_instances")]
    pub plugins: Vec<PluginSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera: CameraSettings::default(),
            pool: PoolSettings::default(),
            engine: EngineSettings::default(),
            control: ControlSettings::default(),
            hotkeys: BTreeMap::new(),
            shortcuts: default_shortcuts(),
            plugins: Vec::new(),
        }
    }
}

impl Config {
    /// Parse JSON text; `origin` only labels errors
    pub fn from_json(text: &str, origin: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        config.check()?;
        Ok(config)
    }

    /// Sanity checks serde cannot express
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "camera size {}x{} is empty",
                self.camera.width, self.camera.height
            )));
        }
        if self.pool.capacity < pool::MIN_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "pool capacity {} is below the minimum of {}",
                self.pool.capacity,
                pool::MIN_CAPACITY
            )));
        }
        if self.control.bus_capacity == 0 {
            return Err(ConfigError::Invalid("bus capacity must be at least 1".into()));
        }
        Ok(())
    }

    pub fn to_json(&self) -> String {
        // Serialising plain data structs with string keys cannot fail
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}

/// Default config file location (`~/.config/overlaycam/config.json`)
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("overlaycam").join("config.json"))
}

/// Where configuration comes from
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<Config, ConfigError>;

    /// File to poll for changes, if the source is file-backed
    fn watch_path(&self) -> Option<&Path> {
        None
    }
}

/// JSON file on disk; a missing file yields the defaults
#[derive(Debug, Clone)]
pub struct JsonConfigSource {
    path: PathBuf,
}

impl JsonConfigSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for JsonConfigSource {
    fn load(&self) -> Result<Config, ConfigError> {
        let shown = self.path.display().to_string();
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %shown, "No config file, using defaults");
                return Ok(Config::default());
            }
            Err(source) => return Err(ConfigError::Read { path: shown, source }),
        };
        let config = Config::from_json(&text, &shown)?;
        debug!(path = %shown, plugins = config.plugins.len(), "Config loaded");
        Ok(config)
    }

    fn watch_path(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Fixed in-memory configuration
#[derive(Debug, Clone, Default)]
pub struct StaticConfigSource(pub Config);

impl ConfigSource for StaticConfigSource {
    fn load(&self) -> Result<Config, ConfigError> {
        Ok(self.0.clone())
    }
}
