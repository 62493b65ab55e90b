//! Configuration using Figment
//!
//! Configuration is layered, later layers overriding earlier ones:
//! 1. built-in defaults
//! 2. `config/bridge.toml` (or the file given on the command line)
//! 3. environment variables prefixed with `GENICAM_BRIDGE_`, with `__` between nested keys
//!
//! # Example
//! ```no_run
//! use genicam_bridge::config::BridgeConfig;
//!
//! let config = BridgeConfig::load()?;
//! config.validate()?;
//! println!("Producer: {}", config.camera.cti_file.display());
//! # Ok::<(), genicam_bridge::error::BridgeError>(())
//! ```
//!
//! `GENICAM_BRIDGE_CAMERA__AUTO_START=true` overrides `camera.auto_start`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::feature::Visibility;
use crate::genicam::SimOptions;
use crate::session::SessionSettings;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "GENICAM_BRIDGE_";

/// Longest accepted `camera.fetch_timeout_s`.
pub const MAX_FETCH_TIMEOUT_S: f64 = 60.0;
/// Lower end of the accepted `camera.max_frame_rate_hz` range.
pub const MIN_FRAME_RATE_HZ: f64 = 0.01;
/// Upper end of the accepted `camera.max_frame_rate_hz` range.
pub const MAX_FRAME_RATE_HZ: f64 = 10_000.0;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Camera session settings
    pub camera: CameraConfig,
    /// Simulated backend used by the headless mode
    pub sim: SimConfig,
    /// Control panel window
    pub gui: GuiConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "GenICam Bridge".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Camera session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// GenTL producer (.cti) to load
    pub cti_file: PathBuf,
    /// Bind the first device the producer reports
    pub connect_first_available: bool,
    /// Start streaming as soon as a device is bound
    pub auto_start: bool,
    /// Upper bound of one buffer fetch, in seconds
    pub fetch_timeout_s: f64,
    /// Pause after a timed out fetch, in milliseconds
    pub timeout_backoff_ms: u64,
    /// Upper bound on delivered frames per second
    pub max_frame_rate_hz: f64,
    /// Frames buffered per viewer
    pub frame_channel_capacity: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            cti_file: PathBuf::from("sim/producer.cti"),
            connect_first_available: false,
            auto_start: false,
            fetch_timeout_s: 0.0001,
            timeout_backoff_ms: 100,
            max_frame_rate_hz: 90.0,
            frame_channel_capacity: 16,
        }
    }
}

/// Simulated camera configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Number of simulated devices
    pub devices: usize,
    /// Initial width in pixels
    pub width: i64,
    /// Initial height in pixels
    pub height: i64,
    /// Initial PFNC pixel format name
    pub pixel_format: String,
}

impl Default for SimConfig {
    fn default() -> Self {
        let options = SimOptions::default();
        Self {
            devices: options.devices,
            width: options.width,
            height: options.height,
            pixel_format: options.pixel_format,
        }
    }
}

/// Control panel window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuiConfig {
    /// Visibility level selected at startup
    pub visibility: Visibility,
    /// Initial window width in points
    pub width: f32,
    /// Initial window height in points
    pub height: f32,
}

impl Default for GuiConfig {
    fn default() -> Self {
        Self {
            visibility: Visibility::Beginner,
            width: 1280.0,
            height: 800.0,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `config/bridge.toml` and environment variables
    pub fn load() -> BridgeResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file leaves the defaults.
    pub fn load_from<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let config = Figment::from(Serialized::defaults(BridgeConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> BridgeResult<()> {
        let invalid = |msg: String| Err(BridgeError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return invalid(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            ));
        }

        if self.camera.cti_file.as_os_str().is_empty() {
            return invalid("camera.cti_file must not be empty".to_string());
        }

        let timeout = self.camera.fetch_timeout_s;
        if !(timeout > 0.0 && timeout <= MAX_FETCH_TIMEOUT_S) {
            return invalid(format!(
                "Invalid fetch_timeout_s {timeout}. Must be in (0, {MAX_FETCH_TIMEOUT_S}] seconds"
            ));
        }

        let rates = MIN_FRAME_RATE_HZ..=MAX_FRAME_RATE_HZ;
        if !rates.contains(&self.camera.max_frame_rate_hz) {
            return invalid(format!(
                "Invalid max_frame_rate_hz {}. Must be in [{MIN_FRAME_RATE_HZ}, {MAX_FRAME_RATE_HZ}]",
                self.camera.max_frame_rate_hz
            ));
        }

        if self.camera.frame_channel_capacity == 0 {
            return invalid("camera.frame_channel_capacity must be at least 1".to_string());
        }

        if crate::genicam::pfnc::by_name(&self.sim.pixel_format).is_none() {
            return invalid(format!("Unknown sim.pixel_format '{}'", self.sim.pixel_format));
        }

        if self.gui.width <= 0.0 || self.gui.height <= 0.0 {
            return invalid(format!(
                "Invalid window size {}x{}",
                self.gui.width, self.gui.height
            ));
        }

        Ok(())
    }

    /// Effective configuration rendered as TOML, in the layout of `config/bridge.toml`.
    pub fn to_toml(&self) -> BridgeResult<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Configuration(e.to_string()))
    }

    /// Settings for a [`CameraSession`](crate::session::CameraSession).
    ///
    /// Expects a configuration that passed [`validate`](Self::validate).
    pub fn session_settings(&self) -> SessionSettings {
        let camera = &self.camera;
        SessionSettings {
            cti_file: camera.cti_file.clone(),
            connect_first_available: camera.connect_first_available,
            auto_start: camera.auto_start,
            fetch_timeout: Duration::from_secs_f64(camera.fetch_timeout_s),
            timeout_backoff: Duration::from_millis(camera.timeout_backoff_ms),
            frame_interval: Duration::from_secs_f64(1.0 / camera.max_frame_rate_hz),
            frame_channel_capacity: camera.frame_channel_capacity,
        }
    }

    /// Options for the simulated backend.
    pub fn sim_options(&self) -> SimOptions {
        SimOptions {
            devices: self.sim.devices,
            width: self.sim.width,
            height: self.sim.height,
            pixel_format: self.sim.pixel_format.clone(),
            register_node: false,
        }
    }
}
