use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON5 parse error: {0}")]
    Json5(#[from] json5::Error),
    #[error("Config directory not found")]
    NoDirFound,
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Hosted model provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Environment variable holding the API key. Re-read on every call.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// REST base URL.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Vision model used for signboard analysis.
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,
    /// Text model used to turn coordinates into a place name.
    #[serde(default = "default_analysis_model")]
    pub locality_model: String,
    /// Video generation model.
    #[serde(default = "default_video_model")]
    pub video_model: String,
    /// Interval between video operation polls.
    #[serde(default = "default_video_poll_secs")]
    pub video_poll_secs: u64,
    /// Give up on a video operation after this long.
    #[serde(default = "default_video_timeout_secs")]
    pub video_timeout_secs: u64,
    /// Per-request HTTP timeout.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_api_key_env() -> String {
    "GEMINI_API_KEY".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_analysis_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_video_model() -> String {
    "veo-3.1-fast-generate-preview".to_string()
}

fn default_video_poll_secs() -> u64 {
    5
}

fn default_video_timeout_secs() -> u64 {
    600
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_api_key_env(),
            base_url: default_base_url(),
            analysis_model: default_analysis_model(),
            locality_model: default_analysis_model(),
            video_model: default_video_model(),
            video_poll_secs: default_video_poll_secs(),
            video_timeout_secs: default_video_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ProviderConfig {
    pub fn video_poll_interval(&self) -> Duration {
        Duration::from_secs(self.video_poll_secs)
    }

    pub fn video_timeout(&self) -> Duration {
        Duration::from_secs(self.video_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Stage controller timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    /// Minimum time spent in Processing before a successful result is shown.
    #[serde(default = "default_dwell_ms")]
    pub dwell_ms: u64,
}

fn default_dwell_ms() -> u64 {
    3800
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            dwell_ms: default_dwell_ms(),
        }
    }
}

impl WorkflowConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }
}

/// Progress animation timing. Independent of [`WorkflowConfig::dwell_ms`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Length of the normalized timeline.
    #[serde(default = "default_total_ms")]
    pub total_ms: u64,
    /// Sampling interval.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Extra time after the timeline ends before completion is signalled.
    #[serde(default = "default_grace_ms")]
    pub grace_ms: u64,
    /// Start offset between consecutive tasks, as a fraction of the timeline.
    #[serde(default = "default_stagger_step")]
    pub stagger_step: f64,
    /// Width of each task's working window, as a fraction of the timeline.
    #[serde(default = "default_window")]
    pub window: f64,
}

fn default_total_ms() -> u64 {
    3500
}

fn default_tick_ms() -> u64 {
    50
}

fn default_grace_ms() -> u64 {
    500
}

fn default_stagger_step() -> f64 {
    0.1
}

fn default_window() -> f64 {
    0.4
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            total_ms: default_total_ms(),
            tick_ms: default_tick_ms(),
            grace_ms: default_grace_ms(),
            stagger_step: default_stagger_step(),
            window: default_window(),
        }
    }
}

impl SimulatorConfig {
    pub fn total(&self) -> Duration {
        Duration::from_millis(self.total_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(1))
    }

    /// Time after which the simulator stops ticking.
    pub fn finish_after(&self) -> Duration {
        Duration::from_millis(self.total_ms + self.grace_ms)
    }

    /// Working window, limited to the whole timeline.
    pub fn window_fraction(&self) -> f64 {
        self.window.clamp(0.0, 1.0)
    }

    /// Start offset between consecutive tasks when `count` tasks are shown.
    ///
    /// Shrunk below `stagger_step` when needed so the last task's window
    /// still ends by the end of the timeline.
    pub fn stagger_for(&self, count: usize) -> f64 {
        if count <= 1 {
            return 0.0;
        }
        let room = (1.0 - self.window_fraction()) / (count - 1) as f64;
        self.stagger_step.min(room).max(0.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.window > 0.0 && self.window <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "simulator.window must be in (0, 1], got {}",
                self.window
            )));
        }
        if !(self.stagger_step >= 0.0 && self.stagger_step < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "simulator.stagger_step must be in [0, 1), got {}",
                self.stagger_step
            )));
        }
        Ok(())
    }
}

/// Camera capture settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// JPEG quality, 1 to 100.
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

fn default_jpeg_quality() -> u8 {
    80
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

/// Geolocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalityConfig {
    /// Region used as the model hint until a place name is known.
    #[serde(default = "default_region")]
    pub default_region: String,
    /// Fixed coordinates; when absent the IP lookup is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    /// IP geolocation endpoint returning `{"lat": .., "lon": ..}`.
    #[serde(default = "default_ip_lookup_url")]
    pub ip_lookup_url: String,
}

fn default_region() -> String {
    "India".to_string()
}

fn default_ip_lookup_url() -> String {
    "http://ip-api.com/json".to_string()
}

impl Default for LocalityConfig {
    fn default() -> Self {
        Self {
            default_region: default_region(),
            latitude: None,
            longitude: None,
            ip_lookup_url: default_ip_lookup_url(),
        }
    }
}

impl LocalityConfig {
    pub fn fixed_coordinates(&self) -> Option<(f64, f64)> {
        self.latitude.zip(self.longitude)
    }
}

/// Local persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database path. Defaults to `~/.signlens/signlens.db`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db_path: Option<PathBuf>,
    /// Save every completed record.
    #[serde(default = "default_true")]
    pub save_records: bool,
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            save_records: default_true(),
        }
    }
}

/// Top-level signlens configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignLensConfig {
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub simulator: SimulatorConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub locality: LocalityConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

impl SignLensConfig {
    /// Resolved database path.
    pub fn db_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.storage.db_path {
            Some(p) => Ok(p.clone()),
            None => Ok(config_dir()?.join("signlens.db")),
        }
    }
}

/// Resolve the signlens config directory (~/.signlens/).
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    dirs::home_dir()
        .map(|h| h.join(".signlens"))
        .ok_or(ConfigError::NoDirFound)
}

/// Resolve the config file path (~/.signlens/config.json5).
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.json5"))
}

/// Load configuration from the default path, falling back to defaults.
pub fn load_config() -> Result<SignLensConfig, ConfigError> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let path = config_file_path()?;
    load_config_from(&path)
}

/// Load configuration from a specific path, falling back to defaults if not found.
pub fn load_config_from(path: &Path) -> Result<SignLensConfig, ConfigError> {
    if !path.exists() {
        tracing::debug!("Config file not found at {}, using defaults", path.display());
        return Ok(SignLensConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: SignLensConfig = json5::from_str(&content)?;
    config.simulator.validate()?;
    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}

/// Ensure the config directory exists.
pub fn ensure_config_dir() -> Result<PathBuf, ConfigError> {
    let dir = config_dir()?;
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
    }
    Ok(dir)
}

/// Write configuration as pretty JSON (valid JSON5) to `path`.
pub fn save_config_to(config: &SignLensConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| ConfigError::Io(std::io::Error::other(e)))?;
    std::fs::write(path, content)?;
    Ok(())
}
