use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{BridgeError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub transform: TransformConfig,
    #[serde(default)]
    pub sink: SinkConfig,
}

/// How the server session is started. Chosen once, never probed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CaptureMode {
    /// New live measurement
    Live,
    /// Timed playback of a recorded file (`Start rtfromfile`)
    Replay { file: String },
}

impl Default for CaptureMode {
    fn default() -> Self {
        CaptureMode::Live
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Tracking server host
    #[serde(default = "default_host")]
    pub host: String,
    /// Little-endian RT port
    #[serde(default = "default_port")]
    pub port: u16,
    /// TakeControl password
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default)]
    pub mode: CaptureMode,
    /// Per-command reply timeout (seconds)
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: f64,
}

fn default_host() -> String { "127.0.0.1".to_string() }
fn default_port() -> u16 { 22223 }
fn default_password() -> String { "password".to_string() }
fn default_command_timeout() -> f64 { 5.0 }

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: default_password(),
            mode: CaptureMode::default(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

impl SourceConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn command_timeout(&self) -> Result<Duration> {
        seconds("source.command_timeout_secs", self.command_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Body name, or "all" to broadcast every body
    #[serde(default = "default_target")]
    pub target: String,
    /// Max frames per second requested from the server (0 = every frame)
    #[serde(default = "default_max_frequency")]
    pub max_frequency: u32,
    /// Stop after this many seconds; absent = until stopped
    #[serde(default)]
    pub duration_secs: Option<f64>,
    /// End the session instead of dropping frames when the target is missing
    #[serde(default)]
    pub abort_on_missing_body: bool,
}

fn default_target() -> String { "L-frame".to_string() }
fn default_max_frequency() -> u32 { 1 }

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            max_frequency: default_max_frequency(),
            duration_secs: None,
            abort_on_missing_body: false,
        }
    }
}

impl StreamConfig {
    pub fn duration(&self) -> Result<Option<Duration>> {
        self.duration_secs
            .map(|d| seconds("stream.duration_secs", d))
            .transpose()
    }
}

/// Positive, finite and representable as a `Duration`.
fn seconds(field: &str, secs: f64) -> Result<Duration> {
    if !(secs.is_finite() && secs > 0.0) {
        return Err(BridgeError::Config(format!("{} must be positive, got {}", field, secs)));
    }
    Duration::try_from_secs_f64(secs)
        .map_err(|e| BridgeError::Config(format!("{} = {}: {}", field, secs, e)))
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    /// Row-major 3x3
    #[serde(default = "default_transform_matrix")]
    pub matrix: [[f32; 3]; 3],
    #[serde(default = "default_transform_scale")]
    pub scale: f32,
}

fn default_transform_matrix() -> [[f32; 3]; 3] { [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]] }
fn default_transform_scale() -> f32 { 1.0 }

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            matrix: default_transform_matrix(),
            scale: default_transform_scale(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SinkConfig {
    #[serde(default = "default_sink_enabled")]
    pub enabled: bool,
    /// UDP destination for OSC pose messages
    #[serde(default = "default_sink_addr")]
    pub addr: String,
}

fn default_sink_enabled() -> bool { true }
fn default_sink_addr() -> String { "127.0.0.1:14555".to_string() }

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            enabled: default_sink_enabled(),
            addr: default_sink_addr(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| BridgeError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(content).map_err(|e| BridgeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Missing file → defaults. A file that exists but does not parse is an error.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            tracing::info!("{} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.stream.target.is_empty() {
            return Err(BridgeError::Config("stream.target must not be empty".into()));
        }
        self.stream.duration()?;
        self.source.command_timeout()?;
        if !(self.transform.scale.is_finite() && self.transform.scale != 0.0) {
            return Err(BridgeError::Config("transform.scale must be finite and non-zero".into()));
        }
        if let CaptureMode::Replay { file } = &self.source.mode {
            if file.is_empty() {
                return Err(BridgeError::Config("replay file must not be empty".into()));
            }
        }
        Ok(())
    }
}
