//! Configuration types for Replay Zero

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

use crate::framing::{DEFAULT_FRAME_LIMIT, MAX_FRAME_LIMIT, MIN_FRAME_LIMIT};
use crate::{ReplayError, Result};

/// Where captured events go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Buffer events and render them to scenario files
    Template,
    /// Frame events and send them to a record stream
    Stream,
}

impl Mode {
    /// Check if mode is Template
    #[must_use]
    pub fn is_template(&self) -> bool {
        matches!(self, Mode::Template)
    }

    /// Check if mode is Stream
    #[must_use]
    pub fn is_stream(&self) -> bool {
        matches!(self, Mode::Stream)
    }
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Port the proxy listens on
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    /// Enable debug logging
    #[serde(default)]
    pub debug: bool,
    /// Upstream for origin-form requests
    #[serde(default)]
    pub target: TargetConfig,
    /// Scenario file output
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Record stream output; selects stream mode when present
    #[serde(default)]
    pub stream: Option<StreamConfig>,
    /// Usage reporting
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Upstream target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Target host
    #[serde(default = "default_target_host")]
    pub host: String,
    /// Target port
    #[serde(default = "default_target_port")]
    pub port: u16,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            host: default_target_host(),
            port: default_target_port(),
        }
    }
}

/// Template output settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Events per scenario file
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// `karate`, `gatling`, or a path to a custom template
    #[serde(default = "default_template")]
    pub template: String,
    /// Extension for custom templates
    #[serde(default)]
    pub extension: Option<String>,
    /// Directory scenario files are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            template: default_template(),
            extension: None,
            output_dir: default_output_dir(),
        }
    }
}

/// Record stream settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Stream name
    pub name: String,
    /// Base URL of the record channel
    pub endpoint: String,
    /// Maximum bytes of payload per frame
    #[serde(default = "default_frame_limit")]
    pub frame_limit: usize,
}

/// Usage reporting settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Endpoint receiving usage reports
    #[serde(default)]
    pub endpoint: Option<String>,
}

fn default_listen_port() -> u16 {
    9000
}

fn default_target_host() -> String {
    "localhost".to_string()
}

fn default_target_port() -> u16 {
    8080
}

fn default_batch_size() -> usize {
    1
}

fn default_template() -> String {
    "karate".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_frame_limit() -> usize {
    DEFAULT_FRAME_LIMIT
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            debug: false,
            target: TargetConfig::default(),
            capture: CaptureConfig::default(),
            stream: None,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, parsed or validated
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ReplayError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&content)
    }

    /// Parse, normalize and validate TOML text
    ///
    /// # Errors
    ///
    /// Returns error if the text cannot be parsed or is invalid
    pub fn from_toml(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content)
            .map_err(|e| ReplayError::ConfigError(format!("Failed to parse config: {e}")))?;

        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Operating mode implied by the configuration
    #[must_use]
    pub fn mode(&self) -> Mode {
        if self.stream.is_some() {
            Mode::Stream
        } else {
            Mode::Template
        }
    }

    /// Fix up recoverable settings
    pub fn normalize(&mut self) {
        if self.capture.batch_size == 0 {
            warn!("Batch size cannot be zero! Using batch=1");
            self.capture.batch_size = 1;
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns error if configuration is invalid
    pub fn validate(&self) -> Result<()> {
        if self.listen_port == 0 {
            return Err(ReplayError::ConfigError(
                "listen_port cannot be 0".to_string(),
            ));
        }

        if self.target.host.is_empty() {
            return Err(ReplayError::ConfigError(
                "target.host cannot be empty".to_string(),
            ));
        }

        if self.target.port == 0 {
            return Err(ReplayError::ConfigError(
                "target.port cannot be 0".to_string(),
            ));
        }

        if self.capture.batch_size == 0 {
            return Err(ReplayError::ConfigError(
                "capture.batch_size cannot be 0".to_string(),
            ));
        }

        let builtin = matches!(self.capture.template.as_str(), "karate" | "gatling");
        if !builtin {
            if self.capture.extension.as_deref().map_or(true, str::is_empty) {
                return Err(ReplayError::ConfigError(
                    "For a custom template, capture.extension is required".to_string(),
                ));
            }
            if !std::path::Path::new(&self.capture.template).is_file() {
                return Err(ReplayError::ConfigError(format!(
                    "Template file does not exist: {}",
                    self.capture.template
                )));
            }
        }

        if let Some(stream) = &self.stream {
            if stream.name.is_empty() {
                return Err(ReplayError::ConfigError(
                    "stream.name cannot be empty".to_string(),
                ));
            }

            if stream.endpoint.is_empty() {
                return Err(ReplayError::ConfigError(
                    "stream.endpoint cannot be empty".to_string(),
                ));
            }

            if !(MIN_FRAME_LIMIT..=MAX_FRAME_LIMIT).contains(&stream.frame_limit) {
                return Err(ReplayError::ConfigError(format!(
                    "stream.frame_limit must be between {MIN_FRAME_LIMIT} and {MAX_FRAME_LIMIT}"
                )));
            }
        }

        Ok(())
    }
}
