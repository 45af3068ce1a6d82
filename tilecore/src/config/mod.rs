//! Engine configuration.
//!
//! Configuration is read from an INI file with two sections:
//!
//! ```ini
//! [scheduler]
//! max_fps = 60
//! throttling = true
//! safety_margin_ms = 2.0
//! default_task_cost_ms = 1.0
//!
//! [logging]
//! level = info
//! file = /var/log/tilecore.log
//! ```
//!
//! Every key is optional; missing keys keep their defaults and unknown keys
//! are ignored.

use std::path::{Path, PathBuf};

use ini::Ini;
use thiserror::Error;

/// Frame rate used when no (or a non-positive) limit is configured.
pub const DEFAULT_MAX_FPS: f64 = 60.0;

/// Milliseconds held back from every frame budget to absorb estimate error.
pub const DEFAULT_SAFETY_MARGIN_MS: f64 = 2.0;

/// Cost charged against the budget for tasks that do not estimate their own.
pub const DEFAULT_TASK_COST_MS: f64 = 1.0;

/// Default tracing filter directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const SCHEDULER_SECTION: &str = "scheduler";
const LOGGING_SECTION: &str = "logging";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid INI.
    #[error("failed to parse config: {0}")]
    Parse(String),

    /// A key holds a value of the wrong shape.
    #[error("invalid value '{value}' for {section}.{key}")]
    InvalidValue {
        section: &'static str,
        key: &'static str,
        value: String,
    },
}

/// Scheduler settings.
#[derive(Clone, Debug, PartialEq)]
pub struct SchedulerConfig {
    /// Target frame rate; the frame budget is `1000 / max_fps` milliseconds.
    pub max_fps: f64,

    /// When false every pending task runs in each pass regardless of budget.
    pub throttling_enabled: bool,

    /// Milliseconds subtracted from the remaining frame time.
    pub safety_margin_ms: f64,

    /// Budget charge for tasks without their own estimate.
    pub default_task_cost_ms: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_fps: DEFAULT_MAX_FPS,
            throttling_enabled: true,
            safety_margin_ms: DEFAULT_SAFETY_MARGIN_MS,
            default_task_cost_ms: DEFAULT_TASK_COST_MS,
        }
    }
}

impl SchedulerConfig {
    /// Set the target frame rate. Values `<= 0` restore [`DEFAULT_MAX_FPS`].
    pub fn with_max_fps(mut self, max_fps: f64) -> Self {
        self.max_fps = normalize_max_fps(max_fps);
        self
    }

    /// Enable or disable budgeted draining.
    pub fn with_throttling(mut self, enabled: bool) -> Self {
        self.throttling_enabled = enabled;
        self
    }

    /// Set the per-frame safety margin.
    pub fn with_safety_margin_ms(mut self, margin_ms: f64) -> Self {
        self.safety_margin_ms = margin_ms.max(0.0);
        self
    }

    /// Set the cost charged for tasks without an estimate.
    pub fn with_default_task_cost_ms(mut self, cost_ms: f64) -> Self {
        self.default_task_cost_ms = cost_ms.max(0.0);
        self
    }

    /// Length of one frame in milliseconds.
    pub fn frame_duration_ms(&self) -> f64 {
        1000.0 / normalize_max_fps(self.max_fps)
    }
}

/// Clamp a frame-rate setting, mapping non-positive and non-finite values to
/// the default.
pub fn normalize_max_fps(max_fps: f64) -> f64 {
    if max_fps.is_finite() && max_fps > 0.0 {
        max_fps
    } else {
        DEFAULT_MAX_FPS
    }
}

/// Logging settings.
#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set (e.g. `debug`,
    /// `tilecore=trace`).
    pub level: String,

    /// Optional log file; when set, output is also written there.
    pub file: Option<PathBuf>,

    /// Emit ANSI colours on the console layer.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            file: None,
            ansi: true,
        }
    }
}

impl LoggingConfig {
    /// Set the filter directive.
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// Write logs to the given file in addition to the console.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self
    }
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EngineConfig {
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Default location: `<config dir>/tilecore/config.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tilecore").join("config.ini"))
    }

    /// Load configuration from an INI file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini_str(&content)
    }

    /// Load from the default path, falling back to defaults when the file
    /// does not exist.
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    /// Parse configuration from INI text.
    pub fn from_ini_str(content: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let mut config = Self::default();

        if let Some(section) = ini.section(Some(SCHEDULER_SECTION)) {
            if let Some(value) = section.get("max_fps") {
                config.scheduler.max_fps =
                    normalize_max_fps(parse_f64(SCHEDULER_SECTION, "max_fps", value)?);
            }
            if let Some(value) = section.get("throttling") {
                config.scheduler.throttling_enabled =
                    parse_bool(SCHEDULER_SECTION, "throttling", value)?;
            }
            if let Some(value) = section.get("safety_margin_ms") {
                config.scheduler.safety_margin_ms =
                    parse_f64(SCHEDULER_SECTION, "safety_margin_ms", value)?.max(0.0);
            }
            if let Some(value) = section.get("default_task_cost_ms") {
                config.scheduler.default_task_cost_ms =
                    parse_f64(SCHEDULER_SECTION, "default_task_cost_ms", value)?.max(0.0);
            }
        }

        if let Some(section) = ini.section(Some(LOGGING_SECTION)) {
            if let Some(value) = section.get("level") {
                config.logging.level = value.trim().to_string();
            }
            if let Some(value) = section.get("file") {
                let value = value.trim();
                if !value.is_empty() {
                    config.logging.file = Some(PathBuf::from(value));
                }
            }
            if let Some(value) = section.get("ansi") {
                config.logging.ansi = parse_bool(LOGGING_SECTION, "ansi", value)?;
            }
        }

        Ok(config)
    }

    /// Render the configuration as INI text.
    pub fn to_ini_string(&self) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some(SCHEDULER_SECTION))
            .set("max_fps", self.scheduler.max_fps.to_string())
            .set("throttling", self.scheduler.throttling_enabled.to_string())
            .set("safety_margin_ms", self.scheduler.safety_margin_ms.to_string())
            .set(
                "default_task_cost_ms",
                self.scheduler.default_task_cost_ms.to_string(),
            );
        ini.with_section(Some(LOGGING_SECTION))
            .set("level", self.logging.level.as_str())
            .set("ansi", self.logging.ansi.to_string());
        if let Some(file) = &self.logging.file {
            ini.with_section(Some(LOGGING_SECTION))
                .set("file", file.to_string_lossy().to_string());
        }

        let mut buf = Vec::new();
        // Writing into a Vec cannot fail.
        let _ = ini.write_to(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

fn parse_f64(section: &'static str, key: &'static str, value: &str) -> Result<f64, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .map_err(|_| ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
        })
}

fn parse_bool(section: &'static str, key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            section,
            key,
            value: value.to_string(),
        }),
    }
}
