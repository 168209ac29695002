//! Configuration schema definitions.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use switchyard_core::BotCommand;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct SwitchyardConfig {
    /// Bot identity, access and command table.
    #[serde(default)]
    pub bot: BotSettings,

    /// Dispatcher tuning.
    #[serde(default)]
    pub dispatch: DispatchSettings,

    /// User-state persistence.
    #[serde(default)]
    pub storage: StorageSettings,

    /// Logging setup.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot
// =============================================================================

/// Bot settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BotSettings {
    /// Platform access token.
    #[serde(default)]
    pub token: String,

    /// Handles allowed to talk to the bot; absent means everyone with a handle.
    #[serde(default)]
    pub allow_list: Option<Vec<String>>,

    /// Command table, in display order.
    #[serde(default)]
    pub commands: Vec<BotCommand>,

    /// Push the command table to the platform on startup.
    #[serde(default = "default_true")]
    pub publish_commands: bool,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            allow_list: None,
            commands: Vec::new(),
            publish_commands: true,
        }
    }
}

impl fmt::Debug for BotSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = if self.token.is_empty() {
            "<unset>"
        } else {
            "<redacted>"
        };
        f.debug_struct("BotSettings")
            .field("token", &token)
            .field("allow_list", &self.allow_list)
            .field("commands", &self.commands)
            .field("publish_commands", &self.publish_commands)
            .finish()
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Dispatch
// =============================================================================

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchSettings {
    /// Process events of the same user one at a time.
    #[serde(default)]
    pub serialize_per_user: bool,

    /// Field of the state record carrying the state tag.
    #[serde(default = "default_state_tag_field")]
    pub state_tag_field: String,

    /// Field of the callback payload carrying the discriminant.
    #[serde(default = "default_payload_tag_field")]
    pub payload_tag_field: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            serialize_per_user: false,
            state_tag_field: default_state_tag_field(),
            payload_tag_field: default_payload_tag_field(),
        }
    }
}

fn default_state_tag_field() -> String {
    switchyard_framework::DEFAULT_STATE_TAG_FIELD.to_string()
}

fn default_payload_tag_field() -> String {
    switchyard_framework::DEFAULT_PAYLOAD_TAG_FIELD.to_string()
}

// =============================================================================
// Storage
// =============================================================================

/// Which state backend to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Records live in process memory.
    #[default]
    Memory,
    /// One JSON file per user under `data_dir`.
    File,
}

/// Storage settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    #[serde(default)]
    pub backend: StorageKind,

    /// Directory for the file backend; defaults to the platform data dir.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StorageSettings {
    /// Returns the configured data directory, falling back to
    /// `<data dir>/switchyard`.
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| dirs::data_dir().map(|dir| dir.join("switchyard")))
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON; requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation policy for file output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Per-module level overrides, e.g. `switchyard_framework = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
