//! Logging configuration
//!
//! Every type deserializes with defaults for missing fields, so an embedding
//! application can keep a partial table in its own TOML file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Level for targets without an override; `RUST_LOG` replaces the lot
    pub default_level: String,
    pub console: ConsoleOutput,
    /// JSON lines to a rolling file when set
    pub file: Option<FileConfig>,
    /// Fields included in every JSON line, console or file
    pub json: JsonFields,
    /// Per-target level overrides, e.g. `eventvault_storage = "debug"`
    pub targets: BTreeMap<String, String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: "info".to_string(),
            console: ConsoleOutput::Json,
            file: None,
            json: JsonFields::default(),
            targets: BTreeMap::new(),
        }
    }
}

impl LogConfig {
    /// Debug level, human-readable colored console
    pub fn development() -> Self {
        Self {
            default_level: "debug".to_string(),
            console: ConsoleOutput::Pretty { ansi: true },
            ..Default::default()
        }
    }

    /// Warnings only, plain text so captured test output stays readable
    pub fn testing() -> Self {
        Self {
            default_level: "warn".to_string(),
            console: ConsoleOutput::Pretty { ansi: false },
            ..Default::default()
        }
    }

    /// Filter directives: the default level followed by target overrides
    pub fn filter_directives(&self) -> String {
        let mut directives = vec![self.default_level.clone()];
        directives.extend(
            self.targets
                .iter()
                .map(|(target, level)| format!("{target}={level}")),
        );
        directives.join(",")
    }
}

/// What, if anything, goes to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ConsoleOutput {
    Off,
    Json,
    Pretty { ansi: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub directory: PathBuf,
    pub prefix: String,
    pub rotation: RotationStrategy,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./logs"),
            prefix: "eventvault".to_string(),
            rotation: RotationStrategy::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RotationStrategy {
    #[default]
    Daily,
    Hourly,
    /// A single `<prefix>.log`
    Never,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct JsonFields {
    /// Event fields at the top level instead of under `fields`
    pub flatten: bool,
    pub span_list: bool,
    pub current_span: bool,
    /// Source file and line
    pub location: bool,
}

impl Default for JsonFields {
    fn default() -> Self {
        Self {
            flatten: true,
            span_list: true,
            current_span: true,
            location: true,
        }
    }
}
