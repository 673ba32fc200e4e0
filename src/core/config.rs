//! SZ-015: Batch configuration — YAML file, defaults and validation.

use crate::logs::{SinkConfig, SinkKind, DETAIL, NORMAL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Settings for one batch, as read from `stanza.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchConfig {
    /// Keep going after a failure
    #[serde(default)]
    pub persist: bool,

    /// Default worker pool size per file; `maxjobs = N` in a script overrides it
    #[serde(default = "default_max_jobs")]
    pub max_jobs: usize,

    #[serde(default = "default_sinks")]
    pub sinks: Vec<SinkConfig>,

    /// JSONL run event log
    #[serde(default)]
    pub events: Option<PathBuf>,
}

fn default_max_jobs() -> usize {
    1
}

fn default_sinks() -> Vec<SinkConfig> {
    vec![SinkConfig {
        kind: SinkKind::Console,
        path: None,
        level: NORMAL,
    }]
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            persist: false,
            max_jobs: default_max_jobs(),
            sinks: default_sinks(),
            events: None,
        }
    }
}

/// A config validation error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Parse a batch config file from disk.
pub fn parse_config_file(path: &Path) -> Result<BatchConfig, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_config(&content)
}

/// Parse a batch config from a string.
pub fn parse_config(yaml: &str) -> Result<BatchConfig, String> {
    serde_yaml_ng::from_str(yaml).map_err(|e| format!("YAML parse error: {}", e))
}

/// Validate a parsed config. Returns a list of errors (empty = valid).
pub fn validate_config(config: &BatchConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if config.max_jobs == 0 {
        errors.push(ValidationError {
            message: "max_jobs must be at least 1".to_string(),
        });
    }

    for (i, sink) in config.sinks.iter().enumerate() {
        if sink.level > DETAIL {
            errors.push(ValidationError {
                message: format!(
                    "sink {} level {} is above the maximum {}",
                    i, sink.level, DETAIL
                ),
            });
        }
        match sink.kind {
            SinkKind::File if sink.path.is_none() => {
                errors.push(ValidationError {
                    message: format!("sink {} (file) has no path", i),
                });
            }
            SinkKind::Console if sink.path.is_some() => {
                errors.push(ValidationError {
                    message: format!("sink {} (console) does not take a path", i),
                });
            }
            _ => {}
        }
    }

    errors
}
