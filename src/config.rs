use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Free-form label for the loaded profile.
    pub profile_name: String,
    pub coercion: CoercionRules,
    pub matching: MatchRules,
    pub records: RecordRules,
    pub saved_filters: Vec<SavedFilter>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            profile_name: "default".to_string(),
            coercion: CoercionRules::default(),
            matching: MatchRules::default(),
            records: RecordRules::default(),
            saved_filters: Vec::new(),
        }
    }
}

impl FilterConfig {
    pub fn saved_filter(&self, name: &str) -> Option<&SavedFilter> {
        self.saved_filters.iter().find(|f| f.name == name)
    }
}

/// How raw filter values are turned into numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoercionRules {
    pub grouping_separator: char,
    pub decimal_separator: char,
    /// chrono format strings tried after RFC 3339, interpreted as UTC
    pub timestamp_formats: Vec<String>,
}

impl Default for CoercionRules {
    fn default() -> Self {
        Self {
            grouping_separator: ',',
            decimal_separator: '.',
            timestamp_formats: vec![
                "%Y-%m-%d %H:%M:%S%.f".to_string(),
                "%Y-%m-%dT%H:%M:%S%.f".to_string(),
                "%Y-%m-%d".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Case-insensitive `==` and `contains`
    pub ignore_case: bool,
    /// Prefix of derived columns that alias a real field
    pub derived_prefix: String,
}

impl Default for MatchRules {
    fn default() -> Self {
        Self {
            ignore_case: false,
            derived_prefix: crate::record::DERIVED_PREFIX.to_string(),
        }
    }
}

/// JSON keys holding the typed header of a trace event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordRules {
    pub event_type_field: String,
    pub timestamp_field: String,
    pub trace_type_field: String,
}

impl Default for RecordRules {
    fn default() -> Self {
        Self {
            event_type_field: "type".to_string(),
            timestamp_field: "timestamp".to_string(),
            trace_type_field: "trace_type".to_string(),
        }
    }
}

/// A user-named filter kept in the configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedFilter {
    pub name: String,
    pub expression: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub fn load_config(path: Option<&Path>) -> Result<FilterConfig, ConfigError> {
    if let Some(path) = path {
        load_config_from_path(path)
    } else {
        Ok(default_config().clone())
    }
}

pub fn load_config_from_path(path: &Path) -> Result<FilterConfig, ConfigError> {
    let path_display = path.display().to_string();
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path_display.clone(),
        source,
    })?;

    toml::from_str::<FilterConfig>(&raw).map_err(|source| ConfigError::Parse {
        path: path_display,
        source,
    })
}

pub fn default_config() -> &'static FilterConfig {
    static DEFAULT_CONFIG: LazyLock<FilterConfig> = LazyLock::new(FilterConfig::default);
    &DEFAULT_CONFIG
}
