//! Synthesis settings.
//!
//! [`SynthesisConfig`] can be loaded from `config/ddl_synth.toml` or from
//! environment variables using `SynthesisConfig::load()`.

use crate::dialect::Dialect;
use config::{Config, ConfigError, Environment, File};
use regex::Regex;
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_FILE: &str = "config/ddl_synth.toml";

#[derive(Debug, Clone, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub dialect: Dialect,
    #[serde(default = "default_identifier_budget")]
    pub identifier_budget: usize,
    #[serde(default = "default_suffix_reserve")]
    pub suffix_reserve: usize,
    #[serde(default = "default_segment_chars")]
    pub segment_chars: usize,
    #[serde(default = "default_history_suffix")]
    pub history_suffix: String,
    #[serde(default = "default_i18n_suffix")]
    pub i18n_suffix: String,
    #[serde(default = "default_language_column_length")]
    pub language_column_length: usize,
    /// Range partitions created up front after the first boundary (PostgreSQL)
    #[serde(default = "default_partition_periods")]
    pub partition_periods: usize,
    #[serde(default)]
    pub audit: AuditColumns,
    /// Table name patterns to render; empty renders everything
    #[serde(default)]
    pub include: Vec<String>,
    /// Table name patterns never rendered
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Names of the four audit columns
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuditColumns {
    #[serde(default = "default_created_at")]
    pub created_at: String,
    #[serde(default = "default_created_by")]
    pub created_by: String,
    #[serde(default = "default_modified_at")]
    pub modified_at: String,
    #[serde(default = "default_modified_by")]
    pub modified_by: String,
}

fn default_identifier_budget() -> usize {
    30
}

fn default_suffix_reserve() -> usize {
    4
}

fn default_segment_chars() -> usize {
    3
}

fn default_history_suffix() -> String {
    "_hst".to_string()
}

fn default_i18n_suffix() -> String {
    "_i18n".to_string()
}

fn default_language_column_length() -> usize {
    8
}

fn default_partition_periods() -> usize {
    12
}

fn default_created_at() -> String {
    "created_at".to_string()
}

fn default_created_by() -> String {
    "created_by".to_string()
}

fn default_modified_at() -> String {
    "modified_at".to_string()
}

fn default_modified_by() -> String {
    "modified_by".to_string()
}

impl Default for AuditColumns {
    fn default() -> Self {
        Self {
            created_at: default_created_at(),
            created_by: default_created_by(),
            modified_at: default_modified_at(),
            modified_by: default_modified_by(),
        }
    }
}

impl AuditColumns {
    /// Column names in declaration order
    pub fn names(&self) -> [&str; 4] {
        [
            &self.created_at,
            &self.created_by,
            &self.modified_at,
            &self.modified_by,
        ]
    }

    pub fn contains(&self, column: &str) -> bool {
        self.names().iter().any(|c| c.eq_ignore_ascii_case(column))
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            identifier_budget: default_identifier_budget(),
            suffix_reserve: default_suffix_reserve(),
            segment_chars: default_segment_chars(),
            history_suffix: default_history_suffix(),
            i18n_suffix: default_i18n_suffix(),
            language_column_length: default_language_column_length(),
            partition_periods: default_partition_periods(),
            audit: AuditColumns::default(),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }
}

impl SynthesisConfig {
    /// Default settings for one dialect
    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect,
            ..Default::default()
        }
    }

    /// Load the settings from `config/ddl_synth.toml`, overridden by `DDL_SYNTH__*` env vars.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(DEFAULT_CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("DDL_SYNTH").separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // Unreadable file: retry with env only
                if Path::new(DEFAULT_CONFIG_FILE).exists() {
                    log::warn!(
                        "failed to load {}, falling back to env: {}",
                        DEFAULT_CONFIG_FILE,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix("DDL_SYNTH").separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load settings from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        Self::from_settings(&settings)
    }

    /// Load the settings from one explicit file (TOML, YAML or JSON by extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(true))
            .build()?;
        Self::from_settings(&settings)
    }

    fn from_settings(settings: &Config) -> Result<Self, ConfigError> {
        // A missing section means all defaults
        match settings.get::<SynthesisConfig>("synthesis") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Synthesis settings could not be loaded: {}",
                e
            ))),
        }
    }

    /// Effective identifier limit: the configured budget clamped to the dialect's maximum
    pub fn identifier_limit(&self) -> usize {
        self.identifier_budget
            .min(self.dialect.max_identifier_length())
    }

    /// Compile the include/exclude patterns
    pub fn render_filter(&self) -> Result<RenderFilter, ConfigError> {
        let compile = |patterns: &[String]| -> Result<Vec<Regex>, ConfigError> {
            patterns
                .iter()
                .map(|p| {
                    Regex::new(&format!("(?i)^(?:{})$", p)).map_err(|e| {
                        ConfigError::Message(format!("invalid table pattern '{}': {}", p, e))
                    })
                })
                .collect()
        };
        Ok(RenderFilter {
            include: compile(&self.include)?,
            exclude: compile(&self.exclude)?,
        })
    }
}

/// Compiled include/exclude table filters
#[derive(Debug, Clone, Default)]
pub struct RenderFilter {
    include: Vec<Regex>,
    exclude: Vec<Regex>,
}

impl RenderFilter {
    pub fn accepts(&self, table: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|r| r.is_match(table));
        included && !self.exclude.iter().any(|r| r.is_match(table))
    }
}
