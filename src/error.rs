//! Synthesis error types
//!
//! Every failure is fatal for the run. Variants carry enough context
//! (object name, table, offending fragment) to locate the metadata to fix.

use thiserror::Error;

/// Errors raised while scanning metadata or synthesizing DDL
#[derive(Debug, Error)]
pub enum SynthError {
    /// A physical identifier does not fit the length budget, even compressed
    #[error("identifier '{name}' exceeds the limit of {limit} characters")]
    Naming { name: String, limit: usize },

    /// The same physical name was registered twice in one run
    #[error("duplicate object name '{name}' (first used by {first_owner}, again by {second_owner})")]
    NameCollision {
        name: String,
        first_owner: String,
        second_owner: String,
    },

    /// Raw statement text does not match the grammar of its kind
    #[error("unsupported {kind} statement shape: {text}")]
    Parse { kind: String, text: String },

    /// Inconsistent or incomplete declarative metadata
    #[error("invalid configuration for table '{table}': {message}")]
    Config { table: String, message: String },

    /// A combination of declarations the synthesizer refuses to render
    #[error("unsupported combination on table '{table}': {message}")]
    Unsupported { table: String, message: String },

    /// A relation points at a class or table that is not part of the model
    #[error("'{owner}' references unknown target '{target}'")]
    Resolution { owner: String, target: String },

    /// Settings could not be loaded
    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// The harvester output could not be deserialized
    #[error("metadata model error: {0}")]
    Model(#[from] serde_json::Error),
}

/// Result type for synthesis operations
pub type SynthResult<T> = Result<T, SynthError>;

impl SynthError {
    pub(crate) fn config(table: impl Into<String>, message: impl Into<String>) -> Self {
        SynthError::Config {
            table: table.into(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(kind: impl Into<String>, text: impl Into<String>) -> Self {
        SynthError::Parse {
            kind: kind.into(),
            text: text.into(),
        }
    }
}
