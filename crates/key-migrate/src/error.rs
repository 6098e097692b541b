//! Error taxonomy of a migration run and its process exit codes.

use thiserror::Error;

use key_migrate_core::error::{MaterializeError, TransformError};

/// Why one key failed. Each variant maps to a distinct exit code.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("configuration error: {0:#}")]
    Config(anyhow::Error),

    #[error("legacy fetch failed for '{key_web}': {reason:#}")]
    LegacyFetch {
        key_web: String,
        reason: anyhow::Error,
    },

    #[error("I/O error: {0:#}")]
    Io(anyhow::Error),

    #[error("transformation failed for '{key_web}': {source}")]
    Transformation {
        key_web: String,
        source: TransformError,
    },

    #[error("document for '{key_web}' failed schema validation ({} errors)", errors.len())]
    Validation { key_web: String, errors: Vec<String> },

    #[error("materialization failed: {0}")]
    Materialization(#[from] MaterializeError),
}

impl MigrationError {
    pub fn exit_code(&self) -> i32 {
        match self {
            MigrationError::Config(_) => 2,
            MigrationError::Transformation { .. } => 3,
            MigrationError::Validation { .. } => 4,
            MigrationError::Materialization(_) => 5,
            MigrationError::LegacyFetch { .. } | MigrationError::Io(_) => 6,
        }
    }

    /// Pipeline stage the error belongs to, for log lines.
    pub fn stage(&self) -> &'static str {
        match self {
            MigrationError::Config(_) => "config",
            MigrationError::LegacyFetch { .. } => "fetch",
            MigrationError::Io(_) => "io",
            MigrationError::Transformation { .. } => "convert",
            MigrationError::Validation { .. } => "validate",
            MigrationError::Materialization(_) => "materialize",
        }
    }
}

/// Highest exit code among a batch of outcomes; 0 when all succeeded.
pub fn batch_exit_code<'a, T: 'a>(
    results: impl IntoIterator<Item = &'a Result<T, MigrationError>>,
) -> i32 {
    results
        .into_iter()
        .filter_map(|r| r.as_ref().err())
        .map(MigrationError::exit_code)
        .max()
        .unwrap_or(0)
}
