//! Error types for transformation and materialization.

use thiserror::Error;

/// A legacy record that cannot be converted. Fatal for that record only.
#[derive(Debug, Error)]
pub enum TransformError {
    #[error("legacy record has an unexpected shape: {0}")]
    Shape(#[source] serde_json::Error),
    #[error("statement {statement_id} references unknown value {value_id}")]
    UnknownValue {
        statement_id: String,
        value_id: String,
    },
}

/// Which id namespace a statement field belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementField {
    Taxon,
    Character,
    Value,
}

impl std::fmt::Display for StatementField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StatementField::Taxon => "taxonId",
            StatementField::Character => "characterId",
            StatementField::Value => "value",
        };
        f.write_str(name)
    }
}

/// Entity creation or id rewriting failed. Fatal for the whole key.
#[derive(Debug, Error)]
pub enum MaterializeError {
    #[error("{failed} of {attempted} {stage} operations failed; first error: {first}")]
    Store {
        stage: &'static str,
        attempted: usize,
        failed: usize,
        first: anyhow::Error,
    },

    #[error("statement {statement_id}: {field} '{id}' does not resolve to a materialized entity")]
    UnresolvedReference {
        statement_id: String,
        field: StatementField,
        id: String,
    },
}
