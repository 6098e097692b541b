//! JSON schema gate between transformation, persistence and materialization.
//!
//! The schema is compiled once. [`ValidationGate::validate`] never mutates
//! the document and returns the same report for the same input.

use anyhow::{Context, Result};
use jsonschema::JSONSchema;
use serde_json::Value;
use std::path::Path;
use tracing::warn;

pub struct ValidationGate {
    compiled: JSONSchema,
    schema_uri: Option<String>,
}

impl ValidationGate {
    pub fn new(schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::compile(schema)
            .map_err(|e| anyhow::anyhow!("Invalid JSON schema: {}", e))?;
        let schema_uri = schema
            .get("$schema")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            compiled,
            schema_uri,
        })
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
        let schema: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse schema file: {}", path.display()))?;
        Self::new(&schema)
    }

    /// The schema's own `$schema` URI, copied into converted documents.
    pub fn schema_uri(&self) -> Option<&str> {
        self.schema_uri.as_deref()
    }

    /// All validation errors as `{instance_path}: {message}`; empty when valid.
    pub fn errors(&self, document: &Value) -> Vec<String> {
        match self.compiled.validate(document) {
            Ok(()) => Vec::new(),
            Err(errors) => errors
                .map(|e| format!("{}: {}", e.instance_path, e))
                .collect(),
        }
    }

    /// Validate and log every error on failure.
    pub fn validate(&self, key: &str, document: &Value) -> Result<(), Vec<String>> {
        let errors = self.errors(document);
        if errors.is_empty() {
            return Ok(());
        }
        for error in &errors {
            warn!(stage = "validate", key, error = %error, "schema violation");
        }
        Err(errors)
    }
}
