//! Legacy id → surrogate id tables and the statement rewrite pass.
//!
//! Entity creation only records pairs here. Statements are rewritten once,
//! after every table is complete, into a new vector: the input is never
//! touched, so a statement is either entirely legacy or entirely remapped,
//! and a legacy id that happens to equal some surrogate id cannot be mapped
//! twice.

use std::collections::HashMap;

use tracing::warn;

use crate::error::{MaterializeError, StatementField};
use crate::models::Statement;

#[derive(Debug, Default, Clone)]
struct Namespace {
    forward: HashMap<String, String>,
}

impl Namespace {
    fn insert(&mut self, kind: &str, old: &str, new: &str) {
        if let Some(existing) = self.forward.get(old) {
            // Statements can only follow one of the duplicates.
            warn!(kind, old_id = old, kept = %existing, ignored = new, "duplicate legacy id");
            return;
        }
        self.forward.insert(old.to_string(), new.to_string());
    }
}

/// `oldId → newId` tables for taxa, characters and character states.
#[derive(Debug, Default, Clone)]
pub struct IdRemap {
    taxa: Namespace,
    characters: Namespace,
    states: Namespace,
}

impl IdRemap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_taxon(&mut self, old: &str, new: &str) {
        self.taxa.insert("taxon", old, new);
    }

    pub fn insert_character(&mut self, old: &str, new: &str) {
        self.characters.insert("character", old, new);
    }

    pub fn insert_state(&mut self, old: &str, new: &str) {
        self.states.insert("state", old, new);
    }

    pub fn taxon(&self, old: &str) -> Option<&str> {
        self.taxa.forward.get(old).map(String::as_str)
    }

    pub fn character(&self, old: &str) -> Option<&str> {
        self.characters.forward.get(old).map(String::as_str)
    }

    pub fn state(&self, old: &str) -> Option<&str> {
        self.states.forward.get(old).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.taxa.forward.len() + self.characters.forward.len() + self.states.forward.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Produce the remapped statement list.
    ///
    /// Every field must resolve; the first one that does not is reported.
    pub fn rewrite_statements(
        &self,
        statements: &[Statement],
    ) -> Result<Vec<Statement>, MaterializeError> {
        statements
            .iter()
            .map(|s| {
                Ok(Statement {
                    id: s.id.clone(),
                    taxon_id: resolve(s, StatementField::Taxon, &s.taxon_id, self.taxon(&s.taxon_id))?,
                    character_id: resolve(
                        s,
                        StatementField::Character,
                        &s.character_id,
                        self.character(&s.character_id),
                    )?,
                    value: resolve(s, StatementField::Value, &s.value, self.state(&s.value))?,
                })
            })
            .collect()
    }
}

fn resolve(
    statement: &Statement,
    field: StatementField,
    old: &str,
    new: Option<&str>,
) -> Result<String, MaterializeError> {
    new.map(str::to_string)
        .ok_or_else(|| MaterializeError::UnresolvedReference {
            statement_id: statement.id.clone(),
            field,
            id: old.to_string(),
        })
}
