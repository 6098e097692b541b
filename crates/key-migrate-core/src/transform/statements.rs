//! Legacy species-has-value records → statements.

use std::collections::HashMap;

use crate::error::TransformError;
use crate::models::{LegacySpeciesValue, LegacyValue, Statement};

/// One statement per species-has-value record.
///
/// The character id is the trait owning the referenced value. A record that
/// points to a value missing from `values` fails the whole conversion.
pub fn map_statements(
    values: &[LegacyValue],
    species_values: &[LegacySpeciesValue],
) -> Result<Vec<Statement>, TransformError> {
    let mut owner: HashMap<&str, &str> = HashMap::with_capacity(values.len());
    for v in values {
        owner.entry(v.value_id.as_str()).or_insert(v.trait_id.as_str());
    }

    species_values
        .iter()
        .map(|sv| {
            let trait_id = owner.get(sv.value_id.as_str()).ok_or_else(|| {
                TransformError::UnknownValue {
                    statement_id: sv.sp_has_value_id.clone(),
                    value_id: sv.value_id.clone(),
                }
            })?;
            Ok(Statement {
                id: sv.sp_has_value_id.clone(),
                taxon_id: sv.sp_id.clone(),
                character_id: trait_id.to_string(),
                value: sv.value_id.clone(),
            })
        })
        .collect()
}
