//! Legacy traits and values → characters and their states.

use crate::media_ref::media_id_for;
use crate::models::{
    localized, Character, CharacterState, LegacyImage, LegacyTrait, LegacyValue, MediaLinks,
};

/// Character type emitted for every migrated trait (single-select).
pub const EXCLUSIVE: &str = "exclusive";

/// One character per trait; each value whose `trait_id` matches becomes a
/// state, in legacy order. A state's media is the first image whose
/// `type_id` equals the value id.
pub fn map_characters(
    traits: &[LegacyTrait],
    values: &[LegacyValue],
    images: &[LegacyImage],
    language: &str,
) -> Vec<Character> {
    traits
        .iter()
        .map(|t| {
            let states = values
                .iter()
                .filter(|v| v.trait_id == t.trait_id)
                .map(|v| CharacterState {
                    id: v.value_id.clone(),
                    title: localized(language, v.value_text.clone().unwrap_or_default()),
                    media: image_for(images, &v.value_id).map(MediaLinks::One),
                })
                .collect();

            Character {
                id: t.trait_id.clone(),
                title: localized(language, t.trait_text.clone().unwrap_or_default()),
                kind: EXCLUSIVE.to_string(),
                states,
            }
        })
        .collect()
}

/// Media id of the first image attached to `type_id`.
pub(crate) fn image_for(images: &[LegacyImage], type_id: &str) -> Option<String> {
    let image = images
        .iter()
        .find(|img| img.type_id.as_deref() == Some(type_id))?;
    media_id_for(image.image.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn traits(ids: &[&str]) -> Vec<LegacyTrait> {
        ids.iter()
            .map(|id| LegacyTrait {
                trait_id: id.to_string(),
                trait_text: Some(format!("trait {}", id)),
            })
            .collect()
    }

    fn value(id: &str, trait_id: &str) -> LegacyValue {
        LegacyValue {
            value_id: id.to_string(),
            trait_id: trait_id.to_string(),
            value_text: Some(format!("value {}", id)),
        }
    }

    #[test]
    fn test_states_partition_values_by_trait() {
        let traits = traits(&["1", "2", "3"]);
        let values = vec![
            value("10", "1"),
            value("20", "2"),
            value("11", "1"),
            value("21", "2"),
            value("30", "3"),
        ];
        let characters = map_characters(&traits, &values, &[], "en");

        assert_eq!(characters.len(), 3);
        let all: Vec<&str> = characters
            .iter()
            .flat_map(|c| c.states.iter().map(|s| s.id.as_str()))
            .collect();
        assert_eq!(all.len(), values.len());
        let unique: HashSet<&str> = all.iter().copied().collect();
        assert_eq!(unique.len(), values.len());

        let first: Vec<&str> = characters[0].states.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(first, vec!["10", "11"]);
        for c in &characters {
            assert_eq!(c.kind, EXCLUSIVE);
        }
    }

    #[test]
    fn test_state_media_resolved_by_type_id() {
        let traits = traits(&["1"]);
        let values = vec![value("10", "1"), value("11", "1")];
        let images = vec![
            LegacyImage {
                image: Some("https://host/img/Oval_Leaf.jpg".to_string()),
                type_id: Some("10".to_string()),
            },
            LegacyImage {
                image: Some("https://host/img/other.jpg".to_string()),
                type_id: Some("99".to_string()),
            },
        ];
        let characters = map_characters(&traits, &values, &images, "no");

        let states = &characters[0].states;
        assert_eq!(states[0].media, Some(MediaLinks::One("ovalleaf".to_string())));
        assert_eq!(states[1].media, None);
        assert_eq!(states[0].title.get("no").map(String::as_str), Some("value 10"));
    }

    #[test]
    fn test_trait_without_values_has_no_states() {
        let characters = map_characters(&traits(&["7"]), &[], &[], "en");
        assert_eq!(characters.len(), 1);
        assert!(characters[0].states.is_empty());
    }
}
