use chrono::{TimeZone, Utc};
use serde_json::json;
use std::collections::HashSet;

use key_migrate_core::ledger::Ledger;
use key_migrate_core::materialize::materialize;
use key_migrate_core::models::{flatten_taxa, LegacyKey, Taxon};
use key_migrate_core::store::memory::InMemoryStore;
use key_migrate_core::store::{EntityKind, EntityStore};
use key_migrate_core::transform::{convert_to_document, ConvertOptions};

fn options() -> ConvertOptions {
    ConvertOptions {
        language: "nb".to_string(),
        license: "CC BY-SA 4.0".to_string(),
        creator: "ArtsApp".to_string(),
        schema_uri: None,
        identifier: "scenario-a".to_string(),
        now: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
    }
}

/// Two species (one under Coleoptera/Carabidae, one without order), one
/// trait with two values and one species-has-value fact.
fn scenario_a() -> LegacyKey {
    serde_json::from_value(json!({
        "keyWeb": "biller",
        "name": "Biller",
        "keyInfo": "Nøkkel til biller",
        "version": 3,
        "keyStatus": "beta",
        "image": [
            { "image": "https://artsapp.uib.no/images/Carabus_nemoralis.jpg", "typeId": 1 },
            { "image": "https://artsapp.uib.no/images/svart.png", "typeId": 10 }
        ],
        "trait": [{ "traitId": 1, "traitText": "Farge" }],
        "value": [
            { "valueId": 10, "traitId": 1, "valueText": "Svart" },
            { "valueId": 11, "traitId": 1, "valueText": "Rød" }
        ],
        "species": [
            {
                "speciesId": 1,
                "latinName": "Carabus nemoralis",
                "localName": "Lundløper",
                "order": "Coleoptera",
                "family": "Carabidae"
            },
            { "speciesId": 2, "latinName": "Incertae sedis", "localName": "Ukjent" }
        ],
        "spHasValue": [{ "spHasValueId": 100, "spId": 1, "valueId": 10 }]
    }))
    .unwrap()
}

#[test]
fn scenario_a_document_shape() {
    let doc = convert_to_document(&scenario_a(), &options()).unwrap();

    assert_eq!(doc.taxa.len(), 2);
    let leaves: Vec<&Taxon> = doc.taxa.iter().filter(|t| matches!(t, Taxon::Leaf(_))).collect();
    assert_eq!(leaves.len(), 1);
    assert_eq!(leaves[0].id(), "2");

    let order = doc
        .taxa
        .iter()
        .find(|t| matches!(t, Taxon::Group(_)))
        .unwrap();
    assert_eq!(order.id(), "coleoptera");
    assert_eq!(order.children().len(), 1);
    let family = &order.children()[0];
    assert_eq!(family.id(), "carabidae");
    assert_eq!(family.children().len(), 1);
    assert_eq!(family.children()[0].id(), "1");

    assert_eq!(doc.characters.len(), 1);
    assert_eq!(doc.characters[0].states.len(), 2);

    assert_eq!(doc.statements.len(), 1);
    let statement = &doc.statements[0];
    let taxon_ids: HashSet<&str> = flatten_taxa(&doc.taxa).iter().map(|t| t.id()).collect();
    assert!(taxon_ids.contains(statement.taxon_id.as_str()));
    assert_eq!(statement.character_id, doc.characters[0].id);
    assert!(doc.characters[0]
        .states
        .iter()
        .any(|s| s.id == statement.value));
}

#[tokio::test]
async fn scenario_a_materializes_with_resolving_statements() {
    let mut doc = convert_to_document(&scenario_a(), &options()).unwrap();
    let store = InMemoryStore::new();
    let ledger = Ledger::new();

    let out = materialize(&store, &ledger, 1000, &mut doc, 2).await.unwrap();

    // order, family, species, orderless species
    assert_eq!(store.count(EntityKind::Taxon).await.unwrap(), 4);
    assert_eq!(store.count(EntityKind::Character).await.unwrap(), 1);
    assert_eq!(store.count(EntityKind::CharacterState).await.unwrap(), 2);

    let statement = &doc.statements[0];
    let taxon_ids: HashSet<&str> = flatten_taxa(&doc.taxa).iter().map(|t| t.id()).collect();
    assert!(taxon_ids.contains(statement.taxon_id.as_str()));
    assert_eq!(statement.character_id, doc.characters[0].id);
    assert_eq!(statement.value, doc.characters[0].states[0].id);

    // One taxon image and one state image.
    assert_eq!(out.taxa_media.len(), 1);
    assert_eq!(out.state_media.len(), 1);
    assert_eq!(out.revision_media.len(), 2);
    assert!(out.key_media.is_empty());
}
