use async_trait::async_trait;
use image::{ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use key_migrate::config::{load_config, Config, KeyEntry};
use key_migrate::convert::{convert_record, document_path, legacy_snapshot_path};
use key_migrate::error::MigrationError;
use key_migrate::fetch::{FetchError, MediaSource};
use key_migrate::insert::Inserter;
use key_migrate::validate::ValidationGate;
use key_migrate_core::store::memory::InMemoryStore;
use key_migrate_core::store::{EntityKind, EntityStore};

const ALL_KINDS: [EntityKind; 10] = [
    EntityKind::Revision,
    EntityKind::Key,
    EntityKind::KeyRevision,
    EntityKind::KeyInfo,
    EntityKind::KeyLanguage,
    EntityKind::Taxon,
    EntityKind::Character,
    EntityKind::CharacterState,
    EntityKind::Media,
    EntityKind::KeyMedia,
];

fn schema_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../schema/key.schema.json")
}

fn setup_config(schema: &Path) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();
    let config_path = root.join("keymig.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{root}/data/keys.sqlite"

[paths]
schema = "{schema}"
target = "{root}/target"
media_root = "{root}/media"

[defaults]
license = "CC BY-SA 4.0"
creator = "ArtsApp"
created_by = "importer"

[materialize]
concurrency = 4

[media]
concurrency = 2

[[keys]]
key_web = "Biller"
language = "nb"
"#,
            root = root.display(),
            schema = schema.display(),
        ),
    )
    .unwrap();
    let config = load_config(&config_path).unwrap();
    (tmp, config)
}

fn legacy_record() -> Value {
    json!({
        "keyWeb": "biller",
        "name": "Biller",
        "keyInfo": "Nøkkel til biller",
        "version": 3,
        "keyStatus": "beta",
        "keyImage": "https://artsapp.uib.no/images/Forside.jpg",
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
    })
}

/// Writes a small image in the format implied by the destination file name.
struct ImageSource {
    calls: AtomicUsize,
}

#[async_trait]
impl MediaSource for ImageSource {
    async fn download(&self, _url: &str, dest: &Path) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let format = match dest.extension().and_then(|e| e.to_str()) {
            Some("png") => ImageFormat::Png,
            _ => ImageFormat::Jpeg,
        };
        RgbImage::from_pixel(200, 150, Rgb([20, 120, 40]))
            .save_with_format(dest, format)
            .map_err(|e| FetchError::Io {
                path: dest.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            })
    }
}

/// Every download fails at the network level.
struct UnreachableSource {
    calls: AtomicUsize,
}

#[async_trait]
impl MediaSource for UnreachableSource {
    async fn download(&self, url: &str, _dest: &Path) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(FetchError::Network {
            url: url.to_string(),
            reason: "connection refused".to_string(),
        })
    }
}

fn entry() -> KeyEntry {
    KeyEntry {
        key_web: "Biller".to_string(),
        language: "nb".to_string(),
    }
}

async fn convert(config: &Config, gate: &ValidationGate) {
    convert_record(config, gate, &entry(), legacy_record())
        .await
        .unwrap();
}

fn leaves_with_media(taxa: &Value) -> Vec<(String, Value)> {
    let mut out = Vec::new();
    for taxon in taxa.as_array().into_iter().flatten() {
        if let Some(children) = taxon.get("children") {
            out.extend(leaves_with_media(children));
        } else if let Some(media) = taxon.get("media") {
            out.push((taxon["id"].as_str().unwrap().to_string(), media.clone()));
        }
    }
    out
}

#[tokio::test]
async fn test_insert_links_all_media() {
    let (tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();
    convert(&config, &gate).await;

    let store = InMemoryStore::new();
    let source = ImageSource {
        calls: AtomicUsize::new(0),
    };
    let inserter = Inserter {
        config: &config,
        gate: &gate,
        store: &store,
        source: &source,
    };

    let report = inserter.insert_key("Biller").await.unwrap();
    assert!(report.skipped_media.is_empty());
    assert_eq!(report.media_linked, 3);
    assert_eq!(report.taxa, 4);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);

    assert_eq!(store.count(EntityKind::Media).await.unwrap(), 3);
    assert_eq!(store.count(EntityKind::KeyMedia).await.unwrap(), 1);
    assert_eq!(store.count(EntityKind::KeyInfo).await.unwrap(), 1);
    assert_eq!(store.count(EntityKind::KeyLanguage).await.unwrap(), 1);

    let key = store.find_key(report.key_id).await.unwrap().unwrap();
    assert_eq!(key.status, "PRIVATE");
    assert_eq!(key.version.as_deref(), Some("3"));
    assert_eq!(key.title.as_deref(), Some("Biller"));

    let manifest: Vec<String> = key.media["mediaElements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(manifest.len(), 2);

    let leaves = leaves_with_media(&key.content["taxa"]);
    assert_eq!(leaves.len(), 1);
    let (taxon_id, media) = &leaves[0];
    let media_id = media[0].as_str().unwrap();
    assert!(manifest.iter().any(|m| m == media_id));

    let dir = tmp
        .path()
        .join("media/keys")
        .join(report.key_id.to_string())
        .join("taxa")
        .join(taxon_id);
    assert!(dir.join(format!("{}.jpeg", media_id)).exists());
    assert!(dir.join(format!("{}-thumbnail.jpeg", media_id)).exists());

    let state = &key.content["characters"][0]["states"][0];
    let state_media = state["media"][0].as_str().unwrap();
    let state_dir = tmp
        .path()
        .join("media/keys")
        .join(report.key_id.to_string())
        .join("characters")
        .join(key.content["characters"][0]["id"].as_str().unwrap())
        .join("states")
        .join(state["id"].as_str().unwrap());
    assert!(state_dir.join(format!("{}-thumbnail.png", state_media)).exists());

    let thumb = image::open(dir.join(format!("{}-thumbnail.jpeg", media_id))).unwrap();
    assert_eq!((thumb.width(), thumb.height()), (128, 128));
}

#[tokio::test]
async fn test_unreachable_media_is_skipped_not_fatal() {
    let (tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();
    convert(&config, &gate).await;

    let store = InMemoryStore::new();
    let source = UnreachableSource {
        calls: AtomicUsize::new(0),
    };
    let inserter = Inserter {
        config: &config,
        gate: &gate,
        store: &store,
        source: &source,
    };

    let report = inserter.insert_key("Biller").await.unwrap();
    assert_eq!(report.skipped_media.len(), 3);
    assert_eq!(report.media_linked, 0);
    // One retry per asset.
    assert_eq!(source.calls.load(Ordering::SeqCst), 6);

    assert_eq!(store.count(EntityKind::Media).await.unwrap(), 0);
    assert_eq!(store.count(EntityKind::KeyMedia).await.unwrap(), 0);
    assert_eq!(store.count(EntityKind::Key).await.unwrap(), 1);

    let key = store.find_key(report.key_id).await.unwrap().unwrap();
    assert!(leaves_with_media(&key.content["taxa"]).is_empty());
    assert!(key.content["characters"][0]["states"][0].get("media").is_none());
    assert_eq!(key.media, json!({ "mediaElements": [] }));

    // No partial files are left behind.
    let key_dir = tmp.path().join("media/keys").join(report.key_id.to_string());
    let files = walk_files(&key_dir);
    assert!(files.is_empty(), "unexpected files: {:?}", files);
}

fn walk_files(dir: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return out;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_files(&path));
        } else {
            out.push(path);
        }
    }
    out
}

#[tokio::test]
async fn test_validation_failure_keeps_only_legacy_snapshot() {
    let tmp_schema = TempDir::new().unwrap();
    let strict = tmp_schema.path().join("strict.json");
    fs::write(
        &strict,
        serde_json::to_string(&json!({
            "$schema": "http://json-schema.org/draft-07/schema#",
            "type": "object",
            "properties": { "status": { "enum": ["PUBLISHED"] } }
        }))
        .unwrap(),
    )
    .unwrap();
    let (_tmp, config) = setup_config(&strict);
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();

    let err = convert_record(&config, &gate, &entry(), legacy_record())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Validation { .. }));
    assert_eq!(err.exit_code(), 4);

    assert!(legacy_snapshot_path(&config.paths.target, "Biller").exists());
    assert!(!document_path(&config.paths.target, "Biller").exists());

    let store = InMemoryStore::new();
    let source = ImageSource {
        calls: AtomicUsize::new(0),
    };
    let inserter = Inserter {
        config: &config,
        gate: &gate,
        store: &store,
        source: &source,
    };
    assert!(inserter.insert_key("Biller").await.is_err());
    for kind in ALL_KINDS {
        assert_eq!(store.count(kind).await.unwrap(), 0, "{} rows", kind.as_str());
    }
}

#[tokio::test]
async fn test_malformed_record_keeps_legacy_snapshot() {
    let (_tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();

    let mut record = legacy_record();
    record["keyStatus"] = Value::Null;
    let err = convert_record(&config, &gate, &entry(), record.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::Transformation { .. }));
    assert_eq!(err.exit_code(), 3);

    let snapshot = legacy_snapshot_path(&config.paths.target, "Biller");
    let written: Value = serde_json::from_str(&fs::read_to_string(snapshot).unwrap()).unwrap();
    assert_eq!(written, record);
    assert!(!document_path(&config.paths.target, "Biller").exists());
}

#[tokio::test]
async fn test_null_image_url_does_not_reject_the_key() {
    let (_tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();

    let mut record = legacy_record();
    record["image"][0]["image"] = Value::Null;
    convert_record(&config, &gate, &entry(), record).await.unwrap();

    let doc: Value = serde_json::from_str(
        &fs::read_to_string(document_path(&config.paths.target, "Biller")).unwrap(),
    )
    .unwrap();
    let ids: Vec<&str> = doc["mediaElements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["forside", "svart"]);
}

#[tokio::test]
async fn test_invalid_persisted_document_is_rejected_before_insert() {
    let (_tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();
    convert(&config, &gate).await;

    let path = document_path(&config.paths.target, "Biller");
    let mut doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    doc["status"] = json!("ARCHIVED");
    fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let store = InMemoryStore::new();
    let source = ImageSource {
        calls: AtomicUsize::new(0),
    };
    let inserter = Inserter {
        config: &config,
        gate: &gate,
        store: &store,
        source: &source,
    };
    let err = inserter.insert_key("Biller").await.unwrap_err();
    assert_eq!(err.exit_code(), 4);
    assert_eq!(store.count(EntityKind::Revision).await.unwrap(), 0);
    assert_eq!(store.count(EntityKind::Key).await.unwrap(), 0);
}

#[tokio::test]
async fn test_group_taxon_without_scientific_name_is_rejected() {
    let (_tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();
    convert(&config, &gate).await;

    let path = document_path(&config.paths.target, "Biller");
    let mut doc: Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    let group = doc["taxa"]
        .as_array_mut()
        .unwrap()
        .iter_mut()
        .find(|t| t.get("children").is_some())
        .unwrap();
    group.as_object_mut().unwrap().remove("scientificName");
    fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

    let store = InMemoryStore::new();
    let source = ImageSource {
        calls: AtomicUsize::new(0),
    };
    let inserter = Inserter {
        config: &config,
        gate: &gate,
        store: &store,
        source: &source,
    };
    let err = inserter.load_document("Biller").await.unwrap_err();
    assert!(matches!(err, MigrationError::Validation { .. }));
    assert_eq!(err.exit_code(), 4);
}

#[tokio::test]
async fn test_failure_after_media_rolls_everything_back() {
    let (tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();
    convert(&config, &gate).await;

    let store = InMemoryStore::new();
    store.fail_creates(EntityKind::KeyInfo);
    let source = ImageSource {
        calls: AtomicUsize::new(0),
    };
    let inserter = Inserter {
        config: &config,
        gate: &gate,
        store: &store,
        source: &source,
    };

    let err = inserter.insert_key("Biller").await.unwrap_err();
    assert_eq!(err.exit_code(), 5);
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);

    for kind in ALL_KINDS {
        assert_eq!(store.count(kind).await.unwrap(), 0, "{} rows", kind.as_str());
    }
    assert!(walk_files(&tmp.path().join("media")).is_empty());
}

#[tokio::test]
async fn test_store_failure_during_materialization() {
    let (_tmp, config) = setup_config(&schema_path());
    let gate = ValidationGate::from_file(&config.paths.schema).unwrap();
    convert(&config, &gate).await;

    let store = InMemoryStore::new();
    store.fail_creates(EntityKind::Taxon);
    let source = ImageSource {
        calls: AtomicUsize::new(0),
    };
    let inserter = Inserter {
        config: &config,
        gate: &gate,
        store: &store,
        source: &source,
    };

    let err = inserter.insert_key("Biller").await.unwrap_err();
    assert!(matches!(err, MigrationError::Materialization(_)));
    assert!(err.to_string().contains("4 of 4 taxon"));
    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
    for kind in ALL_KINDS {
        assert_eq!(store.count(kind).await.unwrap(), 0, "{} rows", kind.as_str());
    }
}
