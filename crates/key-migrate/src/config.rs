use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub legacy: LegacyConfig,
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub materialize: MaterializeConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub keys: Vec<KeyEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// JSON schema every document must satisfy.
    pub schema: PathBuf,
    /// Directory holding `{key}-old.json` and `{key}-new.json`.
    pub target: PathBuf,
    pub media_root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LegacyConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_legacy_timeout")]
    pub timeout_secs: u64,
}

impl Default for LegacyConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            timeout_secs: default_legacy_timeout(),
        }
    }
}

fn default_api_base() -> String {
    "https://artsapp.uib.no/api/v1".to_string()
}
fn default_legacy_timeout() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct DefaultsConfig {
    pub license: String,
    pub creator: String,
    pub created_by: String,
    #[serde(default = "default_workgroup_id")]
    pub workgroup_id: i64,
    #[serde(default = "default_revision_note")]
    pub revision_note: String,
}

fn default_workgroup_id() -> i64 {
    1
}
fn default_revision_note() -> String {
    "Imported from old ArtsApp".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct MaterializeConfig {
    #[serde(default = "default_materialize_concurrency")]
    pub concurrency: usize,
}

impl Default for MaterializeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_materialize_concurrency(),
        }
    }
}

fn default_materialize_concurrency() -> usize {
    16
}

#[derive(Debug, Deserialize, Clone)]
pub struct MediaConfig {
    #[serde(default = "default_media_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_width: u32,
    #[serde(default = "default_thumbnail_size")]
    pub thumbnail_height: u32,
    #[serde(default = "default_thumbnail_quality")]
    pub thumbnail_quality: u8,
    #[serde(default = "default_fetch_timeout")]
    pub fetch_timeout_secs: u64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            concurrency: default_media_concurrency(),
            thumbnail_width: default_thumbnail_size(),
            thumbnail_height: default_thumbnail_size(),
            thumbnail_quality: default_thumbnail_quality(),
            fetch_timeout_secs: default_fetch_timeout(),
        }
    }
}

fn default_media_concurrency() -> usize {
    8
}
fn default_thumbnail_size() -> u32 {
    128
}
fn default_thumbnail_quality() -> u8 {
    90
}
fn default_fetch_timeout() -> u64 {
    60
}

/// One legacy key to migrate.
#[derive(Debug, Deserialize, Clone)]
pub struct KeyEntry {
    pub key_web: String,
    pub language: String,
}

impl Config {
    pub fn key(&self, key_web: &str) -> Option<&KeyEntry> {
        self.keys.iter().find(|k| k.key_web == key_web)
    }

    /// Resolve a command argument: `all` (or nothing) selects every key.
    pub fn select_keys(&self, selector: Option<&str>) -> Result<Vec<KeyEntry>> {
        match selector {
            None | Some("all") => Ok(self.keys.clone()),
            Some(name) => self
                .key(name)
                .cloned()
                .map(|k| vec![k])
                .ok_or_else(|| anyhow::anyhow!("Unknown key: '{}'. Not listed in [[keys]].", name)),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.materialize.concurrency == 0 {
        anyhow::bail!("materialize.concurrency must be > 0");
    }
    if config.media.concurrency == 0 {
        anyhow::bail!("media.concurrency must be > 0");
    }
    if config.media.thumbnail_width == 0 || config.media.thumbnail_height == 0 {
        anyhow::bail!("media.thumbnail_width and media.thumbnail_height must be > 0");
    }
    if !(1..=100).contains(&config.media.thumbnail_quality) {
        anyhow::bail!("media.thumbnail_quality must be in [1, 100]");
    }

    let mut seen = HashSet::new();
    for key in &config.keys {
        if key.key_web.trim().is_empty() {
            anyhow::bail!("keys.key_web must not be empty");
        }
        if key.language.trim().is_empty() {
            anyhow::bail!("keys.language must not be empty for '{}'", key.key_web);
        }
        if !seen.insert(key.key_web.as_str()) {
            anyhow::bail!("Duplicate key in [[keys]]: '{}'", key.key_web);
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[db]
path = "./data/keys.sqlite"

[paths]
schema = "./schema.json"
target = "./target"
media_root = "./media"

[defaults]
license = "CC BY-SA 4.0"
creator = "ArtsApp"
created_by = "importer"

[[keys]]
key_web = "beetles"
language = "nb"
"#;

    fn write(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_applied() {
        let file = write(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.legacy.api_base, "https://artsapp.uib.no/api/v1");
        assert_eq!(config.defaults.workgroup_id, 1);
        assert_eq!(config.defaults.revision_note, "Imported from old ArtsApp");
        assert_eq!(config.materialize.concurrency, 16);
        assert_eq!(config.media.thumbnail_width, 128);
        assert_eq!(config.media.thumbnail_quality, 90);
        assert_eq!(config.keys.len(), 1);
    }

    #[test]
    fn test_rejects_zero_quality() {
        let file = write(&format!("{}\n[media]\nthumbnail_quality = 0\n", MINIMAL));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("thumbnail_quality"));
    }

    #[test]
    fn test_rejects_duplicate_keys() {
        let file = write(&format!(
            "{}\n[[keys]]\nkey_web = \"beetles\"\nlanguage = \"en\"\n",
            MINIMAL
        ));
        let err = load_config(file.path()).unwrap_err();
        assert!(err.to_string().contains("Duplicate key"));
    }

    #[test]
    fn test_select_keys() {
        let file = write(MINIMAL);
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.select_keys(Some("all")).unwrap().len(), 1);
        assert_eq!(config.select_keys(Some("beetles")).unwrap()[0].language, "nb");
        assert!(config.select_keys(Some("moths")).is_err());
    }
}
