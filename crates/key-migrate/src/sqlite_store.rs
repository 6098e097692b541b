//! SQLite-backed [`EntityStore`] implementation.
//!
//! Every create is a single `INSERT`; surrogate ids come from
//! `last_insert_rowid()`. Revision content and media snapshots are stored
//! as JSON text.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use key_migrate_core::store::{
    EntityKind, EntityRef, EntityStore, KeyInfo, KeyRecord, Media, MediaFiles, NewKey, NewMedia,
    NewRevision,
};

/// SQLite implementation of the [`EntityStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn table_name(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Revision => "revisions",
        EntityKind::Key => "keys",
        EntityKind::KeyRevision => "key_revisions",
        EntityKind::KeyInfo => "key_info",
        EntityKind::KeyLanguage => "key_languages",
        EntityKind::Taxon => "taxa",
        EntityKind::Character => "characters",
        EntityKind::CharacterState => "character_states",
        EntityKind::Media => "media",
        EntityKind::KeyMedia => "key_media",
    }
}

fn parse_json(text: Option<String>) -> Value {
    text.and_then(|t| serde_json::from_str(&t).ok())
        .unwrap_or(Value::Null)
}

#[async_trait]
impl EntityStore for SqliteStore {
    async fn create_revision(&self, revision: &NewRevision) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO revisions (note, created_by, status, content, media, created_at)
            VALUES (?, ?, ?, '{}', '{}', ?)
            "#,
        )
        .bind(&revision.note)
        .bind(&revision.created_by)
        .bind(&revision.status)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn create_key(&self, key: &NewKey) -> Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO keys (revision_id, workgroup_id, created_by, status, version, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(key.revision_id)
        .bind(key.workgroup_id)
        .bind(&key.created_by)
        .bind(&key.status)
        .bind(&key.version)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn link_revision(&self, key_id: i64, revision_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO key_revisions (key_id, revision_id) VALUES (?, ?)")
            .bind(key_id)
            .bind(revision_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_key_info(&self, info: &KeyInfo) -> Result<()> {
        sqlx::query(
            "INSERT INTO key_info (key_id, language_code, title, description) VALUES (?, ?, ?, ?)",
        )
        .bind(info.key_id)
        .bind(&info.language_code)
        .bind(&info.title)
        .bind(&info.description)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_key_language(&self, key_id: i64, language_code: &str) -> Result<()> {
        sqlx::query("INSERT INTO key_languages (key_id, language_code) VALUES (?, ?)")
            .bind(key_id)
            .bind(language_code)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_taxon(&self, key_id: i64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO taxa (key_id) VALUES (?)")
            .bind(key_id)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn create_character(&self, key_id: i64, kind: &str) -> Result<i64> {
        let result = sqlx::query("INSERT INTO characters (key_id, type) VALUES (?, ?)")
            .bind(key_id)
            .bind(kind)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn create_character_state(&self, character_id: i64) -> Result<i64> {
        let result = sqlx::query("INSERT INTO character_states (character_id) VALUES (?)")
            .bind(character_id)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn create_media(&self, media: &NewMedia) -> Result<i64> {
        let result = sqlx::query("INSERT INTO media (type, created_by) VALUES (?, ?)")
            .bind(&media.mime_type)
            .bind(&media.created_by)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_media_files(&self, media_id: i64, files: &MediaFiles) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE media
            SET file_name = ?, file_path = ?, thumbnail_name = ?, thumbnail_path = ?
            WHERE id = ?
            "#,
        )
        .bind(&files.file_name)
        .bind(&files.file_path)
        .bind(&files.thumbnail_name)
        .bind(&files.thumbnail_path)
        .bind(media_id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("media {} not found", media_id);
        }
        Ok(())
    }

    async fn find_media(&self, media_id: i64) -> Result<Option<Media>> {
        let row = sqlx::query(
            r#"
            SELECT id, type, file_name, file_path, thumbnail_name, thumbnail_path
            FROM media WHERE id = ?
            "#,
        )
        .bind(media_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| {
            let file_name: Option<String> = row.get("file_name");
            let file_path: Option<String> = row.get("file_path");
            let thumbnail_name: Option<String> = row.get("thumbnail_name");
            let thumbnail_path: Option<String> = row.get("thumbnail_path");
            let files = match (file_name, file_path, thumbnail_name, thumbnail_path) {
                (Some(file_name), Some(file_path), Some(thumbnail_name), Some(thumbnail_path)) => {
                    Some(MediaFiles {
                        file_name,
                        file_path,
                        thumbnail_name,
                        thumbnail_path,
                    })
                }
                _ => None,
            };
            Media {
                id: row.get("id"),
                mime_type: row.get("type"),
                files,
            }
        }))
    }

    async fn create_key_media(&self, key_id: i64, media_id: i64) -> Result<()> {
        sqlx::query("INSERT INTO key_media (key_id, media_id) VALUES (?, ?)")
            .bind(key_id)
            .bind(media_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_revision(
        &self,
        revision_id: i64,
        content: &Value,
        media: &Value,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE revisions SET content = ?, media = ? WHERE id = ?")
            .bind(serde_json::to_string(content)?)
            .bind(serde_json::to_string(media)?)
            .bind(revision_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            anyhow::bail!("revision {} not found", revision_id);
        }
        Ok(())
    }

    async fn find_key(&self, key_id: i64) -> Result<Option<KeyRecord>> {
        let row = sqlx::query(
            r#"
            SELECT k.id, k.revision_id, k.status, k.version, k.created_by,
                   r.content, r.media,
                   (SELECT title FROM key_info i WHERE i.key_id = k.id LIMIT 1) AS title
            FROM keys k
            LEFT JOIN revisions r ON r.id = k.revision_id
            WHERE k.id = ?
            "#,
        )
        .bind(key_id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to load key {}", key_id))?;

        Ok(row.map(|row| KeyRecord {
            id: row.get("id"),
            revision_id: row.get("revision_id"),
            status: row.get("status"),
            version: row.get("version"),
            created_by: row.get("created_by"),
            title: row.get("title"),
            content: parse_json(row.get("content")),
            media: parse_json(row.get("media")),
        }))
    }

    async fn count(&self, kind: EntityKind) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table_name(kind));
        let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(n)
    }

    async fn destroy(&self, entity: &EntityRef) -> Result<()> {
        let query = match entity {
            EntityRef::Revision(id) => sqlx::query("DELETE FROM revisions WHERE id = ?").bind(*id),
            EntityRef::Key(id) => sqlx::query("DELETE FROM keys WHERE id = ?").bind(*id),
            EntityRef::KeyRevision {
                key_id,
                revision_id,
            } => sqlx::query("DELETE FROM key_revisions WHERE key_id = ? AND revision_id = ?")
                .bind(*key_id)
                .bind(*revision_id),
            EntityRef::KeyInfo {
                key_id,
                language_code,
            } => sqlx::query("DELETE FROM key_info WHERE key_id = ? AND language_code = ?")
                .bind(*key_id)
                .bind(language_code.clone()),
            EntityRef::KeyLanguage {
                key_id,
                language_code,
            } => sqlx::query("DELETE FROM key_languages WHERE key_id = ? AND language_code = ?")
                .bind(*key_id)
                .bind(language_code.clone()),
            EntityRef::Taxon(id) => sqlx::query("DELETE FROM taxa WHERE id = ?").bind(*id),
            EntityRef::Character(id) => {
                sqlx::query("DELETE FROM characters WHERE id = ?").bind(*id)
            }
            EntityRef::CharacterState(id) => {
                sqlx::query("DELETE FROM character_states WHERE id = ?").bind(*id)
            }
            EntityRef::Media(id) => sqlx::query("DELETE FROM media WHERE id = ?").bind(*id),
            EntityRef::KeyMedia { key_id, media_id } => {
                sqlx::query("DELETE FROM key_media WHERE key_id = ? AND media_id = ?")
                    .bind(*key_id)
                    .bind(*media_id)
            }
        };
        query
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to destroy {}", entity.kind().as_str()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
    use std::str::FromStr;

    async fn store() -> SqliteStore {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").unwrap();
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        crate::migrate::migrate_pool(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn test_key_round_trip() {
        let store = store().await;
        let revision_id = store
            .create_revision(&NewRevision {
                note: "Imported".to_string(),
                created_by: "importer".to_string(),
                status: "ACCEPTED".to_string(),
            })
            .await
            .unwrap();
        let key_id = store
            .create_key(&NewKey {
                revision_id,
                workgroup_id: 1,
                created_by: "importer".to_string(),
                status: "PRIVATE".to_string(),
                version: Some("2".to_string()),
            })
            .await
            .unwrap();
        store
            .create_key_info(&KeyInfo {
                key_id,
                language_code: "nb".to_string(),
                title: Some("Biller".to_string()),
                description: None,
            })
            .await
            .unwrap();
        store
            .update_revision(revision_id, &json!({"taxa": []}), &json!({"mediaElements": []}))
            .await
            .unwrap();

        let key = store.find_key(key_id).await.unwrap().unwrap();
        assert_eq!(key.revision_id, revision_id);
        assert_eq!(key.status, "PRIVATE");
        assert_eq!(key.title.as_deref(), Some("Biller"));
        assert_eq!(key.content, json!({"taxa": []}));
        assert!(store.find_key(key_id + 100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_media_files_and_destroy() {
        let store = store().await;
        let id = store
            .create_media(&NewMedia {
                mime_type: "image/jpeg".to_string(),
                created_by: "importer".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(store.find_media(id).await.unwrap().unwrap().files, None);

        let files = MediaFiles {
            file_name: format!("{}.jpeg", id),
            file_path: format!("/m/keys/1/{}.jpeg", id),
            thumbnail_name: format!("{}-thumbnail.jpeg", id),
            thumbnail_path: format!("/m/keys/1/{}-thumbnail.jpeg", id),
        };
        store.update_media_files(id, &files).await.unwrap();
        assert_eq!(store.find_media(id).await.unwrap().unwrap().files, Some(files));

        store.destroy(&EntityRef::Media(id)).await.unwrap();
        assert!(store.find_media(id).await.unwrap().is_none());
        assert_eq!(store.count(EntityKind::Media).await.unwrap(), 0);
    }
}
