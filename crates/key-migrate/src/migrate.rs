use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

const TABLES: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS revisions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        note TEXT NOT NULL,
        created_by TEXT NOT NULL,
        status TEXT NOT NULL,
        content TEXT NOT NULL DEFAULT '{}',
        media TEXT NOT NULL DEFAULT '{}',
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS keys (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        revision_id INTEGER NOT NULL,
        workgroup_id INTEGER NOT NULL,
        created_by TEXT NOT NULL,
        status TEXT NOT NULL,
        version TEXT,
        created_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS key_revisions (
        key_id INTEGER NOT NULL,
        revision_id INTEGER NOT NULL,
        PRIMARY KEY (key_id, revision_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS key_info (
        key_id INTEGER NOT NULL,
        language_code TEXT NOT NULL,
        title TEXT,
        description TEXT,
        PRIMARY KEY (key_id, language_code)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS key_languages (
        key_id INTEGER NOT NULL,
        language_code TEXT NOT NULL,
        PRIMARY KEY (key_id, language_code)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS taxa (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key_id INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS characters (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        key_id INTEGER NOT NULL,
        type TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS character_states (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        character_id INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS media (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        type TEXT NOT NULL,
        created_by TEXT NOT NULL,
        file_name TEXT,
        file_path TEXT,
        thumbnail_name TEXT,
        thumbnail_path TEXT
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS key_media (
        key_id INTEGER NOT NULL,
        media_id INTEGER NOT NULL,
        PRIMARY KEY (key_id, media_id)
    )
    "#,
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_taxa_key_id ON taxa(key_id)",
    "CREATE INDEX IF NOT EXISTS idx_characters_key_id ON characters(key_id)",
    "CREATE INDEX IF NOT EXISTS idx_character_states_character_id ON character_states(character_id)",
];

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index on an open pool. Idempotent.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    for statement in TABLES.iter().chain(INDEXES) {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
