use anyhow::{Context, Result};
use serde_json::Value;

use key_migrate_core::models::{flatten_taxa, Taxon};
use key_migrate_core::store::{EntityStore, KeyRecord};

fn count(content: &Value, field: &str) -> usize {
    content
        .get(field)
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0)
}

/// Taxon count of a stored revision, group nodes included.
fn count_taxa(content: &Value) -> usize {
    content
        .get("taxa")
        .cloned()
        .and_then(|taxa| serde_json::from_value::<Vec<Taxon>>(taxa).ok())
        .map(|taxa| flatten_taxa(&taxa).len())
        .unwrap_or(0)
}

pub async fn load_key(store: &dyn EntityStore, key_id: i64) -> Result<KeyRecord> {
    store
        .find_key(key_id)
        .await?
        .with_context(|| format!("Key {} not found", key_id))
}

/// CLI entry point: prints a persisted key to stdout.
pub async fn run_show(store: &dyn EntityStore, key_id: i64) -> Result<()> {
    let key = load_key(store, key_id).await?;

    println!("--- Key ---");
    println!("id:          {}", key.id);
    println!("title:       {}", key.title.as_deref().unwrap_or("(untitled)"));
    println!("status:      {}", key.status);
    println!("version:     {}", key.version.as_deref().unwrap_or("-"));
    println!("created_by:  {}", key.created_by);
    println!("revision:    {}", key.revision_id);
    println!();

    println!("--- Revision content ---");
    println!("taxa:        {}", count_taxa(&key.content));
    println!("characters:  {}", count(&key.content, "characters"));
    println!("statements:  {}", count(&key.content, "statements"));
    println!("media:       {}", count(&key.media, "mediaElements"));

    Ok(())
}
