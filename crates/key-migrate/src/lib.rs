//! # Key Migrate
//!
//! Migrates identification keys from the legacy key API into
//! schema-validated documents, then materializes those documents into a
//! relational entity graph with fetched media and thumbnails.
//!
//! ## Pipeline
//!
//! ```text
//! legacy API ──▶ convert ──▶ {key}-old.json / {key}-new.json
//!                                   │
//!                                   ▼
//!               insert ──▶ validate ──▶ materialize ──▶ media ──▶ SQLite
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`sqlite_store`] | SQLite [`EntityStore`](key_migrate_core::store::EntityStore) |
//! | [`legacy`] | Legacy key API client |
//! | [`validate`] | JSON schema gate |
//! | [`convert`] | Legacy record → document artifacts |
//! | [`fetch`] | Media download with one retry |
//! | [`thumbnail`] | Thumbnail derivation |
//! | [`media`] | Media pipeline |
//! | [`insert`] | Document → persisted key |
//! | [`error`] | Error taxonomy and exit codes |

pub mod config;
pub mod convert;
pub mod db;
pub mod error;
pub mod fetch;
pub mod insert;
pub mod keys;
pub mod legacy;
pub mod media;
pub mod migrate;
pub mod show;
pub mod sqlite_store;
pub mod thumbnail;
pub mod validate;
