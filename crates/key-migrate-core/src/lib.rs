//! # Key Migrate Core
//!
//! Storage-agnostic logic for migrating legacy identification keys: legacy
//! and target data models, the legacy → document transformer, media id
//! derivation, the entity store abstraction, id remapping and the
//! materializer.
//!
//! This crate contains no sqlx, HTTP or filesystem I/O. The `key-migrate`
//! crate supplies those around it.

pub mod error;
pub mod ledger;
pub mod materialize;
pub mod media_ref;
pub mod models;
pub mod remap;
pub mod store;
pub mod transform;
