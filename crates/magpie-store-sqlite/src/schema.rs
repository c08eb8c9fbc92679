//! SQL schema and identity constants for the magpie output store.
//!
//! A store file is recognized by two header values in the `extra` table:
//! `db_id` names the application and `db_v` the schema version. A file with
//! any other identity is refused rather than migrated over.

use uuid::{Uuid, uuid};

/// Application identity written into (and demanded from) the `db_id` header.
pub const DB_ID: &str = "magpie";

/// Schema version written into (and demanded from) the `db_v` header.
pub const DB_VERSION: u32 = 1;

pub const KEY_DB_ID: &str = "db_id";
pub const KEY_DB_VERSION: &str = "db_v";
pub const KEY_LATEST_OUTPUT_TIMESTAMP: &str = "latest_output_timestamp";

/// Namespace under which all deterministic collection UUIDs are derived.
pub const UUID_BASE_NAMESPACE: Uuid =
  uuid!("30227437-1da5-4e0f-91cf-cc4174fb6cc6");

pub const DEFAULT_COLLECTION_TEXT_ID: &str = "default";
pub const DEFAULT_COLLECTION_DISPLAYNAME: &str = "Default";

/// The default collection's UUID is derived, not random, so every store
/// agrees on it without coordination.
pub fn default_collection_uuid() -> Uuid {
  Uuid::new_v5(&UUID_BASE_NAMESPACE, DEFAULT_COLLECTION_TEXT_ID.as_bytes())
}

/// Full schema DDL; executed inside the building savepoint on a fresh file.
pub const SCHEMA: &str = "
PRAGMA secure_delete = ON;

-- Header key/value pairs; values are raw BLOBs with per-key codecs.
CREATE TABLE extra (
    name   TEXT NOT NULL UNIQUE,
    value  BLOB
);

CREATE TABLE collections (
    collection_uuid  BLOB NOT NULL UNIQUE,
    text_id          TEXT NOT NULL,
    displayname      TEXT
);

CREATE TABLE entries (
    entry_uuid       BLOB NOT NULL UNIQUE,
    collection_uuid  BLOB NOT NULL REFERENCES collections(collection_uuid),
    full_url         TEXT NOT NULL,
    title            TEXT
);
";
