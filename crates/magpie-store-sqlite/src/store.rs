//! The storage pipeline.
//!
//! Pipeline:
//!   path + Capture
//!     └─ connect()        → open (or create) the store file
//!          └─ verify() / build() → check or establish identity + schema
//!               └─ fill()          → write new entries under a savepoint
//!                    └─ close           → StoreReport
//!
//! Each mutating stage runs inside a named SQLite savepoint, so a crash or
//! an abort mid-stage leaves the file as it was before the stage started.
//! Cancellation requests are acknowledged only at stage boundaries; a
//! request arriving mid-fill is first put to the policy's confirmation hook.

use std::{path::Path, time::Duration};

use chrono::Utc;
use magpie_core::{capture::Capture, paths};
use rusqlite::{Connection, OpenFlags, OptionalExtension, params};
use uuid::Uuid;

use crate::{
  cancel::CancelPolicy,
  encode,
  error::{Error, Result, Stage},
  schema,
};

const SAVEPOINT_VERIFYING: &str = "db_verifying";
const SAVEPOINT_BUILDING: &str = "db_building";
const SAVEPOINT_FILLING: &str = "writing_new_data";

/// What a completed run did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreReport {
  /// Whether the store file was created by this run.
  pub created:    bool,
  /// Entries newly written.
  pub inserted:   u64,
  /// Entries skipped because an identical (url, title) pair was already in
  /// the default collection.
  pub duplicates: u64,
}

/// Write `capture` into the store at `path`, creating the store if the file
/// does not exist yet.
///
/// Idempotent with respect to content: re-running with the same capture
/// writes nothing new.
pub fn store_capture(
  capture: &Capture,
  path: &Path,
  policy: &impl CancelPolicy,
) -> Result<StoreReport> {
  let (mut conn, created) = connect(path)?;
  consume_boundary(policy, Stage::Connecting)?;

  if created {
    build(&mut conn)?;
    consume_boundary(policy, Stage::Building)?;
  } else {
    verify(&mut conn)?;
    consume_boundary(policy, Stage::Verifying)?;
  }

  let (inserted, duplicates) = fill(&mut conn, capture, policy)?;
  consume_boundary(policy, Stage::Filling)?;

  conn
    .close()
    .map_err(|(_conn, err)| Error::database(Stage::Disconnecting)(err))?;

  Ok(StoreReport {
    created,
    inserted,
    duplicates,
  })
}

/// A consumed request at a stage boundary stops the run cleanly: the
/// finished stage is already committed, nothing else has begun.
fn consume_boundary(policy: &impl CancelPolicy, stage: Stage) -> Result<()> {
  if policy.consume() {
    return Err(Error::Interrupted { stage });
  }
  Ok(())
}

// ─── Connecting ──────────────────────────────────────────────────────────────

fn connect(path: &Path) -> Result<(Connection, bool)> {
  let resolved = paths::resolve_creatable(path)?;
  let created = !resolved.exists();

  // Creating the file explicitly lets the connection itself be opened
  // without SQLITE_OPEN_CREATE, so a typo'd path can never silently become
  // a new database somewhere unintended.
  if created {
    std::fs::File::create(&resolved).map_err(|err| Error::FileAccess {
      message: format!("could not create the output file {resolved:?}"),
      source:  Some(Box::new(err)),
    })?;
  } else if !resolved.is_file() {
    return Err(paths::PathError::NotAFile(resolved).into());
  }

  let conn =
    Connection::open_with_flags(&resolved, OpenFlags::SQLITE_OPEN_READ_WRITE)
      .map_err(Error::database(Stage::Connecting))?;
  conn
    .busy_timeout(Duration::from_secs(5))
    .map_err(Error::database(Stage::Connecting))?;
  conn
    .pragma_update(None, "foreign_keys", true)
    .map_err(Error::database(Stage::Connecting))?;

  Ok((conn, created))
}

// ─── Verifying ───────────────────────────────────────────────────────────────

/// Check the identity headers of an existing file.
///
/// An existing file is never altered unless it proves to be a store of
/// exactly this application and schema version.
fn verify(conn: &mut Connection) -> Result<()> {
  let sp = conn
    .savepoint_with_name(SAVEPOINT_VERIFYING)
    .map_err(Error::database(Stage::Verifying))?;

  let db_id = require_header(&sp, schema::KEY_DB_ID)?;
  let db_id = encode::decode_str(&db_id).map_err(|err| {
    Error::header(Stage::Verifying, format!("header \"db_id\": {err}"))
  })?;
  if db_id != schema::DB_ID {
    return Err(Error::header(
      Stage::Verifying,
      format!(
        "the output file belongs to application {db_id:?}, not {:?}",
        schema::DB_ID
      ),
    ));
  }

  let db_v = require_header(&sp, schema::KEY_DB_VERSION)?;
  let db_v = encode::decode_u32(&db_v).map_err(|err| {
    Error::header(Stage::Verifying, format!("header \"db_v\": {err}"))
  })?;
  if db_v != schema::DB_VERSION {
    return Err(Error::header(
      Stage::Verifying,
      format!(
        "the output store has schema version {db_v}, this version writes \
         only {}",
        schema::DB_VERSION
      ),
    ));
  }

  sp.commit().map_err(Error::database(Stage::Verifying))
}

fn require_header(conn: &Connection, key: &str) -> Result<Vec<u8>> {
  header_get(conn, key, Stage::Verifying)?.ok_or_else(|| {
    Error::header(
      Stage::Verifying,
      format!("the output file carries no {key:?} header"),
    )
  })
}

fn header_get(
  conn: &Connection,
  key: &str,
  stage: Stage,
) -> Result<Option<Vec<u8>>> {
  conn
    .query_row("SELECT value FROM extra WHERE name = ?1", [key], |row| {
      row.get(0)
    })
    .optional()
    .map_err(Error::database(stage))
}

fn header_put(
  conn: &Connection,
  key: &str,
  value: &[u8],
  stage: Stage,
) -> Result<()> {
  conn
    .execute(
      "INSERT INTO extra (name, value) VALUES (?1, ?2)
       ON CONFLICT (name) DO UPDATE SET value = excluded.value",
      params![key, value],
    )
    .map_err(Error::database(stage))?;
  Ok(())
}

// ─── Building ────────────────────────────────────────────────────────────────

/// Establish the schema and identity headers in a fresh file.
fn build(conn: &mut Connection) -> Result<()> {
  let sp = conn
    .savepoint_with_name(SAVEPOINT_BUILDING)
    .map_err(Error::database(Stage::Building))?;

  sp.execute_batch(schema::SCHEMA)
    .map_err(Error::database(Stage::Building))?;
  header_put(
    &sp,
    schema::KEY_DB_ID,
    &encode::encode_str(schema::DB_ID),
    Stage::Building,
  )?;
  header_put(
    &sp,
    schema::KEY_DB_VERSION,
    &encode::encode_u32(schema::DB_VERSION),
    Stage::Building,
  )?;

  sp.commit().map_err(Error::database(Stage::Building))
}

// ─── Filling ─────────────────────────────────────────────────────────────────

/// Write the capture's entries into the default collection.
///
/// Runs entirely inside one savepoint: either every new row (plus the
/// refreshed `latest_output_timestamp` header) lands, or none do.
fn fill(
  conn: &mut Connection,
  capture: &Capture,
  policy: &impl CancelPolicy,
) -> Result<(u64, u64)> {
  let mut sp = conn
    .savepoint_with_name(SAVEPOINT_FILLING)
    .map_err(Error::database(Stage::Filling))?;

  let now = Utc::now().timestamp().clamp(0, u32::MAX as i64) as u32;
  header_put(
    &sp,
    schema::KEY_LATEST_OUTPUT_TIMESTAMP,
    &encode::encode_u32(now),
    Stage::Filling,
  )?;

  let collection = encode::encode_uuid(schema::default_collection_uuid());
  sp.execute(
    "INSERT OR IGNORE INTO collections (collection_uuid, text_id, \
     displayname) VALUES (?1, ?2, ?3)",
    params![
      collection,
      schema::DEFAULT_COLLECTION_TEXT_ID,
      schema::DEFAULT_COLLECTION_DISPLAYNAME
    ],
  )
  .map_err(Error::database(Stage::Filling))?;

  let mut inserted = 0u64;
  let mut duplicates = 0u64;
  let mut aborted = false;

  // Inner scope: the prepared statements borrow the savepoint and must be
  // dropped before it can be rolled back or committed.
  {
    // Dedup is content-keyed over the whole table, not per collection.
    let mut exists = sp
      .prepare(
        "SELECT EXISTS(
           SELECT 1 FROM entries WHERE full_url = ?1 AND title = ?2
         )",
      )
      .map_err(Error::database(Stage::Filling))?;
    let mut insert = sp
      .prepare(
        "INSERT INTO entries (entry_uuid, collection_uuid, full_url, title)
         VALUES (?1, ?2, ?3, ?4)",
      )
      .map_err(Error::database(Stage::Filling))?;

    for entry in &capture.entries {
      // A request arriving mid-fill is put to the policy before any data
      // is thrown away; a declined abort clears the request and the fill
      // carries on.
      if policy.pending() {
        if policy.confirm_abort() {
          aborted = true;
          break;
        }
        policy.consume();
      }

      let known: bool = exists
        .query_row(params![entry.url, entry.title], |row| row.get(0))
        .map_err(Error::database(Stage::Filling))?;
      if known {
        duplicates += 1;
        continue;
      }

      let entry_uuid = encode::encode_uuid(Uuid::new_v4());
      insert
        .execute(params![entry_uuid, collection, entry.url, entry.title])
        .map_err(Error::database(Stage::Filling))?;
      inserted += 1;
    }
  }

  if aborted {
    sp.rollback().map_err(Error::database(Stage::Filling))?;
    policy.consume();
    return Err(Error::Interrupted {
      stage: Stage::Filling,
    });
  }

  sp.commit().map_err(Error::database(Stage::Filling))?;
  Ok((inserted, duplicates))
}
