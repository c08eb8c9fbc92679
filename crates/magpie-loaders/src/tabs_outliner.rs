//! Loader for Tabs Outliner session databases.
//!
//! Pipeline:
//!   path
//!     └─ fetch_snapshot_row()   → four raw column values
//!          └─ convert_row()        → Snapshot (typed fields + parsed op array)
//!               └─ precheck_op_array() → sentinels + cross-field clock check
//!                    └─ flatten_entries()  → (url, title) pairs → Capture
//!
//! The single row of `current_session_snapshot` carries a flat JSON op-log
//! array bounded by two sentinel records; everything strictly between them
//! is a 3-element entry whose content `type` discriminator selects one of a
//! closed set of nested schemas. Only tab-typed entries are extracted.

use std::{path::Path, time::Duration};

use chrono::{DateTime, Utc};
use magpie_core::{capture::Capture, paths};
use rusqlite::{Connection, OpenFlags, types::Value as SqlValue};
use serde::Deserialize;
use serde_json::Value;

use crate::{
  error::{Error, Result},
  schema,
};

const SNAPSHOT_TABLE: &str = "current_session_snapshot";
const FIELD_NAMES: [&str; 4] = ["id", "timestamp", "op_array_len", "data"];

/// Op-log type code of the session-init sentinel (first element).
const INIT_SENTINEL_CODE: i64 = 2000;
/// Op-log type code of every ordinary entry between the sentinels.
const ENTRY_CODE: i64 = 2001;
/// Op-log type code of the close sentinel (last element).
const CLOSE_SENTINEL_CODE: i64 = 11111;

/// Maximum allowed gap between the payload's embedded close time and the
/// row's own timestamp, in seconds.
const CLOCK_WINDOW_SECS: f64 = 10.0;

// ─── Public API ──────────────────────────────────────────────────────────────

/// Load a Tabs Outliner session database from `path` into a [`Capture`].
pub fn load(path: &Path) -> Result<Capture> {
  let raw = fetch_snapshot_row(path)?;
  let snapshot = convert_row(raw)?;
  let ops = precheck_op_array(&snapshot)?;
  let pairs = flatten_entries(ops)?;
  Ok(Capture::from_pairs(pairs))
}

// ─── Row fetch ───────────────────────────────────────────────────────────────

/// Open the source database strictly read-only and fetch the snapshot row.
///
/// Engine-level failures (locked file, corruption, missing table) are
/// database errors; a wrong row or column count is a content problem and
/// reported as structural instead.
fn fetch_snapshot_row(path: &Path) -> Result<[SqlValue; 4]> {
  let resolved = paths::resolve_existing_file(path)?;
  let conn =
    Connection::open_with_flags(&resolved, OpenFlags::SQLITE_OPEN_READ_ONLY)
      .map_err(Error::database("could not open the input database"))?;
  conn
    .busy_timeout(Duration::from_secs(5))
    .map_err(Error::database("could not configure the input database"))?;

  let mut stmt = conn
    .prepare(&format!("SELECT * FROM \"{SNAPSHOT_TABLE}\""))
    .map_err(Error::database("could not read the input database"))?;

  let column_count = stmt.column_count();
  if column_count != 4 {
    return Err(Error::structural(format!(
      "input database table \"{SNAPSHOT_TABLE}\" contains {column_count} \
       fields, expected 4 fields"
    )));
  }

  let mut rows = stmt
    .query([])
    .map_err(Error::database("could not read the input database"))?;

  // Fetch at most two rows; enough to detect surplus without loading a
  // potentially large table.
  let first = rows
    .next()
    .map_err(Error::database("could not read the input database"))?;
  let Some(first) = first else {
    return Err(Error::structural(format!(
      "input database table \"{SNAPSHOT_TABLE}\" contains 0 rows, known to \
       contain exactly 1 row"
    )));
  };

  let mut values = Vec::with_capacity(4);
  for index in 0..4 {
    let value: SqlValue = first
      .get(index)
      .map_err(Error::database("could not read the input database"))?;
    values.push(value);
  }

  let surplus = rows
    .next()
    .map_err(Error::database("could not read the input database"))?;
  if surplus.is_some() {
    return Err(Error::structural(format!(
      "input database table \"{SNAPSHOT_TABLE}\" contains more than 1 row, \
       known to contain exactly 1 row"
    )));
  }

  // values has exactly 4 elements by construction
  Ok(values.try_into().map_err(|_| {
    Error::structural(format!(
      "input database table \"{SNAPSHOT_TABLE}\" row could not be read"
    ))
  })?)
}

// ─── Row conversion ──────────────────────────────────────────────────────────

struct Snapshot {
  /// The row's own clock, from its millisecond timestamp column.
  timestamp:    DateTime<Utc>,
  /// Declared length of the op array.
  op_array_len: u64,
  /// The parsed payload; expected to be the op array.
  data:         Value,
}

impl Snapshot {
  fn timestamp_secs(&self) -> f64 {
    self.timestamp.timestamp_millis() as f64 / 1000.0
  }
}

/// Check the four column types (batched: each mismatch is independently
/// checkable, so all are collected into one combined message — the sole
/// exception to first-failure-only reporting) and convert the fields.
fn convert_row(values: [SqlValue; 4]) -> Result<Snapshot> {
  check_field_types(&values)?;
  let [id, timestamp, op_array_len, data] = values;

  let id = numeric_field(&id);
  if id != 1.0 {
    return Err(Error::structural(format!(
      "only \"{SNAPSHOT_TABLE}.id\" == 1.0 is known, {id} encountered"
    )));
  }

  let millis = numeric_field(&timestamp);
  let timestamp = (millis.is_finite() && millis >= 0.0)
    .then(|| DateTime::<Utc>::from_timestamp_millis(millis as i64))
    .flatten()
    .ok_or_else(|| {
      Error::structural(format!(
        "weird \"{SNAPSHOT_TABLE}.timestamp\" encountered: {millis}"
      ))
    })?;

  let declared_len = numeric_field(&op_array_len);
  if !(declared_len.is_finite()
    && declared_len >= 0.0
    && declared_len.fract() == 0.0)
  {
    return Err(Error::structural(format!(
      "\"{SNAPSHOT_TABLE}.op_array_len\" is expected to be a non-negative \
       integer, encountered: {declared_len}"
    )));
  }

  let SqlValue::Text(payload) = data else {
    // unreachable after the type check, but never panic on input
    return Err(Error::structural(format!(
      "\"{SNAPSHOT_TABLE}.data\" is expected to be text"
    )));
  };
  let data = schema::parse_json_strict(&payload).map_err(|err| {
    Error::structural_with(
      format!(
        "failed to convert \"{SNAPSHOT_TABLE}.data\" to a structured object"
      ),
      err,
    )
  })?;

  Ok(Snapshot {
    timestamp,
    op_array_len: declared_len as u64,
    data,
  })
}

fn check_field_types(values: &[SqlValue; 4]) -> Result<()> {
  let mut problems = Vec::new();
  for (index, name) in FIELD_NAMES.iter().enumerate() {
    let (ok, expected) = match index {
      // id, timestamp, op_array_len: INTEGER and REAL both count as numeric
      0..=2 => (
        matches!(values[index], SqlValue::Integer(_) | SqlValue::Real(_)),
        "numeric",
      ),
      _ => (matches!(values[index], SqlValue::Text(_)), "text"),
    };
    if !ok {
      problems.push(format!(
        "input database field \"{SNAPSHOT_TABLE}.{name}\" was recognized as \
         type '{}', expected '{expected}'",
        sql_type_name(&values[index])
      ));
    }
  }
  if problems.is_empty() {
    Ok(())
  } else {
    Err(Error::structural(problems.join("; ")))
  }
}

fn sql_type_name(value: &SqlValue) -> &'static str {
  match value {
    SqlValue::Null => "null",
    SqlValue::Integer(_) => "integer",
    SqlValue::Real(_) => "real",
    SqlValue::Text(_) => "text",
    SqlValue::Blob(_) => "blob",
  }
}

/// Only called on fields already checked to be INTEGER or REAL.
fn numeric_field(value: &SqlValue) -> f64 {
  match value {
    SqlValue::Integer(i) => *i as f64,
    SqlValue::Real(f) => *f,
    _ => f64::NAN,
  }
}

// ─── Sentinel schemas ────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InitSentinel {
  #[serde(rename = "type")]
  type_code: i64,
  node:      InitNode,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InitNode {
  #[serde(rename = "type")]
  kind: String,
  data: InitPayload,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct InitPayload {
  #[serde(rename = "treeId")]
  tree_id:         Value,
  #[serde(rename = "nextDId")]
  next_d_id:       i64,
  #[serde(rename = "nonDumpedDId")]
  non_dumped_d_id: i64,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct CloseSentinel {
  #[serde(rename = "type")]
  type_code: i64,
  /// Milliseconds; the payload's own clock at session close.
  time:      f64,
}

// ─── Precheck ────────────────────────────────────────────────────────────────

/// Validate the array shape and both sentinels; returns the op array.
fn precheck_op_array(snapshot: &Snapshot) -> Result<&[Value]> {
  let ops = snapshot.data.as_array().ok_or_else(|| {
    Error::structural(
      "JSON root element of \"data\" is expected to be an array",
    )
  })?;

  if ops.len() as u64 != snapshot.op_array_len {
    return Err(Error::structural(format!(
      "JSON root array is expected to contain exactly \
       \"{SNAPSHOT_TABLE}.op_array_len\" == {} elements total, {} found",
      snapshot.op_array_len,
      ops.len()
    )));
  }
  if ops.len() < 2 {
    return Err(Error::structural(format!(
      "JSON root array is expected to carry both sentinel elements, {} \
       elements found",
      ops.len()
    )));
  }

  check_init_sentinel(&ops[0])?;
  let close_millis = check_close_sentinel(&ops[ops.len() - 1])?;

  // Cross-field consistency: the payload's embedded close time must be
  // strictly before the row's own timestamp and within the window.
  let close_secs = close_millis / 1000.0;
  let row_secs = snapshot.timestamp_secs();
  if !(close_secs < row_secs && (row_secs - close_secs) < CLOCK_WINDOW_SECS) {
    return Err(Error::structural(format!(
      "timestamps on JSON and DB have weird relation; JSON's is \
       {close_secs} and DB's is {row_secs}"
    )));
  }

  Ok(ops)
}

fn check_init_sentinel(value: &Value) -> Result<()> {
  let sentinel: InitSentinel =
    schema::from_value(value.clone(), "JSON special first element")?;
  let ok = sentinel.type_code == INIT_SENTINEL_CODE
    && sentinel.node.kind == "session"
    && schema::as_non_negative_number(&sentinel.node.data.tree_id).is_some()
    && sentinel.node.data.next_d_id == 1
    && sentinel.node.data.non_dumped_d_id == 1;
  if !ok {
    return Err(Error::structural(
      "JSON special first element has unexpected format",
    ));
  }
  Ok(())
}

/// Returns the embedded close time in milliseconds.
fn check_close_sentinel(value: &Value) -> Result<f64> {
  let sentinel: CloseSentinel =
    schema::from_value(value.clone(), "JSON special last element")?;
  if sentinel.type_code != CLOSE_SENTINEL_CODE {
    return Err(Error::structural(
      "JSON special last element has unexpected format",
    ));
  }
  Ok(sentinel.time)
}

// ─── Entry schemas ───────────────────────────────────────────────────────────

/// `marks` override sub-object (favicon / title overrides).
///
/// The override fields are checked only by deserialization, never read.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct Marks {
  /// Always present and always empty in every observed capture.
  relicons:       Vec<Value>,
  #[serde(rename = "customFavicon")]
  custom_favicon: Option<String>,
  #[serde(rename = "customTitle")]
  custom_title:   Option<String>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct MutedInfo {
  muted:  bool,
  reason: Option<String>,
}

/// `data` of an entry without a `type` discriminator: a saved tab.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct SavedTabData {
  audible: bool,
  #[serde(rename = "autoDiscardable")]
  auto_discardable: bool,
  discarded: bool,
  #[serde(rename = "mutedInfo")]
  muted_info: MutedInfo,
  title: String,
  url: String,
  active: Option<bool>,
  #[serde(rename = "favIconUrl")]
  fav_icon_url: Option<String>,
  #[serde(rename = "groupId")]
  group_id: Option<i64>,
  highlighted: Option<bool>,
  id: Option<i64>,
  #[serde(rename = "openerTabId")]
  opener_tab_id: Option<i64>,
  #[serde(rename = "pendingUrl")]
  pending_url: Option<String>,
  #[serde(rename = "wasSavedOnLastWinSave")]
  was_saved_on_last_win_save: Option<bool>,
  #[serde(rename = "windowId")]
  window_id: Option<i64>,
}

/// `data` of a `tab`-typed entry: a live tab. Unlike the saved kind, `id`
/// is required and `wasSavedOnLastWinSave` is not recognized.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct LiveTabData {
  audible: bool,
  #[serde(rename = "autoDiscardable")]
  auto_discardable: bool,
  discarded: bool,
  id: i64,
  #[serde(rename = "mutedInfo")]
  muted_info: MutedInfo,
  title: String,
  url: String,
  active: Option<bool>,
  #[serde(rename = "favIconUrl")]
  fav_icon_url: Option<String>,
  #[serde(rename = "groupId")]
  group_id: Option<i64>,
  highlighted: Option<bool>,
  #[serde(rename = "openerTabId")]
  opener_tab_id: Option<i64>,
  #[serde(rename = "pendingUrl")]
  pending_url: Option<String>,
  status: Option<String>,
  #[serde(rename = "windowId")]
  window_id: Option<i64>,
}

/// `data` of a live window.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct WinData {
  #[serde(rename = "type")]
  kind:    String,
  rect:    String,
  focused: Option<bool>,
  id:      Option<i64>,
  state:   Option<String>,
}

/// `data` of a saved window; like [`WinData`] minus `state`, plus an
/// optional crash marker.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SavedWinData {
  #[serde(rename = "type")]
  kind: String,
  rect: String,
  focused: Option<bool>,
  id: Option<i64>,
  #[serde(rename = "crashDetectedDate")]
  crash_detected_date: Option<i64>,
}

// ─── Entry validation ────────────────────────────────────────────────────────

/// Validate every element strictly between the sentinels; tab-typed entries
/// (discriminator absent or `tab`) contribute their (url, title) pair.
///
/// The first failing entry aborts the walk; its 1-based index within the
/// open interval is included in the error.
fn flatten_entries(ops: &[Value]) -> Result<Vec<(String, String)>> {
  let mut pairs = Vec::new();
  for (index, entry) in ops[1..ops.len() - 1].iter().enumerate() {
    match validate_entry(entry) {
      Ok(Some(pair)) => pairs.push(pair),
      Ok(None) => {}
      Err(cause) => {
        return Err(Error::Structural {
          message: format!(
            "input data has unexpected format (stopped at first failed \
             entry {})",
            index + 1
          ),
          source:  Some(Box::new(cause)),
        });
      }
    }
  }
  Ok(pairs)
}

fn validate_entry(entry: &Value) -> Result<Option<(String, String)>> {
  let parts = entry
    .as_array()
    .filter(|parts| parts.len() == 3)
    .ok_or_else(|| {
      Error::structural("op-log entry is expected to be a 3-element array")
    })?;

  if parts[0].as_i64() != Some(ENTRY_CODE) {
    return Err(Error::structural(format!(
      "op-log entry type code is expected to be {ENTRY_CODE}"
    )));
  }
  let content = parts[1].as_object().ok_or_else(|| {
    Error::structural("op-log entry contents is expected to be a mapping")
  })?;
  let kids = parts[2].as_array().ok_or_else(|| {
    Error::structural(
      "op-log entry child references are expected to be an array",
    )
  })?;
  if !kids.iter().all(|k| k.as_u64().is_some()) {
    return Err(Error::structural(
      "op-log entry child references are expected to be non-negative \
       integers",
    ));
  }

  // The discriminator is judged before the data sub-object: an entry of
  // an unknown kind is reported as such even when its data is also absent.
  let kind = match content.get("type") {
    None => None,
    Some(Value::String(kind))
      if matches!(kind.as_str(), "tab" | "win" | "savedwin" | "group") =>
    {
      Some(kind.as_str())
    }
    Some(Value::String(other)) => {
      return Err(Error::structural(format!(
        "JSON entry contents has unknown type: \"{other}\""
      )));
    }
    Some(other) => {
      return Err(Error::structural(format!(
        "JSON entry contents has unknown type: {other}"
      )));
    }
  };

  let data = content.get("data").ok_or_else(|| {
    Error::structural(
      "JSON entry contents is expected to have \"data\" subobject, nothing \
       found",
    )
  })?;

  match kind {
    // A saved tab; contributes its pair.
    None => {
      let tab: SavedTabData = check_data(data, "saved tab")?;
      check_saved_tab(&tab)?;
      Ok(Some((tab.url, tab.title)))
    }
    // A live tab; contributes its pair.
    Some("tab") => {
      check_marks(content.get("marks"))?;
      let tab: LiveTabData = check_data(data, "live tab")?;
      check_live_tab(&tab)?;
      Ok(Some((tab.url, tab.title)))
    }
    // Windows and groups are validated but have no individual URL.
    Some("win") => {
      check_marks(content.get("marks"))?;
      check_colapsed(content.get("colapsed"))?;
      let win: WinData = check_data(data, "live window")?;
      check_win(&win.kind, &win.rect, win.focused, win.id)?;
      if let Some(state) = &win.state
        && state != "maximized"
      {
        return Err(Error::structural(format!(
          "live window \"state\" has unknown value \"{state}\""
        )));
      }
      Ok(None)
    }
    Some("savedwin") => {
      check_marks(content.get("marks"))?;
      let win: SavedWinData = check_data(data, "saved window")?;
      check_win(&win.kind, &win.rect, win.focused, win.id)?;
      if win.crash_detected_date.is_some_and(|d| d < 0) {
        return Err(Error::structural(
          "saved window \"crashDetectedDate\" is expected to be non-negative",
        ));
      }
      Ok(None)
    }
    // Only "group" remains after the discriminator filter above.
    Some(_) => {
      check_marks(content.get("marks"))?;
      check_colapsed(content.get("colapsed"))?;
      check_group_data(data)?;
      Ok(None)
    }
  }
}

fn check_data<T: serde::de::DeserializeOwned>(
  data: &Value,
  what: &str,
) -> Result<T> {
  schema::from_value(data.clone(), &format!("{what} \"data\" subobject"))
}

fn check_marks(marks: Option<&Value>) -> Result<()> {
  let Some(marks) = marks else { return Ok(()) };
  let marks: Marks =
    schema::from_value(marks.clone(), "\"marks\" subobject")?;
  if !marks.relicons.is_empty() {
    return Err(Error::structural(
      "\"marks.relicons\" is expected to be an empty array",
    ));
  }
  Ok(())
}

fn check_colapsed(colapsed: Option<&Value>) -> Result<()> {
  match colapsed {
    None | Some(Value::Bool(_)) => Ok(()),
    Some(_) => Err(Error::structural(
      "\"colapsed\" subobject is expected to be a boolean",
    )),
  }
}

fn check_muted_info(info: &MutedInfo) -> Result<()> {
  if info.muted && info.reason.as_deref() != Some("user") {
    return Err(Error::structural(
      "\"mutedInfo\" of a muted tab is expected to carry reason \"user\"",
    ));
  }
  Ok(())
}

fn check_saved_tab(tab: &SavedTabData) -> Result<()> {
  check_tab_flags(
    tab.auto_discardable,
    tab.active,
    tab.group_id,
    tab.id,
    tab.opener_tab_id,
    tab.window_id,
  )?;
  if tab.was_saved_on_last_win_save == Some(false) {
    return Err(Error::structural(
      "\"wasSavedOnLastWinSave\" is expected to be true when present",
    ));
  }
  check_muted_info(&tab.muted_info)
}

fn check_live_tab(tab: &LiveTabData) -> Result<()> {
  check_tab_flags(
    tab.auto_discardable,
    tab.active,
    tab.group_id,
    Some(tab.id),
    tab.opener_tab_id,
    tab.window_id,
  )?;
  if let Some(status) = &tab.status
    && !matches!(status.as_str(), "loading" | "unloaded")
  {
    return Err(Error::structural(format!(
      "tab \"status\" has unknown value \"{status}\""
    )));
  }
  check_muted_info(&tab.muted_info)
}

fn check_tab_flags(
  auto_discardable: bool,
  active: Option<bool>,
  group_id: Option<i64>,
  id: Option<i64>,
  opener_tab_id: Option<i64>,
  window_id: Option<i64>,
) -> Result<()> {
  if !auto_discardable {
    return Err(Error::structural(
      "\"autoDiscardable\" is expected to be true",
    ));
  }
  if active == Some(false) {
    return Err(Error::structural(
      "\"active\" is expected to be true when present",
    ));
  }
  if group_id.is_some_and(|g| g != -1) {
    return Err(Error::structural("\"groupId\" is expected to be -1"));
  }
  if id.is_some_and(|i| i <= 0) {
    return Err(Error::structural("tab \"id\" is expected to be positive"));
  }
  if opener_tab_id.is_some_and(|i| i <= 0) {
    return Err(Error::structural(
      "\"openerTabId\" is expected to be positive",
    ));
  }
  if window_id.is_some_and(|i| i <= 0) {
    return Err(Error::structural(
      "\"windowId\" is expected to be positive",
    ));
  }
  Ok(())
}

fn check_win(
  kind: &str,
  rect: &str,
  focused: Option<bool>,
  id: Option<i64>,
) -> Result<()> {
  if !matches!(kind, "normal" | "popup") {
    return Err(Error::structural(format!(
      "window \"type\" has unknown value \"{kind}\""
    )));
  }
  if focused == Some(false) {
    return Err(Error::structural(
      "window \"focused\" is expected to be true when present",
    ));
  }
  if id.is_some_and(|i| i <= 0) {
    return Err(Error::structural(
      "window \"id\" is expected to be positive",
    ));
  }
  check_window_rect(rect)
}

/// `rect` encodes geometry as four `_`-separated integers (x0, y0, x1, y1)
/// with x0 ≤ x1 and y0 ≤ y1.
fn check_window_rect(rect: &str) -> Result<()> {
  let parts: Vec<&str> = rect.split('_').collect();
  let numbers: Option<Vec<i64>> = (parts.len() == 4)
    .then(|| parts.iter().map(|p| p.parse().ok()).collect())
    .flatten();
  let ok = numbers
    .is_some_and(|n| n[0] <= n[2] && n[1] <= n[3]);
  if !ok {
    return Err(Error::structural(format!(
      "window \"rect\" has unknown format: \"{rect}\""
    )));
  }
  Ok(())
}

/// The one lax schema: only `rect` is validated (four parts, all the
/// literal string `undefined`); other keys are tolerated, matching the
/// format's observed behavior for groups.
fn check_group_data(data: &Value) -> Result<()> {
  let rect = data
    .as_object()
    .and_then(|map| map.get("rect"))
    .and_then(Value::as_str)
    .ok_or_else(|| {
      Error::structural(
        "group \"data\" subobject is expected to carry a string \"rect\"",
      )
    })?;
  let parts: Vec<&str> = rect.split('_').collect();
  if parts.len() != 4 || !parts.iter().all(|p| *p == "undefined") {
    return Err(Error::structural(format!(
      "group \"rect\" has unknown format: \"{rect}\""
    )));
  }
  Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use rusqlite::params;
  use serde_json::{Value, json};
  use tempfile::TempDir;

  use super::*;

  const ROW_TS_MS: f64 = 1_650_000_000_000.0;

  fn init_sentinel() -> Value {
    json!({
      "type": 2000,
      "node": {
        "type": "session",
        "data": {"treeId": "1646246396", "nextDId": 1, "nonDumpedDId": 1},
      },
    })
  }

  fn close_sentinel(time_ms: f64) -> Value {
    json!({"type": 11111, "time": time_ms})
  }

  fn saved_tab(url: &str, title: &str) -> Value {
    json!([2001, {"data": {
      "audible": false,
      "autoDiscardable": true,
      "discarded": false,
      "mutedInfo": {"muted": false},
      "title": title,
      "url": url,
    }}, []])
  }

  fn live_tab(url: &str, title: &str) -> Value {
    json!([2001, {"type": "tab", "data": {
      "audible": false,
      "autoDiscardable": true,
      "discarded": false,
      "id": 42,
      "mutedInfo": {"muted": false},
      "status": "unloaded",
      "title": title,
      "url": url,
      "windowId": 7,
    }}, [0]])
  }

  fn live_win() -> Value {
    json!([2001, {"type": "win", "colapsed": false, "data": {
      "type": "normal",
      "rect": "10_20_900_700",
      "focused": true,
      "id": 7,
    }}, [1, 2]])
  }

  fn group() -> Value {
    json!([2001, {"type": "group", "data": {
      "rect": "undefined_undefined_undefined_undefined",
    }}, []])
  }

  fn ops_array(middle: Vec<Value>) -> Value {
    let mut ops = vec![init_sentinel()];
    ops.extend(middle);
    ops.push(close_sentinel(ROW_TS_MS - 2_000.0));
    Value::Array(ops)
  }

  fn fixture_db(dir: &TempDir, ops: &Value) -> std::path::PathBuf {
    fixture_db_with(dir, 1.0, ROW_TS_MS, None, ops)
  }

  fn fixture_db_with(
    dir: &TempDir,
    id: f64,
    ts_ms: f64,
    op_array_len: Option<f64>,
    ops: &Value,
  ) -> std::path::PathBuf {
    let path = dir.path().join("session.db");
    let declared = op_array_len
      .unwrap_or_else(|| ops.as_array().map_or(0, Vec::len) as f64);
    let conn = Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "CREATE TABLE current_session_snapshot (
           id REAL, timestamp REAL, op_array_len REAL, data TEXT
         )",
      )
      .unwrap();
    conn
      .execute(
        "INSERT INTO current_session_snapshot VALUES (?1, ?2, ?3, ?4)",
        params![id, ts_ms, declared, ops.to_string()],
      )
      .unwrap();
    path
  }

  fn structural_message(err: Error) -> String {
    match err {
      Error::Structural { message, .. } => message,
      other => panic!("expected structural error, got: {other}"),
    }
  }

  #[test]
  fn extracts_tab_entries_only() {
    let dir = tempfile::tempdir().unwrap();
    let ops = ops_array(vec![
      live_win(),
      live_tab("https://a.example", "A"),
      saved_tab("https://b.example", "B"),
      group(),
    ]);
    let capture = load(&fixture_db(&dir, &ops)).unwrap();

    let urls: Vec<&str> =
      capture.entries.iter().map(|e| e.url.as_str()).collect();
    assert_eq!(urls, ["https://a.example", "https://b.example"]);
  }

  #[test]
  fn duplicate_tabs_collapse_in_the_capture() {
    let dir = tempfile::tempdir().unwrap();
    let ops = ops_array(vec![
      saved_tab("https://a.example", "A"),
      saved_tab("https://a.example", "A"),
    ]);
    let capture = load(&fixture_db(&dir, &ops)).unwrap();
    assert_eq!(capture.entries.len(), 1);
  }

  #[test]
  fn declared_length_mismatch_fails_before_entry_validation() {
    let dir = tempfile::tempdir().unwrap();
    // A bogus middle entry that would fail per-entry validation; the
    // length mismatch must win.
    let ops = ops_array(vec![json!(["bogus"])]);
    let path = fixture_db_with(&dir, 1.0, ROW_TS_MS, Some(99.0), &ops);

    let message = structural_message(load(&path).unwrap_err());
    assert!(message.contains("op_array_len"), "message was: {message}");
  }

  #[test]
  fn column_type_mismatches_are_batched_into_one_message() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");
    let conn = Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "CREATE TABLE current_session_snapshot (
           id REAL, timestamp TEXT, op_array_len REAL, data REAL
         )",
      )
      .unwrap();
    conn
      .execute(
        "INSERT INTO current_session_snapshot VALUES (1.0, 'late', 0.0, 2.5)",
        [],
      )
      .unwrap();

    let message = structural_message(load(&path).unwrap_err());
    assert!(message.contains("current_session_snapshot.timestamp"));
    assert!(message.contains("current_session_snapshot.data"));
    assert!(message.contains("; "), "message was: {message}");
  }

  #[test]
  fn zero_rows_is_a_structural_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session.db");
    let conn = Connection::open(&path).unwrap();
    conn
      .execute_batch(
        "CREATE TABLE current_session_snapshot (
           id REAL, timestamp REAL, op_array_len REAL, data TEXT
         )",
      )
      .unwrap();
    drop(conn);

    let message = structural_message(load(&path).unwrap_err());
    assert!(message.contains("0 rows"));
  }

  #[test]
  fn surplus_rows_are_a_structural_error() {
    let dir = tempfile::tempdir().unwrap();
    let ops = ops_array(vec![]);
    let path = fixture_db(&dir, &ops);
    let conn = Connection::open(&path).unwrap();
    conn
      .execute(
        "INSERT INTO current_session_snapshot VALUES (1.0, ?1, 2.0, '[]')",
        params![ROW_TS_MS],
      )
      .unwrap();
    drop(conn);

    let message = structural_message(load(&path).unwrap_err());
    assert!(message.contains("more than 1 row"));
  }

  #[test]
  fn snapshot_id_other_than_one_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ops = ops_array(vec![]);
    let path = fixture_db_with(&dir, 3.0, ROW_TS_MS, None, &ops);
    let message = structural_message(load(&path).unwrap_err());
    assert!(message.contains("== 1.0"));
  }

  #[test]
  fn unknown_discriminator_reports_one_based_entry_index() {
    let dir = tempfile::tempdir().unwrap();
    let ops = ops_array(vec![
      saved_tab("https://a.example", "A"),
      json!([2001, {"type": "portal", "data": {}}, []]),
    ]);
    let message =
      structural_message(load(&fixture_db(&dir, &ops)).unwrap_err());
    assert!(
      message.contains("stopped at first failed entry 2"),
      "message was: {message}"
    );
  }

  #[test]
  fn close_time_not_strictly_before_row_timestamp_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ops = Value::Array(vec![init_sentinel(), close_sentinel(ROW_TS_MS)]);
    let message =
      structural_message(load(&fixture_db(&dir, &ops)).unwrap_err());
    assert!(message.contains("weird relation"), "message was: {message}");
  }

  #[test]
  fn close_time_outside_ten_second_window_fails() {
    let dir = tempfile::tempdir().unwrap();
    let ops =
      Value::Array(vec![init_sentinel(), close_sentinel(ROW_TS_MS - 11_000.0)]);
    load(&fixture_db(&dir, &ops)).unwrap_err();
  }

  #[test]
  fn malformed_init_sentinel_fails_precheck() {
    let dir = tempfile::tempdir().unwrap();
    let mut init = init_sentinel();
    init["node"]["data"]["nextDId"] = json!(2);
    let ops = Value::Array(vec![init, close_sentinel(ROW_TS_MS - 2_000.0)]);
    let message =
      structural_message(load(&fixture_db(&dir, &ops)).unwrap_err());
    assert!(message.contains("first element"), "message was: {message}");
  }

  #[test]
  fn muted_without_user_reason_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut tab = saved_tab("https://a.example", "A");
    tab[1]["data"]["mutedInfo"] = json!({"muted": true});
    let ops = ops_array(vec![tab]);
    load(&fixture_db(&dir, &ops)).unwrap_err();
  }

  #[test]
  fn live_tab_rejects_saved_only_field() {
    let dir = tempfile::tempdir().unwrap();
    let mut tab = live_tab("https://a.example", "A");
    tab[1]["data"]["wasSavedOnLastWinSave"] = json!(true);
    let ops = ops_array(vec![tab]);
    load(&fixture_db(&dir, &ops)).unwrap_err();
  }

  #[test]
  fn window_rect_with_inverted_corners_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut win = live_win();
    win[1]["data"]["rect"] = json!("900_20_10_700");
    let ops = ops_array(vec![win]);
    load(&fixture_db(&dir, &ops)).unwrap_err();
  }

  #[test]
  fn group_tolerates_extra_data_keys() {
    let dir = tempfile::tempdir().unwrap();
    let mut grp = group();
    grp[1]["data"]["somethingNew"] = json!(1);
    let ops = ops_array(vec![grp]);
    load(&fixture_db(&dir, &ops)).unwrap();
  }

  #[test]
  fn marks_with_nonempty_relicons_fails() {
    let dir = tempfile::tempdir().unwrap();
    let mut tab = live_tab("https://a.example", "A");
    tab[1]["marks"] = json!({"relicons": ["x"]});
    let ops = ops_array(vec![tab]);
    load(&fixture_db(&dir, &ops)).unwrap_err();
  }

  #[test]
  fn marks_with_overrides_passes() {
    let dir = tempfile::tempdir().unwrap();
    let mut tab = live_tab("https://a.example", "A");
    tab[1]["marks"] =
      json!({"relicons": [], "customTitle": "Pinned", "customFavicon": "f"});
    let ops = ops_array(vec![tab]);
    load(&fixture_db(&dir, &ops)).unwrap();
  }

  #[test]
  fn missing_file_is_a_file_access_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = load(&dir.path().join("absent.db")).unwrap_err();
    assert!(matches!(err, Error::FileAccess { .. }));
  }

  #[test]
  fn non_database_file_is_a_database_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-a-db");
    std::fs::write(&path, "plain text, definitely not sqlite").unwrap();
    let err = load(&path).unwrap_err();
    assert!(matches!(err, Error::Database { .. }));
  }
}
