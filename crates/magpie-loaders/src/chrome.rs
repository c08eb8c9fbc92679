//! Loader for Google Chrome `Bookmarks` files.
//!
//! Pipeline:
//!   path
//!     └─ read_input_file()     → String
//!          └─ parse_json_strict()  → Value
//!               └─ precheck_document() → &roots
//!                    └─ flatten_root()     → (url, name) pairs → Capture
//!
//! The bookmark forest is traversed with an explicit work stack carrying the
//! node address, so pathological nesting cannot exhaust the call stack while
//! the first failing node is still reported with its dotted path.

use std::path::Path;

use magpie_core::{capture::Capture, paths};
use serde::Deserialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  error::{Error, Result},
  schema,
};

/// The three well-known roots, in validation order.
const ROOT_KEYS: [&str; 3] = ["bookmark_bar", "other", "synced"];

// ─── Public API ──────────────────────────────────────────────────────────────

/// Load a Chrome bookmarks JSON document from `path` into a [`Capture`].
///
/// Every `url` leaf contributes its (url, name) pair; `folder` nodes
/// contribute nothing directly. Validation stops at the first failing node.
pub fn load(path: &Path) -> Result<Capture> {
  let text = read_input_file(path)?;
  let document = schema::parse_json_strict(&text)?;
  let roots = precheck_document(&document)?;

  let mut pairs = Vec::new();
  for key in ROOT_KEYS {
    // Presence is guaranteed by the precheck.
    pairs.extend(flatten_root(key, roots[key].clone())?);
  }
  Ok(Capture::from_pairs(pairs))
}

// ─── File access ─────────────────────────────────────────────────────────────

fn read_input_file(path: &Path) -> Result<String> {
  let resolved = paths::resolve_existing_file(path)?;
  let bytes = std::fs::read(&resolved).map_err(|err| {
    Error::file_access_with(
      format!("an error occurred while reading the input file {resolved:?}"),
      err,
    )
  })?;
  String::from_utf8(bytes).map_err(|err| {
    Error::file_access_with(
      format!("encoding error occurred in the input file {resolved:?}"),
      err,
    )
  })
}

// ─── Top-level precheck ──────────────────────────────────────────────────────

/// Check `version`, `checksum`, and the `roots` key set; returns the roots
/// mapping. Top-level keys other than those three are tolerated (Chrome adds
/// e.g. `sync_metadata` on some channels).
fn precheck_document(document: &Value) -> Result<&Map<String, Value>> {
  let top = document.as_object().ok_or_else(|| {
    Error::structural("top-level JSON element is expected to be a mapping")
  })?;

  match top.get("version") {
    Some(Value::Number(n)) if n.as_i64() == Some(1) => {}
    Some(other) => {
      return Err(Error::structural(format!(
        "only \"version\" == 1 is known, {other} encountered"
      )));
    }
    None => {
      return Err(Error::structural(
        "input data is missing the \"version\" element",
      ));
    }
  }

  match top.get("checksum") {
    Some(Value::String(s)) if schema::is_hex_checksum(s) => {}
    Some(_) => {
      return Err(Error::structural("\"checksum\" has unknown format"));
    }
    None => {
      return Err(Error::structural(
        "input data is missing the \"checksum\" element",
      ));
    }
  }

  let roots = match top.get("roots") {
    Some(Value::Object(map)) => map,
    Some(other) => {
      return Err(Error::structural(format!(
        "the \"roots\" element is expected to be a mapping, {} encountered",
        value_kind(other)
      )));
    }
    None => {
      return Err(Error::structural(
        "input data is missing the \"roots\" element",
      ));
    }
  };

  for key in ROOT_KEYS {
    if !roots.contains_key(key) {
      return Err(Error::structural(format!(
        "the \"roots\" element is missing the \"{key}\" root"
      )));
    }
  }
  for key in roots.keys() {
    if !ROOT_KEYS.contains(&key.as_str()) {
      return Err(Error::structural(format!(
        "the \"roots\" element has an unrecognized root \"{key}\""
      )));
    }
  }

  Ok(roots)
}

fn value_kind(value: &Value) -> &'static str {
  match value {
    Value::Null => "null",
    Value::Bool(_) => "a boolean",
    Value::Number(_) => "a number",
    Value::String(_) => "a string",
    Value::Array(_) => "an array",
    Value::Object(_) => "a mapping",
  }
}

// ─── Node schemas ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct UrlNode {
  date_added:    String,
  date_modified: Option<String>,
  guid:          String,
  id:            String,
  name:          String,
  #[serde(rename = "type")]
  _type:         String,
  url:           String,
  // checked only by deserialization, never read afterwards
  #[allow(dead_code)]
  meta_info:     Option<MetaInfo>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FolderNode {
  date_added:    String,
  date_modified: Option<String>,
  guid:          String,
  id:            String,
  name:          String,
  #[serde(rename = "type")]
  _type:         String,
  children:      Vec<Value>,
}

/// The single recognized `meta_info` key.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
#[allow(dead_code)]
struct MetaInfo {
  last_visited_desktop: String,
}

// ─── Traversal ───────────────────────────────────────────────────────────────

enum Flattened {
  Url { url: String, name: String },
  Folder { children: Vec<Value> },
}

/// Validate and flatten one root's subtree in document order.
///
/// The stack holds (node, per-level child indices); an empty index list
/// marks the root itself. Children are pushed in reverse so the first
/// failure found matches a depth-first left-to-right walk.
fn flatten_root(root_key: &str, root: Value) -> Result<Vec<(String, String)>> {
  let mut pairs = Vec::new();
  let mut stack: Vec<(Value, Vec<usize>)> = vec![(root, Vec::new())];

  while let Some((node, address)) = stack.pop() {
    let is_root = address.is_empty();
    match validate_node(node, is_root) {
      Ok(Flattened::Url { url, name }) => pairs.push((url, name)),
      Ok(Flattened::Folder { children }) => {
        for (index, child) in children.into_iter().enumerate().rev() {
          let mut child_address = address.clone();
          child_address.push(index);
          stack.push((child, child_address));
        }
      }
      Err(cause) => {
        return Err(Error::Structural {
          message: format!(
            "input data has unexpected format (stopped at first failed node \
             {})",
            node_address(root_key, &address)
          ),
          source:  Some(Box::new(cause)),
        });
      }
    }
  }
  Ok(pairs)
}

/// `other.2.0` for the first child of the third child of `other`; a failing
/// root is addressed by its key alone.
fn node_address(root_key: &str, indices: &[usize]) -> String {
  if indices.is_empty() {
    return root_key.to_string();
  }
  let tail: Vec<String> = indices.iter().map(usize::to_string).collect();
  format!("{root_key}.{}", tail.join("."))
}

fn validate_node(node: Value, is_root: bool) -> Result<Flattened> {
  let kind = node
    .get("type")
    .and_then(Value::as_str)
    .ok_or_else(|| {
      Error::structural("bookmark node is missing a string \"type\"")
    })?
    .to_owned();

  match kind.as_str() {
    "url" => {
      let url_node: UrlNode = schema::from_value(node, "bookmark url node")?;
      check_common_fields(
        &url_node.date_added,
        url_node.date_modified.as_deref(),
        &url_node.guid,
        &url_node.id,
        is_root,
      )?;
      Ok(Flattened::Url {
        url:  url_node.url,
        name: url_node.name,
      })
    }
    "folder" => {
      let folder: FolderNode =
        schema::from_value(node, "bookmark folder node")?;
      check_common_fields(
        &folder.date_added,
        folder.date_modified.as_deref(),
        &folder.guid,
        &folder.id,
        is_root,
      )?;
      Ok(Flattened::Folder {
        children: folder.children,
      })
    }
    other => Err(Error::structural(format!(
      "bookmark node has unrecognized type \"{other}\""
    ))),
  }
}

fn check_common_fields(
  date_added: &str,
  date_modified: Option<&str>,
  guid: &str,
  id: &str,
  is_root: bool,
) -> Result<()> {
  if !schema::is_digit_string(date_added) {
    return Err(Error::structural(
      "\"date_added\" is expected to be a digits-only string",
    ));
  }
  if let Some(modified) = date_modified
    && !schema::is_digit_string(modified)
  {
    return Err(Error::structural(
      "\"date_modified\" is expected to be a digits-only string",
    ));
  }
  if !schema::is_digit_string(id) {
    return Err(Error::structural(
      "\"id\" is expected to be a digits-only string",
    ));
  }
  check_guid(guid, is_root)
}

/// Root nodes carry version-5 GUIDs, non-root nodes version-4 — a declared
/// invariant of the format, both RFC 4122 variant in canonical hyphenated
/// lowercase form.
fn check_guid(guid: &str, is_root: bool) -> Result<()> {
  let expected_version = if is_root { 5 } else { 4 };
  let parsed = guid_canonical_shape(guid)
    .then(|| Uuid::parse_str(guid).ok())
    .flatten();
  let ok = parsed.is_some_and(|u| {
    u.get_variant() == uuid::Variant::RFC4122
      && u.get_version_num() == expected_version
  });
  if !ok {
    return Err(Error::structural(format!(
      "\"guid\" is expected to be a version-{expected_version} RFC 4122 UUID \
       in canonical form"
    )));
  }
  Ok(())
}

/// Hyphenated lowercase hex only; [`Uuid::parse_str`] alone would also
/// accept braced, unhyphenated, and uppercase forms the format never emits.
fn guid_canonical_shape(s: &str) -> bool {
  let bytes = s.as_bytes();
  bytes.len() == 36
    && bytes.iter().enumerate().all(|(i, &b)| match i {
      8 | 13 | 18 | 23 => b == b'-',
      _ => matches!(b, b'0'..=b'9' | b'a'..=b'f'),
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
