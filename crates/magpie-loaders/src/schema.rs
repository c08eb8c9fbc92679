//! Shared structural-validation helpers.
//!
//! Each format instantiates the same pattern: parse strictly into a generic
//! [`serde_json::Value`], then deserialize each node into a closed
//! per-discriminator struct with `deny_unknown_fields` and run value
//! predicates afterwards. These are the pieces both loaders share.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// Parse `text` as strict JSON.
///
/// serde_json rejects the non-finite constants (`NaN`, `Infinity`) some
/// producers emit, which is exactly the strictness the formats require; the
/// error names the line and column of the first offending token.
pub(crate) fn parse_json_strict(text: &str) -> Result<Value> {
  serde_json::from_str(text).map_err(|err| {
    let message = format!(
      "input JSON is corrupted (failed at line {} column {})",
      err.line(),
      err.column()
    );
    Error::structural_with(message, err)
  })
}

/// Deserialize a generic node into a closed schema struct.
///
/// `what` names the node in the resulting structural error; the serde
/// message (missing field, unknown field, wrong type) is carried both in the
/// text and as the preserved cause.
pub(crate) fn from_value<T: DeserializeOwned>(
  value: Value,
  what: &str,
) -> Result<T> {
  serde_json::from_value(value).map_err(|err| {
    let message = format!("{what} has unknown format: {err}");
    Error::structural_with(message, err)
  })
}

/// Non-empty, ASCII digits only. Chrome encodes timestamps and ids this way.
pub(crate) fn is_digit_string(s: &str) -> bool {
  !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Exactly 32 hexadecimal characters; the format of the bookmark checksum.
pub(crate) fn is_hex_checksum(s: &str) -> bool {
  s.len() == 32 && s.bytes().all(|b| b.is_ascii_hexdigit())
}

/// A value convertible to a non-negative number: either a JSON number or a
/// numeric string.
pub(crate) fn as_non_negative_number(value: &Value) -> Option<f64> {
  let number = match value {
    Value::Number(n) => n.as_f64()?,
    Value::String(s) => s.trim().parse().ok()?,
    _ => return None,
  };
  (number >= 0.0).then_some(number)
}
