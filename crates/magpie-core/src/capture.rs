//! The canonical record — the format-neutral result of a successful load.
//!
//! Every loader produces a [`Capture`]; the storage engine is its only
//! consumer. Once built, a capture is never mutated.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

/// A single extracted (URL, title) pair.
///
/// Equality and ordering are by exact pair equality; that is also the
/// deduplication key used by the storage engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
  pub url:   String,
  pub title: String,
}

/// The result of loading one input source.
#[derive(Debug, Clone)]
pub struct Capture {
  /// When loading completed. Always the wall clock at construction time,
  /// never a timestamp copied from the source.
  pub captured_at: DateTime<Utc>,
  /// Unique (URL, title) pairs; insertion order is irrelevant.
  pub entries:     BTreeSet<Entry>,
}

impl Capture {
  /// Build a capture from extracted pairs, deduplicating them once.
  pub fn from_pairs<I>(pairs: I) -> Self
  where
    I: IntoIterator<Item = (String, String)>,
  {
    let entries = pairs
      .into_iter()
      .map(|(url, title)| Entry { url, title })
      .collect();
    Self {
      captured_at: Utc::now(),
      entries,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn from_pairs_deduplicates_exact_pairs() {
    let capture = Capture::from_pairs(vec![
      ("https://a.example".to_string(), "A".to_string()),
      ("https://b.example".to_string(), "B".to_string()),
      ("https://a.example".to_string(), "A".to_string()),
    ]);
    assert_eq!(capture.entries.len(), 2);
  }

  #[test]
  fn same_url_with_different_titles_stays_distinct() {
    let capture = Capture::from_pairs(vec![
      ("https://a.example".to_string(), "A".to_string()),
      ("https://a.example".to_string(), "A2".to_string()),
    ]);
    assert_eq!(capture.entries.len(), 2);
  }
}
