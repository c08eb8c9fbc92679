//! Input loaders for `magpie`.
//!
//! Each loader reads one on-disk format produced by a browser or a
//! tab-manager extension, validates it completely, and distills it into a
//! [`Capture`](magpie_core::capture::Capture) of deduplicated (url, title)
//! pairs. Validation is deliberately exhaustive: any field or value outside
//! the known shape of the format fails the whole load, so that a silent
//! format change upstream cannot slip wrong data into the store.

pub mod chrome;
pub mod error;
mod schema;
pub mod tabs_outliner;

use std::path::Path;

pub use error::{Error, Result};
use magpie_core::capture::Capture;

/// The known input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
  /// A Google Chrome `Bookmarks` JSON file.
  Chrome,
  /// A Tabs Outliner session-log SQLite database.
  TabsOutliner,
}

/// Load `path` as `source`, producing a capture of its (url, title) pairs.
pub fn load(source: Source, path: &Path) -> Result<Capture> {
  match source {
    Source::Chrome => chrome::load(path),
    Source::TabsOutliner => tabs_outliner::load(path),
  }
}
