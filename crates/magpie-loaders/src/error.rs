//! Error taxonomy shared by both loaders.
//!
//! Three kinds, independently distinguishable by the caller: file access
//! (OS-level), database access (engine-level), and structural format
//! (content-level). Causes are always preserved, never discarded.

use magpie_core::paths::PathError;
use thiserror::Error;

type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
  /// The input path could not be resolved or read at the OS level.
  #[error("{message}")]
  FileAccess {
    message: String,
    #[source]
    source:  Option<BoxedCause>,
  },

  /// The SQLite engine reported an operational or integrity failure not
  /// attributable to the content of the data.
  #[error("{message}")]
  Database {
    message: String,
    #[source]
    source:  rusqlite::Error,
  },

  /// Parsed content violates the expected schema, type, range, or
  /// cross-field consistency rule.
  #[error("{message}")]
  Structural {
    message: String,
    #[source]
    source:  Option<BoxedCause>,
  },
}

impl Error {
  pub(crate) fn file_access_with(
    message: impl Into<String>,
    source: impl Into<BoxedCause>,
  ) -> Self {
    Self::FileAccess {
      message: message.into(),
      source:  Some(source.into()),
    }
  }

  pub(crate) fn structural(message: impl Into<String>) -> Self {
    Self::Structural {
      message: message.into(),
      source:  None,
    }
  }

  pub(crate) fn structural_with(
    message: impl Into<String>,
    source: impl Into<BoxedCause>,
  ) -> Self {
    Self::Structural {
      message: message.into(),
      source:  Some(source.into()),
    }
  }

  pub(crate) fn database(
    message: impl Into<String>,
  ) -> impl FnOnce(rusqlite::Error) -> Self {
    let message = message.into();
    move |source| Self::Database { message, source }
  }
}

impl From<PathError> for Error {
  fn from(err: PathError) -> Self {
    Self::file_access_with(format!("cannot locate the input path: {err}"), err)
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
