//! Error type for `magpie-store-sqlite`.
//!
//! Every failure is tagged with the pipeline [`Stage`] it occurred in, so
//! the caller can tell a failure before any write (harmless) from one
//! during schema construction (store file may be corrupted).

use magpie_core::paths::PathError;
use thiserror::Error;

/// The store pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  /// Resolving the path and opening the connection.
  Connecting,
  /// Checking the headers of an existing store file.
  Verifying,
  /// Creating the schema in a fresh store file.
  Building,
  /// Writing captured entries.
  Filling,
  /// Closing the connection.
  Disconnecting,
}

impl Stage {
  /// Whether a failure in this stage can leave a partially-built schema
  /// behind. Savepoints roll back row writes, but a fresh file that dies
  /// mid-DDL is not worth keeping.
  pub fn failure_may_corrupt(self) -> bool { matches!(self, Stage::Building) }
}

impl std::fmt::Display for Stage {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Stage::Connecting => "connecting",
      Stage::Verifying => "verifying",
      Stage::Building => "building",
      Stage::Filling => "filling",
      Stage::Disconnecting => "disconnecting",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// The output path could not be resolved or created at the OS level.
  #[error("{message}")]
  FileAccess {
    message: String,
    #[source]
    source:  Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
  },

  /// The SQLite engine failed during `stage`.
  #[error("database failure while {stage}")]
  Database {
    stage:  Stage,
    #[source]
    source: rusqlite::Error,
  },

  /// The file exists but its headers do not identify a store this version
  /// can write to.
  #[error("{message}")]
  Header { stage: Stage, message: String },

  /// The run was stopped on request at the boundary of `stage`, or rolled
  /// back during it.
  #[error("interrupted while {stage}")]
  Interrupted { stage: Stage },
}

impl Error {
  /// The stage the failure is attributed to, where one applies.
  pub fn stage(&self) -> Option<Stage> {
    match self {
      Error::FileAccess { .. } => None,
      Error::Database { stage, .. }
      | Error::Header { stage, .. }
      | Error::Interrupted { stage } => Some(*stage),
    }
  }

  pub(crate) fn database(stage: Stage) -> impl FnOnce(rusqlite::Error) -> Self {
    move |source| Self::Database { stage, source }
  }

  pub(crate) fn header(stage: Stage, message: impl Into<String>) -> Self {
    Self::Header {
      stage,
      message: message.into(),
    }
  }
}

impl From<PathError> for Error {
  fn from(err: PathError) -> Self {
    Self::FileAccess {
      message: format!("cannot locate the output path: {err}"),
      source:  Some(Box::new(err)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
