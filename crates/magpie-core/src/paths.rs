//! Path resolution with distinct failure modes.
//!
//! Loaders and the storage engine need to tell a symlink cycle apart from a
//! plain missing path, which `std::fs::canonicalize` reports as different
//! [`std::io::ErrorKind`]s.

use std::{
  io,
  path::{Path, PathBuf},
};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
  #[error("loop detected while resolving path {path:?}")]
  Cycle {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("path not found: {0:?}")]
  NotFound(PathBuf),

  #[error("not a regular file: {0:?}")]
  NotAFile(PathBuf),

  #[error("could not resolve path {path:?}")]
  Io {
    path:   PathBuf,
    #[source]
    source: io::Error,
  },
}

pub type Result<T, E = PathError> = std::result::Result<T, E>;

/// Resolve `path` to an existing regular file.
///
/// Symlink cycles, missing paths, and non-file targets are reported as
/// distinct errors so that callers can attribute them precisely.
pub fn resolve_existing_file(path: &Path) -> Result<PathBuf> {
  let resolved = canonicalize_classified(path)?;
  if !resolved.is_file() {
    return Err(PathError::NotAFile(resolved));
  }
  Ok(resolved)
}

/// Resolve `path` leniently: the leaf may not exist yet, but its parent
/// directory must resolve. Used for output files that are about to be
/// created.
pub fn resolve_creatable(path: &Path) -> Result<PathBuf> {
  match canonicalize_classified(path) {
    Ok(resolved) => Ok(resolved),
    Err(PathError::NotFound(_)) => {
      let file_name = path
        .file_name()
        .ok_or_else(|| PathError::NotFound(path.to_path_buf()))?;
      let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
      };
      let parent = canonicalize_classified(&parent)?;
      Ok(parent.join(file_name))
    }
    Err(err) => Err(err),
  }
}

fn canonicalize_classified(path: &Path) -> Result<PathBuf> {
  std::fs::canonicalize(path).map_err(|source| match source.kind() {
    io::ErrorKind::FilesystemLoop => PathError::Cycle {
      path: path.to_path_buf(),
      source,
    },
    io::ErrorKind::NotFound => PathError::NotFound(path.to_path_buf()),
    _ => PathError::Io {
      path: path.to_path_buf(),
      source,
    },
  })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn existing_file_resolves() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("input.json");
    std::fs::write(&file, "{}").unwrap();

    let resolved = resolve_existing_file(&file).unwrap();
    assert!(resolved.is_file());
  }

  #[test]
  fn missing_path_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve_existing_file(&dir.path().join("absent")).unwrap_err();
    assert!(matches!(err, PathError::NotFound(_)));
  }

  #[test]
  fn directory_is_not_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = resolve_existing_file(dir.path()).unwrap_err();
    assert!(matches!(err, PathError::NotAFile(_)));
  }

  #[cfg(unix)]
  #[test]
  fn symlink_cycle_is_detected_distinctly() {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    std::os::unix::fs::symlink(&a, &b).unwrap();
    std::os::unix::fs::symlink(&b, &a).unwrap();

    let err = resolve_existing_file(&a).unwrap_err();
    assert!(matches!(err, PathError::Cycle { .. }));
  }

  #[test]
  fn creatable_resolves_nonexistent_leaf() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("new.db");

    let resolved = resolve_creatable(&target).unwrap();
    assert_eq!(resolved.file_name().unwrap(), "new.db");
    assert!(!resolved.exists());
  }

  #[test]
  fn creatable_fails_on_missing_parent() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("no-such-dir").join("new.db");
    let err = resolve_creatable(&target).unwrap_err();
    assert!(matches!(err, PathError::NotFound(_)));
  }
}
