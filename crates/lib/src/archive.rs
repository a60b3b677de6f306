//! Access to application archives.
//!
//! A root archive is either a zip file or an exploded directory with the
//! same layout:
//!
//! - `META-INF/thin/manifest.toml` - the package manifest
//! - `META-INF/<name>[-<profile>].properties` - override-layer files
//! - `classes/` - the application's own classes

use std::collections::BTreeSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::consts::{MANIFEST_PATH, NESTED_CLASSES_PREFIX};
use crate::manifest::{Manifest, ManifestError};

/// Errors that can occur while reading an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
  #[error("archive not found: {0}")]
  NotFound(PathBuf),

  #[error("failed to read archive {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid zip archive {path}: {source}")]
  Zip {
    path: PathBuf,
    #[source]
    source: zip::result::ZipError,
  },
}

/// An opened application archive.
#[derive(Debug, Clone)]
pub enum Archive {
  /// An exploded archive on disk.
  Directory(PathBuf),
  /// A zip file together with the names of its entries.
  Zip { path: PathBuf, entries: BTreeSet<String> },
}

impl Archive {
  /// Open an archive, indexing zip entries up front.
  pub fn open(path: &Path) -> Result<Self, ArchiveError> {
    if path.is_dir() {
      return Ok(Archive::Directory(path.to_path_buf()));
    }
    if !path.is_file() {
      return Err(ArchiveError::NotFound(path.to_path_buf()));
    }

    let zip = open_zip(path)?;
    let entries = zip.file_names().map(str::to_string).collect();
    Ok(Archive::Zip {
      path: path.to_path_buf(),
      entries,
    })
  }

  pub fn path(&self) -> &Path {
    match self {
      Archive::Directory(path) => path,
      Archive::Zip { path, .. } => path,
    }
  }

  /// Returns true if the archive holds a file entry with this name.
  pub fn has_entry(&self, name: &str) -> bool {
    match self {
      Archive::Directory(root) => root.join(name).is_file(),
      Archive::Zip { entries, .. } => entries.contains(name),
    }
  }

  /// Read an entry's bytes, or `None` if it does not exist.
  pub fn read_entry(&self, name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
    match self {
      Archive::Directory(root) => {
        let path = root.join(name);
        if !path.is_file() {
          return Ok(None);
        }
        fs::read(&path)
          .map(Some)
          .map_err(|source| ArchiveError::Io { path, source })
      }
      Archive::Zip { path, entries } => {
        if !entries.contains(name) {
          return Ok(None);
        }
        read_zip_entry(path, name)
      }
    }
  }

  /// Read an entry as UTF-8 text.
  pub fn read_entry_string(&self, name: &str) -> Result<Option<String>, ArchiveError> {
    Ok(
      self
        .read_entry(name)?
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
    )
  }

  /// Returns true if the archive embeds classes under the nested prefix.
  pub fn has_nested_classes(&self) -> bool {
    match self {
      Archive::Directory(root) => root.join(NESTED_CLASSES_PREFIX).is_dir(),
      Archive::Zip { entries, .. } => entries.iter().any(|name| name.starts_with(NESTED_CLASSES_PREFIX)),
    }
  }

  /// Load the package manifest embedded in the archive.
  pub fn manifest(&self) -> Result<Manifest, ManifestError> {
    let content = self
      .read_entry_string(MANIFEST_PATH)
      .map_err(|e| ManifestError::Read {
        path: self.path().join(MANIFEST_PATH),
        source: std::io::Error::other(e),
      })?
      .ok_or_else(|| ManifestError::Missing(self.path().to_path_buf()))?;
    Manifest::from_toml_str(&content)
  }
}

fn open_zip(path: &Path) -> Result<zip::ZipArchive<fs::File>, ArchiveError> {
  let file = fs::File::open(path).map_err(|source| ArchiveError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  zip::ZipArchive::new(file).map_err(|source| ArchiveError::Zip {
    path: path.to_path_buf(),
    source,
  })
}

/// Read a single entry from a zip file on disk.
pub(crate) fn read_zip_entry(path: &Path, name: &str) -> Result<Option<Vec<u8>>, ArchiveError> {
  let mut zip = open_zip(path)?;
  let mut entry = match zip.by_name(name) {
    Ok(entry) => entry,
    Err(zip::result::ZipError::FileNotFound) => return Ok(None),
    Err(source) => {
      return Err(ArchiveError::Zip {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  let mut bytes = Vec::with_capacity(entry.size() as usize);
  entry.read_to_end(&mut bytes).map_err(|source| ArchiveError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  Ok(Some(bytes))
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use super::*;
  use crate::util::testutil::{write_file, write_zip};

  const MANIFEST: &str = "coordinate = \"com.example:app:1.0\"\n";

  #[test]
  fn zip_archive_entries() {
    let temp = TempDir::new().unwrap();
    let path = write_zip(
      &temp.path().join("app.jar"),
      &[
        ("META-INF/thin/manifest.toml", MANIFEST),
        ("classes/", ""),
        ("classes/com/example/App.class", "bytes"),
      ],
    );

    let archive = Archive::open(&path).unwrap();
    assert!(archive.has_entry("classes/com/example/App.class"));
    assert!(!archive.has_entry("classes/missing.class"));
    assert!(archive.has_nested_classes());
    assert_eq!(
      archive.read_entry_string("classes/com/example/App.class").unwrap().as_deref(),
      Some("bytes")
    );
    assert_eq!(archive.manifest().unwrap().coordinate, "com.example:app:1.0");
  }

  #[test]
  fn exploded_archive_entries() {
    let temp = TempDir::new().unwrap();
    write_file(temp.path(), "META-INF/thin/manifest.toml", MANIFEST);
    write_file(temp.path(), "classes/com/example/App.class", "bytes");

    let archive = Archive::open(temp.path()).unwrap();
    assert!(archive.has_entry("META-INF/thin/manifest.toml"));
    assert!(archive.has_nested_classes());
    assert!(archive.read_entry("nope").unwrap().is_none());
  }

  #[test]
  fn missing_manifest_is_reported() {
    let temp = TempDir::new().unwrap();
    let path = write_zip(&temp.path().join("empty.jar"), &[("README", "hi")]);

    let err = Archive::open(&path).unwrap().manifest().unwrap_err();
    assert!(matches!(err, ManifestError::Missing(_)));
  }

  #[test]
  fn missing_archive_is_not_found() {
    let temp = TempDir::new().unwrap();
    assert!(matches!(
      Archive::open(&temp.path().join("nope.jar")),
      Err(ArchiveError::NotFound(_))
    ));
  }
}
