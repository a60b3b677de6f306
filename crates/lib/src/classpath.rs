//! Classpath assembly.
//!
//! The order is fixed: the root archive, then the root archive's embedded
//! class directory, then every resolved artifact in resolver order.

use std::collections::HashSet;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::archive::Archive;
use crate::consts::{NESTED_CLASSES_PREFIX, NESTED_SEPARATOR};
use crate::resolve::ResolvedSet;

#[derive(Debug, Error)]
pub enum ClasspathError {
  #[error("cannot render classpath: {0}")]
  Join(#[from] std::env::JoinPathsError),
}

/// One location on a classpath.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ClasspathEntry {
  /// A zip archive, searched from its root.
  Archive { path: PathBuf },
  /// A directory tree.
  Directory { path: PathBuf },
  /// A directory inside a zip archive.
  Nested { archive: PathBuf, prefix: String },
}

impl ClasspathEntry {
  /// The file-system location backing this entry.
  pub fn location(&self) -> &Path {
    match self {
      ClasspathEntry::Archive { path } | ClasspathEntry::Directory { path } => path,
      ClasspathEntry::Nested { archive, .. } => archive,
    }
  }

  fn for_path(path: PathBuf) -> Self {
    if path.is_dir() {
      ClasspathEntry::Directory { path }
    } else {
      ClasspathEntry::Archive { path }
    }
  }
}

impl fmt::Display for ClasspathEntry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ClasspathEntry::Archive { path } | ClasspathEntry::Directory { path } => write!(f, "{}", path.display()),
      ClasspathEntry::Nested { archive, prefix } => write!(f, "{}{NESTED_SEPARATOR}{prefix}", archive.display()),
    }
  }
}

/// An ordered, duplicate-free list of classpath locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Classpath {
  entries: Vec<ClasspathEntry>,
}

impl Classpath {
  pub fn entries(&self) -> &[ClasspathEntry] {
    &self.entries
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  /// Distinct file-system locations, in order.
  ///
  /// A nested entry contributes its outer archive, so the root archive may
  /// appear once for both itself and its classes.
  pub fn locations(&self) -> Vec<PathBuf> {
    let mut seen = HashSet::new();
    self
      .entries
      .iter()
      .map(ClasspathEntry::location)
      .filter(|p| seen.insert(p.to_path_buf()))
      .map(Path::to_path_buf)
      .collect()
  }

  /// The locations joined with the platform path separator.
  pub fn to_path_string(&self) -> Result<OsString, ClasspathError> {
    Ok(std::env::join_paths(self.locations())?)
  }

  fn push(&mut self, seen: &mut HashSet<ClasspathEntry>, entry: ClasspathEntry) {
    if seen.insert(entry.clone()) {
      self.entries.push(entry);
    } else {
      debug!(entry = %entry, "dropping duplicate classpath entry");
    }
  }
}

impl<'a> IntoIterator for &'a Classpath {
  type Item = &'a ClasspathEntry;
  type IntoIter = std::slice::Iter<'a, ClasspathEntry>;

  fn into_iter(self) -> Self::IntoIter {
    self.entries.iter()
  }
}

/// Build the classpath for a root archive and its resolved artifacts.
///
/// Artifacts without a file are skipped. A file given as a nested
/// `outer.jar!/inner` path is replaced by the outer archive.
pub fn assemble(root: &Archive, resolved: &ResolvedSet) -> Classpath {
  let mut classpath = Classpath::default();
  let mut seen = HashSet::new();

  match root {
    Archive::Directory(dir) => {
      classpath.push(&mut seen, ClasspathEntry::Directory { path: dir.clone() });
      if root.has_nested_classes() {
        let classes = dir.join(NESTED_CLASSES_PREFIX.trim_end_matches('/'));
        classpath.push(&mut seen, ClasspathEntry::Directory { path: classes });
      }
    }
    Archive::Zip { path, .. } => {
      classpath.push(&mut seen, ClasspathEntry::Archive { path: path.clone() });
      if root.has_nested_classes() {
        classpath.push(
          &mut seen,
          ClasspathEntry::Nested {
            archive: path.clone(),
            prefix: NESTED_CLASSES_PREFIX.to_string(),
          },
        );
      }
    }
  }

  for artifact in resolved {
    let Some(file) = &artifact.file else {
      debug!(coordinate = %artifact.coordinate, "skipping artifact without a file");
      continue;
    };
    let file = outer_archive(file);
    if !file.exists() {
      warn!(coordinate = %artifact.coordinate, path = %file.display(), "skipping missing artifact file");
      continue;
    }
    classpath.push(&mut seen, ClasspathEntry::for_path(file));
  }

  debug!(entries = classpath.len(), "assembled classpath");
  classpath
}

/// `outer.jar!/inner/path` becomes `outer.jar`; other paths are unchanged.
pub fn outer_archive(path: &Path) -> PathBuf {
  let text = path.to_string_lossy();
  match text.find(NESTED_SEPARATOR) {
    Some(idx) => PathBuf::from(&text[..idx]),
    None => path.to_path_buf(),
  }
}
