//! Typed override directives.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::coordinate::{ArtifactKey, Coordinate, CoordinateError};
use crate::placeholder::PlaceholderError;

/// Errors that can occur while loading or interpreting override files.
#[derive(Debug, Error)]
pub enum OverrideError {
  #[error("failed to read override file {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("failed to read override entry {entry}: {source}")]
  Archive {
    entry: String,
    #[source]
    source: ArchiveError,
  },

  #[error("failed to resolve override '{key}': {source}")]
  Placeholder {
    key: String,
    #[source]
    source: PlaceholderError,
  },

  #[error("invalid value for override '{key}': {source}")]
  Coordinate {
    key: String,
    #[source]
    source: CoordinateError,
  },
}

/// What a directive asks the planner to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "target", rename_all = "kebab-case")]
pub enum DirectiveKind {
  /// Add a dependency, replacing any existing one with the same key.
  AddDependency(Coordinate),
  /// Remove a dependency and exclude it from every transitive closure.
  ExcludeDependency(ArtifactKey),
  /// Add a version-constraint import.
  PinConstraint(Coordinate),
  /// Pin a version directly.
  PinManaged(Coordinate),
}

impl fmt::Display for DirectiveKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      DirectiveKind::AddDependency(c) => write!(f, "add {c}"),
      DirectiveKind::ExcludeDependency(k) => write!(f, "exclude {k}"),
      DirectiveKind::PinConstraint(c) => write!(f, "pin-constraint {c}"),
      DirectiveKind::PinManaged(c) => write!(f, "pin-managed {c}"),
    }
  }
}

/// One override entry, tagged with the profile that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverrideDirective {
  /// The suffix after the namespace, e.g. `core` in `dependencies.core`.
  pub name: String,
  #[serde(flatten)]
  pub kind: DirectiveKind,
  pub profile: String,
}
