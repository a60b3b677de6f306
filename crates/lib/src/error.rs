//! Error taxonomy.
//!
//! Every failure surfaced by the launcher falls into one of a few classes
//! that decide how callers react:
//!
//! | kind                  | handling                                         |
//! |-----------------------|--------------------------------------------------|
//! | `ManifestUnreadable`  | fatal                                            |
//! | `ResolutionFailed`    | fatal unless cached artifacts satisfy the request |
//! | `AmbiguousEntryPoint` | fatal                                            |
//! | `LaunchFailed`        | recorded as instance state `failed`              |
//! | `CleanupFailed`       | recorded as instance state `error`               |

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::archive::ArchiveError;
use crate::manifest::ManifestError;
use crate::overrides::OverrideError;
use crate::resolve::{PlanError, ResolveError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
  ManifestUnreadable,
  ResolutionFailed,
  AmbiguousEntryPoint,
  LaunchFailed,
  CleanupFailed,
}

impl ErrorKind {
  /// Whether the error ends the operation, as opposed to being recorded on
  /// an instance.
  pub fn is_fatal(self) -> bool {
    matches!(
      self,
      ErrorKind::ManifestUnreadable | ErrorKind::ResolutionFailed | ErrorKind::AmbiguousEntryPoint
    )
  }
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      ErrorKind::ManifestUnreadable => "manifest unreadable",
      ErrorKind::ResolutionFailed => "resolution failed",
      ErrorKind::AmbiguousEntryPoint => "ambiguous entry point",
      ErrorKind::LaunchFailed => "launch failed",
      ErrorKind::CleanupFailed => "cleanup failed",
    };
    f.write_str(s)
  }
}

/// Errors from preparing an archive for launch.
#[derive(Debug, Error)]
pub enum LaunchError {
  #[error(transparent)]
  Archive(#[from] ArchiveError),

  #[error(transparent)]
  Manifest(#[from] ManifestError),

  #[error(transparent)]
  Override(#[from] OverrideError),

  #[error(transparent)]
  Resolve(#[from] ResolveError),
}

impl From<PlanError> for LaunchError {
  fn from(e: PlanError) -> Self {
    match e {
      PlanError::Override(e) => LaunchError::Override(e),
      PlanError::Resolve(e) => LaunchError::Resolve(e),
    }
  }
}

impl LaunchError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      LaunchError::Archive(_) | LaunchError::Manifest(_) | LaunchError::Override(_) => ErrorKind::ManifestUnreadable,
      LaunchError::Resolve(_) => ErrorKind::ResolutionFailed,
    }
  }
}
