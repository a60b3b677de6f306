//! Manifest types for thinlaunch.
//!
//! A manifest declares a package's coordinate, an optional parent, a property
//! table, direct dependencies, and version-constraint imports. It is the
//! declarative stand-in for the dependencies a thin archive does not bundle.
//!
//! # Structure
//!
//! Two layers of types live here:
//! - [`Manifest`]: the document exactly as written, with coordinates kept as
//!   raw strings because they may still contain `${...}` placeholders
//! - [`ResolvedManifest`]: the result of walking the parent chain, merging
//!   properties, substituting placeholders, and dropping non-runtime scopes
//!
//! # Format
//!
//! Manifests are TOML documents:
//!
//! ```toml
//! coordinate = "com.example:app:1.0.0"
//! parent = "com.example:parent:3"
//! imports = ["org.acme:acme-bom:${acme.version}"]
//!
//! [properties]
//! "acme.version" = "2.1"
//!
//! [[dependencies]]
//! coordinate = "org.acme:acme-core"
//! exclusions = ["org.legacy:*"]
//!
//! [launch]
//! main = "com.example.App"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coordinate::{ArtifactKey, Coordinate, CoordinateError};
use crate::placeholder::PlaceholderError;

/// Errors that can occur while reading or resolving a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
  /// Failed to read the manifest resource.
  #[error("failed to read manifest {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The manifest document is not valid TOML or has the wrong shape.
  #[error("failed to parse manifest: {0}")]
  Parse(#[from] toml::de::Error),

  /// The resource does not contain a manifest.
  #[error("no manifest found in {0}")]
  Missing(PathBuf),

  /// A placeholder in a manifest field could not be substituted.
  #[error("failed to resolve '{field}' in manifest {manifest}: {source}")]
  Placeholder {
    manifest: String,
    field: String,
    #[source]
    source: PlaceholderError,
  },

  /// A coordinate (after substitution) is malformed.
  #[error("invalid coordinate in manifest {manifest}: {source}")]
  Coordinate {
    manifest: String,
    #[source]
    source: CoordinateError,
  },
}

/// Dependency scope.
///
/// Only [`Scope::Compile`] and [`Scope::Runtime`] reach a runtime classpath.
/// [`Scope::Import`] marks a dependency that is really a constraint import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
  #[default]
  Compile,
  Runtime,
  Provided,
  Test,
  Import,
}

impl Scope {
  /// Returns true if dependencies in this scope belong on a runtime classpath.
  pub fn is_runtime(self) -> bool {
    matches!(self, Scope::Compile | Scope::Runtime)
  }
}

/// A dependency declaration as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
  /// Coordinate string; may contain placeholders.
  pub coordinate: String,
  #[serde(default)]
  pub scope: Scope,
  #[serde(default)]
  pub optional: bool,
  /// `group:name` keys (wildcards allowed) excluded from this dependency's
  /// transitive closure.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub exclusions: Vec<String>,
}

/// Launch metadata for an application archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LaunchSpec {
  /// Name of the main class handed to the entry point.
  pub main: Option<String>,
  /// Name of the entry point that knows how to run `main`.
  pub entry: Option<String>,
}

/// A manifest document as written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
  pub coordinate: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub properties: BTreeMap<String, String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub dependencies: Vec<DependencySpec>,
  /// Version-constraint imports (BOMs).
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub imports: Vec<String>,
  /// Versions pinned by this manifest for dependencies that omit one.
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub managed: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub launch: Option<LaunchSpec>,
}

impl Manifest {
  /// Parse a manifest from TOML text.
  pub fn from_toml_str(content: &str) -> Result<Self, ManifestError> {
    Ok(toml::from_str(content)?)
  }

  /// Load a manifest from a file.
  pub fn load(path: &Path) -> Result<Self, ManifestError> {
    let content = fs::read_to_string(path).map_err(|source| ManifestError::Read {
      path: path.to_path_buf(),
      source,
    })?;
    Self::from_toml_str(&content)
  }
}

/// A dependency ready for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Dependency {
  pub coordinate: Coordinate,
  pub scope: Scope,
  pub optional: bool,
  pub exclusions: BTreeSet<ArtifactKey>,
}

impl Dependency {
  /// A compile-scope dependency with no exclusions.
  pub fn new(coordinate: Coordinate) -> Self {
    Self {
      coordinate,
      scope: Scope::Compile,
      optional: false,
      exclusions: BTreeSet::new(),
    }
  }

  pub fn key(&self) -> ArtifactKey {
    self.coordinate.key()
  }

  /// Returns true if `key` is excluded from this dependency's closure.
  pub fn excludes(&self, key: &ArtifactKey) -> bool {
    self.exclusions.iter().any(|e| e.matches(key))
  }
}

/// A manifest with its parent chain folded in and every placeholder resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedManifest {
  pub coordinate: Coordinate,
  /// Merged properties of the manifest and its ancestors.
  pub properties: BTreeMap<String, String>,
  /// Runtime dependencies, descendant declarations first.
  pub dependencies: Vec<Dependency>,
  /// Constraint imports, descendant declarations first.
  pub imports: Vec<Coordinate>,
  pub managed: Vec<Coordinate>,
  pub launch: LaunchSpec,
  /// Coordinates of the ancestors that were folded in, nearest first.
  pub ancestors: Vec<Coordinate>,
}
