//! Resolver contract and the types exchanged with it.
//!
//! - [`Resolver`] - the engine that turns a request into artifact files
//! - [`ResolveRequest`] - dependencies, constraint imports, pins, transitivity
//! - [`ResolvedSet`] - flat, deduplicated result keyed by `(group, name)`

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::coordinate::{ArtifactKey, Coordinate};
use crate::manifest::{Dependency, Manifest, ManifestError};

/// Errors reported by a resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The artifact does not exist in any repository.
  #[error("artifact not found: {0}")]
  NotFound(Coordinate),

  /// The artifact is not cached locally and offline mode forbids fetching.
  #[error("artifact {0} is not cached and offline mode is enabled")]
  Offline(Coordinate),

  /// No version was declared and no constraint import manages one.
  #[error("no version declared or managed for {0}")]
  MissingVersion(ArtifactKey),

  /// A package manifest could not be read.
  #[error("failed to read manifest for {coordinate}: {source}")]
  Manifest {
    coordinate: Coordinate,
    #[source]
    source: Box<ManifestError>,
  },

  /// A cached artifact does not match its recorded checksum.
  #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
  Checksum {
    path: PathBuf,
    expected: String,
    actual: String,
  },

  /// Filesystem error while reading or populating the cache.
  #[error("io error at {path}: {source}")]
  Io {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  /// The resolver could not be initialised.
  #[error("resolver initialisation failed: {0}")]
  Init(String),
}

/// Everything the resolver needs for one resolution.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolveRequest {
  pub dependencies: Vec<Dependency>,
  /// Version-constraint imports (BOMs).
  pub imports: Vec<Coordinate>,
  /// Direct version pins that win over imports.
  pub managed: Vec<Coordinate>,
  /// When false, only the direct dependencies are resolved.
  pub transitive: bool,
}

/// One resolved artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
  /// Coordinate with its final version.
  pub coordinate: Coordinate,
  /// Backing file; `None` for an optional artifact that could not be found.
  pub file: Option<PathBuf>,
  /// Exclusions merged from every path that reached this artifact.
  #[serde(skip_serializing_if = "BTreeSet::is_empty")]
  pub exclusions: BTreeSet<ArtifactKey>,
}

impl ResolvedArtifact {
  pub fn new(coordinate: Coordinate, file: Option<PathBuf>) -> Self {
    Self {
      coordinate,
      file,
      exclusions: BTreeSet::new(),
    }
  }

  pub fn key(&self) -> ArtifactKey {
    self.coordinate.key()
  }
}

/// Flat, ordered, deduplicated resolution result.
///
/// Holds at most one artifact per `(group, name)`. Inserting an artifact
/// whose key is already present replaces the earlier entry in place, so the
/// last writer wins while the original order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ResolvedSet {
  artifacts: Vec<ResolvedArtifact>,
  #[serde(skip)]
  index: BTreeMap<ArtifactKey, usize>,
}

impl ResolvedSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert an artifact, returning the entry it replaced.
  pub fn insert(&mut self, artifact: ResolvedArtifact) -> Option<ResolvedArtifact> {
    let key = artifact.key();
    match self.index.get(&key) {
      Some(&pos) => Some(std::mem::replace(&mut self.artifacts[pos], artifact)),
      None => {
        self.index.insert(key, self.artifacts.len());
        self.artifacts.push(artifact);
        None
      }
    }
  }

  pub fn get(&self, key: &ArtifactKey) -> Option<&ResolvedArtifact> {
    self.index.get(key).map(|&pos| &self.artifacts[pos])
  }

  pub fn contains_key(&self, key: &ArtifactKey) -> bool {
    self.index.contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.artifacts.len()
  }

  pub fn is_empty(&self) -> bool {
    self.artifacts.is_empty()
  }

  /// Artifacts in resolver-return order.
  pub fn iter(&self) -> std::slice::Iter<'_, ResolvedArtifact> {
    self.artifacts.iter()
  }

  pub fn coordinates(&self) -> impl Iterator<Item = &Coordinate> {
    self.artifacts.iter().map(|a| &a.coordinate)
  }

  /// Backing files, skipping artifacts without one.
  pub fn files(&self) -> impl Iterator<Item = &Path> {
    self.artifacts.iter().filter_map(|a| a.file.as_deref())
  }

  /// Entries of `self` that `base` does not already provide.
  ///
  /// An entry is dropped when `base` holds the same key at the same version.
  /// When the versions disagree the entry from `self` is kept, so the caller
  /// still ships its own version.
  pub fn subtract(&self, base: &ResolvedSet) -> ResolvedSet {
    self
      .artifacts
      .iter()
      .filter(|artifact| match base.get(&artifact.key()) {
        Some(existing) => existing.coordinate.version != artifact.coordinate.version,
        None => true,
      })
      .cloned()
      .collect()
  }
}

impl FromIterator<ResolvedArtifact> for ResolvedSet {
  fn from_iter<T: IntoIterator<Item = ResolvedArtifact>>(iter: T) -> Self {
    let mut set = ResolvedSet::new();
    for artifact in iter {
      set.insert(artifact);
    }
    set
  }
}

impl<'a> IntoIterator for &'a ResolvedSet {
  type Item = &'a ResolvedArtifact;
  type IntoIter = std::slice::Iter<'a, ResolvedArtifact>;

  fn into_iter(self) -> Self::IntoIter {
    self.artifacts.iter()
  }
}

/// A package repository resolution engine.
///
/// Implementations own version mediation and artifact retrieval; callers
/// only describe what they want.
pub trait Resolver: Send + Sync {
  /// Resolve a request into a flat set of artifacts.
  fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedSet, ResolveError>;

  /// Fetch the file of a single, fully versioned artifact.
  fn resolve_one(&self, coordinate: &Coordinate) -> Result<PathBuf, ResolveError>;

  /// Read the manifest published for a coordinate.
  fn read_manifest(&self, coordinate: &Coordinate) -> Result<Manifest, ResolveError>;
}

impl<R: Resolver + ?Sized> Resolver for Arc<R> {
  fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedSet, ResolveError> {
    (**self).resolve(request)
  }

  fn resolve_one(&self, coordinate: &Coordinate) -> Result<PathBuf, ResolveError> {
    (**self).resolve_one(coordinate)
  }

  fn read_manifest(&self, coordinate: &Coordinate) -> Result<Manifest, ResolveError> {
    (**self).read_manifest(coordinate)
  }
}
