//! A [`Resolver`] over directory-layout repositories.
//!
//! Artifacts live at `<root>/<group as path>/<name>/<version>/<file>`, with
//! the package manifest beside them as `<name>-<version>.toml`. A file may
//! carry a `<file>.sha256` digest that is verified when it is copied into
//! the cache.
//!
//! Lookups check the local cache first. In online mode, a miss is served
//! from the first remote repository that has the file, and the file is
//! copied into the cache so later lookups (including offline ones) find it.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, trace, warn};

use super::types::{ResolveError, ResolveRequest, ResolvedArtifact, ResolvedSet, Resolver};
use crate::coordinate::{ArtifactKey, Coordinate};
use crate::manifest::{Dependency, Manifest, ManifestError, ManifestReader};
use crate::platform::paths;
use crate::util::hash::hash_file;

const MANIFEST_EXTENSION: &str = "toml";
const CHECKSUM_SUFFIX: &str = ".sha256";

/// Where artifacts come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
  /// Local cache root.
  pub root: PathBuf,
  /// Remote repositories, searched in order on a cache miss.
  pub remotes: Vec<PathBuf>,
  /// Only the cache is consulted.
  pub offline: bool,
}

impl RepositoryConfig {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      remotes: Vec::new(),
      offline: false,
    }
  }

  /// Configuration from `THIN_ROOT`, `THIN_REPOS` and `THIN_OFFLINE`.
  pub fn from_env() -> Result<Self, ResolveError> {
    let root = paths::repository_root()
      .ok_or_else(|| ResolveError::Init("cannot determine a cache directory; set THIN_ROOT".to_string()))?;
    Ok(Self {
      root,
      remotes: paths::remote_repositories(),
      offline: paths::offline(),
    })
  }
}

/// Resolver backed by a local cache and remote directory repositories.
#[derive(Debug)]
pub struct LocalRepository {
  config: RepositoryConfig,
}

impl LocalRepository {
  /// Open the repository, creating the cache root if needed.
  pub fn open(config: RepositoryConfig) -> Result<Self, ResolveError> {
    fs::create_dir_all(&config.root).map_err(|source| ResolveError::Io {
      path: config.root.clone(),
      source,
    })?;
    info!(root = %config.root.display(), remotes = config.remotes.len(), offline = config.offline, "opened repository");
    Ok(Self { config })
  }

  pub fn config(&self) -> &RepositoryConfig {
    &self.config
  }

  /// Cache path of a fully versioned coordinate.
  pub fn cache_path(&self, coordinate: &Coordinate) -> Option<PathBuf> {
    relative_path(coordinate).map(|rel| self.config.root.join(rel))
  }

  /// Locate a file in the cache, fetching it from a remote if allowed.
  fn fetch(&self, coordinate: &Coordinate) -> Result<PathBuf, ResolveError> {
    let relative = relative_path(coordinate).ok_or_else(|| ResolveError::MissingVersion(coordinate.key()))?;
    let cached = self.config.root.join(&relative);
    if cached.is_file() {
      trace!(path = %cached.display(), "cache hit");
      return Ok(cached);
    }
    if self.config.offline {
      return Err(ResolveError::Offline(coordinate.clone()));
    }

    for remote in &self.config.remotes {
      let source = remote.join(&relative);
      if !source.is_file() {
        continue;
      }
      verify_checksum(&source)?;
      copy_into_cache(&source, &cached)?;
      debug!(coordinate = %coordinate, remote = %remote.display(), "fetched into cache");
      return Ok(cached);
    }

    Err(ResolveError::NotFound(coordinate.clone()))
  }

  /// Managed versions from explicit pins, then from constraint imports.
  ///
  /// Earlier entries win. Imports are followed recursively; one that cannot
  /// be read is logged and skipped.
  fn managed_versions(&self, request: &ResolveRequest) -> BTreeMap<ArtifactKey, String> {
    let mut managed = BTreeMap::new();
    for c in &request.managed {
      if let Some(version) = &c.version {
        managed.entry(c.key()).or_insert_with(|| version.clone());
      }
    }

    let mut visited = HashSet::new();
    let mut queue: VecDeque<Coordinate> = request.imports.iter().cloned().collect();
    while let Some(import) = queue.pop_front() {
      if !visited.insert(import.clone()) {
        continue;
      }
      let resolved = match self
        .read_manifest(&import)
        .and_then(|m| ManifestReader::new(self).resolve(&m).map_err(|e| manifest_error(&import, e)))
      {
        Ok(resolved) => resolved,
        Err(e) => {
          warn!(import = %import, error = %e, "failed to read constraint import");
          continue;
        }
      };
      for c in resolved.managed {
        if let Some(version) = &c.version {
          managed.entry(c.key()).or_insert_with(|| version.clone());
        }
      }
      queue.extend(resolved.imports);
    }

    managed
  }

  /// Runtime dependencies declared in an artifact's own manifest.
  ///
  /// Artifacts without a manifest have no dependencies.
  fn dependencies_of(&self, coordinate: &Coordinate) -> Result<Vec<Dependency>, ResolveError> {
    match self.read_manifest(coordinate) {
      Ok(manifest) => Ok(
        ManifestReader::new(self)
          .resolve(&manifest)
          .map_err(|e| manifest_error(coordinate, e))?
          .dependencies,
      ),
      Err(ResolveError::NotFound(_)) | Err(ResolveError::Offline(_)) => {
        trace!(coordinate = %coordinate, "no manifest; treating as leaf");
        Ok(Vec::new())
      }
      Err(e) => Err(e),
    }
  }
}

struct Pending {
  dependency: Dependency,
  /// Exclusions collected along the path that reached this dependency.
  inherited: BTreeSet<ArtifactKey>,
  direct: bool,
}

impl Resolver for LocalRepository {
  /// Breadth-first, nearest declaration wins.
  ///
  /// Direct dependencies keep their declared version and fall back to a
  /// managed one; transitive dependencies prefer the managed version.
  fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedSet, ResolveError> {
    let managed = self.managed_versions(request);
    let mut resolved = ResolvedSet::new();
    let mut queue: VecDeque<Pending> = request
      .dependencies
      .iter()
      .map(|d| Pending {
        dependency: d.clone(),
        inherited: BTreeSet::new(),
        direct: true,
      })
      .collect();

    while let Some(Pending {
      dependency,
      inherited,
      direct,
    }) = queue.pop_front()
    {
      let key = dependency.key();
      if resolved.contains_key(&key) {
        continue;
      }
      if inherited.iter().any(|e| e.matches(&key)) {
        trace!(dependency = %key, "excluded");
        continue;
      }

      let declared = dependency.coordinate.version.clone();
      let pinned = managed.get(&key).cloned();
      let version = if direct { declared.or(pinned) } else { pinned.or(declared) };
      let Some(version) = version else {
        if dependency.optional {
          warn!(dependency = %key, "skipping optional dependency without a version");
          continue;
        }
        return Err(ResolveError::MissingVersion(key));
      };
      let coordinate = dependency.coordinate.with_version(version);

      let file = match self.fetch(&coordinate) {
        Ok(file) => Some(file),
        Err(e @ (ResolveError::NotFound(_) | ResolveError::Offline(_))) if dependency.optional => {
          warn!(coordinate = %coordinate, error = %e, "skipping unresolved optional artifact");
          None
        }
        Err(e) => return Err(e),
      };

      let mut exclusions = inherited;
      exclusions.extend(dependency.exclusions.iter().cloned());

      if request.transitive && file.is_some() {
        for child in self.dependencies_of(&coordinate)? {
          if child.optional {
            continue;
          }
          queue.push_back(Pending {
            dependency: child,
            inherited: exclusions.clone(),
            direct: false,
          });
        }
      }

      let mut artifact = ResolvedArtifact::new(coordinate, file);
      artifact.exclusions = exclusions;
      resolved.insert(artifact);
    }

    debug!(artifacts = resolved.len(), "resolved dependencies");
    Ok(resolved)
  }

  fn resolve_one(&self, coordinate: &Coordinate) -> Result<PathBuf, ResolveError> {
    self.fetch(coordinate)
  }

  fn read_manifest(&self, coordinate: &Coordinate) -> Result<Manifest, ResolveError> {
    let manifest_coordinate = Coordinate {
      classifier: None,
      extension: MANIFEST_EXTENSION.to_string(),
      ..coordinate.clone()
    };
    let path = self.fetch(&manifest_coordinate)?;
    Manifest::load(&path).map_err(|e| manifest_error(coordinate, e))
  }
}

fn relative_path(coordinate: &Coordinate) -> Option<PathBuf> {
  Some(coordinate.repository_dir()?.join(coordinate.file_name()?))
}

fn manifest_error(coordinate: &Coordinate, source: ManifestError) -> ResolveError {
  ResolveError::Manifest {
    coordinate: coordinate.clone(),
    source: Box::new(source),
  }
}

fn checksum_path(path: &Path) -> PathBuf {
  let mut name = path.as_os_str().to_os_string();
  name.push(CHECKSUM_SUFFIX);
  PathBuf::from(name)
}

/// Compare a file against its `.sha256` sidecar, if there is one.
fn verify_checksum(path: &Path) -> Result<(), ResolveError> {
  let sidecar = checksum_path(path);
  let expected = match fs::read_to_string(&sidecar) {
    Ok(content) => content.split_whitespace().next().unwrap_or_default().to_lowercase(),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
    Err(source) => return Err(ResolveError::Io { path: sidecar, source }),
  };

  let actual = hash_file(path).map_err(|source| ResolveError::Io {
    path: path.to_path_buf(),
    source,
  })?;
  if actual.0 != expected {
    return Err(ResolveError::Checksum {
      path: path.to_path_buf(),
      expected,
      actual: actual.0,
    });
  }
  Ok(())
}

/// Copy through a uniquely named temporary sibling so readers never see a
/// partial file and concurrent fetches of the same artifact do not collide.
fn copy_into_cache(source: &Path, target: &Path) -> Result<(), ResolveError> {
  let io_err = |path: &Path| {
    let path = path.to_path_buf();
    move |source: std::io::Error| ResolveError::Io { path, source }
  };
  let parent = target.parent().unwrap_or_else(|| Path::new("."));
  fs::create_dir_all(parent).map_err(io_err(parent))?;

  let mut partial = NamedTempFile::new_in(parent).map_err(io_err(parent))?;
  let mut input = fs::File::open(source).map_err(io_err(source))?;
  io::copy(&mut input, partial.as_file_mut()).map_err(io_err(partial.path()))?;

  match partial.persist(target) {
    Ok(_) => Ok(()),
    // Another fetch of the same artifact got there first.
    Err(e) if target.is_file() => {
      trace!(path = %target.display(), error = %e.error, "cache entry already written");
      Ok(())
    }
    Err(e) => Err(ResolveError::Io {
      path: target.to_path_buf(),
      source: e.error,
    }),
  }
}
