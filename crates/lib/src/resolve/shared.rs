//! A lazily opened, process-shared repository handle.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use super::local::{LocalRepository, RepositoryConfig};
use super::types::{ResolveError, ResolveRequest, ResolvedSet, Resolver};
use crate::coordinate::Coordinate;
use crate::manifest::Manifest;

/// Opens its repository on first use, exactly once.
///
/// The fast path is a lock-free read of the initialised handle. On a miss
/// the initialiser lock is taken and the handle checked again before
/// opening, so concurrent first callers open the repository only once. A
/// failed open is not cached; the next call retries.
#[derive(Debug)]
pub struct SharedResolver {
  config: RepositoryConfig,
  handle: OnceLock<Arc<LocalRepository>>,
  init: Mutex<()>,
}

impl SharedResolver {
  pub fn new(config: RepositoryConfig) -> Self {
    Self {
      config,
      handle: OnceLock::new(),
      init: Mutex::new(()),
    }
  }

  pub fn config(&self) -> &RepositoryConfig {
    &self.config
  }

  pub fn is_initialized(&self) -> bool {
    self.handle.get().is_some()
  }

  /// The shared repository, opening it if this is the first use.
  pub fn get(&self) -> Result<Arc<LocalRepository>, ResolveError> {
    if let Some(handle) = self.handle.get() {
      return Ok(Arc::clone(handle));
    }

    let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(handle) = self.handle.get() {
      return Ok(Arc::clone(handle));
    }

    debug!(root = %self.config.root.display(), "initialising repository");
    let handle = Arc::new(LocalRepository::open(self.config.clone())?);
    let _ = self.handle.set(Arc::clone(&handle));
    Ok(handle)
  }
}

impl Resolver for SharedResolver {
  fn resolve(&self, request: &ResolveRequest) -> Result<ResolvedSet, ResolveError> {
    self.get()?.resolve(request)
  }

  fn resolve_one(&self, coordinate: &Coordinate) -> Result<PathBuf, ResolveError> {
    self.get()?.resolve_one(coordinate)
  }

  fn read_manifest(&self, coordinate: &Coordinate) -> Result<Manifest, ResolveError> {
    self.get()?.read_manifest(coordinate)
  }
}

#[cfg(test)]
mod tests {
  use std::thread;

  use tempfile::TempDir;

  use super::*;

  #[test]
  fn concurrent_first_use_opens_once() {
    let temp = TempDir::new().unwrap();
    let shared = Arc::new(SharedResolver::new(RepositoryConfig::new(temp.path().join("cache"))));
    assert!(!shared.is_initialized());

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let shared = Arc::clone(&shared);
        thread::spawn(move || shared.get().unwrap())
      })
      .collect();
    let repos: Vec<Arc<LocalRepository>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(shared.is_initialized());
    assert!(repos.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert!(temp.path().join("cache").is_dir());
  }

  #[test]
  fn failed_open_is_retried() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("file");
    std::fs::write(&blocker, "not a directory").unwrap();

    let shared = SharedResolver::new(RepositoryConfig::new(blocker.join("cache")));
    assert!(shared.get().is_err());
    assert!(!shared.is_initialized());
  }
}
