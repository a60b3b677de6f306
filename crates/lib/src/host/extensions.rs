//! Process-wide extension registry.
//!
//! Some facilities can only exist once per process (protocol handlers,
//! global hooks and the like). A hosted application installs them here,
//! keyed by name and owned by its boundary, together with an optional
//! teardown hook. When the boundary is closed, the host releases everything
//! the boundary owns so a later application in a fresh boundary starts with
//! a clean slate.

use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, LazyLock, Mutex};

use thiserror::Error;
use tracing::{debug, warn};

use super::components::Lookup;
use crate::boundary::BoundaryId;

/// Runs when an extension is released. An `Err` is reported as a cleanup
/// failure.
pub type Teardown = Box<dyn FnOnce() -> Result<(), String> + Send>;

#[derive(Debug, Error)]
pub enum ExtensionError {
  #[error("extension '{key}' is already installed by {owner}")]
  AlreadyInstalled { key: String, owner: BoundaryId },

  #[error("teardown of extension '{key}' failed: {message}")]
  TeardownFailed { key: String, message: String },
}

struct Extension {
  owner: BoundaryId,
  value: Arc<dyn Any + Send + Sync>,
  type_name: &'static str,
  teardown: Option<Teardown>,
}

static GLOBAL: LazyLock<Arc<ExtensionRegistry>> = LazyLock::new(|| Arc::new(ExtensionRegistry::new()));

#[derive(Default)]
pub struct ExtensionRegistry {
  entries: Mutex<BTreeMap<String, Extension>>,
}

impl ExtensionRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// The registry shared by the whole process.
  pub fn global() -> Arc<ExtensionRegistry> {
    Arc::clone(&GLOBAL)
  }

  /// Install a singleton. A key can only be held by one boundary at a time.
  pub fn install<T: Any + Send + Sync>(
    &self,
    key: impl Into<String>,
    owner: BoundaryId,
    value: T,
    teardown: Option<Teardown>,
  ) -> Result<(), ExtensionError> {
    let key = key.into();
    let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = entries.get(&key) {
      return Err(ExtensionError::AlreadyInstalled {
        key,
        owner: existing.owner,
      });
    }
    debug!(key = %key, owner = %owner, "installed extension");
    entries.insert(
      key,
      Extension {
        owner,
        value: Arc::new(value),
        type_name: type_name::<T>(),
        teardown,
      },
    );
    Ok(())
  }

  pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Lookup<Arc<T>> {
    let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
    let Some(extension) = entries.get(key) else {
      return Lookup::NotFound;
    };
    match Arc::clone(&extension.value).downcast::<T>() {
      Ok(value) => Lookup::Found(value),
      Err(_) => Lookup::TypeMismatch {
        expected: type_name::<T>(),
        found: extension.type_name,
      },
    }
  }

  pub fn owner(&self, key: &str) -> Option<BoundaryId> {
    self
      .entries
      .lock()
      .unwrap_or_else(|e| e.into_inner())
      .get(key)
      .map(|e| e.owner)
  }

  pub fn is_empty(&self) -> bool {
    self.entries.lock().unwrap_or_else(|e| e.into_inner()).is_empty()
  }

  /// Remove every extension owned by `owner` and run its teardown hook.
  ///
  /// All hooks run even if one fails or panics; the first failure is
  /// returned. Returns the number of extensions released.
  pub fn release(&self, owner: BoundaryId) -> Result<usize, ExtensionError> {
    let released: Vec<(String, Extension)> = {
      let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
      let keys: Vec<String> = entries
        .iter()
        .filter(|(_, e)| e.owner == owner)
        .map(|(k, _)| k.clone())
        .collect();
      keys
        .into_iter()
        .filter_map(|k| entries.remove(&k).map(|e| (k, e)))
        .collect()
    };

    let count = released.len();
    let mut first_error = None;
    for (key, extension) in released {
      let Some(teardown) = extension.teardown else {
        continue;
      };
      let outcome = catch_unwind(AssertUnwindSafe(teardown)).unwrap_or_else(|_| Err("teardown panicked".to_string()));
      if let Err(message) = outcome {
        warn!(key = %key, owner = %owner, error = %message, "extension teardown failed");
        first_error.get_or_insert(ExtensionError::TeardownFailed { key, message });
      }
    }

    if count > 0 {
      debug!(owner = %owner, count, "released extensions");
    }
    match first_error {
      Some(e) => Err(e),
      None => Ok(count),
    }
  }
}

/// An [`ExtensionRegistry`] view bound to one boundary.
#[derive(Clone)]
pub struct ExtensionScope {
  registry: Arc<ExtensionRegistry>,
  owner: BoundaryId,
}

impl ExtensionScope {
  pub fn new(registry: Arc<ExtensionRegistry>, owner: BoundaryId) -> Self {
    Self { registry, owner }
  }

  pub fn owner(&self) -> BoundaryId {
    self.owner
  }

  pub fn install<T: Any + Send + Sync>(
    &self,
    key: impl Into<String>,
    value: T,
    teardown: Option<Teardown>,
  ) -> Result<(), ExtensionError> {
    self.registry.install(key, self.owner, value, teardown)
  }

  pub fn get<T: Any + Send + Sync>(&self, key: &str) -> Lookup<Arc<T>> {
    self.registry.get(key)
  }
}
