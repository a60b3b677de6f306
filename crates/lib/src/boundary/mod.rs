//! Isolation boundaries.
//!
//! An [`IsolationBoundary`] is a loader over one application's classpath.
//! It delegates to a parent loader according to a [`Delegation`] strategy
//! chosen at construction:
//!
//! - [`Delegation::ParentFirst`] - ask the parent, then the own classpath
//! - [`Delegation::ChildFirst`] - search the own classpath, then the parent
//!
//! Class lookups are cached per boundary, so a name is searched for at
//! most once. Resources follow the same order but are not cached.

pub mod context;
mod loader;

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

pub use loader::{ClassDef, LoadError, Loader, PlatformLoader, Resource, class_resource_name};

use crate::archive::Archive;
use crate::classpath::{Classpath, ClasspathEntry};

static NEXT_BOUNDARY_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique boundary identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct BoundaryId(u64);

impl BoundaryId {
  fn next() -> Self {
    BoundaryId(NEXT_BOUNDARY_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for BoundaryId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "boundary-{}", self.0)
  }
}

/// Order in which a boundary consults its parent and its own classpath.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Delegation {
  #[default]
  ParentFirst,
  ChildFirst,
}

/// Which host loader a boundary delegates to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ParentSource {
  /// The host's own loader.
  #[default]
  Host,
  /// The host loader's parent, hiding the host's own classes.
  HostParent,
}

impl ParentSource {
  /// Pick the delegation parent relative to `host`.
  pub fn select(self, host: &Arc<dyn Loader>) -> Option<Arc<dyn Loader>> {
    match self {
      ParentSource::Host => Some(Arc::clone(host)),
      ParentSource::HostParent => host.parent(),
    }
  }
}

/// A searchable classpath location.
struct Source {
  archive: Archive,
  prefix: String,
}

impl Source {
  fn open(entry: &ClasspathEntry) -> Result<Self, LoadError> {
    let location = entry.location().to_path_buf();
    let archive = Archive::open(&location).map_err(|source| LoadError::Open { location, source })?;
    let prefix = match entry {
      ClasspathEntry::Nested { prefix, .. } => prefix.clone(),
      _ => String::new(),
    };
    Ok(Self { archive, prefix })
  }

  fn location(&self) -> PathBuf {
    self.archive.path().to_path_buf()
  }

  fn read(&self, name: &str) -> Result<Option<Vec<u8>>, LoadError> {
    let entry = format!("{}{}", self.prefix, name);
    if !self.archive.has_entry(&entry) {
      return Ok(None);
    }
    self.archive.read_entry(&entry).map_err(|source| LoadError::Read {
      name: name.to_string(),
      location: self.location(),
      source,
    })
  }
}

/// A loader scoped to one hosted application.
pub struct IsolationBoundary {
  id: BoundaryId,
  name: String,
  delegation: Delegation,
  parent: Option<Arc<dyn Loader>>,
  sources: RwLock<Vec<Source>>,
  cache: RwLock<HashMap<String, Arc<ClassDef>>>,
  closed: AtomicBool,
}

impl IsolationBoundary {
  /// Build a boundary over `classpath`, opening every entry up front.
  pub fn new(
    name: impl Into<String>,
    classpath: &Classpath,
    delegation: Delegation,
    parent: Option<Arc<dyn Loader>>,
  ) -> Result<Arc<Self>, LoadError> {
    let sources = classpath.entries().iter().map(Source::open).collect::<Result<Vec<_>, _>>()?;
    let boundary = Self {
      id: BoundaryId::next(),
      name: name.into(),
      delegation,
      parent,
      sources: RwLock::new(sources),
      cache: RwLock::new(HashMap::new()),
      closed: AtomicBool::new(false),
    };
    debug!(
      boundary = %boundary.id,
      name = %boundary.name,
      entries = classpath.len(),
      delegation = ?delegation,
      "created isolation boundary"
    );
    Ok(Arc::new(boundary))
  }

  pub fn id(&self) -> BoundaryId {
    self.id
  }

  pub fn delegation(&self) -> Delegation {
    self.delegation
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::Acquire)
  }

  /// Number of classes resolved through this boundary so far.
  pub fn cached_classes(&self) -> usize {
    self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
  }

  /// Release the classpath and the class cache. Idempotent.
  pub fn close(&self) {
    if self.closed.swap(true, Ordering::AcqRel) {
      return;
    }
    self.sources.write().unwrap_or_else(|e| e.into_inner()).clear();
    self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
    debug!(boundary = %self.id, name = %self.name, "closed isolation boundary");
  }

  /// Search only this boundary's classpath.
  pub fn find_own_resource(&self, name: &str) -> Result<Option<Resource>, LoadError> {
    let sources = self.sources.read().unwrap_or_else(|e| e.into_inner());
    for source in sources.iter() {
      if let Some(bytes) = source.read(name)? {
        return Ok(Some(Resource {
          name: name.to_string(),
          bytes,
          location: source.location(),
        }));
      }
    }
    Ok(None)
  }

  fn find_own_class(&self, name: &str) -> Result<Option<Arc<ClassDef>>, LoadError> {
    Ok(self.find_own_resource(&class_resource_name(name))?.map(|resource| {
      Arc::new(ClassDef {
        name: name.to_string(),
        bytes: resource.bytes,
        location: resource.location,
        defined_by: self.name.clone(),
      })
    }))
  }

  fn from_parent(&self, name: &str) -> Option<Arc<ClassDef>> {
    self.parent.as_ref().and_then(|p| p.load_class(name).ok())
  }

  fn ensure_open(&self) -> Result<(), LoadError> {
    if self.is_closed() {
      return Err(LoadError::Closed(self.name.clone()));
    }
    Ok(())
  }
}

impl Loader for IsolationBoundary {
  fn name(&self) -> &str {
    &self.name
  }

  fn parent(&self) -> Option<Arc<dyn Loader>> {
    self.parent.clone()
  }

  fn load_class(&self, name: &str) -> Result<Arc<ClassDef>, LoadError> {
    self.ensure_open()?;
    if let Some(class) = self.cache.read().unwrap_or_else(|e| e.into_inner()).get(name) {
      return Ok(Arc::clone(class));
    }

    let found = match self.delegation {
      Delegation::ParentFirst => match self.from_parent(name) {
        Some(class) => Some(class),
        None => self.find_own_class(name)?,
      },
      Delegation::ChildFirst => match self.find_own_class(name)? {
        Some(class) => Some(class),
        None => self.from_parent(name),
      },
    };
    let class = found.ok_or_else(|| LoadError::ClassNotFound(name.to_string()))?;
    trace!(boundary = %self.id, class = name, defined_by = %class.defined_by, "loaded class");

    let mut cache = self.cache.write().unwrap_or_else(|e| e.into_inner());
    Ok(Arc::clone(cache.entry(name.to_string()).or_insert(class)))
  }

  fn find_resource(&self, name: &str) -> Option<Resource> {
    if self.is_closed() {
      return None;
    }
    let own = || self.find_own_resource(name).ok().flatten();
    let parent = || self.parent.as_ref().and_then(|p| p.find_resource(name));
    match self.delegation {
      Delegation::ParentFirst => parent().or_else(own),
      Delegation::ChildFirst => own().or_else(parent),
    }
  }
}

impl fmt::Debug for IsolationBoundary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("IsolationBoundary")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("delegation", &self.delegation)
      .field("closed", &self.is_closed())
      .finish()
  }
}
