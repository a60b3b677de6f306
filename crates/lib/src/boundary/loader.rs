//! The loader contract shared by boundaries and the host.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::consts::CLASS_SUFFIX;

#[derive(Debug, Error)]
pub enum LoadError {
  #[error("class not found: {0}")]
  ClassNotFound(String),

  #[error("loader {0} is closed")]
  Closed(String),

  #[error("failed to open classpath entry {location}: {source}")]
  Open {
    location: PathBuf,
    #[source]
    source: ArchiveError,
  },

  #[error("failed to read {name} from {location}: {source}")]
  Read {
    name: String,
    location: PathBuf,
    #[source]
    source: ArchiveError,
  },
}

/// A class definition found by a loader.
#[derive(Clone, PartialEq, Eq)]
pub struct ClassDef {
  /// Binary name, e.g. `com.example.App`.
  pub name: String,
  pub bytes: Vec<u8>,
  /// Classpath location the class was read from.
  pub location: PathBuf,
  /// Name of the loader that defined it.
  pub defined_by: String,
}

impl fmt::Debug for ClassDef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ClassDef")
      .field("name", &self.name)
      .field("len", &self.bytes.len())
      .field("location", &self.location)
      .field("defined_by", &self.defined_by)
      .finish()
  }
}

/// A resource found by a loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
  pub name: String,
  pub bytes: Vec<u8>,
  pub location: PathBuf,
}

impl Resource {
  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.bytes).into_owned()
  }
}

/// A hierarchical class and resource loader.
pub trait Loader: Send + Sync {
  fn name(&self) -> &str;

  /// The loader this one delegates to, if any.
  fn parent(&self) -> Option<Arc<dyn Loader>>;

  /// Load a class by binary name, applying the loader's delegation policy.
  fn load_class(&self, name: &str) -> Result<Arc<ClassDef>, LoadError>;

  /// Find a resource by `/`-separated path, applying the same policy.
  fn find_resource(&self, name: &str) -> Option<Resource>;
}

impl fmt::Debug for dyn Loader {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Loader({})", self.name())
  }
}

/// Resource path of a class: `a.b.C` becomes `a/b/C.class`.
pub fn class_resource_name(name: &str) -> String {
  format!("{}{CLASS_SUFFIX}", name.replace('.', "/"))
}

/// An in-memory loader standing in for the host process.
///
/// The host registers the classes and resources it shares with hosted
/// applications. Lookups are parent-first.
pub struct PlatformLoader {
  name: String,
  parent: Option<Arc<dyn Loader>>,
  resources: BTreeMap<String, Vec<u8>>,
}

impl PlatformLoader {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      parent: None,
      resources: BTreeMap::new(),
    }
  }

  pub fn with_parent(mut self, parent: Arc<dyn Loader>) -> Self {
    self.parent = Some(parent);
    self
  }

  /// Register a class under its binary name.
  pub fn with_class(mut self, name: &str, bytes: impl Into<Vec<u8>>) -> Self {
    self.resources.insert(class_resource_name(name), bytes.into());
    self
  }

  pub fn with_resource(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
    self.resources.insert(name.into(), bytes.into());
    self
  }

  fn location(&self) -> PathBuf {
    PathBuf::from(format!("<{}>", self.name))
  }

  fn find_own(&self, name: &str) -> Option<Resource> {
    self.resources.get(name).map(|bytes| Resource {
      name: name.to_string(),
      bytes: bytes.clone(),
      location: self.location(),
    })
  }
}

impl Loader for PlatformLoader {
  fn name(&self) -> &str {
    &self.name
  }

  fn parent(&self) -> Option<Arc<dyn Loader>> {
    self.parent.clone()
  }

  fn load_class(&self, name: &str) -> Result<Arc<ClassDef>, LoadError> {
    if let Some(parent) = &self.parent
      && let Ok(class) = parent.load_class(name)
    {
      return Ok(class);
    }
    let resource = self
      .find_own(&class_resource_name(name))
      .ok_or_else(|| LoadError::ClassNotFound(name.to_string()))?;
    Ok(Arc::new(ClassDef {
      name: name.to_string(),
      bytes: resource.bytes,
      location: resource.location,
      defined_by: self.name.clone(),
    }))
  }

  fn find_resource(&self, name: &str) -> Option<Resource> {
    self
      .parent
      .as_ref()
      .and_then(|p| p.find_resource(name))
      .or_else(|| self.find_own(name))
  }
}
