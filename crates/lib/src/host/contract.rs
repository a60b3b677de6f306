//! The interface between the host and a hosted application.
//!
//! A hosted application is created by an [`ApplicationFactory`] inside its
//! isolation boundary and driven through [`HostedApplication`]. Factories
//! are registered with [`EntryPoints`] under a name, optionally with a
//! marker class whose presence on a classpath identifies archives they can
//! run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::components::ComponentRegistry;
use super::extensions::ExtensionScope;
use super::instance::InstanceId;
use crate::boundary::{IsolationBoundary, Loader};
use crate::classpath::Classpath;
use crate::manifest::LaunchSpec;

/// Error type reported by hosted applications.
pub type AppError = Box<dyn std::error::Error + Send + Sync>;

/// What an application receives at startup.
#[derive(Clone)]
pub struct LaunchContext {
  pub id: InstanceId,
  pub name: String,
  /// The archive being launched.
  pub resource: PathBuf,
  /// Main class named by the manifest, if any.
  pub main: Option<String>,
  pub properties: BTreeMap<String, String>,
  pub args: Vec<String>,
  pub profiles: Vec<String>,
  pub classpath: Classpath,
  pub boundary: Arc<IsolationBoundary>,
  pub extensions: ExtensionScope,
}

impl fmt::Debug for LaunchContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LaunchContext")
      .field("id", &self.id)
      .field("name", &self.name)
      .field("resource", &self.resource)
      .field("main", &self.main)
      .field("args", &self.args)
      .field("profiles", &self.profiles)
      .finish_non_exhaustive()
  }
}

/// An application running inside an isolation boundary.
pub trait HostedApplication: Send + Sync {
  /// Start the application.
  ///
  /// Returns once the application is serving or has finished. Work that
  /// keeps going afterwards must run on the application's own threads.
  fn run(&self, context: &LaunchContext) -> Result<(), AppError>;

  /// Whether the application is still running after [`run`](Self::run).
  fn is_running(&self) -> bool;

  /// The error the application stopped with, if any.
  fn error(&self) -> Option<String> {
    None
  }

  /// Ask the application to stop. Cooperative; must not block indefinitely.
  fn close(&self) -> Result<(), AppError>;

  /// Components published for introspection.
  fn components(&self) -> Option<&ComponentRegistry> {
    None
  }
}

/// Creates hosted applications.
pub trait ApplicationFactory: Send + Sync {
  fn name(&self) -> &str;

  /// A class that marks archives this factory can run.
  fn marker(&self) -> Option<&str> {
    None
  }

  fn create(&self, context: &LaunchContext) -> Result<Box<dyn HostedApplication>, AppError>;
}

/// Why no single entry point could be chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
  Unknown(String),
  None,
  Ambiguous(Vec<String>),
}

/// Registered entry points.
#[derive(Clone, Default)]
pub struct EntryPoints {
  factories: Vec<Arc<dyn ApplicationFactory>>,
}

impl EntryPoints {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a factory; a later registration with the same name wins.
  pub fn register(&mut self, factory: Arc<dyn ApplicationFactory>) {
    self.factories.retain(|f| f.name() != factory.name());
    self.factories.push(factory);
  }

  pub fn with(mut self, factory: Arc<dyn ApplicationFactory>) -> Self {
    self.register(factory);
    self
  }

  pub fn names(&self) -> Vec<&str> {
    self.factories.iter().map(|f| f.name()).collect()
  }

  /// Choose the factory for an application.
  ///
  /// An entry point named by the manifest is used as is. Otherwise exactly
  /// one factory's marker class must be loadable through the boundary.
  pub fn select(
    &self,
    launch: &LaunchSpec,
    boundary: &IsolationBoundary,
  ) -> Result<Arc<dyn ApplicationFactory>, Selection> {
    if let Some(name) = &launch.entry {
      return self
        .factories
        .iter()
        .find(|f| f.name() == name)
        .cloned()
        .ok_or_else(|| Selection::Unknown(name.clone()));
    }

    let matching: Vec<&Arc<dyn ApplicationFactory>> = self
      .factories
      .iter()
      .filter(|f| f.marker().is_some_and(|m| boundary.load_class(m).is_ok()))
      .collect();
    match matching.as_slice() {
      [only] => {
        debug!(entry = only.name(), "selected entry point by marker");
        Ok(Arc::clone(only))
      }
      [] => Err(Selection::None),
      many => Err(Selection::Ambiguous(many.iter().map(|f| f.name().to_string()).collect())),
    }
  }
}
