//! The runtime host.
//!
//! [`RuntimeHost`] keeps a table of application instances keyed by the
//! fingerprint of their archive path and drives each through the
//! [`LaunchState`] machine:
//!
//! - `deploy` prepares the classpath, builds an isolation boundary, and
//!   starts the application on a dedicated worker thread, waiting for it
//!   with a bounded timeout
//! - `status` reports the state, cleaning up after applications that have
//!   stopped on their own
//! - `cancel`/`undeploy` stop a running application and release its
//!   boundary and extensions
//!
//! Launch and cleanup failures are recorded on the instance rather than
//! returned, so one failing application never takes the host down.

pub mod command;
pub mod components;
pub mod contract;
pub mod extensions;
mod instance;
mod state;

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, TryLockError};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info, warn};

pub use command::CommandEntryPoint;
pub use components::{ComponentRegistry, Lookup};
pub use contract::{AppError, ApplicationFactory, EntryPoints, HostedApplication, LaunchContext, Selection};
pub use extensions::{ExtensionError, ExtensionRegistry, ExtensionScope, Teardown};
pub use instance::{ApplicationInstance, InstanceId, InstanceStatus};
pub use state::LaunchState;

use crate::boundary::{self, Delegation, IsolationBoundary, LoadError, Loader, ParentSource, PlatformLoader};
use crate::consts::{DEFAULT_LAUNCH_TIMEOUT_SECS, DEFAULT_LAYER_NAME};
use crate::error::{ErrorKind, LaunchError};
use crate::launcher::{LaunchOptions, Launcher};
use crate::resolve::Resolver;
use crate::util::hash::fingerprint_path;

#[derive(Debug, Error)]
pub enum HostError {
  #[error("cannot read {path}: {source}")]
  Resource {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error(transparent)]
  Launch(#[from] LaunchError),

  #[error("failed to build isolation boundary: {0}")]
  Boundary(#[from] LoadError),

  #[error("unknown entry point '{0}'")]
  UnknownEntryPoint(String),

  #[error("no entry point can run {0}")]
  NoEntryPoint(String),

  #[error("several entry points can run {name}: {}", candidates.join(", "))]
  AmbiguousEntryPoint { name: String, candidates: Vec<String> },

  #[error("launch failed: {0}")]
  LaunchFailed(String),

  #[error("launch did not finish within {0:?}")]
  LaunchTimeout(Duration),

  #[error("no instance with id {0}")]
  UnknownInstance(InstanceId),

  #[error("instance {id} cannot go from {from} to {to}")]
  InvalidTransition {
    id: InstanceId,
    from: LaunchState,
    to: LaunchState,
  },
}

impl HostError {
  /// Taxonomy class, or `None` for caller mistakes.
  pub fn kind(&self) -> Option<ErrorKind> {
    match self {
      HostError::Resource { .. } => Some(ErrorKind::ManifestUnreadable),
      HostError::Launch(e) => Some(e.kind()),
      HostError::UnknownEntryPoint(_) | HostError::NoEntryPoint(_) | HostError::AmbiguousEntryPoint { .. } => {
        Some(ErrorKind::AmbiguousEntryPoint)
      }
      HostError::Boundary(_) | HostError::LaunchFailed(_) | HostError::LaunchTimeout(_) => Some(ErrorKind::LaunchFailed),
      HostError::UnknownInstance(_) | HostError::InvalidTransition { .. } => None,
    }
  }

  fn from_selection(selection: Selection, name: &str) -> Self {
    match selection {
      Selection::Unknown(entry) => HostError::UnknownEntryPoint(entry),
      Selection::None => HostError::NoEntryPoint(name.to_string()),
      Selection::Ambiguous(candidates) => HostError::AmbiguousEntryPoint {
        name: name.to_string(),
        candidates,
      },
    }
  }
}

/// Host-wide settings.
#[derive(Debug, Clone)]
pub struct HostConfig {
  /// How long deploy waits for an application to start.
  pub launch_timeout: Duration,
  pub delegation: Delegation,
  pub parent: ParentSource,
  /// Defaults for every deploy; name, profiles and properties come from the
  /// request.
  pub launch: LaunchOptions,
}

impl Default for HostConfig {
  fn default() -> Self {
    Self {
      launch_timeout: Duration::from_secs(DEFAULT_LAUNCH_TIMEOUT_SECS),
      delegation: Delegation::default(),
      parent: ParentSource::default(),
      launch: LaunchOptions::default(),
    }
  }
}

/// Parameters of one deploy.
#[derive(Debug, Clone, Default)]
pub struct DeployRequest {
  pub resource: PathBuf,
  /// Override-file base name; also the instance's display name.
  pub name: Option<String>,
  pub profiles: Vec<String>,
  pub properties: BTreeMap<String, String>,
  pub args: Vec<String>,
}

impl DeployRequest {
  pub fn new(resource: impl Into<PathBuf>) -> Self {
    Self {
      resource: resource.into(),
      ..Default::default()
    }
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }

  pub fn profiles<I, S>(mut self, profiles: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.profiles = profiles.into_iter().map(Into::into).collect();
    self
  }

  pub fn property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.properties.insert(key.into(), value.into());
    self
  }

  pub fn args<I, S>(mut self, args: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.args = args.into_iter().map(Into::into).collect();
    self
  }
}

type LaunchOutcome = Result<Box<dyn HostedApplication>, String>;

/// Hosts applications in isolation boundaries.
pub struct RuntimeHost {
  resolver: Arc<dyn Resolver>,
  entry_points: EntryPoints,
  host_loader: Arc<dyn Loader>,
  extensions: Arc<ExtensionRegistry>,
  config: HostConfig,
  instances: DashMap<InstanceId, Arc<Mutex<ApplicationInstance>>>,
  /// Snapshots of instances locked for a launch or a stop, so listings do
  /// not wait on them.
  busy: DashMap<InstanceId, InstanceStatus>,
}

impl RuntimeHost {
  pub fn new(resolver: Arc<dyn Resolver>, entry_points: EntryPoints, config: HostConfig) -> Self {
    let platform: Arc<dyn Loader> = Arc::new(PlatformLoader::new("platform"));
    Self {
      resolver,
      entry_points,
      host_loader: Arc::new(PlatformLoader::new("host").with_parent(platform)),
      extensions: ExtensionRegistry::global(),
      config,
      instances: DashMap::new(),
      busy: DashMap::new(),
    }
  }

  /// Replace the loader standing in for the host process.
  pub fn with_host_loader(mut self, loader: Arc<dyn Loader>) -> Self {
    self.host_loader = loader;
    self
  }

  /// Use a private extension registry instead of the process-wide one.
  pub fn with_extensions(mut self, extensions: Arc<ExtensionRegistry>) -> Self {
    self.extensions = extensions;
    self
  }

  pub fn config(&self) -> &HostConfig {
    &self.config
  }

  /// Instance id of a resource without deploying it.
  pub fn instance_id(resource: &Path) -> Result<InstanceId, HostError> {
    fingerprint_path(resource).map_err(|source| HostError::Resource {
      path: resource.to_path_buf(),
      source,
    })
  }

  /// Deploy an archive and wait for it to start, finish, or fail.
  ///
  /// Deploying a resource that is already running returns its id without
  /// launching it again.
  ///
  /// # Errors
  ///
  /// Returns an error only for fatal failures (unreadable manifest, failed
  /// resolution, no usable entry point). Launch failures are recorded on
  /// the instance and reported by [`status`](Self::status).
  pub fn deploy(&self, request: DeployRequest) -> Result<InstanceId, HostError> {
    let id = Self::instance_id(&request.resource)?;
    let name = request.name.clone().unwrap_or_else(|| DEFAULT_LAYER_NAME.to_string());

    let instance = self
      .instances
      .entry(id.clone())
      .or_insert_with(|| {
        debug!(id = %id, resource = %request.resource.display(), "registering instance");
        Arc::new(Mutex::new(ApplicationInstance::new(
          id.clone(),
          request.resource.clone(),
          name.clone(),
          request.profiles.clone(),
        )))
      })
      .clone();
    let mut instance = lock(&instance);

    self.refresh(&mut instance);
    if instance.state().is_running() {
      info!(id = %id, "already running");
      return Ok(id);
    }
    if instance.has_boundary() {
      debug!(id = %id, "releasing boundary left by a previous launch");
      instance.release(&self.extensions);
    }

    instance.configure(name.clone(), request.profiles.clone());
    instance.transition_to(LaunchState::Launching)?;
    info!(id = %id, name = %name, resource = %request.resource.display(), "deploying");

    self.busy.insert(id.clone(), instance.status());
    let launched = self.launch(&mut instance, &request, &id, &name);
    self.busy.remove(&id);

    match launched {
      Ok(()) => Ok(id),
      Err(e) => {
        instance.fail(e.kind().unwrap_or(ErrorKind::LaunchFailed), e.to_string());
        if !matches!(e, HostError::LaunchTimeout(_)) {
          instance.release(&self.extensions);
        }
        match e.kind() {
          Some(kind) if kind.is_fatal() => Err(e),
          _ => Ok(id),
        }
      }
    }
  }

  fn launch(
    &self,
    instance: &mut ApplicationInstance,
    request: &DeployRequest,
    id: &InstanceId,
    name: &str,
  ) -> Result<(), HostError> {
    let options = LaunchOptions {
      name: name.to_string(),
      profiles: request.profiles.clone(),
      properties: request.properties.clone(),
      ..self.config.launch.clone()
    };
    let prepared = Launcher::new(self.resolver.as_ref(), options).prepare(&request.resource)?;

    let parent = self.config.parent.select(&self.host_loader);
    let boundary = IsolationBoundary::new(name, &prepared.classpath, self.config.delegation, parent)?;
    instance.attach(Arc::clone(&boundary), None);

    let factory = self
      .entry_points
      .select(&prepared.manifest.launch, &boundary)
      .map_err(|selection| HostError::from_selection(selection, name))?;
    debug!(id = %id, entry = factory.name(), "launching entry point");

    let owner = boundary.id();
    let extensions = Arc::clone(&self.extensions);

    let context = LaunchContext {
      id: id.clone(),
      name: name.to_string(),
      resource: request.resource.clone(),
      main: prepared.manifest.launch.main.clone(),
      properties: prepared.properties(),
      args: request.args.clone(),
      profiles: request.profiles.clone(),
      classpath: prepared.classpath.clone(),
      extensions: ExtensionScope::new(Arc::clone(&self.extensions), boundary.id()),
      boundary,
    };

    // Zero capacity: a send either reaches a waiting deploy or fails, so a
    // late outcome is never parked in the channel and dropped unclosed.
    let (tx, rx) = mpsc::sync_channel::<LaunchOutcome>(0);
    thread::Builder::new()
      .name(format!("launch-{name}"))
      .spawn(move || {
        let outcome = {
          let _entered = boundary::context::enter(Arc::clone(&context.boundary));
          let started = catch_unwind(AssertUnwindSafe(|| -> Result<Box<dyn HostedApplication>, AppError> {
            let app = factory.create(&context)?;
            app.run(&context)?;
            Ok(app)
          }));
          match started {
            Ok(Ok(app)) => Ok(app),
            Ok(Err(e)) => Err(e.to_string()),
            Err(payload) => Err(panic_message(payload)),
          }
        };
        // Drop the worker's references before handing over, so a release
        // right after the handover sees the boundary as unreferenced.
        drop(context);
        drop(factory);

        // The deploy gave up waiting and may already have released the
        // boundary, so clean up whatever the late start left behind.
        if let Err(mpsc::SendError(outcome)) = tx.send(outcome) {
          warn!(boundary = %owner, "launch finished after its deploy timed out; cleaning up");
          if let Ok(app) = outcome
            && let Err(e) = app.close()
          {
            warn!(boundary = %owner, error = %e, "failed to close abandoned application");
          }
          if let Err(e) = extensions.release(owner) {
            warn!(boundary = %owner, error = %e, "failed to release extensions of abandoned application");
          }
        }
      })
      .map_err(|e| HostError::LaunchFailed(format!("cannot start launch worker: {e}")))?;

    match rx.recv_timeout(self.config.launch_timeout) {
      Ok(Ok(app)) => {
        let error = app.error();
        let running = app.is_running();
        instance.attach_app(app);
        if let Some(error) = error {
          return Err(HostError::LaunchFailed(error));
        }
        if running {
          instance.transition_to(LaunchState::Running)?;
          info!(id = %id, "application running");
        } else {
          instance.transition_to(LaunchState::Complete)?;
          info!(id = %id, "application completed during startup");
          instance.release(&self.extensions);
        }
        Ok(())
      }
      Ok(Err(message)) => Err(HostError::LaunchFailed(message)),
      Err(RecvTimeoutError::Timeout) => {
        warn!(id = %id, timeout = ?self.config.launch_timeout, "launch timed out; abandoning worker");
        Err(HostError::LaunchTimeout(self.config.launch_timeout))
      }
      Err(RecvTimeoutError::Disconnected) => Err(HostError::LaunchFailed(
        "launch worker exited without reporting".to_string(),
      )),
    }
  }

  /// Current state of an instance.
  ///
  /// An application that stopped on its own is moved to `complete` or
  /// `failed` and cleaned up before the state is reported.
  pub fn status(&self, id: &InstanceId) -> Result<InstanceStatus, HostError> {
    let instance = self.get(id)?;
    let mut instance = lock(&instance);
    self.refresh(&mut instance);
    if !instance.state().is_running() && instance.has_boundary() {
      instance.release(&self.extensions);
    }
    Ok(instance.status())
  }

  /// Stop a running instance. A no-op for instances that are not running.
  pub fn cancel(&self, id: &InstanceId) -> Result<LaunchState, HostError> {
    let instance = self.get(id)?;
    let mut instance = lock(&instance);
    self.refresh(&mut instance);
    if !instance.state().is_running() {
      debug!(id = %id, state = %instance.state(), "not running; nothing to cancel");
      return Ok(instance.state());
    }

    instance.transition_to(LaunchState::Cancelled)?;
    self.busy.insert(id.clone(), instance.status());
    instance.release(&self.extensions);
    self.busy.remove(id);
    info!(id = %id, state = %instance.state(), "cancelled");
    Ok(instance.state())
  }

  /// Cancel an instance and release anything a previous launch left behind.
  /// Undeploying twice is a no-op.
  pub fn undeploy(&self, id: &InstanceId) -> Result<LaunchState, HostError> {
    self.cancel(id)?;
    let instance = self.get(id)?;
    let mut instance = lock(&instance);
    if instance.has_boundary() {
      instance.release(&self.extensions);
    }
    Ok(instance.state())
  }

  /// Undeploy every instance.
  pub fn shutdown(&self) {
    let ids: Vec<InstanceId> = self.instances.iter().map(|e| e.key().clone()).collect();
    for id in ids {
      if let Err(e) = self.undeploy(&id) {
        warn!(id = %id, error = %e, "failed to undeploy during shutdown");
      }
    }
  }

  /// Every known instance.
  ///
  /// An instance that is being launched or stopped is reported as it was
  /// when that started, without waiting for it to finish.
  pub fn instances(&self) -> Vec<InstanceStatus> {
    let handles: Vec<(InstanceId, Arc<Mutex<ApplicationInstance>>)> = self
      .instances
      .iter()
      .map(|e| (e.key().clone(), Arc::clone(e.value())))
      .collect();
    let mut statuses: Vec<InstanceStatus> = handles.iter().map(|(id, handle)| self.snapshot(id, handle)).collect();
    statuses.sort_by(|a, b| a.id.cmp(&b.id));
    statuses
  }

  /// A component published by a running application.
  pub fn component<T: Any + Send + Sync>(&self, id: &InstanceId, name: &str) -> Result<Lookup<Arc<T>>, HostError> {
    let instance = self.get(id)?;
    let instance = lock(&instance);
    Ok(
      instance
        .app()
        .and_then(|app| app.components())
        .map(|registry| registry.get::<T>(name))
        .unwrap_or(Lookup::NotFound),
    )
  }

  /// Every component of type `T` published by a running application.
  pub fn components_of_type<T: Any + Send + Sync>(&self, id: &InstanceId) -> Result<Vec<(String, Arc<T>)>, HostError> {
    let instance = self.get(id)?;
    let instance = lock(&instance);
    Ok(
      instance
        .app()
        .and_then(|app| app.components())
        .map(|registry| registry.of_type::<T>())
        .unwrap_or_default(),
    )
  }

  fn snapshot(&self, id: &InstanceId, handle: &Mutex<ApplicationInstance>) -> InstanceStatus {
    loop {
      match handle.try_lock() {
        Ok(instance) => return instance.status(),
        Err(TryLockError::Poisoned(e)) => return e.into_inner().status(),
        Err(TryLockError::WouldBlock) => {
          if let Some(busy) = self.busy.get(id) {
            return busy.value().clone();
          }
          // Held briefly, or about to be published as busy.
          thread::yield_now();
        }
      }
    }
  }

  fn get(&self, id: &InstanceId) -> Result<Arc<Mutex<ApplicationInstance>>, HostError> {
    self
      .instances
      .get(id)
      .map(|entry| Arc::clone(entry.value()))
      .ok_or_else(|| HostError::UnknownInstance(id.clone()))
  }

  /// Pick up an application that stopped since the last look.
  fn refresh(&self, instance: &mut ApplicationInstance) {
    if !instance.state().is_running() {
      return;
    }
    let Some(app) = instance.app() else {
      return;
    };
    if app.is_running() {
      return;
    }
    match app.error() {
      Some(error) => instance.fail(ErrorKind::LaunchFailed, error),
      None => {
        if let Err(e) = instance.transition_to(LaunchState::Complete) {
          warn!(error = %e, "unexpected state while completing");
        }
      }
    }
    instance.release(&self.extensions);
  }
}

impl Drop for RuntimeHost {
  fn drop(&mut self) {
    self.shutdown();
  }
}

fn lock(instance: &Mutex<ApplicationInstance>) -> MutexGuard<'_, ApplicationInstance> {
  instance.lock().unwrap_or_else(|e| e.into_inner())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
  let detail = payload
    .downcast_ref::<&str>()
    .map(|s| s.to_string())
    .or_else(|| payload.downcast_ref::<String>().cloned())
    .unwrap_or_else(|| "unknown panic".to_string());
  format!("application panicked during startup: {detail}")
}
