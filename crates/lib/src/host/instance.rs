//! Application instance records.

use std::path::PathBuf;
use std::sync::{Arc, Weak};

use serde::Serialize;
use tracing::{debug, error, warn};

use super::HostError;
use super::contract::HostedApplication;
use super::extensions::ExtensionRegistry;
use super::state::LaunchState;
use crate::boundary::{BoundaryId, IsolationBoundary};
use crate::error::ErrorKind;
use crate::util::hash::Fingerprint;

/// Stable instance identifier: the fingerprint of the resource path.
pub type InstanceId = Fingerprint;

/// One deployed (or previously deployed) application.
pub struct ApplicationInstance {
  id: InstanceId,
  resource: PathBuf,
  name: String,
  profiles: Vec<String>,
  state: LaunchState,
  error: Option<(ErrorKind, String)>,
  boundary: Option<Arc<IsolationBoundary>>,
  app: Option<Box<dyn HostedApplication>>,
  /// The last closed boundary, kept weakly to detect leaks.
  released: Option<Weak<IsolationBoundary>>,
  launches: u32,
}

/// A point-in-time view of an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstanceStatus {
  pub id: InstanceId,
  pub resource: PathBuf,
  pub name: String,
  pub profiles: Vec<String>,
  pub state: LaunchState,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  /// Class of the recorded error: `launch-failed` for applications that
  /// failed to start or stopped with an error, `cleanup-failed` for a
  /// teardown that went wrong.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error_kind: Option<ErrorKind>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub boundary: Option<BoundaryId>,
  /// A closed boundary is still referenced somewhere.
  pub leaked: bool,
  pub launches: u32,
}

impl ApplicationInstance {
  pub(crate) fn new(id: InstanceId, resource: PathBuf, name: String, profiles: Vec<String>) -> Self {
    Self {
      id,
      resource,
      name,
      profiles,
      state: LaunchState::Unknown,
      error: None,
      boundary: None,
      app: None,
      released: None,
      launches: 0,
    }
  }

  pub fn id(&self) -> &InstanceId {
    &self.id
  }

  pub fn state(&self) -> LaunchState {
    self.state
  }

  pub fn has_boundary(&self) -> bool {
    self.boundary.is_some()
  }

  pub(crate) fn app(&self) -> Option<&dyn HostedApplication> {
    self.app.as_deref()
  }

  pub(crate) fn configure(&mut self, name: String, profiles: Vec<String>) {
    self.name = name;
    self.profiles = profiles;
  }

  pub(crate) fn transition_to(&mut self, next: LaunchState) -> Result<(), HostError> {
    if !self.state.can_transition_to(next) {
      return Err(HostError::InvalidTransition {
        id: self.id.clone(),
        from: self.state,
        to: next,
      });
    }
    debug!(id = %self.id, from = %self.state, to = %next, "state change");
    if next == LaunchState::Launching {
      self.launches += 1;
      self.error = None;
    }
    self.state = next;
    Ok(())
  }

  /// Move to `failed` with an error, from wherever the instance is.
  pub(crate) fn fail(&mut self, kind: ErrorKind, message: String) {
    let next = if self.state.can_transition_to(LaunchState::Failed) {
      LaunchState::Failed
    } else {
      LaunchState::Error
    };
    error!(id = %self.id, name = %self.name, kind = %kind, error = %message, "application failed");
    self.error = Some((kind, message));
    self.state = next;
  }

  pub(crate) fn attach(&mut self, boundary: Arc<IsolationBoundary>, app: Option<Box<dyn HostedApplication>>) {
    self.boundary = Some(boundary);
    self.app = app;
  }

  pub(crate) fn attach_app(&mut self, app: Box<dyn HostedApplication>) {
    self.app = Some(app);
  }

  /// Close the application and its boundary.
  ///
  /// 1. Ask the application to stop
  /// 2. Release the extensions its boundary installed
  /// 3. Close the boundary and drop every strong reference the host holds
  ///
  /// Failures move the instance to `error`; the rest of the sequence still
  /// runs and the instance stays redeployable.
  pub(crate) fn release(&mut self, extensions: &ExtensionRegistry) {
    let mut failures = Vec::new();

    if let Some(app) = self.app.take() {
      if let Err(e) = app.close() {
        failures.push(format!("close failed: {e}"));
      }
      drop(app);
    }

    if let Some(boundary) = self.boundary.take() {
      if let Err(e) = extensions.release(boundary.id()) {
        failures.push(e.to_string());
      }
      boundary.close();
      let weak = Arc::downgrade(&boundary);
      drop(boundary);
      if weak.strong_count() > 0 {
        warn!(id = %self.id, strong = weak.strong_count(), "boundary still referenced after close");
      }
      self.released = Some(weak);
    }

    if !failures.is_empty() {
      let message = failures.join("; ");
      error!(id = %self.id, error = %message, "cleanup failed");
      self.error = Some((ErrorKind::CleanupFailed, message));
      self.state = LaunchState::Error;
    }
  }

  pub fn status(&self) -> InstanceStatus {
    InstanceStatus {
      id: self.id.clone(),
      resource: self.resource.clone(),
      name: self.name.clone(),
      profiles: self.profiles.clone(),
      state: self.state,
      error: self.error.as_ref().map(|(_, message)| message.clone()),
      error_kind: self.error.as_ref().map(|(kind, _)| *kind),
      boundary: self.boundary.as_ref().map(|b| b.id()),
      leaked: self.released.as_ref().is_some_and(|w| w.strong_count() > 0),
      launches: self.launches,
    }
  }
}
