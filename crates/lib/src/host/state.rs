//! Launch state machine.

use std::fmt;

use serde::Serialize;

/// Lifecycle state of one application instance.
///
/// ```text
/// unknown -> launching -> running | complete | failed
/// running -> cancelled | complete | failed
/// complete | failed | cancelled | error -> launching   (redeploy)
/// any -> error
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LaunchState {
  #[default]
  Unknown,
  Launching,
  Running,
  Complete,
  Failed,
  Cancelled,
  Error,
}

impl LaunchState {
  pub fn can_transition_to(self, next: LaunchState) -> bool {
    use LaunchState::*;
    match (self, next) {
      (_, Error) => true,
      (Unknown, Launching) => true,
      (Launching, Running | Complete | Failed) => true,
      (Running, Cancelled | Complete | Failed) => true,
      (Complete | Failed | Cancelled | Error, Launching) => true,
      _ => false,
    }
  }

  pub fn is_running(self) -> bool {
    self == LaunchState::Running
  }

  /// No further progress happens without a redeploy.
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      LaunchState::Complete | LaunchState::Failed | LaunchState::Cancelled | LaunchState::Error
    )
  }
}

impl fmt::Display for LaunchState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      LaunchState::Unknown => "unknown",
      LaunchState::Launching => "launching",
      LaunchState::Running => "running",
      LaunchState::Complete => "complete",
      LaunchState::Failed => "failed",
      LaunchState::Cancelled => "cancelled",
      LaunchState::Error => "error",
    };
    f.write_str(s)
  }
}

#[cfg(test)]
mod tests {
  use super::LaunchState::*;
  use super::*;

  #[test]
  fn launch_path() {
    assert!(Unknown.can_transition_to(Launching));
    assert!(Launching.can_transition_to(Running));
    assert!(Launching.can_transition_to(Complete));
    assert!(Launching.can_transition_to(Failed));
    assert!(Running.can_transition_to(Cancelled));
  }

  #[test]
  fn rejected_transitions() {
    assert!(!Unknown.can_transition_to(Running));
    assert!(!Launching.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Running));
    assert!(!Running.can_transition_to(Launching));
  }

  #[test]
  fn error_from_anywhere_and_redeploy_from_terminal() {
    for state in [Unknown, Launching, Running, Complete, Failed, Cancelled, Error] {
      assert!(state.can_transition_to(Error));
      assert_eq!(state.can_transition_to(Launching), state == Unknown || state.is_terminal());
    }
  }
}
