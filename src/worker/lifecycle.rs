//! Controller lifecycle states and the transitions allowed between them.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WorkerState {
  #[default]
  Uninstalled,
  /// Fetching and storing the install manifest
  Installing,
  /// Installed, waiting to activate
  Installed,
  /// Evicting stale buckets
  Activating,
  /// Intercepting fetch, sync and push events
  Active,
  /// Failed or replaced; receives no more events
  Redundant,
}

impl WorkerState {
  pub fn as_str(&self) -> &'static str {
    match self {
      WorkerState::Uninstalled => "uninstalled",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Active => "active",
      WorkerState::Redundant => "redundant",
    }
  }

  pub fn can_transition_to(self, to: WorkerState) -> bool {
    use WorkerState::*;

    matches!(
      (self, to),
      (Uninstalled, Installing)
        | (Installing, Installed)
        | (Installing, Redundant)
        | (Installed, Activating)
        | (Installed, Redundant)
        | (Activating, Active)
        | (Activating, Redundant)
        | (Active, Redundant)
    )
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[cfg(test)]
mod tests {
  use super::WorkerState::*;

  #[test]
  fn test_happy_path() {
    assert!(Uninstalled.can_transition_to(Installing));
    assert!(Installing.can_transition_to(Installed));
    assert!(Installed.can_transition_to(Activating));
    assert!(Activating.can_transition_to(Active));
    assert!(Active.can_transition_to(Redundant));
  }

  #[test]
  fn test_failures_go_redundant() {
    assert!(Installing.can_transition_to(Redundant));
    assert!(Activating.can_transition_to(Redundant));
  }

  #[test]
  fn test_no_skipping_or_reviving() {
    assert!(!Uninstalled.can_transition_to(Active));
    assert!(!Installing.can_transition_to(Active));
    assert!(!Redundant.can_transition_to(Installing));
    assert!(!Active.can_transition_to(Installing));
    assert!(!Installed.can_transition_to(Installed));
  }
}
