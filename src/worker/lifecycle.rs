//! Worker lifecycle state machine.

use color_eyre::{eyre::eyre, Result};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// Lifecycle states of one cache manager instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, install not yet run
  Parsed,
  Installing,
  /// Manifest cached, waiting to activate
  Installed,
  Activating,
  /// Stale namespaces purged, controlling clients
  Activated,
  /// Install failed; this instance must not serve
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(s)
  }
}

#[derive(Debug)]
pub struct Lifecycle {
  state: Mutex<WorkerState>,
  skip_waiting: AtomicBool,
  clients_claimed: AtomicBool,
}

impl Default for Lifecycle {
  fn default() -> Self {
    Self {
      state: Mutex::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
      clients_claimed: AtomicBool::new(false),
    }
  }
}

impl Lifecycle {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Redundant)
  }

  /// Move to `to` if the current state is one of `from`.
  fn transition(&self, from: &[WorkerState], to: WorkerState) -> Result<()> {
    let mut state = self
      .state
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !from.contains(&state) {
      return Err(eyre!(
        "Invalid worker state: cannot move from {} to {}",
        *state,
        to
      ));
    }
    *state = to;
    Ok(())
  }

  pub fn begin_install(&self) -> Result<()> {
    self.transition(
      &[WorkerState::Parsed, WorkerState::Redundant],
      WorkerState::Installing,
    )
  }

  pub fn finish_install(&self, success: bool) -> Result<()> {
    let to = if success {
      WorkerState::Installed
    } else {
      WorkerState::Redundant
    };
    self.transition(&[WorkerState::Installing], to)
  }

  /// Accept an installation completed by an earlier instance.
  pub fn adopt_install(&self) -> Result<()> {
    self.transition(
      &[WorkerState::Parsed, WorkerState::Installed],
      WorkerState::Installed,
    )
  }

  pub fn begin_activate(&self) -> Result<()> {
    self.transition(
      &[WorkerState::Installed, WorkerState::Activated],
      WorkerState::Activating,
    )
  }

  /// `success == false` returns to `Installed` so activation can be retried.
  pub fn finish_activate(&self, success: bool) -> Result<()> {
    let to = if success {
      WorkerState::Activated
    } else {
      WorkerState::Installed
    };
    self.transition(&[WorkerState::Activating], to)
  }

  /// Take over without waiting for clients of the previous version to close.
  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  pub fn skips_waiting(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Start controlling every open client without a reload.
  pub fn claim_clients(&self) {
    self.clients_claimed.store(true, Ordering::SeqCst);
  }

  pub fn controls_clients(&self) -> bool {
    self.clients_claimed.load(Ordering::SeqCst)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_happy_path() {
    let lifecycle = Lifecycle::new();
    assert_eq!(lifecycle.state(), WorkerState::Parsed);

    lifecycle.begin_install().unwrap();
    lifecycle.finish_install(true).unwrap();
    lifecycle.begin_activate().unwrap();
    lifecycle.finish_activate(true).unwrap();

    assert_eq!(lifecycle.state(), WorkerState::Activated);
  }

  #[test]
  fn test_activate_before_install_rejected() {
    let lifecycle = Lifecycle::new();

    let err = lifecycle.begin_activate().unwrap_err();
    assert!(err.to_string().contains("parsed"));
    assert_eq!(lifecycle.state(), WorkerState::Parsed);
  }

  #[test]
  fn test_failed_install_is_redundant_and_retryable() {
    let lifecycle = Lifecycle::new();
    lifecycle.begin_install().unwrap();
    lifecycle.finish_install(false).unwrap();

    assert_eq!(lifecycle.state(), WorkerState::Redundant);
    assert!(lifecycle.begin_activate().is_err());
    assert!(lifecycle.begin_install().is_ok());
  }

  #[test]
  fn test_failed_activate_can_retry() {
    let lifecycle = Lifecycle::new();
    lifecycle.adopt_install().unwrap();
    lifecycle.begin_activate().unwrap();
    lifecycle.finish_activate(false).unwrap();

    assert_eq!(lifecycle.state(), WorkerState::Installed);
    assert!(lifecycle.begin_activate().is_ok());
  }

  #[test]
  fn test_flags() {
    let lifecycle = Lifecycle::new();
    assert!(!lifecycle.skips_waiting());
    assert!(!lifecycle.controls_clients());

    lifecycle.skip_waiting();
    lifecycle.claim_clients();

    assert!(lifecycle.skips_waiting());
    assert!(lifecycle.controls_clients());
  }
}
