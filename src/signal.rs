//! One-shot broadcast completion signal.
//!
//! A [Signal] starts unfired and can be fired exactly once. Any number of
//! clones may wait on it; all of them observe the same transition.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared one-shot signal. Cloning shares the underlying state.
#[derive(Clone, Debug)]
pub struct Signal {
  tx: Arc<watch::Sender<bool>>,
}

impl Signal {
  pub fn new() -> Self {
    let (tx, _rx) = watch::channel(false);
    Self { tx: Arc::new(tx) }
  }

  /// A signal that is already fired.
  pub fn fired() -> Self {
    let signal = Self::new();
    signal.fire();
    signal
  }

  /// Fires the signal. Returns `true` only for the call that performed the transition.
  pub fn fire(&self) -> bool {
    self.tx.send_if_modified(|fired| {
      if *fired {
        false
      } else {
        *fired = true;
        true
      }
    })
  }

  pub fn is_fired(&self) -> bool {
    *self.tx.borrow()
  }

  /// Resolves once the signal has fired (immediately if it already has).
  pub async fn wait(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives as long as `self`, so this only returns once fired.
    let _ = rx.wait_for(|fired| *fired).await;
  }
}

impl Default for Signal {
  fn default() -> Self {
    Self::new()
  }
}
