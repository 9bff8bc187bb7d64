//! Per-invocation execution context.
//!
//! Every workflow invocation runs under its own [Process]. Ports open a
//! private reader/writer pair per process and tear it down when the process
//! exits, so concurrent invocations never see each other's packets.

use crate::signal::Signal;
use crate::types::ProcessId;
use std::sync::Arc;
use tracing::debug;

/// Handle to an execution context. Cloning shares the same process.
#[derive(Clone, Debug)]
pub struct Process {
  inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
  id: ProcessId,
  exited: Signal,
}

impl Process {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Inner {
        id: ProcessId::new(),
        exited: Signal::new(),
      }),
    }
  }

  pub fn id(&self) -> ProcessId {
    self.inner.id
  }

  /// Ends the process. Idempotent; returns `true` for the call that ended it.
  pub fn exit(&self) -> bool {
    let exited = self.inner.exited.fire();
    if exited {
      debug!(process = %self.inner.id, "process exited");
    }
    exited
  }

  pub fn is_exited(&self) -> bool {
    self.inner.exited.is_fired()
  }

  /// Resolves once the process has exited.
  pub async fn done(&self) {
    self.inner.exited.wait().await;
  }

  pub(crate) fn exit_signal(&self) -> Signal {
    self.inner.exited.clone()
  }
}

impl Default for Process {
  fn default() -> Self {
    Self::new()
  }
}

impl PartialEq for Process {
  fn eq(&self, other: &Self) -> bool {
    self.inner.id == other.inner.id
  }
}

impl Eq for Process {}
