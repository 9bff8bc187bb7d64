//! Identity newtypes.
//!
//! Numeric ids come from process-wide monotonic counters, so a freed identity
//! is never handed out again and stale bookkeeping can't alias a new object.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

macro_rules! counter_id {
  ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
    $(#[$meta])*
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct $name(u64);

    impl $name {
      /// Allocates the next unused id.
      pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
      }
    }

    impl fmt::Display for $name {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, concat!($prefix, "#{}"), self.0)
      }
    }
  };
}

counter_id!(
  /// Identity of a [crate::Packet].
  PacketId,
  "packet"
);
counter_id!(
  /// Identity of a read-side pipe.
  PipeId,
  "pipe"
);
counter_id!(
  /// Identity of a [crate::port::Reader].
  ReaderId,
  "reader"
);
counter_id!(
  /// Identity of a [crate::port::Writer].
  WriterId,
  "writer"
);
counter_id!(
  /// Identity of an in- or out-port.
  PortId,
  "port"
);

/// Identity of a [crate::Process].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProcessId(Uuid);

impl ProcessId {
  pub fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl Default for ProcessId {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Display for ProcessId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    self.0.fmt(f)
  }
}
