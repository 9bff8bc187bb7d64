//! Identity-bearing packet wrapper.

use super::PacketId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// One unit of work flowing through the graph.
///
/// Packets compare and hash by identity, never by payload: two packets with
/// equal payloads are still distinct entries in a [crate::Tracer]. Cloning a
/// packet yields another handle to the same identity.
pub struct Packet<T> {
  id: PacketId,
  payload: Arc<T>,
}

impl<T> Packet<T> {
  pub fn new(payload: T) -> Self {
    Self::from_arc(Arc::new(payload))
  }

  pub fn from_arc(payload: Arc<T>) -> Self {
    Self {
      id: PacketId::next(),
      payload,
    }
  }

  pub fn id(&self) -> PacketId {
    self.id
  }

  pub fn payload(&self) -> &T {
    &self.payload
  }

  pub fn payload_arc(&self) -> &Arc<T> {
    &self.payload
  }

  /// Mints a new packet identity sharing this packet's payload.
  pub fn carry(&self) -> Self {
    Self::from_arc(Arc::clone(&self.payload))
  }
}

impl<T> Clone for Packet<T> {
  fn clone(&self) -> Self {
    Self {
      id: self.id,
      payload: Arc::clone(&self.payload),
    }
  }
}

impl<T> PartialEq for Packet<T> {
  fn eq(&self, other: &Self) -> bool {
    self.id == other.id
  }
}

impl<T> Eq for Packet<T> {}

impl<T> Hash for Packet<T> {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.id.hash(state);
  }
}

impl<T: fmt::Debug> fmt::Debug for Packet<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Packet")
      .field("id", &self.id)
      .field("payload", &self.payload)
      .finish()
  }
}
