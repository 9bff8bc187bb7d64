//! Ports: named connection points backed by per-process pipes.
//!
//! An [OutPort] linked to an [InPort] describes topology only. Opening either
//! port for a [crate::Process] yields that process's private [Writer] or
//! [Reader]; the forward pipe carries packets, and each delivered packet
//! remembers the reply pipe of the writer that emitted it so acknowledgments
//! travel back to exactly that writer.

mod in_port;
mod out_port;
#[cfg(test)]
mod port_test;
mod reader;
mod writer;

pub use in_port::InPort;
pub use out_port::OutPort;
pub use reader::Reader;
pub use writer::Writer;

use crate::pipe::ReadPipe;
use crate::types::Packet;

/// Acknowledgment sent back along a write.
#[derive(Debug)]
pub struct Ack<T> {
  /// The packet as it was written.
  pub written: Packet<T>,
  /// Result carried back, or `None` when the packet was discarded.
  pub outcome: Option<Packet<T>>,
}

impl<T> Clone for Ack<T> {
  fn clone(&self) -> Self {
    Self {
      written: self.written.clone(),
      outcome: self.outcome.clone(),
    }
  }
}

/// What travels on a forward pipe: the packet plus where to reply.
pub(crate) struct Delivery<T> {
  pub(crate) packet: Packet<T>,
  pub(crate) reply: ReadPipe<Ack<T>>,
}

impl<T> Clone for Delivery<T> {
  fn clone(&self) -> Self {
    Self {
      packet: self.packet.clone(),
      reply: self.reply.clone(),
    }
  }
}
