//! Process-private write end of an out-port.

use super::{Ack, Delivery, Reader};
use crate::config::Config;
use crate::pipe::{PipeReceiver, ReadPipe, WritePipe};
use crate::process::Process;
use crate::signal::Signal;
use crate::types::{Packet, WriterId};
use std::sync::Arc;
use tracing::{trace, warn};

/// Writes packets to linked readers and receives their acknowledgments.
pub struct Writer<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  id: WriterId,
  /// Owning process.
  process: Process,
  /// Broadcast to every linked reader.
  pipe: WritePipe<Delivery<T>>,
  /// Where readers send acknowledgments; travels with each delivery.
  replies: ReadPipe<Ack<T>>,
  replies_rx: PipeReceiver<Ack<T>>,
}

impl<T: Send + Sync + 'static> Writer<T> {
  pub fn new(process: &Process, config: &Config) -> Self {
    let replies = ReadPipe::with_config(config);
    let replies_rx = replies.read();
    Self {
      inner: Arc::new(Inner {
        id: WriterId::next(),
        process: process.clone(),
        pipe: WritePipe::new(),
        replies,
        replies_rx,
      }),
    }
  }

  /// Sends `packet` to every linked reader. Returns how many accepted it,
  /// which is also how many acknowledgments to expect.
  pub fn write(&self, packet: Packet<T>) -> usize {
    if self.is_closed() {
      warn!(writer = %self.inner.id, packet = %packet.id(), "write on closed writer dropped");
      return 0;
    }
    let accepted = self.inner.pipe.write(Delivery {
      packet,
      reply: self.inner.replies.clone(),
    });
    trace!(writer = %self.inner.id, accepted, "writer wrote packet");
    accepted
  }

  pub fn link(&self, reader: &Reader<T>) -> bool {
    self.inner.pipe.link(reader.pipe())
  }
}

impl<T> Writer<T> {
  pub fn id(&self) -> WriterId {
    self.inner.id
  }

  pub fn process(&self) -> &Process {
    &self.inner.process
  }

  /// Next acknowledgment, or `None` once the writer is closed.
  pub async fn receive(&self) -> Option<Ack<T>> {
    self.inner.replies_rx.recv().await
  }

  pub fn unlink(&self, reader: &Reader<T>) -> bool {
    self.inner.pipe.unlink(reader.pipe())
  }

  pub fn links(&self) -> usize {
    self.inner.pipe.links()
  }

  /// Unlinks every reader and stops acknowledgment delivery. Idempotent.
  pub fn close(&self) {
    self.inner.pipe.close();
    self.inner.replies.close();
  }

  pub fn is_closed(&self) -> bool {
    self.inner.replies.is_closed()
  }

  pub fn done(&self) -> Signal {
    self.inner.replies.done()
  }
}

impl<T> Clone for Writer<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}
