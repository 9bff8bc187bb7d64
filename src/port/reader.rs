//! Process-private read end of an in-port.

use super::{Ack, Delivery};
use crate::config::Config;
use crate::pipe::{PipeReceiver, ReadPipe};
use crate::process::Process;
use crate::signal::Signal;
use crate::types::{Packet, PacketId, ReaderId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Reads packets and sends acknowledgments back to their writers.
///
/// Every packet returned by [Reader::read] carries a fresh identity local to
/// this reader, so a write fanned out to several readers yields one distinct
/// packet per reader.
pub struct Reader<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  id: ReaderId,
  /// Owning process.
  process: Process,
  /// Forward pipe writers link to.
  pipe: ReadPipe<Delivery<T>>,
  rx: PipeReceiver<Delivery<T>>,
  /// Reader-local packet -> the delivery it was minted from, until answered.
  origins: Mutex<HashMap<PacketId, Delivery<T>>>,
}

impl<T: Send + Sync + 'static> Reader<T> {
  pub fn new(process: &Process, config: &Config) -> Self {
    let pipe = ReadPipe::with_config(config);
    let rx = pipe.read();
    Self {
      inner: Arc::new(Inner {
        id: ReaderId::next(),
        process: process.clone(),
        pipe,
        rx,
        origins: Mutex::new(HashMap::new()),
      }),
    }
  }
}

impl<T> Reader<T> {
  pub fn id(&self) -> ReaderId {
    self.inner.id
  }

  pub fn process(&self) -> &Process {
    &self.inner.process
  }

  pub(crate) fn pipe(&self) -> &ReadPipe<Delivery<T>> {
    &self.inner.pipe
  }

  /// Next packet in arrival order, or `None` once the reader is closed.
  pub async fn read(&self) -> Option<Packet<T>> {
    let delivery = self.inner.rx.recv().await?;
    let local = delivery.packet.carry();
    trace!(reader = %self.inner.id, written = %delivery.packet.id(), local = %local.id(), "reader received packet");
    self.origins().insert(local.id(), delivery);
    Some(local)
  }

  /// Answers a packet previously returned by [Reader::read]. The writer that
  /// emitted it receives an [Ack] for its original packet. Returns `false` if
  /// `packet` is unknown or was already answered.
  pub fn receive(&self, packet: &Packet<T>, outcome: Option<Packet<T>>) -> bool {
    let Some(origin) = self.origins().remove(&packet.id()) else {
      return false;
    };
    // A closed reply pipe means the writer is gone; the answer is dropped.
    origin.reply.write(Ack {
      written: origin.packet,
      outcome,
    });
    true
  }

  /// The packet as its writer emitted it.
  pub fn origin(&self, packet: &Packet<T>) -> Option<Packet<T>> {
    self
      .origins()
      .get(&packet.id())
      .map(|delivery| delivery.packet.clone())
  }

  /// Drops the reply route for `packet` without answering it.
  pub(crate) fn forget(&self, packet: &Packet<T>) -> bool {
    self.origins().remove(&packet.id()).is_some()
  }

  /// Packets read but not yet answered.
  pub fn pending(&self) -> usize {
    self.origins().len()
  }

  /// Stops delivery. Idempotent.
  pub fn close(&self) {
    self.inner.pipe.close();
  }

  pub fn is_closed(&self) -> bool {
    self.inner.pipe.is_closed()
  }

  pub fn done(&self) -> Signal {
    self.inner.pipe.done()
  }

  fn origins(&self) -> MutexGuard<'_, HashMap<PacketId, Delivery<T>>> {
    self
      .inner
      .origins
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
  }
}

impl<T> Clone for Reader<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}
