//! Input port: hands out one [Reader] per process.

use super::{OutPort, Reader};
use crate::config::Config;
use crate::process::Process;
use crate::types::{PortId, ProcessId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument};

/// Input port of a node.
pub struct InPort<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  id: PortId,
  /// Applied to every reader this port opens.
  config: Config,
  state: Mutex<State<T>>,
}

struct State<T> {
  /// Open reader per process, dropped when the process exits.
  readers: HashMap<ProcessId, Reader<T>>,
  /// Accept streams waiting for newly opened readers.
  listeners: Vec<mpsc::UnboundedSender<Reader<T>>>,
  /// Set by [InPort::close]; later opens hand out closed readers.
  closed: bool,
}

impl<T: Send + Sync + 'static> InPort<T> {
  pub fn new() -> Self {
    Self::with_config(Config::default())
  }

  pub fn with_config(config: Config) -> Self {
    Self {
      inner: Arc::new(Inner {
        id: PortId::next(),
        config,
        state: Mutex::new(State {
          readers: HashMap::new(),
          listeners: Vec::new(),
          closed: false,
        }),
      }),
    }
  }

  /// The reader for `process`, created on first use. A reader opened for an
  /// exited process (or on a closed port) comes back already closed.
  #[instrument(level = "trace", skip(self, process), fields(port = %self.inner.id, process = %process.id()))]
  pub fn open(&self, process: &Process) -> Reader<T> {
    let reader = {
      let mut state = self.inner.lock();
      if let Some(reader) = state.readers.get(&process.id()) {
        return reader.clone();
      }
      let reader = Reader::new(process, &self.inner.config);
      if state.closed || process.is_exited() {
        reader.close();
        return reader;
      }
      state.readers.insert(process.id(), reader.clone());
      state
        .listeners
        .retain(|listener| listener.send(reader.clone()).is_ok());
      reader
    };
    debug!(reader = %reader.id(), "in-port opened reader");

    let weak = Arc::downgrade(&self.inner);
    let exited = process.exit_signal();
    let closed = reader.done();
    let watched = reader.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = exited.wait() => {}
        _ = closed.wait() => {}
      }
      release(&weak, &watched);
    });
    reader
  }

  /// Stream of readers as they are opened, starting with those already open.
  pub fn accept(&self) -> UnboundedReceiverStream<Reader<T>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut state = self.inner.lock();
    if !state.closed {
      for reader in state.readers.values() {
        let _ = tx.send(reader.clone());
      }
      state.listeners.push(tx);
    }
    UnboundedReceiverStream::new(rx)
  }

  /// Links `out` to this port. Same as [OutPort::link].
  pub fn link(&self, out: &OutPort<T>) -> bool {
    out.link(self)
  }
}

impl<T> InPort<T> {
  pub fn id(&self) -> PortId {
    self.inner.id
  }

  /// The open reader for `process`, if any.
  pub fn reader(&self, process: &ProcessId) -> Option<Reader<T>> {
    self.inner.lock().readers.get(process).cloned()
  }

  /// Number of processes with an open reader.
  pub fn readers(&self) -> usize {
    self.inner.lock().readers.len()
  }

  /// Closes every reader and ends all accept streams. Idempotent.
  pub fn close(&self) {
    let readers: Vec<Reader<T>> = {
      let mut state = self.inner.lock();
      state.closed = true;
      state.listeners.clear();
      state.readers.drain().map(|(_, reader)| reader).collect()
    };
    for reader in readers {
      reader.close();
    }
  }
}

impl<T> Inner<T> {
  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

fn release<T>(weak: &Weak<Inner<T>>, reader: &Reader<T>) {
  if let Some(inner) = weak.upgrade() {
    let mut state = inner.lock();
    let current = state.readers.get(&reader.process().id());
    if current.is_some_and(|r| r.id() == reader.id()) {
      state.readers.remove(&reader.process().id());
    }
  }
  reader.close();
}

impl<T> Clone for InPort<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Send + Sync + 'static> Default for InPort<T> {
  fn default() -> Self {
    Self::new()
  }
}
