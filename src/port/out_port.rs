//! Output port: hands out one [Writer] per process and wires it to linked in-ports.

use super::{InPort, Writer};
use crate::config::Config;
use crate::process::Process;
use crate::types::{PortId, ProcessId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::{debug, instrument};

/// Output port of a node.
pub struct OutPort<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  id: PortId,
  /// Applied to every writer this port opens.
  config: Config,
  state: Mutex<State<T>>,
}

struct State<T> {
  /// Linked in-ports, in link order.
  links: Vec<InPort<T>>,
  /// Open writer per process, dropped when the process exits.
  writers: HashMap<ProcessId, Writer<T>>,
  /// Accept streams waiting for newly opened writers.
  listeners: Vec<mpsc::UnboundedSender<Writer<T>>>,
  /// Set by [OutPort::close]; later opens hand out closed writers.
  closed: bool,
}

impl<T: Send + Sync + 'static> OutPort<T> {
  pub fn new() -> Self {
    Self::with_config(Config::default())
  }

  pub fn with_config(config: Config) -> Self {
    Self {
      inner: Arc::new(Inner {
        id: PortId::next(),
        config,
        state: Mutex::new(State {
          links: Vec::new(),
          writers: HashMap::new(),
          listeners: Vec::new(),
          closed: false,
        }),
      }),
    }
  }

  /// The writer for `process`, created on first use and linked to the reader
  /// each linked in-port opens for the same process.
  #[instrument(level = "trace", skip(self, process), fields(port = %self.inner.id, process = %process.id()))]
  pub fn open(&self, process: &Process) -> Writer<T> {
    let (writer, links) = {
      let mut state = self.inner.lock();
      if let Some(writer) = state.writers.get(&process.id()) {
        return writer.clone();
      }
      let writer = Writer::new(process, &self.inner.config);
      if state.closed || process.is_exited() {
        writer.close();
        return writer;
      }
      state.writers.insert(process.id(), writer.clone());
      state
        .listeners
        .retain(|listener| listener.send(writer.clone()).is_ok());
      (writer, state.links.clone())
    };
    for port in &links {
      writer.link(&port.open(process));
    }
    debug!(writer = %writer.id(), links = links.len(), "out-port opened writer");

    let weak = Arc::downgrade(&self.inner);
    let exited = process.exit_signal();
    let closed = writer.done();
    let watched = writer.clone();
    tokio::spawn(async move {
      tokio::select! {
        _ = exited.wait() => {}
        _ = closed.wait() => {}
      }
      release(&weak, &watched);
    });
    writer
  }

  /// Links this port to `port`. Idempotent: returns `false` if already linked.
  /// Processes that already hold a writer are wired immediately.
  #[instrument(level = "trace", skip(self, port), fields(out = %self.inner.id, to = %port.id()))]
  pub fn link(&self, port: &InPort<T>) -> bool {
    let writers: Vec<Writer<T>> = {
      let mut state = self.inner.lock();
      if state.links.iter().any(|p| p.id() == port.id()) {
        return false;
      }
      state.links.push(port.clone());
      state.writers.values().cloned().collect()
    };
    for writer in writers {
      writer.link(&port.open(writer.process()));
    }
    debug!("ports linked");
    true
  }

  /// Stream of writers as they are opened, starting with those already open.
  pub fn accept(&self) -> UnboundedReceiverStream<Writer<T>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut state = self.inner.lock();
    if !state.closed {
      for writer in state.writers.values() {
        let _ = tx.send(writer.clone());
      }
      state.listeners.push(tx);
    }
    UnboundedReceiverStream::new(rx)
  }
}

impl<T> OutPort<T> {
  pub fn id(&self) -> PortId {
    self.inner.id
  }

  /// Removes the link to `port`. Returns `false` if it wasn't linked.
  pub fn unlink(&self, port: &InPort<T>) -> bool {
    let writers: Vec<Writer<T>> = {
      let mut state = self.inner.lock();
      let Some(index) = state.links.iter().position(|p| p.id() == port.id()) else {
        return false;
      };
      state.links.remove(index);
      state.writers.values().cloned().collect()
    };
    for writer in writers {
      if let Some(reader) = port.reader(&writer.process().id()) {
        writer.unlink(&reader);
      }
    }
    true
  }

  pub fn is_linked(&self) -> bool {
    !self.inner.lock().links.is_empty()
  }

  /// The open writer for `process`, if any.
  pub fn writer(&self, process: &ProcessId) -> Option<Writer<T>> {
    self.inner.lock().writers.get(process).cloned()
  }

  /// Number of processes with an open writer.
  pub fn writers(&self) -> usize {
    self.inner.lock().writers.len()
  }

  /// Closes every writer and ends all accept streams. Links are kept. Idempotent.
  pub fn close(&self) {
    let writers: Vec<Writer<T>> = {
      let mut state = self.inner.lock();
      state.closed = true;
      state.listeners.clear();
      state.writers.drain().map(|(_, writer)| writer).collect()
    };
    for writer in writers {
      writer.close();
    }
  }
}

impl<T> Inner<T> {
  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

fn release<T>(weak: &Weak<Inner<T>>, writer: &Writer<T>) {
  if let Some(inner) = weak.upgrade() {
    let mut state = inner.lock();
    let current = state.writers.get(&writer.process().id());
    if current.is_some_and(|w| w.id() == writer.id()) {
      state.writers.remove(&writer.process().id());
    }
  }
  writer.close();
}

impl<T> Clone for OutPort<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Send + Sync + 'static> Default for OutPort<T> {
  fn default() -> Self {
    Self::new()
  }
}
