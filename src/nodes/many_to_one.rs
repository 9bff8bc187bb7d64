//! Fan-in node driver joining one packet per in-port.

use super::{Merge, acknowledge_writers};
use crate::port::{InPort, OutPort, Reader};
use crate::process::Process;
use crate::read_group::ReadGroup;
use crate::tracer::Tracer;
use crate::types::{Packet, PortId, ProcessId};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

type Row<T> = Vec<Packet<T>>;

/// Joins packets from several in-ports into rows and runs a [Merge] on each.
///
/// Every process gets its own [ReadGroup], so rows never mix packets from
/// different invocations. Rows of one process are merged one at a time in the
/// order they complete, so merged packets leave in row order even when the
/// merge is async. The merged packet is written with the whole row as its
/// sources; its acknowledgment answers every packet in the row.
pub struct ManyToOneNode<T> {
  name: String,
  inputs: Vec<InPort<T>>,
  output: OutPort<T>,
  tracer: Tracer<T>,
  merge: Arc<dyn Merge<T>>,
  groups: Groups<T>,
}

struct Groups<T> {
  /// In-port ids, in row order.
  ports: Arc<[PortId]>,
  /// Open joins, removed when their process exits.
  by_process: Arc<Mutex<HashMap<ProcessId, Arc<Join<T>>>>>,
}

/// Fan-in state of one process.
struct Join<T> {
  group: ReadGroup<PortId, Packet<T>>,
  /// Feeds released rows to the process's merge loop; `None` once closed.
  rows: Mutex<Option<mpsc::UnboundedSender<Row<T>>>>,
}

impl<T: Send + Sync + 'static> ManyToOneNode<T> {
  /// Node with `width` in-ports.
  pub fn new(name: impl Into<String>, width: usize, merge: impl Merge<T> + 'static) -> Self {
    Self::with_ports(
      name,
      (0..width).map(|_| InPort::new()).collect(),
      OutPort::new(),
      merge,
    )
  }

  pub fn with_ports(
    name: impl Into<String>,
    inputs: Vec<InPort<T>>,
    output: OutPort<T>,
    merge: impl Merge<T> + 'static,
  ) -> Self {
    let ports: Arc<[PortId]> = inputs.iter().map(InPort::id).collect();
    Self {
      name: name.into(),
      inputs,
      output,
      tracer: Tracer::new(),
      merge: Arc::new(merge),
      groups: Groups {
        ports,
        by_process: Arc::new(Mutex::new(HashMap::new())),
      },
    }
  }

  pub fn with_tracer(mut self, tracer: Tracer<T>) -> Self {
    self.tracer = tracer;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn inputs(&self) -> &[InPort<T>] {
    &self.inputs
  }

  pub fn input(&self, index: usize) -> Option<&InPort<T>> {
    self.inputs.get(index)
  }

  pub fn output(&self) -> &OutPort<T> {
    &self.output
  }

  pub fn tracer(&self) -> &Tracer<T> {
    &self.tracer
  }

  /// Starts serving readers and writers as processes open them. The task
  /// finishes once the node is closed.
  pub fn spawn(&self) -> JoinHandle<()> {
    let name = self.name.clone();
    let mut readers = futures::stream::select_all(self.inputs.iter().map(|port| {
      let id = port.id();
      port.accept().map(move |reader| (id, reader))
    }));
    let writers = self.output.accept();
    let ctx = Context {
      output: self.output.clone(),
      tracer: self.tracer.clone(),
      merge: Arc::clone(&self.merge),
      groups: self.groups.clone(),
    };
    tokio::spawn(async move {
      let serve = async {
        while let Some((port, reader)) = readers.next().await {
          debug!(node = %name, %port, reader = %reader.id(), "serving reader");
          tokio::spawn(read_loop(port, reader, ctx.clone()));
        }
      };
      tokio::join!(serve, acknowledge_writers(writers, ctx.tracer.clone()));
      trace!(node = %name, "node stopped");
    })
  }

  /// Rows started but not yet complete for `process`.
  pub fn pending(&self, process: &ProcessId) -> usize {
    self
      .groups
      .lock()
      .get(process)
      .map_or(0, |join| join.group.pending())
  }

  /// Closes every port and read group, ending every loop. Packets held in
  /// partial rows are answered with the discard sentinel; everything else is
  /// discarded by the loop that owns it, so a shared tracer keeps serving
  /// other nodes.
  pub fn close(&self) {
    let joins: Vec<_> = self.groups.lock().drain().map(|(_, join)| join).collect();
    for join in joins {
      for packet in join.close() {
        self.tracer.resolve(&packet, None);
      }
    }
    for input in &self.inputs {
      input.close();
    }
    self.output.close();
  }
}

struct Context<T> {
  output: OutPort<T>,
  tracer: Tracer<T>,
  merge: Arc<dyn Merge<T>>,
  groups: Groups<T>,
}

async fn read_loop<T: Send + Sync + 'static>(port: PortId, reader: Reader<T>, ctx: Context<T>) {
  let join = ctx.join(&reader);
  while let Some(packet) = reader.read().await {
    ctx.tracer.read(&reader, &packet);
    if !join.submit(&port, packet.clone()) {
      ctx.tracer.resolve(&packet, None);
    }
  }
  let dropped = ctx.tracer.discard_reader(&reader);
  trace!(reader = %reader.id(), dropped, "read loop finished");
}

/// Merges the rows of one process in release order and writes or answers
/// each result before taking the next row.
async fn merge_loop<T: Send + Sync + 'static>(
  process: Process,
  mut rows: mpsc::UnboundedReceiver<Row<T>>,
  ctx: Context<T>,
) {
  while let Some(row) = rows.recv().await {
    match ctx.merge.merge(row.clone()).await {
      None => {
        for source in &row {
          ctx.tracer.resolve(source, None);
        }
      }
      Some(merged) if ctx.output.is_linked() => {
        let writer = ctx.output.open(&process);
        ctx.tracer.write(&writer, &row, merged);
      }
      Some(merged) => {
        for source in &row {
          ctx.tracer.resolve(source, Some(merged.clone()));
        }
      }
    }
  }
  trace!(process = %process.id(), "merge loop finished");
}

impl<T: Send + Sync + 'static> Context<T> {
  /// The join for `reader`'s process, created on first use and closed when
  /// the process exits.
  fn join(&self, reader: &Reader<T>) -> Arc<Join<T>> {
    let process = reader.process().clone();
    let mut joins = self.groups.lock();
    if let Some(join) = joins.get(&process.id()) {
      return Arc::clone(join);
    }
    let (tx, rx) = mpsc::unbounded_channel();
    let join = Arc::new(Join {
      group: ReadGroup::new(self.groups.ports.to_vec()),
      rows: Mutex::new(Some(tx)),
    });
    joins.insert(process.id(), Arc::clone(&join));
    drop(joins);

    tokio::spawn(merge_loop(process.clone(), rx, self.clone()));
    let by_process = Arc::clone(&self.groups.by_process);
    let tracer = self.tracer.clone();
    let watched = Arc::clone(&join);
    tokio::spawn(async move {
      process.done().await;
      let dropped = watched.close();
      for packet in &dropped {
        tracer.resolve(packet, None);
      }
      by_process
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&process.id());
      trace!(process = %process.id(), dropped = dropped.len(), "read group closed");
    });
    join
  }
}

impl<T> Join<T> {
  /// Submits `packet` for `port`, queueing the row it completes. Returns
  /// `false` if the join is closed and the packet was not taken.
  fn submit(&self, port: &PortId, packet: Packet<T>) -> bool {
    let rows = self.lock();
    let Some(tx) = rows.as_ref() else {
      return false;
    };
    if let Some(row) = self.group.submit(port, packet) {
      trace!(%port, width = row.len(), "row complete");
      let _ = tx.send(row);
    }
    true
  }

  /// Stops taking packets and ends the merge loop once queued rows are
  /// merged. Returns the packets of rows that never completed.
  fn close(&self) -> Vec<Packet<T>> {
    let mut rows = self.lock();
    rows.take();
    self.group.close()
  }

  fn lock(&self) -> MutexGuard<'_, Option<mpsc::UnboundedSender<Row<T>>>> {
    self.rows.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<T> Groups<T> {
  fn lock(&self) -> MutexGuard<'_, HashMap<ProcessId, Arc<Join<T>>>> {
    self.by_process.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl<T> Clone for Groups<T> {
  fn clone(&self) -> Self {
    Self {
      ports: Arc::clone(&self.ports),
      by_process: Arc::clone(&self.by_process),
    }
  }
}

impl<T> Clone for Context<T> {
  fn clone(&self) -> Self {
    Self {
      output: self.output.clone(),
      tracer: self.tracer.clone(),
      merge: Arc::clone(&self.merge),
      groups: self.groups.clone(),
    }
  }
}
