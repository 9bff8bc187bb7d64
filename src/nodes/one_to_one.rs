//! Single-input, single-output node driver.

use super::{Action, acknowledge_writers};
use crate::port::{InPort, OutPort, Reader};
use crate::tracer::Tracer;
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// Runs an [Action] on every packet arriving on `in`.
///
/// Results are written to `out` with the input as their source, so the
/// acknowledgment for the result answers the input. When `out` is not linked
/// the input is answered directly with the result.
pub struct OneToOneNode<T> {
  name: String,
  input: InPort<T>,
  output: OutPort<T>,
  tracer: Tracer<T>,
  action: Arc<dyn Action<T>>,
}

impl<T: Send + Sync + 'static> OneToOneNode<T> {
  pub fn new(name: impl Into<String>, action: impl Action<T> + 'static) -> Self {
    Self {
      name: name.into(),
      input: InPort::new(),
      output: OutPort::new(),
      tracer: Tracer::new(),
      action: Arc::new(action),
    }
  }

  /// Records lineage on `tracer` instead of a private one, e.g. to share it
  /// with neighbouring nodes.
  pub fn with_tracer(mut self, tracer: Tracer<T>) -> Self {
    self.tracer = tracer;
    self
  }

  /// Replaces both ports, e.g. to apply a [Config](crate::Config).
  pub fn with_ports(mut self, input: InPort<T>, output: OutPort<T>) -> Self {
    self.input = input;
    self.output = output;
    self
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn input(&self) -> &InPort<T> {
    &self.input
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
    let mut readers = self.input.accept();
    let writers = self.output.accept();
    let output = self.output.clone();
    let tracer = self.tracer.clone();
    let action = Arc::clone(&self.action);
    tokio::spawn(async move {
      let serve = async {
        while let Some(reader) = readers.next().await {
          debug!(node = %name, reader = %reader.id(), "serving reader");
          tokio::spawn(read_loop(
            reader,
            output.clone(),
            tracer.clone(),
            Arc::clone(&action),
          ));
        }
      };
      tokio::join!(serve, acknowledge_writers(writers, tracer.clone()));
      trace!(node = %name, "node stopped");
    })
  }

  /// Closes both ports, ending every loop. Each loop discards the lineage of
  /// its own reader or writer, so a shared tracer keeps serving other nodes.
  pub fn close(&self) {
    self.input.close();
    self.output.close();
  }
}

async fn read_loop<T: Send + Sync + 'static>(
  reader: Reader<T>,
  output: OutPort<T>,
  tracer: Tracer<T>,
  action: Arc<dyn Action<T>>,
) {
  while let Some(packet) = reader.read().await {
    tracer.read(&reader, &packet);
    match action.run(packet.clone()).await {
      None => tracer.resolve(&packet, None),
      Some(result) if output.is_linked() => {
        let writer = output.open(reader.process());
        tracer.write(&writer, std::slice::from_ref(&packet), result);
      }
      Some(result) => tracer.resolve(&packet, Some(result)),
    }
  }
  let dropped = tracer.discard_reader(&reader);
  trace!(reader = %reader.id(), dropped, "read loop finished");
}
