//! Node drivers running user actions over ports, with every read and write
//! recorded on a [Tracer](crate::Tracer) so acknowledgments reach the right
//! upstream writer.
//!
//! A driver spawns one read loop per reader its in-ports hand out and one
//! acknowledgment loop per writer its out-port hands out. Both loops end when
//! their reader or writer closes, which happens when the owning process exits
//! or the node is closed. Whatever lineage the closed reader or writer still
//! holds is discarded, so an exited process leaves nothing behind in the tracer.

mod many_to_one;
mod one_to_one;

pub use many_to_one::ManyToOneNode;
pub use one_to_one::OneToOneNode;

use crate::port::Writer;
use crate::tracer::Tracer;
use crate::types::Packet;
use async_trait::async_trait;
use futures::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::trace;

/// Work done by a [OneToOneNode] for each packet it reads. `None` answers the
/// input with the discard sentinel.
#[async_trait]
pub trait Action<T>: Send + Sync {
  async fn run(&self, packet: Packet<T>) -> Option<Packet<T>>;
}

#[async_trait]
impl<T, F> Action<T> for F
where
  T: Send + Sync + 'static,
  F: Fn(Packet<T>) -> Option<Packet<T>> + Send + Sync,
{
  async fn run(&self, packet: Packet<T>) -> Option<Packet<T>> {
    self(packet)
  }
}

/// Combines one complete row of a [ManyToOneNode], in in-port order.
#[async_trait]
pub trait Merge<T>: Send + Sync {
  async fn merge(&self, row: Vec<Packet<T>>) -> Option<Packet<T>>;
}

#[async_trait]
impl<T, F> Merge<T> for F
where
  T: Send + Sync + 'static,
  F: Fn(Vec<Packet<T>>) -> Option<Packet<T>> + Send + Sync,
{
  async fn merge(&self, row: Vec<Packet<T>>) -> Option<Packet<T>> {
    self(row)
  }
}

/// Feeds every acknowledgment arriving on each accepted writer into `tracer`.
/// Writes still unacknowledged when a writer closes are discarded.
pub(crate) async fn acknowledge_writers<T: Send + Sync + 'static>(
  mut writers: UnboundedReceiverStream<Writer<T>>,
  tracer: Tracer<T>,
) {
  while let Some(writer) = writers.next().await {
    let tracer = tracer.clone();
    tokio::spawn(async move {
      while let Some(ack) = writer.receive().await {
        tracer.acknowledge(&writer, ack);
      }
      let dropped = tracer.discard_writer(&writer);
      trace!(writer = %writer.id(), dropped, "acknowledgment loop finished");
    });
  }
}
