//! Read-side half of a pipe.
//!
//! Writers push into an unbounded funnel; one background task per read-side
//! moves values into a bounded hand-off channel, buffering internally whenever
//! the consumer is behind. Writers therefore never wait on the consumer.

use crate::config::Config;
use crate::signal::Signal;
use crate::types::PipeId;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

/// Read-side of a pipe. Cloning yields another handle to the same pipe.
pub struct ReadPipe<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  id: PipeId,
  input: mpsc::UnboundedSender<T>,
  output: Arc<Mutex<mpsc::Receiver<T>>>,
  done: Signal,
}

impl<T: Send + 'static> ReadPipe<T> {
  /// Creates a read-side with the default hand-off capacity.
  ///
  /// Must be called from within a tokio runtime: the buffering task is spawned here.
  pub fn new() -> Self {
    Self::with_config(&Config::default())
  }

  pub fn with_config(config: &Config) -> Self {
    let (input, input_rx) = mpsc::unbounded_channel();
    let (output_tx, output_rx) = mpsc::channel(config.delivery_capacity.max(1));
    let done = Signal::new();
    let id = PipeId::next();
    tokio::spawn(run(id, input_rx, output_tx, done.clone()));
    Self {
      inner: Arc::new(Inner {
        id,
        input,
        output: Arc::new(Mutex::new(output_rx)),
        done,
      }),
    }
  }
}

impl<T> ReadPipe<T> {
  pub fn id(&self) -> PipeId {
    self.inner.id
  }

  /// Hands `value` to this read-side. Returns `false` (and drops the value)
  /// once the pipe is closed.
  pub fn write(&self, value: T) -> bool {
    if self.inner.done.is_fired() {
      return false;
    }
    self.inner.input.send(value).is_ok()
  }

  /// Receive-only handle. All handles share one ordered stream; each value
  /// is delivered to exactly one `recv` call.
  pub fn read(&self) -> PipeReceiver<T> {
    PipeReceiver {
      output: Arc::clone(&self.inner.output),
      done: self.inner.done.clone(),
    }
  }

  /// Permanently stops delivery. Idempotent.
  pub fn close(&self) {
    if self.inner.done.fire() {
      trace!(pipe = %self.inner.id, "read pipe closed");
    }
  }

  pub fn is_closed(&self) -> bool {
    self.inner.done.is_fired()
  }

  /// Signal fired when the pipe closes.
  pub fn done(&self) -> Signal {
    self.inner.done.clone()
  }
}

impl<T> Clone for ReadPipe<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Send + 'static> Default for ReadPipe<T> {
  fn default() -> Self {
    Self::new()
  }
}

/// Receive-only handle returned by [ReadPipe::read].
pub struct PipeReceiver<T> {
  output: Arc<Mutex<mpsc::Receiver<T>>>,
  done: Signal,
}

impl<T> PipeReceiver<T> {
  /// Next value in write order, or `None` once the pipe is closed.
  pub async fn recv(&self) -> Option<T> {
    if self.done.is_fired() {
      return None;
    }
    let mut rx = self.output.lock().await;
    tokio::select! {
      biased;
      _ = self.done.wait() => None,
      value = rx.recv() => value,
    }
  }
}

impl<T: Send + 'static> PipeReceiver<T> {
  /// Adapts the handle into a [futures::Stream].
  pub fn into_stream(self) -> impl futures::Stream<Item = T> + Send {
    async_stream::stream! {
      while let Some(value) = self.recv().await {
        yield value;
      }
    }
  }
}

impl<T> Clone for PipeReceiver<T> {
  fn clone(&self) -> Self {
    Self {
      output: Arc::clone(&self.output),
      done: self.done.clone(),
    }
  }
}

async fn run<T>(
  id: PipeId,
  mut input: mpsc::UnboundedReceiver<T>,
  output: mpsc::Sender<T>,
  done: Signal,
) {
  let mut buffer: VecDeque<T> = VecDeque::new();
  let mut open = true;

  loop {
    if buffer.is_empty() {
      if !open {
        break;
      }
      tokio::select! {
        biased;
        _ = done.wait() => break,
        value = input.recv() => match value {
          Some(value) => match output.try_send(value) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(value)) => buffer.push_back(value),
            Err(mpsc::error::TrySendError::Closed(_)) => break,
          },
          None => break,
        },
      }
    } else {
      tokio::select! {
        biased;
        _ = done.wait() => break,
        permit = output.reserve() => match permit {
          Ok(permit) => {
            if let Some(value) = buffer.pop_front() {
              permit.send(value);
            }
          }
          Err(_) => break,
        },
        value = input.recv(), if open => match value {
          Some(value) => buffer.push_back(value),
          None => open = false,
        },
      }
    }
  }

  trace!(pipe = %id, dropped = buffer.len(), "read pipe loop finished");
}
