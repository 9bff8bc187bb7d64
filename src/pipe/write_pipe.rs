//! Write-side half of a pipe: broadcasts each value to every linked read-side.

use super::ReadPipe;
use crate::signal::Signal;
use crate::types::PipeId;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tracing::{debug, trace};

/// Write-side of a pipe. Cloning yields another handle to the same link set.
pub struct WritePipe<T> {
  inner: Arc<Inner<T>>,
}

struct Inner<T> {
  links: Mutex<Vec<Link<T>>>,
}

struct Link<T> {
  pipe: ReadPipe<T>,
  /// Fired on unlink so the close watcher for this link exits.
  unlinked: Signal,
}

impl<T: Clone + Send + 'static> WritePipe<T> {
  pub fn new() -> Self {
    Self {
      inner: Arc::new(Inner {
        links: Mutex::new(Vec::new()),
      }),
    }
  }

  /// Hands a copy of `value` to every linked read-side. Never blocks.
  /// Returns how many read-sides accepted it.
  pub fn write(&self, value: T) -> usize {
    let targets: Vec<ReadPipe<T>> = self
      .inner
      .lock()
      .iter()
      .map(|link| link.pipe.clone())
      .collect();
    let mut accepted = 0;
    for pipe in targets {
      if pipe.write(value.clone()) {
        accepted += 1;
      }
    }
    trace!(accepted, "write pipe broadcast");
    accepted
  }

  /// Links `pipe` as a destination. Linking an already linked pipe is a no-op
  /// and returns `false`. The link is dropped automatically when `pipe` closes.
  pub fn link(&self, pipe: &ReadPipe<T>) -> bool {
    if pipe.is_closed() {
      return false;
    }
    let unlinked = Signal::new();
    {
      let mut links = self.inner.lock();
      if links.iter().any(|link| link.pipe.id() == pipe.id()) {
        return false;
      }
      links.push(Link {
        pipe: pipe.clone(),
        unlinked: unlinked.clone(),
      });
    }
    debug!(pipe = %pipe.id(), "write pipe linked");

    let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);
    let closed = pipe.done();
    let id = pipe.id();
    tokio::spawn(async move {
      tokio::select! {
        _ = closed.wait() => {
          if let Some(inner) = weak.upgrade() {
            inner.remove(id);
          }
        }
        _ = unlinked.wait() => {}
      }
    });
    true
  }
}

impl<T> WritePipe<T> {
  /// Removes `pipe` from the destinations. Returns `false` if it wasn't linked.
  pub fn unlink(&self, pipe: &ReadPipe<T>) -> bool {
    let removed = self.inner.remove(pipe.id());
    if removed {
      debug!(pipe = %pipe.id(), "write pipe unlinked");
    }
    removed
  }

  pub fn is_linked(&self, pipe: &ReadPipe<T>) -> bool {
    self.inner.lock().iter().any(|link| link.pipe.id() == pipe.id())
  }

  pub fn links(&self) -> usize {
    self.inner.lock().len()
  }

  /// Unlinks every read-side.
  pub fn close(&self) {
    let links = std::mem::take(&mut *self.inner.lock());
    for link in links {
      link.unlinked.fire();
    }
  }
}

impl<T> Inner<T> {
  fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Link<T>>> {
    self.links.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn remove(&self, id: PipeId) -> bool {
    let mut links = self.lock();
    match links.iter().position(|link| link.pipe.id() == id) {
      Some(index) => {
        let link = links.remove(index);
        link.unlinked.fire();
        true
      }
      None => false,
    }
  }
}

impl<T> Drop for Inner<T> {
  fn drop(&mut self) {
    let links = self.links.get_mut().unwrap_or_else(PoisonError::into_inner);
    for link in links.drain(..) {
      link.unlinked.fire();
    }
  }
}

impl<T> Clone for WritePipe<T> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<T: Clone + Send + 'static> Default for WritePipe<T> {
  fn default() -> Self {
    Self::new()
  }
}
