//! Fan-in barrier joining one value per reader into ordered rows.
//!
//! A [ReadGroup] is built with a fixed, ordered list of participants. Each
//! submission fills the earliest row still missing that participant's slot,
//! so a fast participant can run ahead into later rows. Rows are released
//! strictly oldest first, only once every slot is filled.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::trace;

/// Join barrier over participants of type `R` collecting values of type `T`.
pub struct ReadGroup<R, T> {
  readers: Vec<R>,
  state: Mutex<State<T>>,
}

struct State<T> {
  /// Unreleased rows, oldest first, one slot per participant.
  rows: VecDeque<Vec<Option<T>>>,
  closed: bool,
}

impl<R: PartialEq, T> ReadGroup<R, T> {
  pub fn new(readers: Vec<R>) -> Self {
    Self {
      readers,
      state: Mutex::new(State {
        rows: VecDeque::new(),
        closed: false,
      }),
    }
  }

  pub fn readers(&self) -> &[R] {
    &self.readers
  }

  /// Records `value` for `reader`. Returns the oldest row, in participant
  /// order, when this submission completes it; otherwise `None`.
  ///
  /// Submissions from an unknown reader or after [ReadGroup::close] are ignored.
  pub fn submit(&self, reader: &R, value: T) -> Option<Vec<T>> {
    let slot = self.readers.iter().position(|r| r == reader)?;
    let width = self.readers.len();
    let mut state = self.lock();
    if state.closed {
      return None;
    }

    let row = match state.rows.iter().position(|row| row[slot].is_none()) {
      Some(row) => row,
      None => {
        state.rows.push_back((0..width).map(|_| None).collect());
        state.rows.len() - 1
      }
    };
    state.rows[row][slot] = Some(value);
    trace!(slot, row, queued = state.rows.len(), "read group submit");

    if row != 0 || state.rows[0].iter().any(Option::is_none) {
      return None;
    }
    let complete = state.rows.pop_front()?;
    Some(complete.into_iter().flatten().collect())
  }

  /// Rows started but not yet released.
  pub fn pending(&self) -> usize {
    self.lock().rows.len()
  }

  /// Drops all in-flight rows and returns the values they held, oldest row
  /// first. Later submissions are ignored.
  pub fn close(&self) -> Vec<T> {
    let mut state = self.lock();
    state.closed = true;
    state.rows.drain(..).flatten().flatten().collect()
  }

  pub fn is_closed(&self) -> bool {
    self.lock().closed
  }

  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }
}
