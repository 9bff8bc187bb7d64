//! Tests for `ReadGroup`.

use super::ReadGroup;
use proptest::prelude::*;
use std::sync::Arc;

#[test]
fn single_reader_releases_every_submission() {
  let g = ReadGroup::new(vec!["a"]);
  assert_eq!(g.submit(&"a", 1), Some(vec![1]));
  assert_eq!(g.submit(&"a", 2), Some(vec![2]));
  assert_eq!(g.pending(), 0);
}

#[test]
fn row_released_in_reader_order_once_complete() {
  let g = ReadGroup::new(vec!["a", "b"]);
  assert_eq!(g.submit(&"b", "b0"), None);
  assert_eq!(g.submit(&"a", "a0"), Some(vec!["a0", "b0"]));
}

#[test]
fn later_rows_wait_for_earlier_ones() {
  let g = ReadGroup::new(vec!["a", "b"]);
  // a runs two rows ahead of b.
  assert_eq!(g.submit(&"a", "a0"), None);
  assert_eq!(g.submit(&"a", "a1"), None);
  assert_eq!(g.pending(), 2);
  assert_eq!(g.submit(&"b", "b0"), Some(vec!["a0", "b0"]));
  assert_eq!(g.submit(&"b", "b1"), Some(vec!["a1", "b1"]));
  assert_eq!(g.pending(), 0);
}

#[test]
fn interleaved_submissions_keep_rows_apart() {
  let g = ReadGroup::new(vec!["a", "b"]);
  assert_eq!(g.submit(&"a", 0), None);
  assert_eq!(g.submit(&"b", 10), Some(vec![0, 10]));
  assert_eq!(g.submit(&"b", 11), None);
  assert_eq!(g.submit(&"a", 1), Some(vec![1, 11]));
}

#[test]
fn unknown_reader_is_ignored() {
  let g = ReadGroup::new(vec![1, 2]);
  assert_eq!(g.submit(&3, "x"), None);
  assert_eq!(g.pending(), 0);
}

#[test]
fn close_discards_rows_and_ignores_later_submits() {
  let g = ReadGroup::new(vec!["a", "b"]);
  g.submit(&"a", 1);
  assert_eq!(g.close(), vec![1]);
  assert!(g.is_closed());
  assert_eq!(g.pending(), 0);
  assert_eq!(g.submit(&"b", 2), None);
  assert_eq!(g.submit(&"a", 3), None);
}

#[test]
fn close_returns_held_values_oldest_row_first() {
  let g = ReadGroup::new(vec!["a", "b", "c"]);
  g.submit(&"a", 1);
  g.submit(&"a", 2);
  g.submit(&"b", 10);
  g.submit(&"c", 100);
  g.submit(&"b", 20);
  // The first row was released, only the second is still held.
  assert_eq!(g.close(), vec![2, 20]);
  assert!(g.close().is_empty());
}

#[test]
fn concurrent_submitters_release_rows_in_order() {
  let g = Arc::new(ReadGroup::new(vec![0usize, 1, 2]));
  let rows = Arc::new(std::sync::Mutex::new(Vec::new()));
  let handles: Vec<_> = (0..3usize)
    .map(|reader| {
      let g = Arc::clone(&g);
      let rows = Arc::clone(&rows);
      std::thread::spawn(move || {
        for i in 0..200usize {
          if let Some(row) = g.submit(&reader, (reader, i)) {
            rows.lock().unwrap().push(row);
          }
        }
      })
    })
    .collect();
  for h in handles {
    h.join().unwrap();
  }
  let mut rows = rows.lock().unwrap().clone();
  assert_eq!(rows.len(), 200);
  // Each row holds the i-th submission of every reader, in reader order.
  rows.sort_by_key(|row| row[0].1);
  for (i, row) in rows.iter().enumerate() {
    assert_eq!(row, &vec![(0, i), (1, i), (2, i)]);
  }
}

proptest! {
  #[test]
  fn rows_come_out_in_fifo_order(order in prop::collection::vec(0usize..3, 0..120)) {
    let g = ReadGroup::new(vec![0usize, 1, 2]);
    let mut counts = [0usize; 3];
    let mut released = Vec::new();
    for reader in order {
      let row_index = counts[reader];
      counts[reader] += 1;
      if let Some(row) = g.submit(&reader, row_index) {
        released.push(row);
      }
    }
    let complete = *counts.iter().min().unwrap();
    prop_assert_eq!(released.len(), complete);
    for (i, row) in released.iter().enumerate() {
      prop_assert_eq!(row, &vec![i, i, i]);
    }
  }
}
