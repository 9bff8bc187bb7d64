//! Tests for `WritePipe`.

use super::{ReadPipe, WritePipe};
use std::time::Duration;

#[tokio::test]
async fn broadcasts_to_every_linked_reader() {
  let w = WritePipe::new();
  let a = ReadPipe::new();
  let b = ReadPipe::new();
  assert!(w.link(&a));
  assert!(w.link(&b));
  assert_eq!(w.write(5), 2);
  assert_eq!(a.read().recv().await, Some(5));
  assert_eq!(b.read().recv().await, Some(5));
}

#[tokio::test]
async fn link_is_idempotent() {
  let w = WritePipe::new();
  let r = ReadPipe::new();
  assert!(w.link(&r));
  assert!(!w.link(&r));
  assert_eq!(w.links(), 1);
  assert_eq!(w.write(1), 1);
}

#[tokio::test]
async fn no_replay_for_late_link() {
  let w = WritePipe::new();
  let early = ReadPipe::new();
  w.link(&early);
  w.write(1);
  w.write(2);
  let late = ReadPipe::new();
  w.link(&late);
  w.write(3);
  let rx = late.read();
  assert_eq!(rx.recv().await, Some(3));
  let early_rx = early.read();
  assert_eq!(early_rx.recv().await, Some(1));
  assert_eq!(early_rx.recv().await, Some(2));
  assert_eq!(early_rx.recv().await, Some(3));
}

#[tokio::test]
async fn unlink_stops_delivery_and_is_idempotent() {
  let w = WritePipe::new();
  let r = ReadPipe::new();
  w.link(&r);
  w.write(1);
  assert!(w.unlink(&r));
  assert!(!w.unlink(&r));
  assert_eq!(w.write(2), 0);
  let rx = r.read();
  assert_eq!(rx.recv().await, Some(1));
  let next = tokio::time::timeout(Duration::from_millis(20), rx.recv()).await;
  assert!(next.is_err());
}

#[tokio::test]
async fn unlink_never_linked_has_no_effect() {
  let w: WritePipe<u8> = WritePipe::new();
  let r = ReadPipe::new();
  assert!(!w.unlink(&r));
}

#[tokio::test]
async fn closed_reader_is_unlinked_automatically() {
  let w = WritePipe::new();
  let r = ReadPipe::new();
  w.link(&r);
  r.close();
  for _ in 0..50 {
    if w.links() == 0 {
      break;
    }
    tokio::time::sleep(Duration::from_millis(2)).await;
  }
  assert_eq!(w.links(), 0);
  assert_eq!(w.write(1), 0);
}

#[tokio::test]
async fn write_into_just_closed_reader_is_accepted_silently() {
  let w = WritePipe::new();
  let open = ReadPipe::new();
  let closed = ReadPipe::new();
  w.link(&open);
  w.link(&closed);
  closed.close();
  // The closed side may or may not have been unlinked yet; either way the
  // write succeeds for the open side and never errors.
  assert_eq!(w.write(9), 1);
  assert_eq!(open.read().recv().await, Some(9));
}

#[tokio::test]
async fn linking_a_closed_reader_is_refused() {
  let w: WritePipe<u8> = WritePipe::new();
  let r = ReadPipe::new();
  r.close();
  assert!(!w.link(&r));
}

#[tokio::test]
async fn close_unlinks_everything() {
  let w = WritePipe::new();
  let a = ReadPipe::new();
  let b = ReadPipe::new();
  w.link(&a);
  w.link(&b);
  w.close();
  assert_eq!(w.links(), 0);
  assert!(!w.is_linked(&a));
  assert_eq!(w.write(1), 0);
}

#[tokio::test]
async fn concurrent_writers_keep_per_writer_order() {
  let r = ReadPipe::new();
  let w1 = WritePipe::new();
  let w2 = WritePipe::new();
  w1.link(&r);
  w2.link(&r);
  let h1 = {
    let w1 = w1.clone();
    tokio::spawn(async move {
      for i in 0..100u32 {
        w1.write((1u8, i));
      }
    })
  };
  let h2 = {
    let w2 = w2.clone();
    tokio::spawn(async move {
      for i in 0..100u32 {
        w2.write((2u8, i));
      }
    })
  };
  h1.await.unwrap();
  h2.await.unwrap();
  let rx = r.read();
  let mut next = [0u32; 3];
  for _ in 0..200 {
    let (who, i) = rx.recv().await.unwrap();
    assert_eq!(i, next[who as usize]);
    next[who as usize] += 1;
  }
}
