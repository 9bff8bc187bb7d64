//! Tests for `InPort` and `OutPort`.

use super::{InPort, OutPort};
use crate::process::Process;
use crate::types::Packet;
use futures::StreamExt;
use std::time::Duration;

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
  for _ in 0..100 {
    if check() {
      return true;
    }
    tokio::time::sleep(Duration::from_millis(2)).await;
  }
  check()
}

#[tokio::test]
async fn open_is_cached_per_process() {
  let out: OutPort<u8> = OutPort::new();
  let a = Process::new();
  let b = Process::new();
  let wa = out.open(&a);
  assert_eq!(out.open(&a).id(), wa.id());
  assert_ne!(out.open(&b).id(), wa.id());
  assert_eq!(out.writers(), 2);
}

#[tokio::test]
async fn processes_get_private_channels() {
  let out = OutPort::new();
  let inp = InPort::new();
  assert!(out.link(&inp));
  let a = Process::new();
  let b = Process::new();
  out.open(&a).write(Packet::new("a"));
  out.open(&b).write(Packet::new("b"));
  let ra = inp.open(&a);
  let rb = inp.open(&b);
  assert_eq!(*ra.read().await.unwrap().payload(), "a");
  assert_eq!(*rb.read().await.unwrap().payload(), "b");
}

#[tokio::test]
async fn link_is_idempotent_and_wires_open_writers() {
  let out = OutPort::new();
  let inp = InPort::new();
  let proc = Process::new();
  let w = out.open(&proc);
  assert_eq!(w.links(), 0);
  assert!(out.link(&inp));
  assert!(!inp.link(&out));
  assert_eq!(w.links(), 1);
  assert_eq!(w.write(Packet::new(1)), 1);
  assert_eq!(*inp.open(&proc).read().await.unwrap().payload(), 1);
}

#[tokio::test]
async fn acks_travel_back_across_ports() {
  let out = OutPort::new();
  let inp = InPort::new();
  out.link(&inp);
  let proc = Process::new();
  let w = out.open(&proc);
  let sent = Packet::new("ping".to_string());
  w.write(sent.clone());
  let r = inp.open(&proc);
  let got = r.read().await.unwrap();
  r.receive(&got, Some(Packet::new("pong".to_string())));
  let ack = w.receive().await.unwrap();
  assert_eq!(ack.written, sent);
  assert_eq!(ack.outcome.unwrap().payload(), "pong");
}

#[tokio::test]
async fn unlink_stops_forwarding() {
  let out = OutPort::new();
  let inp = InPort::new();
  let proc = Process::new();
  out.link(&inp);
  let w = out.open(&proc);
  assert!(out.unlink(&inp));
  assert!(!out.unlink(&inp));
  assert_eq!(w.write(Packet::new(0u8)), 0);
  assert!(!out.is_linked());
}

#[tokio::test]
async fn accept_yields_existing_then_new_readers() {
  let inp: InPort<u8> = InPort::new();
  let a = Process::new();
  let b = Process::new();
  let ra = inp.open(&a);
  let mut accepted = inp.accept();
  let rb = inp.open(&b);
  assert_eq!(accepted.next().await.unwrap().id(), ra.id());
  assert_eq!(accepted.next().await.unwrap().id(), rb.id());
}

#[tokio::test]
async fn out_accept_yields_writers() {
  let out: OutPort<u8> = OutPort::new();
  let mut accepted = out.accept();
  let proc = Process::new();
  let w = out.open(&proc);
  assert_eq!(accepted.next().await.unwrap().id(), w.id());
}

#[tokio::test]
async fn process_exit_tears_down_pipes() {
  let out: OutPort<u8> = OutPort::new();
  let inp = InPort::new();
  out.link(&inp);
  let proc = Process::new();
  let w = out.open(&proc);
  let r = inp.reader(&proc.id()).unwrap();
  proc.exit();
  assert!(eventually(|| out.writers() == 0 && inp.readers() == 0).await);
  assert!(w.is_closed());
  assert!(r.is_closed());
}

#[tokio::test]
async fn open_on_exited_process_is_closed() {
  let out: OutPort<u8> = OutPort::new();
  let proc = Process::new();
  proc.exit();
  let w = out.open(&proc);
  assert!(w.is_closed());
  assert_eq!(out.writers(), 0);
}

#[tokio::test]
async fn close_ends_accept_and_closes_readers() {
  let inp: InPort<u8> = InPort::new();
  let proc = Process::new();
  let r = inp.open(&proc);
  let mut accepted = inp.accept();
  let _ = accepted.next().await;
  inp.close();
  assert!(accepted.next().await.is_none());
  assert!(r.is_closed());
  assert!(inp.open(&Process::new()).is_closed());
}
