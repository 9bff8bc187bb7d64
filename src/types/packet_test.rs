//! Tests for `Packet`.

use super::Packet;
use std::collections::HashSet;
use std::sync::Arc;

#[test]
fn equality_is_by_identity() {
  let a = Packet::new(1);
  let b = Packet::new(1);
  assert_ne!(a, b);
  assert_eq!(a, a.clone());
  assert_eq!(a.payload(), b.payload());
}

#[test]
fn carry_shares_payload_with_new_identity() {
  let a = Packet::new("hello".to_string());
  let b = a.carry();
  assert_ne!(a.id(), b.id());
  assert!(Arc::ptr_eq(a.payload_arc(), b.payload_arc()));
}

#[test]
fn ids_are_monotonic() {
  let a = Packet::new(());
  let b = Packet::new(());
  assert!(b.id() > a.id());
}

#[test]
fn hash_set_keys_on_identity() {
  let a = Packet::new(7);
  let mut set = HashSet::new();
  set.insert(a.clone());
  set.insert(a.clone());
  set.insert(Packet::new(7));
  assert_eq!(set.len(), 2);
}
