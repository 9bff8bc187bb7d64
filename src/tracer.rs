//! Packet lineage tracking and acknowledgment propagation.
//!
//! The [Tracer] records which reader consumed each packet, which packets were
//! derived from which sources on which writers, and any manual links. When
//! downstream acknowledgments come back for a derived packet, the tracer walks
//! the lineage backwards and answers the original source on the reader it was
//! read from:
//!
//! - a source fanned out into several derived packets is answered only once
//!   every one of them has an outcome (outcomes are combined by the merger);
//! - a discard (`None`) outcome answers the source with the discard sentinel
//!   immediately, without waiting for siblings;
//! - all bookkeeping for a resolved packet is dropped, so a fully answered
//!   subgraph leaves the tracer empty.
//!
//! Propagation runs as a worklist inside one critical section. Replies to
//! readers are sent after the lock is released but before the call returns.

use crate::port::{Ack, Reader, Writer};
use crate::types::{Packet, PacketId, ReaderId, WriterId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, instrument, trace};

/// Combines the outcomes collected for one packet into the single outcome
/// forwarded upstream. Receives at least one packet, ordered by the creation
/// order of the derived packets that produced them.
pub type Merger<T> = Arc<dyn Fn(Vec<Packet<T>>) -> Option<Packet<T>> + Send + Sync>;

/// Lineage tracker. Cloning shares the same lineage graph.
pub struct Tracer<T> {
  state: Arc<Mutex<State<T>>>,
  merger: Merger<T>,
}

struct State<T> {
  /// Arena of every packet with live bookkeeping.
  packets: HashMap<PacketId, Packet<T>>,
  /// Read packet -> the reader that consumed it and is owed its answer.
  readers: HashMap<PacketId, Reader<T>>,
  /// Reader -> packets it read that are still unanswered, in read order.
  reads: HashMap<ReaderId, Vec<PacketId>>,
  /// Written packet -> the writer it went out on.
  writers: HashMap<PacketId, WriterId>,
  /// Writer -> packets awaiting acknowledgment, oldest first.
  writes: HashMap<WriterId, VecDeque<PacketId>>,
  /// Acknowledgments still expected for a written packet.
  pending: HashMap<PacketId, usize>,
  /// Derived packet -> the packets it was derived from.
  sources: HashMap<PacketId, Vec<PacketId>>,
  /// Source packet -> derived packets still without an outcome.
  targets: HashMap<PacketId, Vec<PacketId>>,
  /// Written packet -> reader-local packets read from it through this tracer.
  downstream: HashMap<PacketId, Vec<PacketId>>,
  /// Outcomes collected so far, keyed by the derived packet that produced each.
  outcomes: HashMap<PacketId, Vec<(PacketId, Packet<T>)>>,
  /// Manual links as `(source, derived)` pairs.
  links: Vec<(PacketId, PacketId)>,
}

enum Step<T> {
  /// One acknowledgment for a written packet.
  Ack(PacketId, Option<Packet<T>>),
  /// Final outcome for a packet.
  Resolve(PacketId, Option<Packet<T>>),
  /// Drop an orphaned packet without answering anyone.
  Discard(PacketId),
}

struct Reply<T> {
  reader: Reader<T>,
  packet: Packet<T>,
  outcome: Option<Packet<T>>,
}

impl<T: Send + Sync + 'static> Tracer<T> {
  /// Tracer whose merger keeps the outcome of the earliest derived packet.
  pub fn new() -> Self {
    Self::with_merger(Arc::new(|outcomes: Vec<Packet<T>>| outcomes.into_iter().next()))
  }

  pub fn with_merger(merger: Merger<T>) -> Self {
    Self {
      state: Arc::new(Mutex::new(State::default())),
      merger,
    }
  }

  /// Records that `reader` consumed `packet`, making it a source for later writes.
  #[instrument(level = "trace", skip_all, fields(reader = %reader.id(), packet = %packet.id()))]
  pub fn read(&self, reader: &Reader<T>, packet: &Packet<T>) {
    let mut state = self.lock();
    let id = packet.id();
    if state.readers.contains_key(&id) {
      return;
    }
    state.packets.insert(id, packet.clone());
    state.readers.insert(id, reader.clone());
    state.reads.entry(reader.id()).or_default().push(id);
    if let Some(origin) = reader.origin(packet)
      && state.writers.contains_key(&origin.id())
    {
      state.downstream.entry(origin.id()).or_default().push(id);
    }
  }

  /// Writes `packet` on `writer`, recording it as derived from each of
  /// `sources`. A source that already has a live derived packet on the same
  /// writer is not re-recorded. Returns how many readers accepted the packet;
  /// when none did, the packet is resolved at once with itself as outcome.
  #[instrument(level = "trace", skip_all, fields(writer = %writer.id(), packet = %packet.id()))]
  pub fn write(&self, writer: &Writer<T>, sources: &[Packet<T>], packet: Packet<T>) -> usize {
    let mut state = self.lock();
    let id = packet.id();
    state.packets.insert(id, packet.clone());
    state.writers.insert(id, writer.id());
    state.writes.entry(writer.id()).or_default().push_back(id);

    for source in sources {
      let source_id = source.id();
      if source_id == id {
        continue;
      }
      let already = state.targets.get(&source_id).is_some_and(|targets| {
        targets
          .iter()
          .any(|t| state.writers.get(t) == Some(&writer.id()))
      });
      if already {
        trace!(source = %source_id, "source already derived on writer");
        continue;
      }
      state
        .packets
        .entry(source_id)
        .or_insert_with(|| source.clone());
      state.sources.entry(id).or_default().push(source_id);
      state.targets.entry(source_id).or_default().push(id);
    }

    let accepted = writer.write(packet.clone());
    let replies = if accepted == 0 {
      self.propagate(&mut state, [Step::Resolve(id, Some(packet))])
    } else {
      state.pending.insert(id, accepted);
      Vec::new()
    };
    drop(state);
    deliver(replies);
    accepted
  }

  /// Declares `b` as derived from `a` without a read or write. Answering `b`
  /// counts towards answering `a`.
  pub fn link(&self, a: &Packet<T>, b: &Packet<T>) {
    if a == b {
      return;
    }
    let mut state = self.lock();
    if state.links.contains(&(a.id(), b.id())) {
      return;
    }
    state.packets.entry(a.id()).or_insert_with(|| a.clone());
    state.packets.entry(b.id()).or_insert_with(|| b.clone());
    state.links.push((a.id(), b.id()));
    state.sources.entry(b.id()).or_default().push(a.id());
    state.targets.entry(a.id()).or_default().push(b.id());
  }

  /// Acknowledges the oldest outstanding write on `writer` with `outcome`.
  #[instrument(level = "trace", skip_all, fields(writer = %writer.id()))]
  pub fn receive(&self, writer: &Writer<T>, outcome: Option<Packet<T>>) {
    let mut state = self.lock();
    let Some(id) = state
      .writes
      .get(&writer.id())
      .and_then(|queue| queue.front().copied())
    else {
      trace!("receive with no outstanding write");
      return;
    };
    let replies = self.propagate(&mut state, [Step::Ack(id, outcome)]);
    drop(state);
    deliver(replies);
  }

  /// Applies an acknowledgment that came back to `writer`.
  #[instrument(level = "trace", skip_all, fields(writer = %writer.id(), written = %ack.written.id()))]
  pub fn acknowledge(&self, writer: &Writer<T>, ack: Ack<T>) {
    let mut state = self.lock();
    let id = ack.written.id();
    if state.writers.get(&id) != Some(&writer.id()) {
      trace!("acknowledgment for untracked write");
      return;
    }
    let replies = self.propagate(&mut state, [Step::Ack(id, ack.outcome)]);
    drop(state);
    deliver(replies);
  }

  /// Answers a tracked packet directly with `outcome`.
  #[instrument(level = "trace", skip_all, fields(packet = %packet.id()))]
  pub fn resolve(&self, packet: &Packet<T>, outcome: Option<Packet<T>>) {
    let mut state = self.lock();
    let replies = self.propagate(&mut state, [Step::Resolve(packet.id(), outcome)]);
    drop(state);
    deliver(replies);
  }

  /// Answers every packet still outstanding on `reader` with the discard
  /// sentinel, releasing its lineage. Returns how many were outstanding.
  #[instrument(level = "trace", skip_all, fields(reader = %reader.id()))]
  pub fn discard_reader(&self, reader: &Reader<T>) -> usize {
    let mut state = self.lock();
    let ids = state.reads.get(&reader.id()).cloned().unwrap_or_default();
    self.discard(state, ids)
  }

  /// Resolves every write on `writer` still awaiting acknowledgment with the
  /// discard sentinel, answering its sources. Returns how many were awaiting.
  #[instrument(level = "trace", skip_all, fields(writer = %writer.id()))]
  pub fn discard_writer(&self, writer: &Writer<T>) -> usize {
    let mut state = self.lock();
    let ids: Vec<PacketId> = state
      .writes
      .get(&writer.id())
      .map(|queue| queue.iter().copied().collect())
      .unwrap_or_default();
    self.discard(state, ids)
  }

  fn discard(&self, mut state: MutexGuard<'_, State<T>>, ids: Vec<PacketId>) -> usize {
    let count = ids.len();
    if count > 0 {
      debug!(count, "discarding outstanding lineage");
    }
    let replies = self.propagate(&mut state, ids.into_iter().map(|id| Step::Resolve(id, None)));
    drop(state);
    deliver(replies);
    count
  }

  /// Discards all lineage. Outstanding reads are answered with the discard sentinel.
  pub fn close(&self) {
    let state = std::mem::take(&mut *self.lock());
    let mut replies = Vec::new();
    for (id, reader) in state.readers {
      if let Some(packet) = state.packets.get(&id) {
        replies.push(Reply {
          reader,
          packet: packet.clone(),
          outcome: None,
        });
      }
    }
    deliver(replies);
  }
}

impl<T> Tracer<T> {
  /// Links whose first end is `a` (when given) and second end is `b` (when
  /// given), flattened as `[a, b, ...]`.
  pub fn links(&self, a: Option<&Packet<T>>, b: Option<&Packet<T>>) -> Vec<Packet<T>> {
    let state = self.lock();
    state
      .links
      .iter()
      .filter(|(x, y)| a.is_none_or(|a| a.id() == *x) && b.is_none_or(|b| b.id() == *y))
      .flat_map(|(x, y)| [state.packets.get(x), state.packets.get(y)])
      .flatten()
      .cloned()
      .collect()
  }

  /// Calls `hook` for `packet`, then each of its recorded ancestors, then each
  /// of its descendants. Does not change any state; the hook runs unlocked.
  pub fn dispatch(&self, packet: &Packet<T>, mut hook: impl FnMut(&Packet<T>)) {
    let visited = {
      let state = self.lock();
      let mut order = vec![packet.clone()];
      let mut seen = HashSet::from([packet.id()]);

      let mut queue = VecDeque::from([packet.id()]);
      while let Some(id) = queue.pop_front() {
        let mut up: Vec<PacketId> = state.sources.get(&id).cloned().unwrap_or_default();
        if let Some(reader) = state.readers.get(&id)
          && let Some(packet) = state.packets.get(&id)
          && let Some(origin) = reader.origin(packet)
          && state.packets.contains_key(&origin.id())
        {
          up.push(origin.id());
        }
        for next in up {
          if seen.insert(next)
            && let Some(p) = state.packets.get(&next)
          {
            order.push(p.clone());
            queue.push_back(next);
          }
        }
      }

      let mut queue = VecDeque::from([packet.id()]);
      while let Some(id) = queue.pop_front() {
        let down = state
          .targets
          .get(&id)
          .into_iter()
          .chain(state.downstream.get(&id))
          .flatten()
          .copied();
        for next in down.collect::<Vec<_>>() {
          if seen.insert(next)
            && let Some(p) = state.packets.get(&next)
          {
            order.push(p.clone());
            queue.push_back(next);
          }
        }
      }
      order
    };
    for p in &visited {
      hook(p);
    }
  }

  /// Packets read on `reader` that are not yet answered, in read order.
  pub fn reads(&self, reader: &Reader<T>) -> Vec<Packet<T>> {
    let state = self.lock();
    state
      .reads
      .get(&reader.id())
      .into_iter()
      .flatten()
      .filter_map(|id| state.packets.get(id).cloned())
      .collect()
  }

  /// Packets written on `writer` still awaiting acknowledgment, oldest first.
  pub fn writes(&self, writer: &Writer<T>) -> Vec<Packet<T>> {
    let state = self.lock();
    state
      .writes
      .get(&writer.id())
      .into_iter()
      .flatten()
      .filter_map(|id| state.packets.get(id).cloned())
      .collect()
  }

  /// True if `packet` has live bookkeeping.
  pub fn contains(&self, packet: &Packet<T>) -> bool {
    self.lock().packets.contains_key(&packet.id())
  }

  /// Number of packets with live bookkeeping.
  pub fn len(&self) -> usize {
    self.lock().packets.len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  fn lock(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn propagate(
    &self,
    state: &mut State<T>,
    steps: impl IntoIterator<Item = Step<T>>,
  ) -> Vec<Reply<T>> {
    let mut replies = Vec::new();
    let mut work: VecDeque<Step<T>> = steps.into_iter().collect();

    while let Some(step) = work.pop_front() {
      match step {
        Step::Ack(id, outcome) => {
          if !state.writers.contains_key(&id) {
            continue;
          }
          let Some(outcome) = outcome else {
            work.push_back(Step::Resolve(id, None));
            continue;
          };
          state
            .outcomes
            .entry(id)
            .or_default()
            .push((outcome.id(), outcome));
          let left = state
            .pending
            .get(&id)
            .copied()
            .unwrap_or(1)
            .saturating_sub(1);
          if left == 0 {
            let merged = self.merge(state, id);
            work.push_back(Step::Resolve(id, merged));
          } else {
            state.pending.insert(id, left);
          }
        }

        Step::Resolve(id, outcome) => {
          let Some(packet) = state.packets.remove(&id) else {
            continue;
          };
          debug!(packet = %id, answered = outcome.is_some(), "lineage resolved");
          state.detach_write(id);
          state.pending.remove(&id);
          state.outcomes.remove(&id);
          state.links.retain(|(a, b)| *a != id && *b != id);
          state.downstream.remove(&id);

          for target in state.targets.remove(&id).unwrap_or_default() {
            if state.unlink_source(target, id) {
              work.push_back(Step::Discard(target));
            }
          }

          if let Some(reader) = state.readers.remove(&id) {
            state.detach_read(reader.id(), id);
            let outcome = outcome.as_ref().map(Packet::carry);
            match reader.origin(&packet) {
              Some(origin) if state.writers.contains_key(&origin.id()) => {
                if let Some(list) = state.downstream.get_mut(&origin.id()) {
                  list.retain(|p| *p != id);
                }
                reader.forget(&packet);
                work.push_back(Step::Ack(origin.id(), outcome));
              }
              _ => replies.push(Reply {
                reader,
                packet: packet.clone(),
                outcome,
              }),
            }
          }

          for source in state.sources.remove(&id).unwrap_or_default() {
            let Some(targets) = state.targets.get_mut(&source) else {
              continue;
            };
            targets.retain(|t| *t != id);
            let remaining = targets.len();
            match &outcome {
              None => work.push_back(Step::Resolve(source, None)),
              Some(o) => {
                state
                  .outcomes
                  .entry(source)
                  .or_default()
                  .push((id, o.clone()));
                if remaining == 0 {
                  state.targets.remove(&source);
                  let merged = self.merge(state, source);
                  work.push_back(Step::Resolve(source, merged));
                }
              }
            }
          }
        }

        Step::Discard(id) => {
          if state.readers.contains_key(&id) || state.writers.contains_key(&id) {
            continue;
          }
          if state.packets.remove(&id).is_none() {
            continue;
          }
          trace!(packet = %id, "orphaned lineage discarded");
          state.outcomes.remove(&id);
          state.links.retain(|(a, b)| *a != id && *b != id);
          state.sources.remove(&id);
          for target in state.targets.remove(&id).unwrap_or_default() {
            if state.unlink_source(target, id) {
              work.push_back(Step::Discard(target));
            }
          }
        }
      }
    }
    replies
  }

  fn merge(&self, state: &mut State<T>, id: PacketId) -> Option<Packet<T>> {
    let mut outcomes = state.outcomes.remove(&id).unwrap_or_default();
    if outcomes.is_empty() {
      return None;
    }
    outcomes.sort_by_key(|(key, _)| *key);
    (self.merger)(outcomes.into_iter().map(|(_, p)| p).collect())
  }
}

impl<T> State<T> {
  fn is_empty(&self) -> bool {
    self.packets.is_empty()
      && self.readers.is_empty()
      && self.reads.is_empty()
      && self.writers.is_empty()
      && self.writes.is_empty()
      && self.pending.is_empty()
      && self.sources.is_empty()
      && self.targets.is_empty()
      && self.downstream.is_empty()
      && self.outcomes.is_empty()
      && self.links.is_empty()
  }

  fn detach_write(&mut self, id: PacketId) {
    let Some(writer) = self.writers.remove(&id) else {
      return;
    };
    if let Some(queue) = self.writes.get_mut(&writer) {
      queue.retain(|p| *p != id);
      if queue.is_empty() {
        self.writes.remove(&writer);
      }
    }
  }

  fn detach_read(&mut self, reader: ReaderId, id: PacketId) {
    if let Some(list) = self.reads.get_mut(&reader) {
      list.retain(|p| *p != id);
      if list.is_empty() {
        self.reads.remove(&reader);
      }
    }
  }

  /// Removes `source` from `target`'s sources. Returns `true` when `target`
  /// is left without sources.
  fn unlink_source(&mut self, target: PacketId, source: PacketId) -> bool {
    let Some(sources) = self.sources.get_mut(&target) else {
      return false;
    };
    sources.retain(|s| *s != source);
    if sources.is_empty() {
      self.sources.remove(&target);
      true
    } else {
      false
    }
  }
}

impl<T> Default for State<T> {
  fn default() -> Self {
    Self {
      packets: HashMap::new(),
      readers: HashMap::new(),
      reads: HashMap::new(),
      writers: HashMap::new(),
      writes: HashMap::new(),
      pending: HashMap::new(),
      sources: HashMap::new(),
      targets: HashMap::new(),
      downstream: HashMap::new(),
      outcomes: HashMap::new(),
      links: Vec::new(),
    }
  }
}

fn deliver<T>(replies: Vec<Reply<T>>) {
  for reply in replies {
    reply.reader.receive(&reply.packet, reply.outcome);
  }
}

impl<T> Clone for Tracer<T> {
  fn clone(&self) -> Self {
    Self {
      state: Arc::clone(&self.state),
      merger: Arc::clone(&self.merger),
    }
  }
}

impl<T: Send + Sync + 'static> Default for Tracer<T> {
  fn default() -> Self {
    Self::new()
  }
}
