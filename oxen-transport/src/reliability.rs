//! The reliability engine (C3, §4.3): outstanding-message tracking, ack
//! processing, retransmit backoff, and keepalive id bookkeeping.
//!
//! Grounded on `tox_sequenced::session::SequenceSession`'s outstanding-entry
//! lifecycle and `cleanup`'s `retain`-based expiry, stripped of
//! fragmentation and congestion control (out of this protocol's scope —
//! parcels are single datagrams).

use crate::error::ReliabilityError;
use crate::outstanding::OutstandingTable;
use crate::time::TimeProvider;
use oxen_wire::{KeepaliveId, MessageId, Sid};
use std::collections::{HashMap, VecDeque};

/// Tunables for the reliability engine (§6).
#[derive(Debug, Clone)]
pub struct Config {
    pub retry_base_ms: u64,
    pub retry_cap: u32,
    pub max_payload_bytes: usize,
    /// Keepalive ids per neighbor that can be outstanding (unanswered)
    /// before the oldest is dropped rather than echoed.
    pub keepalive_pending_window: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            retry_base_ms: 1_000,
            retry_cap: 6,
            max_payload_bytes: 1200,
            keepalive_pending_window: 64,
        }
    }
}

/// A retransmit due for re-framing and re-sending by the caller (the engine
/// does no I/O itself).
#[derive(Debug, Clone)]
pub struct DueRetransmit {
    pub dest: Sid,
    pub id: MessageId,
    pub payload: Vec<u8>,
    pub retry_count: u32,
}

/// Events the reliability engine wants the orchestrator to act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReliabilityEvent {
    /// An ack or a resolved keepalive echo observed contact with `neighbor`
    /// at `timestamp_ms` — feed into C4's local matrix row.
    ContactObserved { neighbor: Sid, timestamp_ms: i64 },
}

struct KeepaliveTracker {
    next_id: HashMap<Sid, u64>,
    pending: HashMap<Sid, VecDeque<(KeepaliveId, i64)>>,
    /// `kk` owed to a neighbor, with the time its `ka` was received —
    /// used to force a standalone echo out within `KEEPALIVE_ECHO_DELAY`
    /// (§4.3) even if no other traffic is due to that neighbor.
    pending_echo: HashMap<Sid, (KeepaliveId, i64)>,
    window: usize,
}

impl KeepaliveTracker {
    fn new(window: usize) -> Self {
        KeepaliveTracker {
            next_id: HashMap::new(),
            pending: HashMap::new(),
            pending_echo: HashMap::new(),
            window,
        }
    }

    fn allocate(&mut self, neighbor: &Sid, now_ms: i64) -> KeepaliveId {
        let counter = self.next_id.entry(neighbor.clone()).or_insert(0);
        let id = KeepaliveId(*counter);
        *counter += 1;
        let queue = self.pending.entry(neighbor.clone()).or_default();
        queue.push_back((id, now_ms));
        while queue.len() > self.window {
            queue.pop_front();
        }
        id
    }

    fn note_incoming(&mut self, neighbor: Sid, ka: KeepaliveId, now_ms: i64) {
        self.pending_echo.insert(neighbor, (ka, now_ms));
    }

    fn take_pending_echo(&mut self, neighbor: &Sid) -> Option<KeepaliveId> {
        self.pending_echo.remove(neighbor).map(|(id, _)| id)
    }

    fn peers_owing_echo(&self, now_ms: i64, delay_ms: i64) -> Vec<Sid> {
        self.pending_echo
            .iter()
            .filter(|(_, (_, received_at))| now_ms - received_at >= delay_ms)
            .map(|(neighbor, _)| neighbor.clone())
            .collect()
    }

    fn resolve(&mut self, neighbor: &Sid, kk: KeepaliveId) -> Option<i64> {
        let queue = self.pending.get_mut(neighbor)?;
        let pos = queue.iter().position(|(id, _)| *id == kk)?;
        let (_, ts) = queue.remove(pos)?;
        Some(ts)
    }
}

/// The reliability engine. One instance per local node, shared across all
/// destinations.
pub struct ReliabilityEngine {
    config: Config,
    outstanding: OutstandingTable,
    keepalive: KeepaliveTracker,
    events: VecDeque<ReliabilityEvent>,
}

impl ReliabilityEngine {
    pub fn new(config: Config) -> Self {
        let keepalive = KeepaliveTracker::new(config.keepalive_pending_window);
        ReliabilityEngine {
            config,
            outstanding: OutstandingTable::new(),
            keepalive,
            events: VecDeque::new(),
        }
    }

    /// Sends a message to `dest`. If `want_ack`, allocates and tracks an id;
    /// otherwise the message is fire-and-forget and untracked (§3).
    pub fn send(
        &mut self,
        dest: Sid,
        payload: Vec<u8>,
        want_ack: bool,
        time: &dyn TimeProvider,
    ) -> Result<Option<MessageId>, ReliabilityError> {
        if payload.len() > self.config.max_payload_bytes {
            return Err(ReliabilityError::PayloadTooLarge {
                size: payload.len(),
                limit: self.config.max_payload_bytes,
            });
        }
        if !want_ack {
            return Ok(None);
        }
        let id = self.outstanding.allocate_id(&dest);
        self.outstanding.insert(
            dest,
            id,
            payload,
            time.now_system_ms(),
            time.now_instant(),
        );
        Ok(Some(id))
    }

    /// Processes an `ma` for `(from, id)`. Duplicate/unknown acks are a
    /// silent no-op (§8: ack idempotence).
    pub fn handle_ack(&mut self, from: Sid, id: MessageId) {
        if let Some(entry) = self.outstanding.ack(&from, id) {
            tracing::debug!(dest = %from, id = %id, "message acked");
            self.events.push_back(ReliabilityEvent::ContactObserved {
                neighbor: from,
                timestamp_ms: entry.first_send_time_ms,
            });
        }
    }

    /// Drops all outstanding entries for a peer that has been given up on
    /// (§4.4).
    pub fn drop_destination(&mut self, dest: &Sid) {
        let dropped = self.outstanding.drop_destination(dest);
        if dropped > 0 {
            tracing::debug!(dest = %dest, count = dropped, "dropped outstanding entries for given-up peer");
        }
    }

    /// Returns every entry whose backoff has elapsed, incrementing its
    /// retry count. `first_send_time_ms` is never touched here.
    pub fn retransmit_due(&mut self, time: &dyn TimeProvider) -> Vec<DueRetransmit> {
        let now = time.now_instant();
        let retry_base_ms = self.config.retry_base_ms;
        let retry_cap = self.config.retry_cap;
        let mut due = Vec::new();
        for (dest, entries) in self.outstanding.entries_mut() {
            for entry in entries.values_mut() {
                let backoff_ms =
                    retry_base_ms * (1u64 << entry.retry_count.min(retry_cap));
                let elapsed = now.saturating_duration_since(entry.last_send_instant);
                if elapsed.as_millis() as u64 >= backoff_ms {
                    entry.retry_count += 1;
                    entry.last_send_instant = now;
                    due.push(DueRetransmit {
                        dest: dest.clone(),
                        id: entry.id,
                        payload: entry.payload.clone(),
                        retry_count: entry.retry_count,
                    });
                }
            }
        }
        due
    }

    pub fn outstanding_count(&self, dest: &Sid) -> usize {
        self.outstanding.outstanding_count(dest)
    }

    pub fn total_outstanding(&self) -> usize {
        self.outstanding.total_outstanding()
    }

    /// Allocates a fresh keepalive id to piggyback as `ka` on the next
    /// outbound parcel to `neighbor`.
    pub fn allocate_keepalive(&mut self, neighbor: &Sid, time: &dyn TimeProvider) -> KeepaliveId {
        self.keepalive.allocate(neighbor, time.now_system_ms())
    }

    /// Records an incoming `ka` from `neighbor`, scheduling it to be echoed
    /// as `kk` on the next outbound parcel (§4.4).
    pub fn note_incoming_ka(&mut self, neighbor: Sid, ka: KeepaliveId, now_ms: i64) {
        self.keepalive.note_incoming(neighbor, ka, now_ms);
    }

    /// Takes the `kk` to piggyback on the next outbound parcel to
    /// `neighbor`, if one is owed.
    pub fn take_pending_echo(&mut self, neighbor: &Sid) -> Option<KeepaliveId> {
        self.keepalive.take_pending_echo(neighbor)
    }

    /// Neighbors whose `kk` has been owed for at least `delay_ms` (§4.3:
    /// "...or a standalone parcel within `KEEPALIVE_ECHO_DELAY`").
    pub fn peers_owing_echo(&self, now_ms: i64, delay_ms: i64) -> Vec<Sid> {
        self.keepalive.peers_owing_echo(now_ms, delay_ms)
    }

    /// Resolves an incoming `kk` from `neighbor` against our own earlier
    /// `ka`, emitting a contact observation on success.
    pub fn resolve_kk(&mut self, neighbor: Sid, kk: KeepaliveId) {
        if let Some(ts) = self.keepalive.resolve(&neighbor, kk) {
            self.events.push_back(ReliabilityEvent::ContactObserved {
                neighbor,
                timestamp_ms: ts,
            });
        }
    }

    pub fn poll_event(&mut self) -> Option<ReliabilityEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::ManualTimeProvider;

    #[test]
    fn send_without_ack_is_untracked() {
        let mut engine = ReliabilityEngine::new(Config::default());
        let clock = ManualTimeProvider::new(0);
        let id = engine
            .send(Sid::from("b"), vec![1, 2, 3], false, &clock)
            .unwrap();
        assert_eq!(id, None);
        assert_eq!(engine.total_outstanding(), 0);
    }

    #[test]
    fn send_with_ack_tracks_and_acks_remove() {
        let mut engine = ReliabilityEngine::new(Config::default());
        let clock = ManualTimeProvider::new(1000);
        let id = engine
            .send(Sid::from("b"), vec![1, 2, 3], true, &clock)
            .unwrap()
            .unwrap();
        assert_eq!(engine.outstanding_count(&Sid::from("b")), 1);

        engine.handle_ack(Sid::from("b"), id);
        assert_eq!(engine.outstanding_count(&Sid::from("b")), 0);
        let event = engine.poll_event().unwrap();
        assert_eq!(
            event,
            ReliabilityEvent::ContactObserved {
                neighbor: Sid::from("b"),
                timestamp_ms: 1000,
            }
        );
    }

    #[test]
    fn duplicate_ack_is_a_no_op() {
        let mut engine = ReliabilityEngine::new(Config::default());
        let clock = ManualTimeProvider::new(0);
        let id = engine
            .send(Sid::from("b"), vec![1], true, &clock)
            .unwrap()
            .unwrap();
        engine.handle_ack(Sid::from("b"), id);
        engine.poll_event();
        engine.handle_ack(Sid::from("b"), id); // duplicate
        assert_eq!(engine.poll_event(), None);
    }

    #[test]
    fn retransmit_backoff_is_exponential_and_preserves_first_send_time() {
        let mut config = Config::default();
        config.retry_base_ms = 100;
        let mut engine = ReliabilityEngine::new(config);
        let clock = ManualTimeProvider::new(0);
        let id = engine
            .send(Sid::from("b"), vec![9], true, &clock)
            .unwrap()
            .unwrap();

        // Too soon: nothing due yet.
        assert!(engine.retransmit_due(&clock).is_empty());

        clock.advance(100);
        let due = engine.retransmit_due(&clock);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, id);
        assert_eq!(due[0].retry_count, 1);

        // Next backoff is 200ms (100 * 2^1); 100ms more isn't enough.
        clock.advance(100);
        assert!(engine.retransmit_due(&clock).is_empty());
        clock.advance(100);
        let due = engine.retransmit_due(&clock);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].retry_count, 2);
    }

    #[test]
    fn give_up_drops_outstanding() {
        let mut engine = ReliabilityEngine::new(Config::default());
        let clock = ManualTimeProvider::new(0);
        engine
            .send(Sid::from("b"), vec![1], true, &clock)
            .unwrap();
        engine
            .send(Sid::from("b"), vec![2], true, &clock)
            .unwrap();
        assert_eq!(engine.outstanding_count(&Sid::from("b")), 2);
        engine.drop_destination(&Sid::from("b"));
        assert_eq!(engine.outstanding_count(&Sid::from("b")), 0);
    }

    #[test]
    fn keepalive_echo_round_trip_observes_contact() {
        let mut engine = ReliabilityEngine::new(Config::default());
        let clock = ManualTimeProvider::new(500);
        let ka = engine.allocate_keepalive(&Sid::from("n"), &clock);
        clock.advance(10);
        engine.resolve_kk(Sid::from("n"), ka);
        let event = engine.poll_event().unwrap();
        assert_eq!(
            event,
            ReliabilityEvent::ContactObserved {
                neighbor: Sid::from("n"),
                timestamp_ms: 500,
            }
        );
    }

    #[test]
    fn incoming_ka_is_scheduled_for_echo() {
        let mut engine = ReliabilityEngine::new(Config::default());
        engine.note_incoming_ka(Sid::from("n"), KeepaliveId(7), 0);
        assert_eq!(
            engine.take_pending_echo(&Sid::from("n")),
            Some(KeepaliveId(7))
        );
        assert_eq!(engine.take_pending_echo(&Sid::from("n")), None);
    }

    #[test]
    fn echo_becomes_overdue_after_the_configured_delay() {
        let mut engine = ReliabilityEngine::new(Config::default());
        engine.note_incoming_ka(Sid::from("n"), KeepaliveId(1), 1_000);
        assert!(engine.peers_owing_echo(1_500, 1_000).is_empty());
        assert_eq!(
            engine.peers_owing_echo(2_000, 1_000),
            vec![Sid::from("n")]
        );
    }
}
