//! The per-destination outstanding-message table (§3, §4.3).

use oxen_wire::{MessageId, Sid};
use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// One in-flight, ack-pending message (§3: "Outstanding-message table").
#[derive(Debug, Clone)]
pub struct OutstandingEntry {
    pub id: MessageId,
    /// Set once, at first send, and never touched again by a retransmit —
    /// this is the value that ends up in the local last-contact cell on ack.
    pub first_send_time_ms: i64,
    pub last_send_instant: Instant,
    pub retry_count: u32,
    pub payload: Vec<u8>,
}

/// Tracks outstanding entries for every destination this node has sent a
/// trackable `md` to. One [`OutstandingTable`] per [`crate::ReliabilityEngine`].
#[derive(Debug, Default)]
pub struct OutstandingTable {
    by_dest: HashMap<Sid, BTreeMap<i64, OutstandingEntry>>,
    next_id: HashMap<Sid, i64>,
}

impl OutstandingTable {
    pub fn new() -> Self {
        OutstandingTable::default()
    }

    /// Allocates the next id for `dest`, monotonically increasing and never
    /// reused within this table's lifetime.
    pub fn allocate_id(&mut self, dest: &Sid) -> MessageId {
        let counter = self.next_id.entry(dest.clone()).or_insert(0);
        let id = *counter;
        *counter += 1;
        MessageId(id)
    }

    pub fn insert(
        &mut self,
        dest: Sid,
        id: MessageId,
        payload: Vec<u8>,
        now_ms: i64,
        now_instant: Instant,
    ) {
        self.by_dest.entry(dest).or_default().insert(
            id.0,
            OutstandingEntry {
                id,
                first_send_time_ms: now_ms,
                last_send_instant: now_instant,
                retry_count: 0,
                payload,
            },
        );
    }

    /// Removes and returns the entry acknowledged by `(dest, id)`. Returns
    /// `None` on a duplicate or unknown ack, which callers must treat as a
    /// silent no-op (§8: "Ack idempotence").
    pub fn ack(&mut self, dest: &Sid, id: MessageId) -> Option<OutstandingEntry> {
        let entries = self.by_dest.get_mut(dest)?;
        let entry = entries.remove(&id.0);
        if entries.is_empty() {
            self.by_dest.remove(dest);
        }
        entry
    }

    /// Drops every outstanding entry for a peer that has been given up on
    /// (§4.4: "cause C3 to drop all outstanding entries for that peer").
    pub fn drop_destination(&mut self, dest: &Sid) -> usize {
        self.by_dest.remove(dest).map(|m| m.len()).unwrap_or(0)
    }

    pub fn outstanding_count(&self, dest: &Sid) -> usize {
        self.by_dest.get(dest).map(|m| m.len()).unwrap_or(0)
    }

    pub fn total_outstanding(&self) -> usize {
        self.by_dest.values().map(BTreeMap::len).sum()
    }

    pub fn destinations(&self) -> impl Iterator<Item = &Sid> {
        self.by_dest.keys()
    }

    pub(crate) fn entries_mut(
        &mut self,
    ) -> impl Iterator<Item = (&Sid, &mut BTreeMap<i64, OutstandingEntry>)> {
        self.by_dest.iter_mut()
    }
}
