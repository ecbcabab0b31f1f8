//! The last-contact matrix (§3, §4.4): `contacts[observer][observed] ->
//! timestamp`. Local-row writes come only from C3 ack/keepalive contact
//! observations; foreign rows are merged cell-wise from gossip.
//!
//! Grounded on `tox_reconcile::iblt`'s merge discipline (commutative,
//! never-rewinding cell update) adapted from XOR-sum merge to max-timestamp
//! merge. `HashMap` is used rather than `tox_proto::FlatMap`: that
//! structure's linear scan targets under ~64 entries, but a cluster's peer
//! count here is unbounded (see DESIGN.md).

use oxen_wire::{ContactCell, Sid};
use std::collections::HashMap;

#[derive(Debug, Default, Clone)]
pub struct LastContactMatrix {
    cells: HashMap<(Sid, Sid), i64>,
}

impl LastContactMatrix {
    pub fn new() -> Self {
        LastContactMatrix::default()
    }

    pub fn get(&self, observer: &Sid, observed: &Sid) -> Option<i64> {
        self.cells.get(&(observer.clone(), observed.clone())).copied()
    }

    /// Writes the local row directly (§3: "The local row of the last-contact
    /// matrix changes only on ack receipt or explicit self-update.").
    /// Retransmits/duplicate observations never move a cell backwards.
    pub fn observe_local(&mut self, local: &Sid, observed: Sid, timestamp_ms: i64) {
        let key = (local.clone(), observed);
        let slot = self.cells.entry(key).or_insert(i64::MIN);
        if timestamp_ms > *slot {
            *slot = timestamp_ms;
        }
    }

    /// Merges gossiped cells cell-wise by max timestamp (§8: "Gossip
    /// monotonicity: a received `lc` can only advance cell timestamps,
    /// never rewind."). Cells absent from `incoming` are left untouched —
    /// "no information" is never represented as a sentinel (§9).
    pub fn merge_gossip(&mut self, incoming: &[ContactCell]) {
        for cell in incoming {
            let key = (cell.observer.clone(), cell.observed.clone());
            let slot = self.cells.entry(key).or_insert(i64::MIN);
            if cell.timestamp > *slot {
                *slot = cell.timestamp;
            }
        }
    }

    /// True if the observer→observed link was seen within `link_stale_ms`
    /// of `now_ms` (§3: "possibly usable").
    pub fn is_usable(
        &self,
        observer: &Sid,
        observed: &Sid,
        now_ms: i64,
        link_stale_ms: i64,
    ) -> bool {
        match self.get(observer, observed) {
            Some(ts) => now_ms.saturating_sub(ts) <= link_stale_ms,
            None => false,
        }
    }

    /// Every SID that appears in any row or column (§3: "a known SID").
    pub fn known_sids(&self) -> std::collections::HashSet<Sid> {
        let mut set = std::collections::HashSet::new();
        for (observer, observed) in self.cells.keys() {
            set.insert(observer.clone());
            set.insert(observed.clone());
        }
        set
    }

    /// All `(observed, timestamp)` pairs in `observer`'s row — used both for
    /// classification and to build gossip fragments.
    pub fn row(&self, observer: &Sid) -> Vec<(Sid, i64)> {
        self.cells
            .iter()
            .filter(|((r, _), _)| r == observer)
            .map(|((_, c), ts)| (c.clone(), *ts))
            .collect()
    }

    pub fn as_contact_cells(&self) -> Vec<ContactCell> {
        self.cells
            .iter()
            .map(|((observer, observed), ts)| ContactCell {
                observer: observer.clone(),
                observed: observed.clone(),
                timestamp: *ts,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gossip_merge_never_rewinds() {
        let mut matrix = LastContactMatrix::new();
        let a = Sid::from("a");
        let b = Sid::from("b");
        matrix.merge_gossip(&[ContactCell {
            observer: a.clone(),
            observed: b.clone(),
            timestamp: 100,
        }]);
        matrix.merge_gossip(&[ContactCell {
            observer: a.clone(),
            observed: b.clone(),
            timestamp: 50,
        }]);
        assert_eq!(matrix.get(&a, &b), Some(100));
    }

    #[test]
    fn missing_cells_are_absent_not_zero() {
        let matrix = LastContactMatrix::new();
        assert_eq!(matrix.get(&Sid::from("a"), &Sid::from("b")), None);
    }

    #[test]
    fn local_observation_advances_cell() {
        let mut matrix = LastContactMatrix::new();
        let local = Sid::from("me");
        matrix.observe_local(&local, Sid::from("b"), 10);
        matrix.observe_local(&local, Sid::from("b"), 5); // stale retransmit echo
        assert_eq!(matrix.get(&local, &Sid::from("b")), Some(10));
    }
}
