//! Next-hop selection and forwarding (§4.4).
//!
//! No teacher module implements graph search (no `petgraph` anywhere in the
//! corpus), so this is a plain iterative breadth-first search over the
//! "possibly usable" adjacency, in keeping with the corpus's preference for
//! explicit algorithms over pulling in a graph crate for one query.

use crate::classify::PeerState;
use crate::error::ReachError;
use crate::matrix::LastContactMatrix;
use oxen_wire::Sid;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

/// Rejects forwarding to a peer the classifier has given up on (§4.4: "cause
/// C3 to drop all outstanding entries for that peer" extends to fresh
/// sends — a given-up peer gets no further traffic until it revives).
pub fn check_forwardable(dest: &Sid, state: PeerState) -> Result<(), ReachError> {
    if state == PeerState::GivenUp {
        return Err(ReachError::GivenUpDrop {
            peer: dest.to_string(),
        });
    }
    Ok(())
}

/// The outcome of a routing decision (§4.3: forwarding may need to know
/// whether the chosen hop was a genuine path or a last-resort fallback).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The direct link is possibly usable.
    Direct(Sid),
    /// No direct link, but a path exists over possibly-usable links.
    Forwarded { next_hop: Sid },
    /// No usable path was found; falls back to the direct link anyway
    /// (§4.4 rule 3, best effort).
    Unavailable { fallback: Sid },
}

impl Route {
    pub fn next_hop(&self) -> &Sid {
        match self {
            Route::Direct(hop) => hop,
            Route::Forwarded { next_hop } => next_hop,
            Route::Unavailable { fallback } => fallback,
        }
    }
}

/// Computes the next hop toward `dest` (§4.4: `route(dest)`).
pub fn route(
    local: &Sid,
    dest: &Sid,
    matrix: &LastContactMatrix,
    now_ms: i64,
    link_stale_ms: i64,
) -> Route {
    if matrix.is_usable(local, dest, now_ms, link_stale_ms) {
        return Route::Direct(dest.clone());
    }

    match shortest_path_first_hop(local, dest, matrix, now_ms, link_stale_ms) {
        Some(next_hop) => Route::Forwarded { next_hop },
        None => Route::Unavailable {
            fallback: dest.clone(),
        },
    }
}

/// BFS over the possibly-usable graph induced by the whole matrix (every
/// known SID is a node; an edge `u -> v` exists iff `u`'s observation of `v`
/// is possibly usable). Among equal-length paths, ties are broken by the
/// lowest SID in byte-lex order at each step (§4.4 rule 2).
fn shortest_path_first_hop(
    local: &Sid,
    dest: &Sid,
    matrix: &LastContactMatrix,
    now_ms: i64,
    link_stale_ms: i64,
) -> Option<Sid> {
    if local == dest {
        return None;
    }
    let nodes = matrix.known_sids();
    if !nodes.contains(dest) {
        return None;
    }

    let mut visited: HashSet<Sid> = HashSet::new();
    visited.insert(local.clone());
    let mut queue: VecDeque<Sid> = VecDeque::new();
    queue.push_back(local.clone());
    let mut parent: HashMap<Sid, Sid> = HashMap::new();

    while let Some(u) = queue.pop_front() {
        if &u == dest {
            break;
        }
        let neighbors: BTreeSet<Sid> = nodes
            .iter()
            .filter(|v| *v != &u && matrix.is_usable(&u, v, now_ms, link_stale_ms))
            .cloned()
            .collect();
        for v in neighbors {
            if visited.insert(v.clone()) {
                parent.insert(v.clone(), u.clone());
                queue.push_back(v);
            }
        }
    }

    if !visited.contains(dest) {
        return None;
    }

    // Walk back from dest to the node whose parent is `local`.
    let mut cur = dest.clone();
    loop {
        let prev = parent.get(&cur)?;
        if prev == local {
            return Some(cur);
        }
        cur = prev.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxen_wire::ContactCell;

    fn usable(observer: &str, observed: &str, ts: i64) -> ContactCell {
        ContactCell {
            observer: Sid::from(observer),
            observed: Sid::from(observed),
            timestamp: ts,
        }
    }

    #[test]
    fn direct_link_is_preferred() {
        let mut matrix = LastContactMatrix::new();
        matrix.merge_gossip(&[usable("a", "b", 100)]);
        let route = route(&Sid::from("a"), &Sid::from("b"), &matrix, 100, 30_000);
        assert_eq!(route, Route::Direct(Sid::from("b")));
    }

    #[test]
    fn forwards_through_intermediate_when_direct_is_stale() {
        let mut matrix = LastContactMatrix::new();
        // a-b link is stale; a-c and c-b are fresh.
        matrix.merge_gossip(&[
            usable("a", "b", 0),
            usable("a", "c", 100),
            usable("c", "b", 100),
        ]);
        let route = route(&Sid::from("a"), &Sid::from("b"), &matrix, 100, 30);
        assert_eq!(
            route,
            Route::Forwarded {
                next_hop: Sid::from("c")
            }
        );
    }

    #[test]
    fn falls_back_to_direct_when_no_path_exists() {
        let mut matrix = LastContactMatrix::new();
        matrix.merge_gossip(&[usable("a", "c", 100)]); // b unreachable from a at all
        matrix.merge_gossip(&[usable("x", "b", 100)]); // b known, but unreachable from a
        let route = route(&Sid::from("a"), &Sid::from("b"), &matrix, 100, 30_000);
        assert_eq!(
            route,
            Route::Unavailable {
                fallback: Sid::from("b")
            }
        );
    }

    #[test]
    fn given_up_peer_is_not_forwardable() {
        assert!(check_forwardable(&Sid::from("b"), PeerState::Reachable).is_ok());
        assert_eq!(
            check_forwardable(&Sid::from("b"), PeerState::GivenUp),
            Err(ReachError::GivenUpDrop {
                peer: Sid::from("b").to_string()
            })
        );
    }
}
