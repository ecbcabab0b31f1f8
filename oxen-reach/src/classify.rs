//! Peer classification (§4.4): the Unknown → Reachable → Unreachable →
//! GivenUp state machine, and the peer-up/peer-down events its transitions
//! emit.
//!
//! Grounded on `merkle_tox_core::engine::MerkleToxEngine::set_peer_reachable`
//! and the engine's `Effect::EmitEvent` style: classification never performs
//! I/O, it only returns the events for the orchestrator to forward.

use oxen_wire::Sid;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Unknown,
    Reachable,
    Unreachable,
    GivenUp,
}

/// A peer-lifecycle event (§4.4, §6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyEvent {
    PeerUp { peer: Sid, expected: bool },
    PeerDown { peer: Sid, expected: bool },
}

struct PeerRecord {
    state: PeerState,
    /// When this peer most recently entered `Unreachable`; used to fire the
    /// give-up transition after `giveup_after_ms`.
    unreachable_since_ms: Option<i64>,
}

/// Tunables for classification (§6).
#[derive(Debug, Clone)]
pub struct Config {
    pub link_stale_ms: i64,
    pub giveup_after_ms: i64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            link_stale_ms: 30_000,
            giveup_after_ms: 5 * 60_000,
        }
    }
}

#[derive(Default)]
pub struct Classifier {
    peers: HashMap<Sid, PeerRecord>,
}

impl Classifier {
    pub fn new() -> Self {
        Classifier::default()
    }

    pub fn state_of(&self, peer: &Sid) -> PeerState {
        self.peers
            .get(peer)
            .map(|r| r.state)
            .unwrap_or(PeerState::Unknown)
    }

    /// Recomputes `peer`'s classification given whether it is currently
    /// "possibly reachable" (any trusted row has a usable cell to it), and
    /// returns the events its transition(s) produce. `expected` distinguishes
    /// a peer-up following an explicit join handshake / a peer-down
    /// following a drained Finalize from an unexpected one.
    pub fn observe(
        &mut self,
        peer: Sid,
        possibly_reachable: bool,
        now_ms: i64,
        config: &Config,
        expected_up: bool,
        expected_down: bool,
    ) -> Vec<ClassifyEvent> {
        let mut events = Vec::new();
        let record = self.peers.entry(peer.clone()).or_insert(PeerRecord {
            state: PeerState::Unknown,
            unreachable_since_ms: None,
        });

        match (record.state, possibly_reachable) {
            (PeerState::Unknown, true) => {
                record.state = PeerState::Reachable;
                events.push(ClassifyEvent::PeerUp {
                    peer: peer.clone(),
                    expected: expected_up,
                });
            }
            (PeerState::Unknown, false) => {
                // No observation yet either way; stays Unknown.
            }
            (PeerState::Reachable, true) => {
                // Still reachable; nothing changes.
            }
            (PeerState::Reachable, false) => {
                record.state = PeerState::Unreachable;
                record.unreachable_since_ms = Some(now_ms);
                tracing::debug!(peer = %peer, "peer became unreachable");
            }
            (PeerState::Unreachable, true) => {
                record.state = PeerState::Reachable;
                record.unreachable_since_ms = None;
            }
            (PeerState::Unreachable, false) => {
                let since = record.unreachable_since_ms.unwrap_or(now_ms);
                if now_ms.saturating_sub(since) >= config.giveup_after_ms {
                    record.state = PeerState::GivenUp;
                    events.push(ClassifyEvent::PeerDown {
                        peer: peer.clone(),
                        expected: expected_down,
                    });
                }
            }
            (PeerState::GivenUp, true) => {
                record.state = PeerState::Reachable;
                record.unreachable_since_ms = None;
                events.push(ClassifyEvent::PeerUp {
                    peer: peer.clone(),
                    expected: expected_up,
                });
            }
            (PeerState::GivenUp, false) => {
                // Stays given up; nothing to do.
            }
        }

        events
    }

    pub fn known_peers(&self) -> impl Iterator<Item = &Sid> {
        self.peers.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_to_reachable_emits_peer_up() {
        let mut c = Classifier::new();
        let config = Config::default();
        let events = c.observe(Sid::from("b"), true, 0, &config, false, false);
        assert_eq!(
            events,
            vec![ClassifyEvent::PeerUp {
                peer: Sid::from("b"),
                expected: false
            }]
        );
        assert_eq!(c.state_of(&Sid::from("b")), PeerState::Reachable);
    }

    #[test]
    fn give_up_requires_sustained_unreachability() {
        let mut c = Classifier::new();
        let config = Config {
            link_stale_ms: 1000,
            giveup_after_ms: 5000,
        };
        c.observe(Sid::from("b"), true, 0, &config, false, false);
        c.observe(Sid::from("b"), false, 1000, &config, false, false);
        assert_eq!(c.state_of(&Sid::from("b")), PeerState::Unreachable);

        // Not yet 5000ms since it went unreachable.
        let events = c.observe(Sid::from("b"), false, 3000, &config, false, false);
        assert!(events.is_empty());
        assert_eq!(c.state_of(&Sid::from("b")), PeerState::Unreachable);

        let events = c.observe(Sid::from("b"), false, 6001, &config, false, true);
        assert_eq!(
            events,
            vec![ClassifyEvent::PeerDown {
                peer: Sid::from("b"),
                expected: true
            }]
        );
        assert_eq!(c.state_of(&Sid::from("b")), PeerState::GivenUp);
    }

    #[test]
    fn revival_from_given_up_emits_peer_up() {
        let mut c = Classifier::new();
        let config = Config {
            link_stale_ms: 1000,
            giveup_after_ms: 0,
        };
        c.observe(Sid::from("b"), true, 0, &config, false, false);
        c.observe(Sid::from("b"), false, 1, &config, false, false);
        assert_eq!(c.state_of(&Sid::from("b")), PeerState::GivenUp);

        let events = c.observe(Sid::from("b"), true, 2, &config, false, false);
        assert_eq!(
            events,
            vec![ClassifyEvent::PeerUp {
                peer: Sid::from("b"),
                expected: false
            }]
        );
    }
}
