//! The orchestrator (C6, §4.6): binds the codec, reliability, reachability,
//! and ordered-channel engines into the public request/event API (§6),
//! driving the three periodic timers (retransmit, keepalive, gossip).
//!
//! Grounded on `merkle_tox_core::engine::MerkleToxEngine`: the orchestrator
//! never touches a socket. Every public method only mutates engine state and
//! queues [`Effect`]s; [`Orchestrator::poll`] drains them in FIFO order,
//! matching §5's "core yields only between events" rule.

use crate::config::OxenConfig;
use crate::events::{DeliveryKind, Effect, Event};
use oxen_channel::{ChannelEngine, ChannelEvent, StreamKind as ChannelStreamKind};
use oxen_reach::{route, ClassifyEvent, Classifier, LastContactMatrix, Route};
use oxen_transport::{ReliabilityEngine, ReliabilityEvent, TimeProvider};
use oxen_wire::{Ack, Body, LastContact, Message, MessageData, MessageId, Parcel, SequenceNumber, Sid};
use rand::RngCore;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;

#[derive(Default)]
struct OutgoingPeerState {
    synchronized: bool,
    oneone_next: i64,
}

/// Drives the Oxen cluster transport for one local node.
pub struct Orchestrator {
    local: Sid,
    config: OxenConfig,
    time: Arc<dyn TimeProvider>,
    rng: Box<dyn RngCore + Send>,

    reliability: ReliabilityEngine,
    matrix: LastContactMatrix,
    classifier: Classifier,
    channel: ChannelEngine,

    known_peers: BTreeSet<Sid>,
    /// Peers a `join_cluster()` call is waiting on — the peer-up that
    /// completes one of these is "expected" (§4.4), everything else is
    /// discovered reachability and reported as unexpected.
    pending_joins: BTreeSet<Sid>,
    outgoing: HashMap<Sid, OutgoingPeerState>,
    broadcast_next: i64,
    last_activity_ms: HashMap<Sid, i64>,
    last_gossip_ms: i64,
    last_retransmit_sweep_ms: i64,
    draining: bool,

    effects: VecDeque<Effect>,
}

impl Orchestrator {
    pub fn new(
        local: Sid,
        config: OxenConfig,
        time: Arc<dyn TimeProvider>,
        rng: Box<dyn RngCore + Send>,
    ) -> Self {
        let reliability = ReliabilityEngine::new(config.transport.clone());
        Orchestrator {
            local,
            config,
            time,
            rng,
            reliability,
            matrix: LastContactMatrix::new(),
            classifier: Classifier::new(),
            channel: ChannelEngine::new(),
            known_peers: BTreeSet::new(),
            pending_joins: BTreeSet::new(),
            outgoing: HashMap::new(),
            broadcast_next: 0,
            last_activity_ms: HashMap::new(),
            last_gossip_ms: 0,
            last_retransmit_sweep_ms: 0,
            draining: false,
            effects: VecDeque::new(),
        }
    }

    // ---- §6 requests -----------------------------------------------------

    /// Dispatches a [`crate::events::Request`] to the matching method. A
    /// thin convenience wrapper — callers are equally free to call
    /// `start_cluster`/`send_datagram`/etc. directly.
    pub fn dispatch(&mut self, request: crate::events::Request) {
        use crate::events::Request;
        match request {
            Request::StartCluster => self.start_cluster(),
            Request::JoinCluster { help_sid, help_addr } => {
                self.join_cluster(help_sid, help_addr)
            }
            Request::LeaveCluster => self.leave_cluster(),
            Request::SendDatagram { peer, bytes } => self.send_datagram(peer, bytes),
            Request::BroadcastDatagram { bytes } => self.broadcast_datagram(bytes),
            Request::SendInOrder { peer, bytes } => self.send_in_order(peer, bytes),
            Request::BroadcastInOrder { bytes } => self.broadcast_in_order(bytes),
        }
    }

    pub fn start_cluster(&mut self) {
        tracing::debug!(local = %self.local, "starting cluster as founder");
    }

    pub fn join_cluster(&mut self, help_sid: Sid, help_addr: String) {
        let _ = help_addr; // address resolution is the host's responsibility (§1)
        self.register_known_peer(help_sid.clone());
        self.pending_joins.insert(help_sid.clone());
        self.ensure_synchronized(&help_sid);
    }

    pub fn leave_cluster(&mut self) {
        self.draining = true;
        let peers: Vec<Sid> = self.known_peers.iter().cloned().collect();
        for peer in peers {
            let broadcast_end = self.broadcast_next - 1;
            let oneone_end = self
                .outgoing
                .get(&peer)
                .map(|s| s.oneone_next - 1)
                .unwrap_or(-1);
            let md = MessageData::Finalize {
                broadcast_end: SequenceNumber(broadcast_end),
                oneone_end: SequenceNumber(oneone_end),
            };
            self.send_tracked_message_data(peer, md);
        }
    }

    pub fn send_datagram(&mut self, peer: Sid, bytes: Vec<u8>) {
        self.send_untracked_message(peer, oxen_wire::Value::Bytes(bytes));
    }

    pub fn broadcast_datagram(&mut self, bytes: Vec<u8>) {
        for peer in self.known_peers.clone() {
            self.send_untracked_message(peer, oxen_wire::Value::Bytes(bytes.clone()));
        }
    }

    pub fn send_in_order(&mut self, peer: Sid, bytes: Vec<u8>) {
        self.ensure_synchronized(&peer);
        let seq = {
            let entry = self.outgoing.entry(peer.clone()).or_default();
            let seq = entry.oneone_next;
            entry.oneone_next += 1;
            seq
        };
        let md = MessageData::OneToOne {
            seq: SequenceNumber(seq),
            data: bytes,
        };
        self.send_tracked_message_data(peer, md);
    }

    pub fn broadcast_in_order(&mut self, bytes: Vec<u8>) {
        let seq = self.broadcast_next;
        self.broadcast_next += 1;
        for peer in self.known_peers.clone() {
            self.ensure_synchronized(&peer);
            let md = MessageData::Broadcast {
                seq: SequenceNumber(seq),
                data: bytes.clone(),
            };
            self.send_tracked_message_data(peer, md);
        }
    }

    // ---- inbound -----------------------------------------------------

    /// Handles one inbound datagram. `from_neighbor` is the peer the host's
    /// transport resolved the source address to — Oxen parcels carry no
    /// cryptographic sender identity (§1 Non-goals), so this trust boundary
    /// is the host's.
    pub fn handle_inbound(&mut self, from_neighbor: Sid, bytes: &[u8]) {
        let decoded = if self.config.lenient_envelope {
            Parcel::decode_lenient(bytes)
        } else {
            Parcel::decode(bytes)
        };
        let parcel = match decoded {
            Ok(p) => p,
            Err(err) => {
                tracing::debug!(error = %err, "discarding malformed parcel");
                return;
            }
        };

        self.register_known_peer(from_neighbor.clone());

        if let Some(ka) = parcel.ka {
            let now_ms = self.time.now_system_ms();
            self.reliability
                .note_incoming_ka(from_neighbor.clone(), ka, now_ms);
        }
        if let Some(kk) = parcel.kk {
            self.reliability.resolve_kk(from_neighbor.clone(), kk);
        }

        match parcel.body {
            Some(Body::Message(m)) => self.handle_message(from_neighbor, m),
            Some(Body::Ack(a)) => self.handle_ack_body(from_neighbor, a),
            Some(Body::LastContact(lc)) => self.handle_last_contact(lc),
            None => {}
        }

        self.drain_reliability_events();
        self.drain_channel_events();
        self.reclassify(self.time.now_system_ms());
    }

    fn handle_message(&mut self, from_neighbor: Sid, m: Message) {
        if m.to != self.local {
            self.forward_message(m);
            return;
        }

        if let Some(id) = m.id {
            let ack = Ack {
                to: m.fr.clone(),
                fr: self.local.clone(),
                id,
            };
            self.route_and_transmit(m.fr.clone(), Some(Body::Ack(ack)));

            match MessageData::from_value(&m.data) {
                Ok(md) => {
                    if let Err(err) = self.channel.handle_message_data(m.fr.clone(), md) {
                        tracing::debug!(error = %err, origin = %m.fr, "channel protocol error");
                    }
                }
                Err(err) => {
                    tracing::debug!(error = %err, origin = %m.fr, "tracked message is not a recognized sub-body");
                }
            }
        } else {
            // Fire-and-forget: deliver the raw payload directly.
            if let Some(raw) = m.data.as_bytes() {
                self.effects.push_back(Effect::Emit(Event::MessageArrived {
                    origin: m.fr.clone(),
                    bytes: raw.to_vec(),
                    kind: DeliveryKind::Unreliable,
                }));
            }
        }

        let _ = from_neighbor;
    }

    fn forward_message(&mut self, m: Message) {
        if let Err(err) = oxen_reach::check_forwardable(&m.to, self.classifier.state_of(&m.to)) {
            tracing::debug!(error = %err, "dropping parcel");
            return;
        }
        self.route_and_transmit(m.to.clone(), Some(Body::Message(m)));
    }

    fn handle_ack_body(&mut self, from_neighbor: Sid, a: Ack) {
        if a.to == self.local {
            self.reliability.handle_ack(a.fr.clone(), a.id);
        } else {
            self.route_and_transmit(a.to.clone(), Some(Body::Ack(a)));
        }
        let _ = from_neighbor;
    }

    fn handle_last_contact(&mut self, lc: LastContact) {
        self.matrix.merge_gossip(&lc.cells);
    }

    // ---- periodic ------------------------------------------------------

    /// Runs the periodic timers (retransmit, keepalive, gossip),
    /// reclassifies every known peer, and drains every effect accumulated
    /// since the last call — including those queued by request handling.
    pub fn poll(&mut self) -> Vec<Effect> {
        let now_ms = self.time.now_system_ms();

        self.run_retransmit_sweep(now_ms);
        self.run_keepalive_sweep(now_ms);
        self.run_gossip_round(now_ms);
        self.drain_reliability_events();
        self.reclassify(now_ms);
        self.drain_channel_events();

        let next_wakeup = [
            self.config.retransmit_sweep_period_ms,
            self.config.keepalive_idle_ms,
            self.config.keepalive_echo_delay_ms,
            self.config.gossip.period_ms,
        ]
        .into_iter()
        .min()
        .unwrap_or(1_000);
        self.effects.push_back(Effect::ScheduleWakeup {
            after_ms: next_wakeup,
        });

        self.effects.drain(..).collect()
    }

    fn run_retransmit_sweep(&mut self, now_ms: i64) {
        if now_ms - self.last_retransmit_sweep_ms < self.config.retransmit_sweep_period_ms {
            return;
        }
        self.last_retransmit_sweep_ms = now_ms;
        for due in self.reliability.retransmit_due(&*self.time) {
            let value = match oxen_wire::decode(&due.payload) {
                Ok(v) => v,
                Err(err) => {
                    tracing::warn!(error = %err, "outstanding payload no longer decodes, dropping retransmit");
                    continue;
                }
            };
            let message = Message {
                to: due.dest.clone(),
                fr: self.local.clone(),
                id: Some(due.id),
                data: value,
            };
            tracing::debug!(dest = %due.dest, id = %due.id, retry = due.retry_count, "retransmitting");
            self.route_and_transmit(due.dest, Some(Body::Message(message)));
        }
    }

    fn run_keepalive_sweep(&mut self, now_ms: i64) {
        let idle_peers: Vec<Sid> = self
            .known_peers
            .iter()
            .filter(|peer| {
                let last = self.last_activity_ms.get(*peer).copied().unwrap_or(0);
                now_ms - last >= self.config.keepalive_idle_ms
            })
            .cloned()
            .collect();
        let overdue_echo_peers = self
            .reliability
            .peers_owing_echo(now_ms, self.config.keepalive_echo_delay_ms);

        let mut due: BTreeSet<Sid> = idle_peers.into_iter().collect();
        due.extend(overdue_echo_peers);
        for peer in due {
            self.frame_and_send(peer, None, now_ms);
        }
    }

    fn run_gossip_round(&mut self, now_ms: i64) {
        if now_ms - self.last_gossip_ms < self.config.gossip.period_ms {
            return;
        }
        self.last_gossip_ms = now_ms;
        if let Some((target, cells)) = oxen_reach::build_gossip_round(
            &self.local,
            &self.matrix,
            &mut *self.rng,
            &self.config.gossip,
        ) {
            self.frame_and_send(target, Some(Body::LastContact(LastContact { cells })), now_ms);
        }
    }

    fn reclassify(&mut self, now_ms: i64) {
        let peers: Vec<Sid> = self
            .matrix
            .known_sids()
            .into_iter()
            .chain(self.known_peers.iter().cloned())
            .filter(|sid| sid != &self.local)
            .collect();
        let link_stale_ms = self.config.classify.link_stale_ms;
        let mut events = Vec::new();
        for peer in peers {
            let reachable = self
                .matrix
                .known_sids()
                .iter()
                .any(|observer| self.matrix.is_usable(observer, &peer, now_ms, link_stale_ms));
            let expected_up = self.pending_joins.contains(&peer);
            events.extend(self.classifier.observe(
                peer,
                reachable,
                now_ms,
                &self.config.classify,
                expected_up,
                self.draining,
            ));
        }
        for event in events {
            match event {
                ClassifyEvent::PeerUp { peer, expected } => {
                    self.pending_joins.remove(&peer);
                    self.known_peers.insert(peer.clone());
                    self.effects
                        .push_back(Effect::Emit(Event::PeerUp { sid: peer, expected }));
                }
                ClassifyEvent::PeerDown { peer, expected } => {
                    self.reliability.drop_destination(&peer);
                    self.outgoing.remove(&peer);
                    self.effects.push_back(Effect::Emit(Event::PeerDown {
                        sid: peer,
                        expected,
                    }));
                }
            }
        }
    }

    fn drain_reliability_events(&mut self) {
        while let Some(event) = self.reliability.poll_event() {
            match event {
                ReliabilityEvent::ContactObserved {
                    neighbor,
                    timestamp_ms,
                } => {
                    self.matrix.observe_local(&self.local, neighbor, timestamp_ms);
                }
            }
        }
    }

    fn drain_channel_events(&mut self) {
        while let Some(event) = self.channel.poll_event() {
            match event {
                ChannelEvent::Delivered { origin, kind, data } => {
                    let kind = match kind {
                        ChannelStreamKind::Broadcast => DeliveryKind::Broadcast,
                        ChannelStreamKind::OneToOne => DeliveryKind::OneToOne,
                    };
                    self.effects.push_back(Effect::Emit(Event::MessageArrived {
                        origin,
                        bytes: data,
                        kind,
                    }));
                }
                ChannelEvent::StreamClosed { origin } => {
                    // A drained Finalize is an expected peer-down (§4.5),
                    // reported immediately rather than waiting for the
                    // link to go stale.
                    self.reliability.drop_destination(&origin);
                    self.outgoing.remove(&origin);
                    self.effects.push_back(Effect::Emit(Event::PeerDown {
                        sid: origin,
                        expected: true,
                    }));
                }
            }
        }
    }

    // ---- helpers ---------------------------------------------------------

    fn register_known_peer(&mut self, peer: Sid) {
        self.known_peers.insert(peer);
    }

    fn ensure_synchronized(&mut self, peer: &Sid) {
        let already = self
            .outgoing
            .get(peer)
            .map(|s| s.synchronized)
            .unwrap_or(false);
        if already {
            return;
        }
        self.outgoing.entry(peer.clone()).or_default().synchronized = true;
        let broadcast_start = self.broadcast_next - 1;
        let oneone_start = self
            .outgoing
            .get(peer)
            .map(|s| s.oneone_next - 1)
            .unwrap_or(-1);
        let md = MessageData::Synchronize {
            broadcast_start: SequenceNumber(broadcast_start),
            oneone_start: SequenceNumber(oneone_start),
        };
        self.send_tracked_message_data(peer.clone(), md);
    }

    fn send_tracked_message_data(&mut self, peer: Sid, md: MessageData) {
        if let Err(err) = oxen_reach::check_forwardable(&peer, self.classifier.state_of(&peer)) {
            tracing::debug!(error = %err, "dropping outbound message");
            return;
        }
        let value = md.to_value();
        let payload = oxen_wire::encode(&value);
        let id = match self
            .reliability
            .send(peer.clone(), payload, true, &*self.time)
        {
            Ok(id) => id,
            Err(err) => {
                tracing::warn!(error = %err, dest = %peer, "could not send tracked message");
                return;
            }
        };
        let message = Message {
            to: peer.clone(),
            fr: self.local.clone(),
            id,
            data: value,
        };
        self.route_and_transmit(peer, Some(Body::Message(message)));
    }

    fn send_untracked_message(&mut self, peer: Sid, data: oxen_wire::Value) {
        if let Err(err) = oxen_reach::check_forwardable(&peer, self.classifier.state_of(&peer)) {
            tracing::debug!(error = %err, "dropping outbound message");
            return;
        }
        let message = Message {
            to: peer.clone(),
            fr: self.local.clone(),
            id: None,
            data,
        };
        self.route_and_transmit(peer, Some(Body::Message(message)));
    }

    fn route_and_transmit(&mut self, dest: Sid, body: Option<Body>) {
        let now_ms = self.time.now_system_ms();
        let next_hop = match route(&self.local, &dest, &self.matrix, now_ms, self.config.classify.link_stale_ms) {
            Route::Direct(hop) | Route::Forwarded { next_hop: hop } => hop,
            Route::Unavailable { fallback } => {
                tracing::debug!(dest = %dest, "no usable route, falling back to direct link");
                fallback
            }
        };
        self.frame_and_send(next_hop, body, now_ms);
    }

    fn frame_and_send(&mut self, next_hop: Sid, body: Option<Body>, now_ms: i64) {
        let ka = self.reliability.allocate_keepalive(&next_hop, &*self.time);
        let kk = self.reliability.take_pending_echo(&next_hop);
        let parcel = Parcel {
            ka: Some(ka),
            kk,
            body,
        };
        self.last_activity_ms.insert(next_hop.clone(), now_ms);
        self.effects.push_back(Effect::Transmit {
            to: next_hop,
            bytes: parcel.encode(),
        });
    }

    pub fn peer_state(&self, peer: &Sid) -> oxen_reach::PeerState {
        self.classifier.state_of(peer)
    }

    pub fn outstanding_count(&self, peer: &Sid) -> usize {
        self.reliability.outstanding_count(peer)
    }

    pub fn local_sid(&self) -> &Sid {
        &self.local
    }
}
