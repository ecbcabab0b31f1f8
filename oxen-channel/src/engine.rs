//! Ties together per-origin [`PeerChannelState`]s into the ordered-channel
//! engine (C5) the orchestrator drives.

use crate::error::ChannelError;
use crate::stream::{PeerChannelState, Phase, StreamKind};
use oxen_wire::{MessageData, Sid};
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Delivered {
        origin: Sid,
        kind: StreamKind,
        data: Vec<u8>,
    },
    StreamClosed {
        origin: Sid,
    },
}

#[derive(Default)]
pub struct ChannelEngine {
    peers: HashMap<Sid, PeerChannelState>,
    events: VecDeque<ChannelEvent>,
}

impl ChannelEngine {
    pub fn new() -> Self {
        ChannelEngine::default()
    }

    /// Dispatches a decoded [`MessageData`] sub-body from `origin`. Protocol
    /// errors are returned (not panicked) so the caller can ack the parcel
    /// and log, per §7.
    pub fn handle_message_data(
        &mut self,
        origin: Sid,
        data: MessageData,
    ) -> Result<(), ChannelError> {
        let origin_label = origin.to_string();
        let state = self.peers.entry(origin.clone()).or_default();
        let was_closed = state.phase() == Phase::Closed;

        match data {
            MessageData::Synchronize {
                broadcast_start,
                oneone_start,
            } => {
                state.synchronize(broadcast_start.0, oneone_start.0, &origin_label)?;
            }
            MessageData::Finalize {
                broadcast_end,
                oneone_end,
            } => {
                state.finalize(broadcast_end.0, oneone_end.0, &origin_label)?;
            }
            MessageData::Broadcast { seq, data } => {
                let delivered =
                    state.receive(StreamKind::Broadcast, seq.0, data, &origin_label)?;
                self.deliver(origin.clone(), StreamKind::Broadcast, delivered);
            }
            MessageData::OneToOne { seq, data } => {
                let delivered =
                    state.receive(StreamKind::OneToOne, seq.0, data, &origin_label)?;
                self.deliver(origin.clone(), StreamKind::OneToOne, delivered);
            }
        }

        if state.phase() == Phase::Closed && !was_closed {
            self.events.push_back(ChannelEvent::StreamClosed { origin });
        }

        Ok(())
    }

    fn deliver(&mut self, origin: Sid, kind: StreamKind, payloads: Vec<Vec<u8>>) {
        for data in payloads {
            self.events.push_back(ChannelEvent::Delivered {
                origin: origin.clone(),
                kind,
                data,
            });
        }
    }

    pub fn phase_of(&self, origin: &Sid) -> Phase {
        self.peers
            .get(origin)
            .map(|s| s.phase())
            .unwrap_or(Phase::Unknown)
    }

    pub fn poll_event(&mut self) -> Option<ChannelEvent> {
        self.events.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxen_wire::SequenceNumber;

    #[test]
    fn end_to_end_broadcast_delivery() {
        let mut engine = ChannelEngine::new();
        let origin = Sid::from("a");
        engine
            .handle_message_data(
                origin.clone(),
                MessageData::Synchronize {
                    broadcast_start: SequenceNumber(0),
                    oneone_start: SequenceNumber(0),
                },
            )
            .unwrap();
        engine
            .handle_message_data(
                origin.clone(),
                MessageData::Broadcast {
                    seq: SequenceNumber(1),
                    data: b"hi".to_vec(),
                },
            )
            .unwrap();
        let event = engine.poll_event().unwrap();
        assert_eq!(
            event,
            ChannelEvent::Delivered {
                origin,
                kind: StreamKind::Broadcast,
                data: b"hi".to_vec()
            }
        );
    }

    #[test]
    fn finalize_emits_stream_closed_once_drained() {
        let mut engine = ChannelEngine::new();
        let origin = Sid::from("a");
        engine
            .handle_message_data(
                origin.clone(),
                MessageData::Synchronize {
                    broadcast_start: SequenceNumber(0),
                    oneone_start: SequenceNumber(0),
                },
            )
            .unwrap();
        engine
            .handle_message_data(
                origin.clone(),
                MessageData::Finalize {
                    broadcast_end: SequenceNumber(0),
                    oneone_end: SequenceNumber(0),
                },
            )
            .unwrap();
        assert_eq!(
            engine.poll_event(),
            Some(ChannelEvent::StreamClosed { origin })
        );
    }
}
