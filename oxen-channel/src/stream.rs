//! Per-origin ordered-channel state (C5, §4.5): broadcast and one-to-one
//! sequence buffers, synchronize/finalize framing, gap-tolerant buffered
//! delivery.
//!
//! Grounded on `tox_sequenced::reassembly`'s gap-tolerant buffering (insert
//! out-of-order, drain-while-contiguous release), adapted from
//! fragment-of-a-message reassembly to message-of-a-stream reassembly.

use crate::error::ChannelError;
use std::collections::BTreeMap;

/// Which of a peer's two ordered channels a payload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Broadcast,
    OneToOne,
}

impl StreamKind {
    fn label(self) -> &'static str {
        match self {
            StreamKind::Broadcast => "broadcast",
            StreamKind::OneToOne => "one-to-one",
        }
    }
}

/// A bound on how far ahead of `last_delivered_seq` an out-of-order message
/// may be buffered, so a misbehaving or wildly out-of-order origin cannot
/// grow this buffer without bound (ambient defensive cap; see SPEC_FULL.md).
pub const MAX_REORDER_WINDOW: usize = 4096;

#[derive(Debug)]
struct SequenceBuffer {
    initialized: bool,
    initial_seq: i64,
    last_delivered_seq: i64,
    finalize_seq: Option<i64>,
    buffer: BTreeMap<i64, Vec<u8>>,
}

impl SequenceBuffer {
    fn new() -> Self {
        SequenceBuffer {
            initialized: false,
            initial_seq: 0,
            last_delivered_seq: 0,
            finalize_seq: None,
            buffer: BTreeMap::new(),
        }
    }

    fn synchronize(&mut self, start: i64, origin: &str, kind: StreamKind) -> Result<(), ChannelError> {
        if self.initialized {
            if self.initial_seq != start {
                return Err(ChannelError::SynchronizeMismatch {
                    origin: origin.to_string(),
                });
            }
            return Ok(()); // idempotent retransmission of the same Synchronize
        }
        let _ = kind;
        self.initialized = true;
        self.initial_seq = start;
        self.last_delivered_seq = start;
        Ok(())
    }

    fn finalize(&mut self, end: i64, origin: &str, kind: StreamKind) -> Result<(), ChannelError> {
        if end < self.last_delivered_seq {
            return Err(ChannelError::FinalizeBelowDelivered {
                origin: origin.to_string(),
                stream: kind.label(),
            });
        }
        self.finalize_seq = Some(end);
        Ok(())
    }

    fn receive(
        &mut self,
        seq: i64,
        data: Vec<u8>,
        origin: &str,
        kind: StreamKind,
    ) -> Result<Vec<Vec<u8>>, ChannelError> {
        if !self.initialized {
            return Err(ChannelError::PrematureMessage {
                origin: origin.to_string(),
                stream: kind.label(),
            });
        }
        if let Some(finalize_seq) = self.finalize_seq {
            if self.last_delivered_seq >= finalize_seq {
                return Err(ChannelError::StreamClosed {
                    origin: origin.to_string(),
                    stream: kind.label(),
                });
            }
        }
        if seq <= self.last_delivered_seq {
            return Ok(Vec::new()); // already delivered; drop
        }
        if self.buffer.len() < MAX_REORDER_WINDOW {
            self.buffer.insert(seq, data);
        } else {
            tracing::warn!(
                origin = origin,
                stream = kind.label(),
                "reorder window full, dropping out-of-order message"
            );
        }

        let mut delivered = Vec::new();
        loop {
            let next = self.last_delivered_seq + 1;
            match self.buffer.remove(&next) {
                Some(payload) => {
                    self.last_delivered_seq = next;
                    delivered.push(payload);
                }
                None => break,
            }
        }
        Ok(delivered)
    }

    fn is_closed(&self) -> bool {
        matches!(self.finalize_seq, Some(f) if self.last_delivered_seq >= f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unknown,
    Synced,
    Finalizing,
    Closed,
}

/// Per-origin channel state: the broadcast and one-to-one sequence buffers
/// plus the shared lifecycle phase (§3).
#[derive(Debug)]
pub struct PeerChannelState {
    phase: Phase,
    broadcast: SequenceBuffer,
    oneone: SequenceBuffer,
}

impl PeerChannelState {
    pub fn new() -> Self {
        PeerChannelState {
            phase: Phase::Unknown,
            broadcast: SequenceBuffer::new(),
            oneone: SequenceBuffer::new(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn synchronize(
        &mut self,
        broadcast_start: i64,
        oneone_start: i64,
        origin: &str,
    ) -> Result<(), ChannelError> {
        self.broadcast
            .synchronize(broadcast_start, origin, StreamKind::Broadcast)?;
        self.oneone
            .synchronize(oneone_start, origin, StreamKind::OneToOne)?;
        if self.phase == Phase::Unknown {
            self.phase = Phase::Synced;
        }
        Ok(())
    }

    pub fn finalize(
        &mut self,
        broadcast_end: i64,
        oneone_end: i64,
        origin: &str,
    ) -> Result<(), ChannelError> {
        self.broadcast
            .finalize(broadcast_end, origin, StreamKind::Broadcast)?;
        self.oneone
            .finalize(oneone_end, origin, StreamKind::OneToOne)?;
        self.phase = Phase::Finalizing;
        self.maybe_close();
        Ok(())
    }

    pub fn receive(
        &mut self,
        kind: StreamKind,
        seq: i64,
        data: Vec<u8>,
        origin: &str,
    ) -> Result<Vec<Vec<u8>>, ChannelError> {
        let buf = match kind {
            StreamKind::Broadcast => &mut self.broadcast,
            StreamKind::OneToOne => &mut self.oneone,
        };
        let delivered = buf.receive(seq, data, origin, kind)?;
        self.maybe_close();
        Ok(delivered)
    }

    fn maybe_close(&mut self) {
        if self.phase == Phase::Finalizing && self.broadcast.is_closed() && self.oneone.is_closed() {
            self.phase = Phase::Closed;
        }
    }
}

impl Default for PeerChannelState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_order_broadcast_is_delivered_in_sequence() {
        let mut state = PeerChannelState::new();
        state.synchronize(0, 0, "origin").unwrap();

        let d1 = state
            .receive(StreamKind::Broadcast, 2, b"two".to_vec(), "origin")
            .unwrap();
        assert!(d1.is_empty()); // gap at 1, nothing releasable yet

        let d2 = state
            .receive(StreamKind::Broadcast, 1, b"one".to_vec(), "origin")
            .unwrap();
        assert_eq!(d2, vec![b"one".to_vec(), b"two".to_vec()]);
    }

    #[test]
    fn duplicate_with_gap_drops_the_duplicate() {
        let mut state = PeerChannelState::new();
        state.synchronize(0, 0, "origin").unwrap();
        state
            .receive(StreamKind::Broadcast, 1, b"one".to_vec(), "origin")
            .unwrap();
        let repeat = state
            .receive(StreamKind::Broadcast, 1, b"one-again".to_vec(), "origin")
            .unwrap();
        assert!(repeat.is_empty());
    }

    #[test]
    fn premature_message_before_synchronize_is_an_error() {
        let mut state = PeerChannelState::new();
        let err = state
            .receive(StreamKind::Broadcast, 1, b"x".to_vec(), "origin")
            .unwrap_err();
        assert!(matches!(err, ChannelError::PrematureMessage { .. }));
    }

    #[test]
    fn mismatched_synchronize_resend_is_an_error() {
        let mut state = PeerChannelState::new();
        state.synchronize(0, 0, "origin").unwrap();
        let err = state.synchronize(5, 0, "origin").unwrap_err();
        assert!(matches!(err, ChannelError::SynchronizeMismatch { .. }));
    }

    #[test]
    fn matching_synchronize_resend_is_idempotent() {
        let mut state = PeerChannelState::new();
        state.synchronize(0, 0, "origin").unwrap();
        state.synchronize(0, 0, "origin").unwrap();
        assert_eq!(state.phase(), Phase::Synced);
    }

    #[test]
    fn finalize_drains_before_close() {
        let mut state = PeerChannelState::new();
        state.synchronize(0, 0, "origin").unwrap();
        state.finalize(1, 0, "origin").unwrap();
        assert_eq!(state.phase(), Phase::Finalizing);

        let delivered = state
            .receive(StreamKind::Broadcast, 1, b"last".to_vec(), "origin")
            .unwrap();
        assert_eq!(delivered, vec![b"last".to_vec()]);
        assert_eq!(state.phase(), Phase::Closed);
    }

    #[test]
    fn messages_after_close_are_rejected() {
        let mut state = PeerChannelState::new();
        state.synchronize(0, 0, "origin").unwrap();
        state.finalize(0, 0, "origin").unwrap();
        assert_eq!(state.phase(), Phase::Closed);
        let err = state
            .receive(StreamKind::OneToOne, 1, b"late".to_vec(), "origin")
            .unwrap_err();
        assert!(matches!(err, ChannelError::StreamClosed { .. }));
    }
}
