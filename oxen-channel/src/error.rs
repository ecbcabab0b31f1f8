use thiserror::Error;

/// Protocol-layer violations of stream semantics (§4.5, §7: "ProtocolError").
/// Always acked at the reliability layer (to stop retransmit storms) and
/// logged; never surfaced to the user as an event.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("regular message on {stream} stream from {origin} arrived before Synchronize")]
    PrematureMessage { origin: String, stream: &'static str },

    #[error("Synchronize re-sent by {origin} does not match the originally recorded values")]
    SynchronizeMismatch { origin: String },

    #[error("Finalize sequence for {origin}'s {stream} stream is below the last delivered sequence")]
    FinalizeBelowDelivered { origin: String, stream: &'static str },

    #[error("message on {stream} stream from {origin} arrived after the stream was closed")]
    StreamClosed { origin: String, stream: &'static str },
}
