//! The public request/event API (§6).

use oxen_wire::Sid;

/// What kind of channel a delivered payload arrived on (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Unreliable,
    OneToOne,
    Broadcast,
}

/// Requests the host process issues to the orchestrator (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    StartCluster,
    JoinCluster { help_sid: Sid, help_addr: String },
    LeaveCluster,
    SendDatagram { peer: Sid, bytes: Vec<u8> },
    BroadcastDatagram { bytes: Vec<u8> },
    SendInOrder { peer: Sid, bytes: Vec<u8> },
    BroadcastInOrder { bytes: Vec<u8> },
}

/// Events the orchestrator emits to the host process (§6).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    MessageArrived {
        origin: Sid,
        bytes: Vec<u8>,
        kind: DeliveryKind,
    },
    PeerUp {
        sid: Sid,
        expected: bool,
    },
    PeerDown {
        sid: Sid,
        expected: bool,
    },
}

/// Work the orchestrator computed but does not perform itself — the host
/// process executes these against the real socket and its own scheduler.
/// Grounded on `merkle_tox_core::engine::Effect`: the engine only ever
/// computes, the caller always does the I/O.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send `bytes` (an encoded [`oxen_wire::Parcel`]) to `to`'s transport
    /// address. Address resolution for a bare [`Sid`] is the host's
    /// responsibility (out of scope, §1).
    Transmit { to: Sid, bytes: Vec<u8> },
    /// Surface a user-facing event.
    Emit(Event),
    /// Ask to be polled again no later than this many milliseconds from
    /// now, so the host's timer doesn't need to guess a cadence.
    ScheduleWakeup { after_ms: i64 },
}
