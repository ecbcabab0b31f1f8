//! The wire layer of the Oxen cluster transport: a self-describing octet
//! codec (§4.1) and the typed parcel schema built on top of it (§4.2).
//!
//! Nothing in this crate touches a socket or a clock; it only turns bytes
//! into [`Value`]s and [`Value`]s into [`Parcel`]s, and back.

pub mod codec;
pub mod error;
pub mod parcel;

pub use codec::{decode, decode_with_limit, encode, Value, DEFAULT_MAX_ENCODED_SIZE};
pub use error::{DecodeError, SchemaError};
pub use parcel::{
    Ack, Body, ContactCell, KeepaliveId, LastContact, Message, MessageData, MessageId, Parcel,
    SequenceNumber, Sid,
};
