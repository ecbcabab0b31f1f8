//! Oxen: the cluster transport for a federated IRC daemon (see
//! `SPEC_FULL.md`). Presents server-to-server messaging as two services —
//! reliable out-of-order delivery and reliable in-order delivery — on top
//! of best-effort datagrams, with gossiped peer reachability and
//! forwarding.
//!
//! This crate is the orchestrator (C6); the wire codec, reliability engine,
//! reachability engine, and ordered-channel engine live in their own crates
//! (`oxen-wire`, `oxen-transport`, `oxen-reach`, `oxen-channel`) and are
//! re-exported here for convenience.

pub mod config;
pub mod events;
pub mod orchestrator;

pub use config::OxenConfig;
pub use events::{DeliveryKind, Effect, Event, Request};
pub use orchestrator::Orchestrator;

pub use oxen_channel as channel;
pub use oxen_reach as reach;
pub use oxen_transport as transport;
pub use oxen_wire as wire;

pub use oxen_wire::Sid;
