//! The reachability engine (C4, §4.4) of the Oxen cluster transport: the
//! gossiped last-contact matrix, peer classification, routing, and
//! forwarding.

pub mod classify;
pub mod error;
pub mod gossip;
pub mod matrix;
pub mod route;

pub use classify::{ClassifyEvent, Classifier, PeerState};
pub use error::ReachError;
pub use gossip::build_gossip_round;
pub use matrix::LastContactMatrix;
pub use route::{check_forwardable, route, Route};
