//! The reliability engine (C3, §4.3) of the Oxen cluster transport:
//! outstanding-message tracking, ack processing, retransmit backoff, and
//! keepalive id bookkeeping. Also carries the injectable clock (§9) shared
//! by every other engine crate.

pub mod error;
pub mod outstanding;
pub mod reliability;
pub mod time;

pub use error::ReliabilityError;
pub use outstanding::{OutstandingEntry, OutstandingTable};
pub use reliability::{Config, DueRetransmit, ReliabilityEngine, ReliabilityEvent};
pub use time::{ManualTimeProvider, SystemTimeProvider, TimeProvider};
