//! The ordered-channel engine (C5, §4.5) of the Oxen cluster transport:
//! per-origin broadcast and one-to-one sequence buffers with
//! synchronize/finalize framing and gap-tolerant delivery.

pub mod engine;
pub mod error;
pub mod stream;

pub use engine::{ChannelEngine, ChannelEvent};
pub use error::ChannelError;
pub use stream::{Phase, StreamKind, MAX_REORDER_WINDOW};
