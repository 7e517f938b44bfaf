//! Go-Back-N reliable data transport.
//!
//! A sliding-window sender and an in-order receiver in one endpoint, run as
//! a single polling loop: deliver, receive, retransmit on timeout, admit
//! new data, in that order. Cumulative ACKs move the window; four duplicate
//! ACKs for the packet before the send base trigger a fast retransmit.
//!
//! [`Gbn`] is the state machine with an explicit clock; [`spawn`] wraps it
//! in a task bridging application channels to a substrate.

mod error;
mod gbn;
mod pump;

pub use error::RdtError;
pub use gbn::{Gbn, GbnConfig, GbnStats};
pub use pump::{spawn, RdtHandle};
