//! Overlay node internals: a packet Forwarder and a path-vector Router.
//!
//! The Forwarder owns the forwarding table and shuttles packets between the
//! substrate, the local application queues and the Router. The Router probes
//! neighbor liveness with hellos, maintains the routing table from received
//! path-vector advertisements, and derives the forwarding table from it.
//! Each runs as its own polling task; bounded channels are the only paths
//! between them.

mod error;
mod forwarder;
mod fwd_table;
mod node;
mod router;

pub use error::OverlayError;
pub use forwarder::{AppHandle, Forwarder, RouterPort, QUEUE_CAPACITY};
pub use fwd_table::{FwdTable, SharedFwdTable};
pub use node::{spawn, LinkSpec};
pub use router::{LinkInfo, Route, Router, RouterConfig};
