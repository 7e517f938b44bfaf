//! Wire-level primitives shared by the overnet subsystems.
//!
//! Every packet on the wire is ASCII, line-oriented and keyword-tagged; the
//! codecs here are total functions from datagram text into typed packets
//! plus a [`WireError`]. The crate also carries the 31-bit string hash the
//! DHT partitions its key space with, and the small pair values (node info,
//! hash range, IPv4 prefix) the packet formats are built from.

mod dht;
mod error;
mod hash;
mod node;
mod overlay;
mod prefix;
mod rdt;
mod router;

pub use dht::{DhtBody, DhtPacket, DEFAULT_TTL, DHT_MAGIC};
pub use error::WireError;
pub use hash::{cw_dist, hashit, MAX_HASH};
pub use node::{HashRange, NodeInfo};
pub use overlay::{OverlayPacket, PROTO_APP, PROTO_RTR};
pub use prefix::Prefix;
pub use rdt::{RdtKind, RdtPacket};
pub use router::{LinkFail, PathVec, RouterPacket, ROUTER_MAGIC};

/// A packet type that can be carried as a datagram payload.
pub trait WireForm: Sized {
    fn encode(&self) -> String;
    fn decode(text: &str) -> Result<Self, WireError>;
}
