//! A Chord-style DHT node over UDP.
//!
//! One process per ring member. Each member owns a contiguous slice of the
//! 31-bit hash space, keeps a bounded routing table warmed passively from
//! packet sender fields, forwards what it does not own toward the member
//! whose range starts closest behind the key's hash, and can join or leave a
//! live ring with key handoff.
//!
//! The protocol itself is a synchronous state machine ([`DhtNode`]); the UDP
//! shell around it lives in [`server`] and the request side in [`client`].

mod bootstrap;
mod cache;
mod error;
mod node;
mod routes;

pub mod client;
pub mod server;

pub use bootstrap::{read_bootstrap, write_bootstrap};
pub use cache::LruCache;
pub use error::DhtError;
pub use node::{failure_for, DhtNode, Outbound};
pub use routes::RouteTable;

/// Result-cache bound (entries), LRU eviction.
pub const CACHE_CAPACITY: usize = 1024;
