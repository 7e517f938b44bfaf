//! The datagram substrate underneath the overlay and the reliable transport.
//!
//! A substrate moves whole packets between directly connected peers with
//! possible loss and reordering. Peers are addressed by a stable link index;
//! all calls are non-blocking, so the polling loops above can interleave
//! substrate work with their other duties.

mod channel;
mod udp;

pub use channel::{connect, lossy_pair, ChannelSubstrate};
pub use udp::UdpSubstrate;

/// Narrow contract every substrate implements.
pub trait Substrate<P>: Send {
    /// True when a send on `lnk` would be accepted right now.
    fn ready(&self, lnk: usize) -> bool;

    /// Best-effort transmit on `lnk`. Packets may be silently lost.
    fn send(&mut self, pkt: &P, lnk: usize);

    /// True when a packet is waiting to be received.
    fn incoming(&mut self) -> bool;

    /// Take the next waiting packet together with its arriving link.
    fn receive(&mut self) -> Option<(P, usize)>;

    /// Number of configured links.
    fn num_links(&self) -> usize;
}
