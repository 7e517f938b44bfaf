use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::Substrate;

type Inbox<P> = Arc<Mutex<VecDeque<(P, usize)>>>;

/// An in-memory substrate with seeded, per-send packet loss.
///
/// Topologies are wired with [`connect`]; each connection registers one link
/// on both endpoints. Deterministic for a fixed seed, which is what the
/// protocol tests lean on.
pub struct ChannelSubstrate<P> {
    inbox: Inbox<P>,
    peers: Vec<(Inbox<P>, usize)>,
    loss: f64,
    rng: StdRng,
    pub sent: u64,
    pub dropped: u64,
}

impl<P> ChannelSubstrate<P> {
    pub fn new(loss: f64, seed: u64) -> Self {
        Self {
            inbox: Arc::new(Mutex::new(VecDeque::new())),
            peers: Vec::new(),
            loss,
            rng: StdRng::seed_from_u64(seed),
            sent: 0,
            dropped: 0,
        }
    }
}

/// Wire `a` and `b` together; returns the link index of the new connection
/// at each endpoint.
pub fn connect<P>(a: &mut ChannelSubstrate<P>, b: &mut ChannelSubstrate<P>) -> (usize, usize) {
    let a_lnk = a.peers.len();
    let b_lnk = b.peers.len();
    a.peers.push((b.inbox.clone(), b_lnk));
    b.peers.push((a.inbox.clone(), a_lnk));
    (a_lnk, b_lnk)
}

/// Two endpoints joined by a single symmetric lossy link.
pub fn lossy_pair<P>(loss: f64, seed: u64) -> (ChannelSubstrate<P>, ChannelSubstrate<P>) {
    let mut a = ChannelSubstrate::new(loss, seed);
    let mut b = ChannelSubstrate::new(loss, seed.wrapping_add(1));
    connect(&mut a, &mut b);
    (a, b)
}

impl<P: Clone + Send> Substrate<P> for ChannelSubstrate<P> {
    fn ready(&self, lnk: usize) -> bool {
        lnk < self.peers.len()
    }

    fn send(&mut self, pkt: &P, lnk: usize) {
        let Some((peer, peer_lnk)) = self.peers.get(lnk) else {
            return;
        };
        if self.loss > 0.0 && self.rng.gen::<f64>() < self.loss {
            self.dropped += 1;
            return;
        }
        self.sent += 1;
        if let Ok(mut inbox) = peer.lock() {
            inbox.push_back((pkt.clone(), *peer_lnk));
        }
    }

    fn incoming(&mut self) -> bool {
        self.inbox.lock().map(|inbox| !inbox.is_empty()).unwrap_or(false)
    }

    fn receive(&mut self) -> Option<(P, usize)> {
        self.inbox.lock().ok()?.pop_front()
    }

    fn num_links(&self) -> usize {
        self.peers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delivers_with_link_attribution() {
        let (mut a, mut b) = lossy_pair::<u32>(0.0, 7);
        a.send(&41, 0);
        a.send(&42, 0);
        assert!(b.incoming());
        assert_eq!(b.receive(), Some((41, 0)));
        assert_eq!(b.receive(), Some((42, 0)));
        assert!(!b.incoming());
    }

    #[test]
    fn loss_is_deterministic_for_a_seed() {
        let run = || {
            let (mut a, mut b) = lossy_pair::<u32>(0.3, 99);
            for i in 0..100 {
                a.send(&i, 0);
            }
            let mut got = Vec::new();
            while let Some((pkt, _)) = b.receive() {
                got.push(pkt);
            }
            got
        };
        let first = run();
        assert_eq!(first, run());
        assert!(first.len() < 100, "some packets must be lost at 30%");
        assert!(!first.is_empty());
    }

    #[test]
    fn multi_link_topology_tags_arrivals() {
        let mut a = ChannelSubstrate::<u32>::new(0.0, 1);
        let mut b = ChannelSubstrate::<u32>::new(0.0, 2);
        let mut c = ChannelSubstrate::<u32>::new(0.0, 3);
        let (_, b_from_a) = connect(&mut a, &mut b);
        let (b_to_c, c_from_b) = connect(&mut b, &mut c);

        a.send(&1, 0);
        assert_eq!(b.receive(), Some((1, b_from_a)));

        b.send(&2, b_to_c);
        assert_eq!(c.receive(), Some((2, c_from_b)));
    }
}
