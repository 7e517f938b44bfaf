use std::net::SocketAddr;

use overnet_wire::{cw_dist, NodeInfo};

/// The bounded routing table of a ring member.
///
/// An ordered list of `(address, firstHash)` entries. The current successor
/// is never evicted; past capacity the oldest other entry goes. An entry is
/// identified by its full value, but a peer that reappears with a new
/// `firstHash` (its range moved) has the old entry refreshed in place.
pub struct RouteTable {
    routes: Vec<NodeInfo>,
    cap: usize,
}

impl RouteTable {
    pub fn new(cap: usize) -> Self {
        Self { routes: Vec::new(), cap: cap.max(1) }
    }

    /// Insert `info`, evicting if needed. Returns true when the table
    /// actually changed.
    pub fn add(&mut self, info: NodeInfo, succ: NodeInfo) -> bool {
        if self.routes.contains(&info) {
            return false;
        }
        if let Some(entry) = self.routes.iter_mut().find(|entry| entry.addr == info.addr) {
            entry.first_hash = info.first_hash;
            return true;
        }
        if self.routes.len() >= self.cap {
            let Some(oldest) = self.routes.iter().position(|entry| entry.addr != succ.addr) else {
                return false;
            };
            self.routes.remove(oldest);
        }
        self.routes.push(info);
        true
    }

    /// Drop every entry for a departed peer. Returns true when something
    /// was removed.
    pub fn remove(&mut self, addr: SocketAddr) -> bool {
        let before = self.routes.len();
        self.routes.retain(|entry| entry.addr != addr);
        self.routes.len() != before
    }

    /// The entry whose `firstHash` minimizes the clockwise distance to `h`;
    /// ties go to the earliest entry.
    pub fn next_hop(&self, h: u32) -> Option<NodeInfo> {
        let mut best: Option<(u32, NodeInfo)> = None;
        for entry in &self.routes {
            let d = cw_dist(h, entry.first_hash);
            if best.map_or(true, |(best_d, _)| d < best_d) {
                best = Some((d, *entry));
            }
        }
        best.map(|(_, entry)| entry)
    }

    pub fn contains_addr(&self, addr: SocketAddr) -> bool {
        self.routes.iter().any(|entry| entry.addr == addr)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInfo> {
        self.routes.iter()
    }
}
