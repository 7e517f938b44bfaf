use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};

use overnet_wire::Prefix;

/// The forwarding table shared by the Forwarder and the Router.
///
/// All access goes through one mutex, the per-Forwarder monitor.
pub type SharedFwdTable = Arc<Mutex<FwdTable>>;

/// Ordered `(prefix, link)` entries with at most one entry per prefix.
pub struct FwdTable {
    entries: Vec<(Prefix, usize)>,
}

impl FwdTable {
    /// A fresh table routes everything to link 0 until the Router learns
    /// better.
    pub fn new() -> Self {
        Self { entries: vec![(Prefix::default_route(), 0)] }
    }

    /// Add or replace the entry for `pfx`. Returns true when the table
    /// actually changed.
    pub fn add_route(&mut self, pfx: Prefix, lnk: usize) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|(p, _)| *p == pfx) {
            if entry.1 == lnk {
                return false;
            }
            entry.1 = lnk;
            return true;
        }
        self.entries.push((pfx, lnk));
        true
    }

    /// The link of the longest matching entry; insertion order breaks ties.
    pub fn lookup(&self, ip: Ipv4Addr) -> Option<usize> {
        let mut best: Option<(u8, usize)> = None;
        for (pfx, lnk) in &self.entries {
            if pfx.matches(ip) && best.map_or(true, |(leng, _)| pfx.leng > leng) {
                best = Some((pfx.leng, *lnk));
            }
        }
        best.map(|(_, lnk)| lnk)
    }

    pub fn get_link(&self, pfx: Prefix) -> Option<usize> {
        self.entries.iter().find(|(p, _)| *p == pfx).map(|(_, lnk)| *lnk)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Prefix, usize)> {
        self.entries.iter()
    }
}

impl Default for FwdTable {
    fn default() -> Self {
        Self::new()
    }
}
