use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::error::WireError;

/// A ring member as it appears on the wire: `ip:port:firstHash`.
///
/// `first_hash` is the low end of the member's hash range and doubles as its
/// identifier in routing tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeInfo {
    pub addr: SocketAddr,
    pub first_hash: u32,
}

impl NodeInfo {
    pub fn new(addr: SocketAddr, first_hash: u32) -> Self {
        Self { addr, first_hash }
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.addr, self.first_hash)
    }
}

impl FromStr for NodeInfo {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, WireError> {
        let bad = || WireError::BadValue { field: "nodeInfo", text: s.to_string() };
        let (addr, hash) = s.rsplit_once(':').ok_or_else(bad)?;
        Ok(Self {
            addr: addr.parse().map_err(|_| bad())?,
            first_hash: hash.parse().map_err(|_| bad())?,
        })
    }
}

/// A closed interval `[lo, hi]` of hash values owned by one ring member.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashRange {
    pub lo: u32,
    pub hi: u32,
}

impl HashRange {
    pub fn new(lo: u32, hi: u32) -> Self {
        Self { lo, hi }
    }

    pub fn contains(&self, h: u32) -> bool {
        self.lo <= h && h <= self.hi
    }
}

impl fmt::Display for HashRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.lo, self.hi)
    }
}

impl FromStr for HashRange {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, WireError> {
        let bad = || WireError::BadValue { field: "hashRange", text: s.to_string() };
        let (lo, hi) = s.split_once(':').ok_or_else(bad)?;
        Ok(Self { lo: lo.parse().map_err(|_| bad())?, hi: hi.parse().map_err(|_| bad())? })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_info_round_trips() {
        let info: NodeInfo = "10.0.0.7:31313:12345".parse().unwrap();
        assert_eq!(info.addr, "10.0.0.7:31313".parse::<SocketAddr>().unwrap());
        assert_eq!(info.first_hash, 12345);
        assert_eq!(info.to_string(), "10.0.0.7:31313:12345");
    }

    #[test]
    fn node_info_rejects_garbage() {
        assert!("10.0.0.7".parse::<NodeInfo>().is_err());
        assert!("10.0.0.7:port:1".parse::<NodeInfo>().is_err());
    }

    #[test]
    fn range_is_inclusive() {
        let r = HashRange::new(10, 20);
        assert!(r.contains(10));
        assert!(r.contains(20));
        assert!(!r.contains(9));
        assert!(!r.contains(21));
    }
}
