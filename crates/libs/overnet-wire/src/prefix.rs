use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use crate::error::WireError;

/// An IPv4 prefix `A.B.C.D/len`.
///
/// Length 0 matches every address and serves as the default route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Prefix {
    pub adr: Ipv4Addr,
    pub leng: u8,
}

impl Prefix {
    pub fn new(adr: Ipv4Addr, leng: u8) -> Self {
        Self { adr, leng }
    }

    /// The all-matching `0.0.0.0/0` prefix.
    pub fn default_route() -> Self {
        Self { adr: Ipv4Addr::UNSPECIFIED, leng: 0 }
    }

    /// True when the leading `leng` bits of `ip` agree with this prefix.
    pub fn matches(&self, ip: Ipv4Addr) -> bool {
        if self.leng == 0 {
            return true;
        }
        let a = u32::from(self.adr);
        let b = u32::from(ip);
        (a ^ b) >> (32 - self.leng as u32) == 0
    }
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.adr, self.leng)
    }
}

impl FromStr for Prefix {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, WireError> {
        let bad = || WireError::BadValue { field: "prefix", text: s.to_string() };
        let (adr, leng) = s.split_once('/').ok_or_else(bad)?;
        let leng: u8 = leng.parse().map_err(|_| bad())?;
        if leng > 32 {
            return Err(bad());
        }
        Ok(Self { adr: adr.parse().map_err(|_| bad())?, leng })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_on_leading_bits() {
        let pfx: Prefix = "10.1.0.0/16".parse().unwrap();
        assert!(pfx.matches(Ipv4Addr::new(10, 1, 200, 9)));
        assert!(!pfx.matches(Ipv4Addr::new(10, 2, 0, 1)));
    }

    #[test]
    fn zero_length_matches_everything() {
        let pfx = Prefix::default_route();
        assert!(pfx.matches(Ipv4Addr::new(255, 255, 255, 255)));
        assert!(pfx.matches(Ipv4Addr::new(0, 0, 0, 1)));
    }

    #[test]
    fn full_length_is_exact() {
        let pfx: Prefix = "192.168.3.7/32".parse().unwrap();
        assert!(pfx.matches(Ipv4Addr::new(192, 168, 3, 7)));
        assert!(!pfx.matches(Ipv4Addr::new(192, 168, 3, 6)));
    }

    #[test]
    fn rejects_overlong_lengths() {
        assert!("10.0.0.0/33".parse::<Prefix>().is_err());
        assert!("10.0.0.0".parse::<Prefix>().is_err());
    }
}
