//! `ip port` bootstrap files: a server records where it listens, a joining
//! node reads its predecessor's location from the same format.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use crate::error::DhtError;

pub fn write_bootstrap(path: &Path, addr: SocketAddr) -> Result<(), DhtError> {
    std::fs::write(path, format!("{} {}\n", addr.ip(), addr.port()))?;
    Ok(())
}

pub fn read_bootstrap(path: &Path) -> Result<SocketAddr, DhtError> {
    let bad = |reason: &str| DhtError::BadBootstrap {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };
    let text = std::fs::read_to_string(path)?;
    let mut tokens = text.split_ascii_whitespace();
    let ip: IpAddr = tokens
        .next()
        .ok_or_else(|| bad("empty file"))?
        .parse()
        .map_err(|_| bad("unparseable address"))?;
    let port: u16 = tokens
        .next()
        .ok_or_else(|| bad("missing port"))?
        .parse()
        .map_err(|_| bad("unparseable port"))?;
    Ok(SocketAddr::new(ip, port))
}
