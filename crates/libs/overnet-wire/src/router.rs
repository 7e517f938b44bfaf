//! The router control-packet format.
//!
//! Hello probes carry a timestamp for RTT measurement; adverts carry a path
//! vector; failure adverts carry the endpoints of a dead link. Timestamps
//! and costs are seconds from the sending router's start baseline.

use std::fmt::Write as _;
use std::net::Ipv4Addr;

use crate::error::WireError;
use crate::prefix::Prefix;
use crate::WireForm;

/// Required first line of every router datagram.
pub const ROUTER_MAGIC: &str = "RPv0";

/// A path-vector advertisement: the prefix, the advert's timestamp and cost,
/// and the sequence of router IPs it has traversed, ending with the router
/// that sent this advert.
#[derive(Debug, Clone, PartialEq)]
pub struct PathVec {
    pub pfx: Prefix,
    pub timestamp: f64,
    pub cost: f64,
    pub path: Vec<Ipv4Addr>,
}

/// Advertisement that the link `from`–`to` is down, with the IPs it has
/// already been propagated through.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkFail {
    pub from: Ipv4Addr,
    pub to: Ipv4Addr,
    pub timestamp: f64,
    pub path: Vec<Ipv4Addr>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RouterPacket {
    Hello { timestamp: f64 },
    Hello2u { timestamp: f64 },
    Advert(PathVec),
    FailureAdvert(LinkFail),
}

impl WireForm for RouterPacket {
    fn encode(&self) -> String {
        let mut out = String::with_capacity(64);
        let _ = writeln!(out, "{ROUTER_MAGIC}");
        match self {
            RouterPacket::Hello { timestamp } => {
                let _ = writeln!(out, "type: hello");
                let _ = writeln!(out, "timestamp: {timestamp}");
            }
            RouterPacket::Hello2u { timestamp } => {
                let _ = writeln!(out, "type: hello2u");
                let _ = writeln!(out, "timestamp: {timestamp}");
            }
            RouterPacket::Advert(pv) => {
                let _ = writeln!(out, "type: advert");
                let _ = write!(out, "pathvec: {} {} {}", pv.pfx, pv.timestamp, pv.cost);
                for ip in &pv.path {
                    let _ = write!(out, " {ip}");
                }
                out.push('\n');
            }
            RouterPacket::FailureAdvert(fa) => {
                let _ = writeln!(out, "type: fadvert");
                let _ = write!(out, "linkfail: {} {} {}", fa.from, fa.to, fa.timestamp);
                for ip in &fa.path {
                    let _ = write!(out, " {ip}");
                }
                out.push('\n');
            }
        }
        out
    }

    fn decode(text: &str) -> Result<Self, WireError> {
        let mut lines = text.lines().filter(|line| !line.is_empty());
        if lines.next() != Some(ROUTER_MAGIC) {
            return Err(WireError::MissingMagic(ROUTER_MAGIC));
        }

        let kind = lines
            .next()
            .and_then(|line| line.strip_prefix("type: "))
            .ok_or(WireError::MissingType)?;
        let payload = lines.next().ok_or(WireError::Truncated)?;

        match kind {
            "hello" | "hello2u" => {
                let rest = payload
                    .strip_prefix("timestamp: ")
                    .ok_or(WireError::MissingField("timestamp"))?;
                let timestamp = parse_f64("timestamp", rest)?;
                if kind == "hello" {
                    Ok(RouterPacket::Hello { timestamp })
                } else {
                    Ok(RouterPacket::Hello2u { timestamp })
                }
            }
            "advert" => {
                let rest =
                    payload.strip_prefix("pathvec: ").ok_or(WireError::MissingField("pathvec"))?;
                let mut tokens = rest.split_ascii_whitespace();
                let pfx: Prefix = tokens.next().ok_or(WireError::Truncated)?.parse()?;
                let timestamp = parse_f64("timestamp", tokens.next().ok_or(WireError::Truncated)?)?;
                let cost = parse_f64("cost", tokens.next().ok_or(WireError::Truncated)?)?;
                let path = parse_path(tokens)?;
                if path.is_empty() {
                    return Err(WireError::MissingField("path"));
                }
                Ok(RouterPacket::Advert(PathVec { pfx, timestamp, cost, path }))
            }
            "fadvert" => {
                let rest = payload
                    .strip_prefix("linkfail: ")
                    .ok_or(WireError::MissingField("linkfail"))?;
                let mut tokens = rest.split_ascii_whitespace();
                let from = parse_ip(tokens.next().ok_or(WireError::Truncated)?)?;
                let to = parse_ip(tokens.next().ok_or(WireError::Truncated)?)?;
                let timestamp = parse_f64("timestamp", tokens.next().ok_or(WireError::Truncated)?)?;
                let path = parse_path(tokens)?;
                if path.is_empty() {
                    return Err(WireError::MissingField("path"));
                }
                Ok(RouterPacket::FailureAdvert(LinkFail { from, to, timestamp, path }))
            }
            _ => Err(WireError::UnknownType(kind.to_string())),
        }
    }
}

fn parse_f64(field: &'static str, text: &str) -> Result<f64, WireError> {
    text.parse().map_err(|_| WireError::BadValue { field, text: text.to_string() })
}

fn parse_ip(text: &str) -> Result<Ipv4Addr, WireError> {
    text.parse().map_err(|_| WireError::BadValue { field: "ip", text: text.to_string() })
}

fn parse_path<'a>(tokens: impl Iterator<Item = &'a str>) -> Result<Vec<Ipv4Addr>, WireError> {
    tokens.map(parse_ip).collect()
}
