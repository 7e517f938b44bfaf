//! The overlay packet moved by the Forwarder.
//!
//! Four fixed header lines followed by the payload, carried verbatim (the
//! payload of a router packet is itself line-oriented, so everything after
//! `payload:` belongs to it).

use std::fmt::Write as _;
use std::net::Ipv4Addr;

use crate::error::WireError;
use crate::WireForm;

/// Payload is an application line for the local sink.
pub const PROTO_APP: u8 = 1;
/// Payload is a router control packet.
pub const PROTO_RTR: u8 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayPacket {
    pub src: Ipv4Addr,
    pub dest: Ipv4Addr,
    pub protocol: u8,
    pub ttl: i32,
    pub payload: String,
}

impl WireForm for OverlayPacket {
    fn encode(&self) -> String {
        let mut out = String::with_capacity(64 + self.payload.len());
        let _ = writeln!(out, "srcAdr:{}", self.src);
        let _ = writeln!(out, "destAdr:{}", self.dest);
        let _ = writeln!(out, "protocol:{}", self.protocol);
        let _ = writeln!(out, "ttl:{}", self.ttl);
        let _ = write!(out, "payload:{}", self.payload);
        out
    }

    fn decode(text: &str) -> Result<Self, WireError> {
        let (src, text) = header_line(text, "srcAdr")?;
        let (dest, text) = header_line(text, "destAdr")?;
        let (protocol, text) = header_line(text, "protocol")?;
        let (ttl, text) = header_line(text, "ttl")?;
        let payload =
            text.strip_prefix("payload:").ok_or(WireError::MissingField("payload"))?.to_string();

        Ok(Self {
            src: parse("srcAdr", src)?,
            dest: parse("destAdr", dest)?,
            protocol: parse("protocol", protocol)?,
            ttl: parse("ttl", ttl)?,
            payload,
        })
    }
}

fn header_line<'a>(text: &'a str, field: &'static str) -> Result<(&'a str, &'a str), WireError> {
    let (line, rest) = text.split_once('\n').ok_or(WireError::Truncated)?;
    let (keyword, value) = line.split_once(':').ok_or(WireError::MissingField(field))?;
    if keyword != field {
        return Err(WireError::UnknownField(keyword.to_string()));
    }
    Ok((value, rest))
}

fn parse<T: std::str::FromStr>(field: &'static str, text: &str) -> Result<T, WireError> {
    text.parse().map_err(|_| WireError::BadValue { field, text: text.to_string() })
}
