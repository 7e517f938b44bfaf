//! The reliable-transport packet exchanged by Go-Back-N endpoints.

use std::fmt::Write as _;

use crate::error::WireError;
use crate::WireForm;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RdtKind {
    Data,
    Ack,
}

impl RdtKind {
    fn as_digit(self) -> u8 {
        match self {
            RdtKind::Data => 0,
            RdtKind::Ack => 1,
        }
    }
}

/// `seq` lives in a 15-bit space; in practice the window configuration
/// bounds it to `2 * w_size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RdtPacket {
    pub kind: RdtKind,
    pub seq: u16,
    pub payload: String,
}

impl RdtPacket {
    pub fn data(seq: u16, payload: impl Into<String>) -> Self {
        Self { kind: RdtKind::Data, seq, payload: payload.into() }
    }

    pub fn ack(seq: u16) -> Self {
        Self { kind: RdtKind::Ack, seq, payload: String::new() }
    }
}

impl WireForm for RdtPacket {
    fn encode(&self) -> String {
        let mut out = String::with_capacity(24 + self.payload.len());
        let _ = writeln!(out, "type:{}", self.kind.as_digit());
        let _ = writeln!(out, "seq:{}", self.seq);
        let _ = write!(out, "payload:{}", self.payload);
        out
    }

    fn decode(text: &str) -> Result<Self, WireError> {
        let (kind, text) = text.split_once('\n').ok_or(WireError::Truncated)?;
        let (seq, text) = text.split_once('\n').ok_or(WireError::Truncated)?;

        let kind = match kind.strip_prefix("type:").ok_or(WireError::MissingField("type"))? {
            "0" => RdtKind::Data,
            "1" => RdtKind::Ack,
            other => return Err(WireError::UnknownType(other.to_string())),
        };
        let seq: u16 = seq
            .strip_prefix("seq:")
            .ok_or(WireError::MissingField("seq"))?
            .parse()
            .map_err(|_| WireError::BadValue { field: "seq", text: seq.to_string() })?;
        if seq >= 1 << 15 {
            return Err(WireError::BadValue { field: "seq", text: seq.to_string() });
        }
        let payload =
            text.strip_prefix("payload:").ok_or(WireError::MissingField("payload"))?.to_string();

        Ok(Self { kind, seq, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_round_trips() {
        let pkt = RdtPacket::data(11, "hello there");
        assert_eq!(RdtPacket::decode(&pkt.encode()).unwrap(), pkt);
    }

    #[test]
    fn ack_carries_no_payload() {
        let pkt = RdtPacket::ack(3);
        let again = RdtPacket::decode(&pkt.encode()).unwrap();
        assert_eq!(again.kind, RdtKind::Ack);
        assert!(again.payload.is_empty());
    }

    #[test]
    fn rejects_sequence_numbers_past_15_bits() {
        let text = "type:0\nseq:40000\npayload:x";
        assert!(matches!(RdtPacket::decode(text), Err(WireError::BadValue { field: "seq", .. })));
    }
}
