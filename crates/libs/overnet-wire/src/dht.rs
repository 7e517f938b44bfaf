//! The DHT packet format.
//!
//! ASCII, one `keyword:value` field per line, introduced by a magic line and
//! closed by a terminating newline. Parsing is total: any datagram either
//! maps to a [`DhtPacket`] or to a [`WireError`] whose rendering becomes the
//! `reason` of a `failure` reply.

use std::fmt::Write as _;
use std::net::SocketAddr;

use crate::error::WireError;
use crate::node::{HashRange, NodeInfo};
use crate::WireForm;

/// Required first line of every DHT datagram.
pub const DHT_MAGIC: &str = "CSE473 DHTPv0.1";

/// Hop budget given to freshly built packets.
pub const DEFAULT_TTL: i32 = 100;

/// The per-kind payload of a DHT packet.
///
/// Each variant carries exactly the fields that are meaningful for its
/// packet type; everything shared (tag, ttl, reply-path addresses, sender
/// identity) lives on the enclosing [`DhtPacket`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DhtBody {
    Get {
        key: String,
    },
    /// Store `value` under `key`. A missing value removes the key.
    Put {
        key: String,
        value: Option<String>,
    },
    /// Positive reply. Join replies use `succ`/`pred`/`range` to seed the
    /// new member; get/put replies echo `key` and carry `value` on a hit.
    Success {
        key: Option<String>,
        value: Option<String>,
        succ: Option<NodeInfo>,
        pred: Option<NodeInfo>,
        range: Option<HashRange>,
    },
    NoMatch {
        key: Option<String>,
    },
    Failure {
        reason: String,
    },
    Join,
    Leave,
    Transfer {
        key: String,
        value: String,
    },
    /// Each present field replaces the receiver's corresponding state.
    Update {
        succ: Option<NodeInfo>,
        pred: Option<NodeInfo>,
        range: Option<HashRange>,
    },
}

impl DhtBody {
    pub fn kind_str(&self) -> &'static str {
        match self {
            DhtBody::Get { .. } => "get",
            DhtBody::Put { .. } => "put",
            DhtBody::Success { .. } => "success",
            DhtBody::NoMatch { .. } => "no match",
            DhtBody::Failure { .. } => "failure",
            DhtBody::Join => "join",
            DhtBody::Leave => "leave",
            DhtBody::Transfer { .. } => "transfer",
            DhtBody::Update { .. } => "update",
        }
    }
}

/// A DHT packet: body plus the envelope fields shared by every kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhtPacket {
    pub body: DhtBody,
    /// Client echo; replies carry the tag of the request they answer.
    pub tag: u32,
    /// Decremented by every relay; exhausted packets are dropped.
    pub ttl: i32,
    /// Original requester, recorded by the first relay.
    pub client: Option<SocketAddr>,
    /// The first relay; replies return through it.
    pub relay: Option<SocketAddr>,
    /// Identity of the peer that produced this packet.
    pub sender: Option<NodeInfo>,
}

impl DhtPacket {
    /// A fresh packet with default ttl and an empty reply path.
    pub fn new(body: DhtBody, tag: u32) -> Self {
        Self { body, tag, ttl: DEFAULT_TTL, client: None, relay: None, sender: None }
    }
}

impl WireForm for DhtPacket {
    fn encode(&self) -> String {
        let mut out = String::with_capacity(128);
        let _ = writeln!(out, "{DHT_MAGIC}");
        let _ = writeln!(out, "type:{}", self.body.kind_str());

        let (key, value) = match &self.body {
            DhtBody::Get { key } => (Some(key), None),
            DhtBody::Put { key, value } => (Some(key), value.as_ref()),
            DhtBody::Success { key, value, .. } => (key.as_ref(), value.as_ref()),
            DhtBody::NoMatch { key } => (key.as_ref(), None),
            DhtBody::Transfer { key, value } => (Some(key), Some(value)),
            _ => (None, None),
        };
        if let Some(key) = key {
            let _ = writeln!(out, "key:{key}");
        }
        if let Some(value) = value {
            let _ = writeln!(out, "value:{value}");
        }

        let _ = writeln!(out, "tag:{}", self.tag);
        let _ = writeln!(out, "ttl:{}", self.ttl);

        if let Some(client) = self.client {
            let _ = writeln!(out, "clientAdr:{client}");
        }
        if let Some(relay) = self.relay {
            let _ = writeln!(out, "relayAdr:{relay}");
        }
        if let Some(sender) = self.sender {
            let _ = writeln!(out, "senderInfo:{sender}");
        }

        let (succ, pred, range) = match &self.body {
            DhtBody::Success { succ, pred, range, .. } => (*succ, *pred, *range),
            DhtBody::Update { succ, pred, range } => (*succ, *pred, *range),
            _ => (None, None, None),
        };
        if let Some(succ) = succ {
            let _ = writeln!(out, "succInfo:{succ}");
        }
        if let Some(pred) = pred {
            let _ = writeln!(out, "predInfo:{pred}");
        }
        if let Some(range) = range {
            let _ = writeln!(out, "hashRange:{range}");
        }

        if let DhtBody::Failure { reason } = &self.body {
            let _ = writeln!(out, "reason:{reason}");
        }

        out
    }

    fn decode(text: &str) -> Result<Self, WireError> {
        let mut lines = text.lines();
        if lines.next() != Some(DHT_MAGIC) {
            return Err(WireError::MissingMagic(DHT_MAGIC));
        }

        let mut kind: Option<String> = None;
        let mut key: Option<String> = None;
        let mut value: Option<String> = None;
        let mut reason: Option<String> = None;
        let mut tag: Option<u32> = None;
        let mut ttl: Option<i32> = None;
        let mut client: Option<SocketAddr> = None;
        let mut relay: Option<SocketAddr> = None;
        let mut sender: Option<NodeInfo> = None;
        let mut succ: Option<NodeInfo> = None;
        let mut pred: Option<NodeInfo> = None;
        let mut range: Option<HashRange> = None;

        for line in lines {
            if line.is_empty() {
                continue;
            }
            let (keyword, rest) =
                line.split_once(':').ok_or_else(|| WireError::UnknownField(line.to_string()))?;
            match keyword {
                "type" => kind = Some(rest.to_string()),
                "key" => key = Some(rest.to_string()),
                "value" => value = Some(rest.to_string()),
                "reason" => reason = Some(rest.to_string()),
                "tag" => {
                    tag = Some(rest.parse().map_err(|_| WireError::BadValue {
                        field: "tag",
                        text: rest.to_string(),
                    })?)
                }
                "ttl" => {
                    ttl = Some(rest.parse().map_err(|_| WireError::BadValue {
                        field: "ttl",
                        text: rest.to_string(),
                    })?)
                }
                "clientAdr" => {
                    client = Some(rest.parse().map_err(|_| WireError::BadValue {
                        field: "clientAdr",
                        text: rest.to_string(),
                    })?)
                }
                "relayAdr" => {
                    relay = Some(rest.parse().map_err(|_| WireError::BadValue {
                        field: "relayAdr",
                        text: rest.to_string(),
                    })?)
                }
                "senderInfo" => sender = Some(rest.parse()?),
                "succInfo" => succ = Some(rest.parse()?),
                "predInfo" => pred = Some(rest.parse()?),
                "hashRange" => range = Some(rest.parse()?),
                _ => return Err(WireError::UnknownField(keyword.to_string())),
            }
        }

        let kind = kind.ok_or(WireError::MissingType)?;
        let body = match kind.as_str() {
            "get" => DhtBody::Get { key: key.ok_or(WireError::MissingField("key"))? },
            "put" => DhtBody::Put { key: key.ok_or(WireError::MissingField("key"))?, value },
            "success" => DhtBody::Success { key, value, succ, pred, range },
            "no match" => DhtBody::NoMatch { key },
            "failure" => {
                DhtBody::Failure { reason: reason.ok_or(WireError::MissingField("reason"))? }
            }
            "join" => DhtBody::Join,
            "leave" => DhtBody::Leave,
            "transfer" => DhtBody::Transfer {
                key: key.ok_or(WireError::MissingField("key"))?,
                value: value.ok_or(WireError::MissingField("value"))?,
            },
            "update" => DhtBody::Update { succ, pred, range },
            _ => return Err(WireError::UnknownType(kind)),
        };

        Ok(Self {
            body,
            tag: tag.ok_or(WireError::MissingField("tag"))?,
            ttl: ttl.ok_or(WireError::MissingField("ttl"))?,
            client,
            relay,
            sender,
        })
    }
}
