/// Errors from packet encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("missing protocol magic (expected {0:?})")]
    MissingMagic(&'static str),

    #[error("packet has no type field")]
    MissingType,

    #[error("unknown packet type {0:?}")]
    UnknownType(String),

    #[error("unknown keyword {0:?}")]
    UnknownField(String),

    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    #[error("bad value {text:?} for field {field:?}")]
    BadValue { field: &'static str, text: String },

    #[error("packet truncated")]
    Truncated,

    #[error("datagram is not ascii text")]
    NotText,
}
