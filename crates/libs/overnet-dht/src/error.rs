use overnet_wire::WireError;

#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Wire(#[from] WireError),

    #[error("bad bootstrap file {path}: {reason}")]
    BadBootstrap { path: String, reason: String },

    #[error("join failed: {0}")]
    JoinFailed(String),

    #[error("no reply after {0} attempts")]
    TimedOut(u32),
}
