#[derive(Debug, thiserror::Error)]
pub enum OverlayError {
    #[error("bad link spec {0:?} (expected <udpAddr>,<routerIp>)")]
    BadLinkSpec(String),

    #[error("substrate has {links} links but {peers} peer ips were given")]
    LinkMismatch { links: usize, peers: usize },
}
