//! Assembly of one overlay node: Forwarder plus Router over one substrate,
//! under a single cancellation token.

use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use overnet_substrate::Substrate;
use overnet_wire::OverlayPacket;

use crate::error::OverlayError;
use crate::forwarder::{AppHandle, Forwarder};
use crate::router::{Router, RouterConfig};

/// One neighbor link as configured on the command line: the substrate UDP
/// endpoint and the router IP reachable behind it.
#[derive(Debug, Clone)]
pub struct LinkSpec {
    pub addr: SocketAddr,
    pub peer_ip: Ipv4Addr,
}

impl FromStr for LinkSpec {
    type Err = OverlayError;

    fn from_str(s: &str) -> Result<Self, OverlayError> {
        let bad = || OverlayError::BadLinkSpec(s.to_string());
        let (addr, peer_ip) = s.split_once(',').ok_or_else(bad)?;
        Ok(Self {
            addr: addr.parse().map_err(|_| bad())?,
            peer_ip: peer_ip.parse().map_err(|_| bad())?,
        })
    }
}

/// Spawn the Forwarder and Router loops for one node.
///
/// `peer_ips[i]` is the router IP reachable over substrate link `i`, so the
/// two lists must line up. Returns the application handle; both tasks stop
/// when `cancel` fires.
pub fn spawn<S>(
    cfg: RouterConfig,
    peer_ips: Vec<Ipv4Addr>,
    sub: S,
    cancel: CancellationToken,
) -> Result<(AppHandle, JoinHandle<()>, JoinHandle<()>), OverlayError>
where
    S: Substrate<OverlayPacket> + 'static,
{
    if peer_ips.len() != sub.num_links() {
        return Err(OverlayError::LinkMismatch {
            links: sub.num_links(),
            peers: peer_ips.len(),
        });
    }

    let (fwdr, port, app) = Forwarder::new(cfg.my_ip, sub);
    let router = Router::new(cfg, peer_ips, port.table.clone());
    let fwdr_task = tokio::spawn(fwdr.run(cancel.clone()));
    let rtr_task = tokio::spawn(router.run(port, cancel));
    Ok((app, fwdr_task, rtr_task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use overnet_substrate::ChannelSubstrate;

    #[test]
    fn link_specs_parse_both_halves() {
        let spec: LinkSpec = "127.0.0.1:5001,10.0.2.1".parse().unwrap();
        assert_eq!(spec.addr, "127.0.0.1:5001".parse::<SocketAddr>().unwrap());
        assert_eq!(spec.peer_ip, Ipv4Addr::new(10, 0, 2, 1));
    }

    #[test]
    fn link_specs_reject_garbage() {
        assert!(matches!(
            "127.0.0.1:5001".parse::<LinkSpec>(),
            Err(OverlayError::BadLinkSpec(_))
        ));
        assert!(matches!(
            "127.0.0.1:5001,not-an-ip".parse::<LinkSpec>(),
            Err(OverlayError::BadLinkSpec(_))
        ));
    }

    #[test]
    fn spawn_rejects_mismatched_link_counts() {
        // zero substrate links, one claimed peer: refused before any task
        // starts, so no runtime is needed
        let sub = ChannelSubstrate::<OverlayPacket>::new(0.0, 1);
        let cfg = RouterConfig::new(Ipv4Addr::new(10, 0, 1, 1), Vec::new());
        let err = spawn(cfg, vec![Ipv4Addr::new(10, 0, 2, 1)], sub, CancellationToken::new())
            .err()
            .expect("mismatch must be refused");
        assert!(matches!(err, OverlayError::LinkMismatch { links: 0, peers: 1 }));
    }
}
