//! The UDP shell around a [`DhtNode`].
//!
//! Binds an ephemeral port on the configured address, records it in the
//! bootstrap file, optionally joins a live ring through a predecessor, then
//! serves until cancelled. Cancellation (the signal path) triggers the
//! graceful-leave sequence before the function returns.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

use overnet_wire::{DhtBody, DhtPacket, WireForm};

use crate::bootstrap::{read_bootstrap, write_bootstrap};
use crate::error::DhtError;
use crate::node::{failure_for, DhtNode, Outbound};

const JOIN_TIMEOUT: Duration = Duration::from_secs(2);
const LEAVE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_DATAGRAM: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub my_ip: IpAddr,
    pub num_routes: usize,
    pub cfg_file: PathBuf,
    pub cache: bool,
    pub debug: bool,
    pub pred_file: Option<PathBuf>,
}

/// Serve until `cancel` fires, then leave the ring and return.
pub async fn run(cfg: ServerConfig, cancel: CancellationToken) -> Result<(), DhtError> {
    let socket = UdpSocket::bind((cfg.my_ip, 0)).await?;
    let addr = socket.local_addr()?;
    write_bootstrap(&cfg.cfg_file, addr)?;
    log::info!("dht({addr}): listening");

    let mut node = match &cfg.pred_file {
        Some(pred_file) => join_ring(&socket, addr, &cfg, pred_file).await?,
        None => DhtNode::new_solo(addr, cfg.num_routes, cfg.cache, cfg.debug),
    };

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            result = socket.recv_from(&mut buf) => {
                match result {
                    Ok((n, from)) => handle_datagram(&socket, &mut node, &buf[..n], from).await,
                    Err(err) => log::warn!("dht({addr}): receive error: {err}"),
                }
            }
        }
    }

    leave_ring(&socket, &mut node, &mut buf).await;
    log::info!("dht({addr}): stopped");
    Ok(())
}

async fn handle_datagram(socket: &UdpSocket, node: &mut DhtNode, data: &[u8], from: SocketAddr) {
    let parsed = std::str::from_utf8(data)
        .map_err(|_| overnet_wire::WireError::NotText)
        .and_then(DhtPacket::decode);
    match parsed {
        Ok(pkt) => transmit(socket, node.handle(pkt, from)).await,
        Err(err) => {
            log::warn!("dht: malformed packet from {from}: {err}");
            transmit(socket, vec![(failure_for(&err), from)]).await;
        }
    }
}

async fn transmit(socket: &UdpSocket, outs: Vec<Outbound>) {
    for (pkt, to) in outs {
        if let Err(err) = socket.send_to(pkt.encode().as_bytes(), to).await {
            log::warn!("dht: send to {to} failed: {err}");
        }
    }
}

async fn join_ring(
    socket: &UdpSocket,
    addr: SocketAddr,
    cfg: &ServerConfig,
    pred_file: &Path,
) -> Result<DhtNode, DhtError> {
    let pred = read_bootstrap(pred_file)?;
    let tag: u32 = rand::random();
    socket.send_to(DhtNode::join_request(addr, tag).encode().as_bytes(), pred).await?;

    let mut buf = vec![0u8; MAX_DATAGRAM];
    let (n, from) = tokio::time::timeout(JOIN_TIMEOUT, socket.recv_from(&mut buf))
        .await
        .map_err(|_| DhtError::JoinFailed("no reply from predecessor".into()))??;

    if from != pred {
        return Err(DhtError::JoinFailed(format!("reply from unexpected peer {from}")));
    }
    let text = std::str::from_utf8(&buf[..n])
        .map_err(|_| DhtError::JoinFailed("unreadable reply".into()))?;
    let reply = DhtPacket::decode(text)?;
    if reply.tag != tag {
        return Err(DhtError::JoinFailed("reply tag mismatch".into()));
    }
    if let DhtBody::Failure { reason } = &reply.body {
        return Err(DhtError::JoinFailed(reason.clone()));
    }

    let (node, outs) =
        DhtNode::from_join_reply(addr, cfg.num_routes, cfg.cache, cfg.debug, &reply)?;
    transmit(socket, outs).await;
    log::info!("dht({addr}): joined ring via {pred}, range {}", node.range());
    Ok(node)
}

/// Run the departure protocol: announce, wait (bounded) for the
/// announcement to circle the ring, then merge our range into the
/// predecessor and hand the keys over.
async fn leave_ring(socket: &UdpSocket, node: &mut DhtNode, buf: &mut [u8]) {
    let Some(outs) = node.start_leave() else {
        return;
    };
    transmit(socket, outs).await;

    let deadline = tokio::time::Instant::now() + LEAVE_TIMEOUT;
    while !node.leave_acked() {
        let rest = deadline.saturating_duration_since(tokio::time::Instant::now());
        if rest.is_zero() {
            log::warn!("dht: leave announcement did not circle back, handing off anyway");
            break;
        }
        match tokio::time::timeout(rest, socket.recv_from(buf)).await {
            Ok(Ok((n, from))) => handle_datagram(socket, node, &buf[..n], from).await,
            Ok(Err(err)) => {
                log::warn!("dht: receive error while leaving: {err}");
                break;
            }
            Err(_) => {
                log::warn!("dht: leave announcement did not circle back, handing off anyway");
                break;
            }
        }
    }

    transmit(socket, node.finish_leave()).await;
}
