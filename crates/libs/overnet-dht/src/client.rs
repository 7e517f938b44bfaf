//! Client side of the DHT request protocol.
//!
//! The server never retries; a client that hears nothing reissues the same
//! request with the same tag so the ring can treat the repeat as the same
//! operation.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use overnet_wire::{DhtBody, DhtPacket, WireForm};

use crate::error::DhtError;

const MAX_DATAGRAM: usize = 16 * 1024;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub bind_ip: IpAddr,
    pub server: SocketAddr,
    pub attempts: u32,
    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(bind_ip: IpAddr, server: SocketAddr) -> Self {
        Self { bind_ip, server, attempts: 3, timeout: Duration::from_secs(2) }
    }
}

/// Issue one request and wait for the matching reply.
pub async fn request(cfg: &ClientConfig, body: DhtBody) -> Result<DhtBody, DhtError> {
    let socket = UdpSocket::bind((cfg.bind_ip, 0)).await?;
    let tag: u32 = rand::random();
    let encoded = DhtPacket::new(body, tag).encode();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    for attempt in 1..=cfg.attempts {
        socket.send_to(encoded.as_bytes(), cfg.server).await?;

        let deadline = tokio::time::Instant::now() + cfg.timeout;
        loop {
            let rest = deadline.saturating_duration_since(tokio::time::Instant::now());
            if rest.is_zero() {
                break;
            }
            match tokio::time::timeout(rest, socket.recv_from(&mut buf)).await {
                Err(_) => break,
                Ok(Err(err)) => return Err(err.into()),
                Ok(Ok((n, from))) => {
                    let Ok(text) = std::str::from_utf8(&buf[..n]) else {
                        continue;
                    };
                    match DhtPacket::decode(text) {
                        Ok(reply) if reply.tag == tag => return Ok(reply.body),
                        Ok(_) => log::debug!("client: reply with foreign tag from {from}"),
                        Err(err) => log::debug!("client: undecodable reply from {from}: {err}"),
                    }
                }
            }
        }
        log::debug!("client: attempt {attempt}/{} timed out", cfg.attempts);
    }

    Err(DhtError::TimedOut(cfg.attempts))
}
