use std::io;
use std::net::{SocketAddr, UdpSocket};

use overnet_wire::WireForm;

use crate::Substrate;

const MAX_DATAGRAM: usize = 16 * 1024;

/// A substrate over one non-blocking UDP socket.
///
/// Each link is a fixed peer address; incoming datagrams are attributed to a
/// link by their source address, and datagrams from unknown sources are
/// dropped.
pub struct UdpSubstrate<P> {
    socket: UdpSocket,
    links: Vec<SocketAddr>,
    pending: Option<(P, usize)>,
}

impl<P: WireForm> UdpSubstrate<P> {
    pub fn bind(bind_addr: SocketAddr, links: Vec<SocketAddr>) -> io::Result<Self> {
        let socket = UdpSocket::bind(bind_addr)?;
        socket.set_nonblocking(true)?;
        log::info!("substrate: bound to {}", socket.local_addr()?);
        Ok(Self { socket, links, pending: None })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    fn poll(&mut self) {
        if self.pending.is_some() {
            return;
        }
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match self.socket.recv_from(&mut buf) {
                Ok((n, from)) => {
                    let Some(lnk) = self.links.iter().position(|peer| *peer == from) else {
                        log::debug!("substrate: datagram from unknown peer {from}");
                        continue;
                    };
                    let Ok(text) = std::str::from_utf8(&buf[..n]) else {
                        log::warn!("substrate: non-ascii datagram from {from}");
                        continue;
                    };
                    match P::decode(text) {
                        Ok(pkt) => {
                            self.pending = Some((pkt, lnk));
                            return;
                        }
                        Err(err) => {
                            log::warn!("substrate: undecodable datagram from {from}: {err}");
                            continue;
                        }
                    }
                }
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => return,
                Err(err) => {
                    log::warn!("substrate: receive error: {err}");
                    return;
                }
            }
        }
    }
}

impl<P: WireForm + Send> Substrate<P> for UdpSubstrate<P> {
    fn ready(&self, lnk: usize) -> bool {
        lnk < self.links.len()
    }

    fn send(&mut self, pkt: &P, lnk: usize) {
        let Some(peer) = self.links.get(lnk) else {
            log::warn!("substrate: send on unknown link {lnk}");
            return;
        };
        if let Err(err) = self.socket.send_to(pkt.encode().as_bytes(), peer) {
            if err.kind() != io::ErrorKind::WouldBlock {
                log::warn!("substrate: send to {peer} failed: {err}");
            }
        }
    }

    fn incoming(&mut self) -> bool {
        self.poll();
        self.pending.is_some()
    }

    fn receive(&mut self) -> Option<(P, usize)> {
        self.poll();
        self.pending.take()
    }

    fn num_links(&self) -> usize {
        self.links.len()
    }
}
