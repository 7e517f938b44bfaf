//! The packet Forwarder.
//!
//! One polling task, one action per tick, priorities fixed: substrate
//! arrivals first, then router output, then fresh application payloads.
//! Bounded channels connect it to the application and the Router; the
//! forwarding table sits behind the shared monitor.

use std::net::Ipv4Addr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use overnet_substrate::Substrate;
use overnet_wire::{OverlayPacket, PROTO_APP, PROTO_RTR};

use crate::fwd_table::{FwdTable, SharedFwdTable};

/// Capacity of every inter-thread queue.
pub const QUEUE_CAPACITY: usize = 1000;

const APP_TTL: i32 = 100;

/// The Router's side of the Forwarder: the shared forwarding table plus the
/// two packet queues.
pub struct RouterPort {
    pub table: SharedFwdTable,
    pub to_fwdr: mpsc::Sender<(OverlayPacket, usize)>,
    pub from_fwdr: mpsc::Receiver<(OverlayPacket, usize)>,
}

/// The application's side: send `"<destIp> <text>"` lines, receive the text
/// of payloads addressed here.
pub struct AppHandle {
    pub to_net: mpsc::Sender<String>,
    pub from_net: mpsc::Receiver<String>,
}

pub struct Forwarder<S> {
    my_ip: Ipv4Addr,
    sub: S,
    table: SharedFwdTable,
    from_src: mpsc::Receiver<String>,
    to_snk: mpsc::Sender<String>,
    from_rtr: mpsc::Receiver<(OverlayPacket, usize)>,
    to_rtr: mpsc::Sender<(OverlayPacket, usize)>,
    // one-slot buffers preserving peek-then-dequeue semantics over mpsc
    pending_rtr: Option<(OverlayPacket, usize)>,
    pending_src: Option<String>,
}

impl<S: Substrate<OverlayPacket>> Forwarder<S> {
    pub fn new(my_ip: Ipv4Addr, sub: S) -> (Self, RouterPort, AppHandle) {
        let table: SharedFwdTable = Arc::new(Mutex::new(FwdTable::new()));
        let (src_tx, src_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (snk_tx, snk_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (rtr_in_tx, rtr_in_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (rtr_out_tx, rtr_out_rx) = mpsc::channel(QUEUE_CAPACITY);

        let fwdr = Self {
            my_ip,
            sub,
            table: table.clone(),
            from_src: src_rx,
            to_snk: snk_tx,
            from_rtr: rtr_in_rx,
            to_rtr: rtr_out_tx,
            pending_rtr: None,
            pending_src: None,
        };
        let port = RouterPort { table, to_fwdr: rtr_in_tx, from_fwdr: rtr_out_rx };
        let app = AppHandle { to_net: src_tx, from_net: snk_rx };
        (fwdr, port, app)
    }

    /// Take at most one action. Returns false when there was nothing to do.
    pub fn tick(&mut self) -> bool {
        if let Some((pkt, lnk)) = self.sub.receive() {
            self.handle_incoming(pkt, lnk);
            return true;
        }

        if self.pending_rtr.is_none() {
            self.pending_rtr = self.from_rtr.try_recv().ok();
        }
        if let Some((pkt, lnk)) = self.pending_rtr.take() {
            if self.sub.ready(lnk) {
                self.sub.send(&pkt, lnk);
                return true;
            }
            self.pending_rtr = Some((pkt, lnk));
        }

        if self.pending_src.is_none() {
            self.pending_src = self.from_src.try_recv().ok();
        }
        if let Some(line) = self.pending_src.take() {
            return self.handle_payload(line);
        }

        false
    }

    fn handle_incoming(&mut self, mut pkt: OverlayPacket, lnk: usize) {
        pkt.ttl -= 1;

        if pkt.dest == self.my_ip {
            match pkt.protocol {
                PROTO_APP => {
                    if self.to_snk.try_send(pkt.payload).is_err() {
                        log::warn!("fwdr({}): sink queue full, payload dropped", self.my_ip);
                    }
                }
                PROTO_RTR => {
                    if self.to_rtr.try_send((pkt, lnk)).is_err() {
                        log::warn!("fwdr({}): router queue full, packet dropped", self.my_ip);
                    }
                }
                other => {
                    log::debug!("fwdr({}): unknown protocol {other}, dropping", self.my_ip);
                }
            }
            return;
        }

        if pkt.ttl <= 0 {
            log::debug!("fwdr({}): ttl exhausted for {}, dropping", self.my_ip, pkt.dest);
            return;
        }
        let out = self.lookup(pkt.dest);
        match out {
            Some(out) if self.sub.ready(out) => self.sub.send(&pkt, out),
            _ => log::debug!("fwdr({}): no usable link for {}, dropping", self.my_ip, pkt.dest),
        }
    }

    /// Wrap one `"<destIp> <text>"` application line and send it.
    fn handle_payload(&mut self, line: String) -> bool {
        let Some((dest, text)) = line.split_once(' ') else {
            log::warn!("fwdr({}): payload without destination, dropping", self.my_ip);
            return true;
        };
        let Ok(dest) = dest.parse::<Ipv4Addr>() else {
            log::warn!("fwdr({}): bad destination {dest:?}, dropping", self.my_ip);
            return true;
        };

        let pkt = OverlayPacket {
            src: self.my_ip,
            dest,
            protocol: PROTO_APP,
            ttl: APP_TTL,
            payload: text.to_string(),
        };
        match self.lookup(dest) {
            Some(lnk) if self.sub.ready(lnk) => {
                self.sub.send(&pkt, lnk);
                true
            }
            Some(_) => {
                // substrate not ready: keep the payload queued for the next tick
                self.pending_src = Some(line);
                false
            }
            None => {
                log::warn!("fwdr({}): no route for {dest}, dropping", self.my_ip);
                true
            }
        }
    }

    fn lookup(&self, dest: Ipv4Addr) -> Option<usize> {
        self.table.lock().ok().and_then(|table| table.lookup(dest))
    }

    /// Poll until cancelled, sleeping 1 ms when idle.
    pub async fn run(mut self, cancel: CancellationToken) {
        log::info!("fwdr({}): running with {} links", self.my_ip, self.sub.num_links());
        while !cancel.is_cancelled() {
            if self.tick() {
                tokio::task::yield_now().await;
            } else {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        log::info!("fwdr({}): stopped", self.my_ip);
    }
}
