use std::collections::VecDeque;
use std::time::{Duration, Instant};

use overnet_substrate::Substrate;
use overnet_wire::{RdtKind, RdtPacket};

use crate::error::RdtError;

/// Duplicate-ACK count that triggers a fast retransmit.
const DUP_ACK_LIMIT: u8 = 4;

#[derive(Debug, Clone)]
pub struct GbnConfig {
    /// Sender window; the sequence space is twice this.
    pub w_size: u16,
    /// Retransmission timeout.
    pub timeout: Duration,
}

impl Default for GbnConfig {
    fn default() -> Self {
        Self { w_size: 8, timeout: Duration::from_secs(1) }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GbnStats {
    pub sent: u64,
    pub delivered: u64,
    pub retransmits: u64,
    pub fast_retransmits: u64,
}

/// One Go-Back-N endpoint: both directions interleaved in a single tick
/// loop with an explicit clock.
pub struct Gbn {
    w_size: u16,
    seq_space: u16,
    timeout: Duration,
    send_buf: Vec<Option<RdtPacket>>,
    recv_buf: Vec<Option<RdtPacket>>,
    send_base: u16,
    send_seq: u16,
    exp_seq: u16,
    recv_base: u16,
    last_rcvd: Option<u16>,
    dup_acks: u8,
    send_again: Option<Instant>,
    stop_timer: bool,
    enable_dup_ack: bool,
    stats: GbnStats,
}

impl Gbn {
    /// The sequence space is twice the window and rides in a 15-bit wire
    /// field, which bounds the window from both ends.
    pub fn new(cfg: GbnConfig) -> Result<Self, RdtError> {
        if cfg.w_size == 0 {
            return Err(RdtError::WindowZero);
        }
        let seq_space = cfg
            .w_size
            .checked_mul(2)
            .filter(|space| *space <= 1 << 15)
            .ok_or(RdtError::WindowTooLarge(cfg.w_size))?;
        Ok(Self {
            w_size: cfg.w_size,
            seq_space,
            timeout: cfg.timeout,
            send_buf: vec![None; seq_space as usize],
            recv_buf: vec![None; seq_space as usize],
            send_base: 0,
            send_seq: 0,
            exp_seq: 0,
            recv_base: 0,
            last_rcvd: None,
            dup_acks: 0,
            send_again: None,
            stop_timer: true,
            enable_dup_ack: true,
            stats: GbnStats::default(),
        })
    }

    pub fn stats(&self) -> GbnStats {
        self.stats
    }

    /// Packets in flight: `diff(sendSeqNum, sendBase)`, never above the
    /// window size.
    pub fn window_len(&self) -> u16 {
        self.diff(self.send_seq, self.send_base)
    }

    pub fn window_empty(&self) -> bool {
        self.window_len() == 0
    }

    fn diff(&self, a: u16, b: u16) -> u16 {
        (a + self.seq_space - b) % self.seq_space
    }

    fn incr(&self, x: u16) -> u16 {
        (x + 1) % self.seq_space
    }

    fn decr(&self, x: u16) -> u16 {
        (x + self.seq_space - 1) % self.seq_space
    }

    /// Take at most one action. Returns false when there was nothing to do.
    pub fn tick(
        &mut self,
        now: Instant,
        sub: &mut dyn Substrate<RdtPacket>,
        inbox: &mut VecDeque<String>,
        outbox: &mut VecDeque<String>,
    ) -> bool {
        // 1. hand the next in-order payload to the application
        if let Some(pkt) = self.recv_buf[self.recv_base as usize].take() {
            outbox.push_back(pkt.payload);
            self.recv_base = self.incr(self.recv_base);
            self.stats.delivered += 1;
            return true;
        }

        // 2. process one substrate arrival
        if let Some((pkt, _)) = sub.receive() {
            match pkt.kind {
                RdtKind::Data => self.handle_data(pkt, sub),
                RdtKind::Ack => self.handle_ack(pkt.seq, now, sub),
            }
            return true;
        }

        // 3. retransmission timer
        if !self.stop_timer
            && !self.window_empty()
            && self.send_again.is_some_and(|deadline| now >= deadline)
        {
            self.retransmit_window(now, sub);
            self.enable_dup_ack = true;
            return true;
        }

        // 4. admit one fresh payload if the window has room
        if !inbox.is_empty() && sub.ready(0) && self.window_len() < self.w_size {
            let Some(payload) = inbox.pop_front() else {
                return false;
            };
            let pkt = RdtPacket::data(self.send_seq, payload);
            self.send_buf[self.send_seq as usize] = Some(pkt.clone());
            if self.window_empty() {
                // first packet since idle starts the timer
                self.send_again = Some(now + self.timeout);
            }
            self.send_seq = self.incr(self.send_seq);
            sub.send(&pkt, 0);
            self.stop_timer = false;
            self.enable_dup_ack = true;
            self.stats.sent += 1;
            return true;
        }

        false
    }

    fn handle_data(&mut self, pkt: RdtPacket, sub: &mut dyn Substrate<RdtPacket>) {
        if pkt.seq == self.exp_seq {
            let acked = self.exp_seq;
            self.recv_buf[acked as usize] = Some(pkt);
            self.last_rcvd = Some(acked);
            self.exp_seq = self.incr(self.exp_seq);
            self.send_ack(acked, sub);
            self.enable_dup_ack = true;
        } else if let Some(last) = self.last_rcvd {
            // out of order: re-ack the last in-order receipt
            self.send_ack(last, sub);
        }
    }

    fn handle_ack(&mut self, seq: u16, now: Instant, sub: &mut dyn Substrate<RdtPacket>) {
        if seq == self.decr(self.send_base) {
            self.dup_acks += 1;
            if self.dup_acks >= DUP_ACK_LIMIT && self.enable_dup_ack {
                self.retransmit_window(now, sub);
                self.dup_acks = 0;
                self.enable_dup_ack = false;
                self.stats.fast_retransmits += 1;
            }
            return;
        }

        if self.diff(seq, self.send_base) < self.w_size && self.send_buf[seq as usize].is_some() {
            // cumulative: clear everything up to and including seq
            let mut i = self.send_base;
            loop {
                self.send_buf[i as usize] = None;
                let done = i == seq;
                i = self.incr(i);
                if done {
                    break;
                }
            }
            self.send_base = self.incr(seq);
            self.dup_acks = 0;
            self.send_again = Some(now + self.timeout);
            if self.window_empty() {
                self.stop_timer = true;
            }
        }
    }

    fn retransmit_window(&mut self, now: Instant, sub: &mut dyn Substrate<RdtPacket>) {
        let mut i = self.send_base;
        while i != self.send_seq {
            if let Some(pkt) = self.send_buf[i as usize].clone() {
                self.blocking_send(&pkt, sub);
                self.stats.retransmits += 1;
            }
            i = self.incr(i);
        }
        self.send_again = Some(now + self.timeout);
    }

    fn send_ack(&mut self, seq: u16, sub: &mut dyn Substrate<RdtPacket>) {
        self.blocking_send(&RdtPacket::ack(seq), sub);
    }

    fn blocking_send(&mut self, pkt: &RdtPacket, sub: &mut dyn Substrate<RdtPacket>) {
        while !sub.ready(0) {
            std::thread::sleep(Duration::from_millis(1));
        }
        sub.send(pkt, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use overnet_substrate::{lossy_pair, ChannelSubstrate};

    fn rig(w_size: u16) -> (Gbn, ChannelSubstrate<RdtPacket>, ChannelSubstrate<RdtPacket>) {
        let (sub, peer) = lossy_pair(0.0, 5);
        let gbn = Gbn::new(GbnConfig { w_size, timeout: Duration::from_millis(50) }).unwrap();
        (gbn, sub, peer)
    }

    #[test]
    fn degenerate_windows_are_refused() {
        assert!(matches!(
            Gbn::new(GbnConfig { w_size: 0, ..GbnConfig::default() }),
            Err(RdtError::WindowZero)
        ));
        assert!(matches!(
            Gbn::new(GbnConfig { w_size: 20_000, ..GbnConfig::default() }),
            Err(RdtError::WindowTooLarge(20_000))
        ));
        assert!(Gbn::new(GbnConfig { w_size: 1 << 14, ..GbnConfig::default() }).is_ok());
    }

    fn drain_sends(peer: &mut ChannelSubstrate<RdtPacket>) -> Vec<RdtPacket> {
        let mut out = Vec::new();
        while let Some((pkt, _)) = peer.receive() {
            out.push(pkt);
        }
        out
    }

    #[test]
    fn window_never_exceeds_w_size() {
        let (mut gbn, mut sub, _peer) = rig(4);
        let now = Instant::now();
        let mut inbox: VecDeque<String> = (0..10).map(|i| format!("m{i}")).collect();
        let mut outbox = VecDeque::new();

        for _ in 0..20 {
            gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
            assert!(gbn.window_len() <= 4);
        }
        assert_eq!(gbn.window_len(), 4, "window fills and then stalls");
        assert_eq!(inbox.len(), 6);
        assert!(!gbn.tick(now, &mut sub, &mut inbox, &mut outbox), "full window admits nothing");
    }

    #[test]
    fn cumulative_ack_slides_the_window_and_stops_the_timer() {
        let (mut gbn, mut sub, mut peer) = rig(4);
        let now = Instant::now();
        let mut inbox: VecDeque<String> = (0..3).map(|i| format!("m{i}")).collect();
        let mut outbox = VecDeque::new();

        for _ in 0..3 {
            gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        }
        assert_eq!(gbn.window_len(), 3);
        drain_sends(&mut peer);

        // ack the middle packet: slots 0..=1 clear
        peer.send(&RdtPacket::ack(1), 0);
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        assert_eq!(gbn.window_len(), 1);

        // ack the rest: window empty, timer stopped
        peer.send(&RdtPacket::ack(2), 0);
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        assert!(gbn.window_empty());

        // far in the future, nothing retransmits
        let later = now + Duration::from_secs(10);
        assert!(!gbn.tick(later, &mut sub, &mut inbox, &mut outbox));
        assert_eq!(gbn.stats().retransmits, 0);
    }

    #[test]
    fn timeout_retransmits_the_whole_window() {
        let (mut gbn, mut sub, mut peer) = rig(4);
        let now = Instant::now();
        let mut inbox: VecDeque<String> = (0..2).map(|i| format!("m{i}")).collect();
        let mut outbox = VecDeque::new();

        gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        drain_sends(&mut peer);

        let later = now + Duration::from_millis(60);
        assert!(gbn.tick(later, &mut sub, &mut inbox, &mut outbox));
        let resent = drain_sends(&mut peer);
        assert_eq!(resent.len(), 2);
        assert_eq!(resent[0].seq, 0);
        assert_eq!(resent[1].seq, 1);
        assert_eq!(gbn.stats().retransmits, 2);
    }

    #[test]
    fn four_duplicate_acks_trigger_one_fast_retransmit() {
        let (mut gbn, mut sub, mut peer) = rig(4);
        let now = Instant::now();
        let mut inbox: VecDeque<String> = (0..4).map(|i| format!("m{i}")).collect();
        let mut outbox = VecDeque::new();

        for _ in 0..4 {
            gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        }
        // packet 0 acked; packets 1..4 presumed lost
        peer.send(&RdtPacket::ack(0), 0);
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        assert_eq!(gbn.window_len(), 3);
        drain_sends(&mut peer);

        // duplicates for sendBase - 1
        for _ in 0..3 {
            peer.send(&RdtPacket::ack(0), 0);
            gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        }
        assert_eq!(gbn.stats().fast_retransmits, 0, "three duplicates are not enough");

        peer.send(&RdtPacket::ack(0), 0);
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        assert_eq!(gbn.stats().fast_retransmits, 1);
        let resent = drain_sends(&mut peer);
        assert_eq!(resent.iter().map(|p| p.seq).collect::<Vec<_>>(), vec![1, 2, 3]);

        // further duplicates stay quiet until re-enabled
        for _ in 0..5 {
            peer.send(&RdtPacket::ack(0), 0);
            gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        }
        assert_eq!(gbn.stats().fast_retransmits, 1);
    }

    #[test]
    fn receiver_delivers_in_order_and_reacks_out_of_order() {
        let (mut gbn, mut sub, mut peer) = rig(4);
        let now = Instant::now();
        let mut inbox = VecDeque::new();
        let mut outbox = VecDeque::new();

        peer.send(&RdtPacket::data(0, "first"), 0);
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox); // receive + ack
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox); // deliver
        assert_eq!(outbox.pop_front().as_deref(), Some("first"));

        let acks = drain_sends(&mut peer);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].kind, RdtKind::Ack);
        assert_eq!(acks[0].seq, 0);

        // a gap: packet 2 instead of 1 provokes a duplicate ack of 0
        peer.send(&RdtPacket::data(2, "early"), 0);
        gbn.tick(now, &mut sub, &mut inbox, &mut outbox);
        assert!(outbox.is_empty(), "out-of-order data is not delivered");
        let acks = drain_sends(&mut peer);
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].seq, 0, "cumulative re-ack of the last in-order packet");
    }

    #[test]
    fn new_send_after_idle_restarts_the_timer() {
        let (mut gbn, mut sub, mut peer) = rig(4);
        let t0 = Instant::now();
        let mut inbox: VecDeque<String> = VecDeque::from(["one".to_string()]);
        let mut outbox = VecDeque::new();

        gbn.tick(t0, &mut sub, &mut inbox, &mut outbox);
        peer.send(&RdtPacket::ack(0), 0);
        gbn.tick(t0, &mut sub, &mut inbox, &mut outbox);
        assert!(gbn.window_empty());
        drain_sends(&mut peer);

        // idle gap, then a second payload: its timer runs from the new send
        let t1 = t0 + Duration::from_millis(200);
        inbox.push_back("two".to_string());
        gbn.tick(t1, &mut sub, &mut inbox, &mut outbox);
        drain_sends(&mut peer);

        assert!(!gbn.tick(t1 + Duration::from_millis(40), &mut sub, &mut inbox, &mut outbox));
        assert!(gbn.tick(t1 + Duration::from_millis(60), &mut sub, &mut inbox, &mut outbox));
        let resent = drain_sends(&mut peer);
        assert_eq!(resent.len(), 1);
        assert_eq!(resent[0].seq, 1);
    }
}
