//! End-to-end Go-Back-N transfer across a substrate that drops almost a
//! third of everything, driven on a virtual clock so the run is exactly
//! reproducible.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use overnet_rdt::{Gbn, GbnConfig};
use overnet_substrate::lossy_pair;
use overnet_wire::RdtPacket;

#[test]
fn one_thousand_payloads_survive_thirty_percent_loss() {
    let (mut sub_a, mut sub_b) = lossy_pair::<RdtPacket>(0.3, 42);
    let cfg = GbnConfig { w_size: 8, timeout: Duration::from_millis(20) };
    let mut a = Gbn::new(cfg.clone()).unwrap();
    let mut b = Gbn::new(cfg).unwrap();

    let expected: Vec<String> = (0..1000).map(|i| format!("payload {i}")).collect();
    let mut a_inbox: VecDeque<String> = expected.iter().cloned().collect();
    let mut a_outbox = VecDeque::new();
    let mut b_inbox = VecDeque::new();
    let mut b_outbox = VecDeque::new();

    let t0 = Instant::now();
    let mut now = t0;
    let mut received: Vec<String> = Vec::new();
    let mut steps: u64 = 0;

    while received.len() < expected.len() {
        steps += 1;
        assert!(steps < 5_000_000, "transfer wedged after {} deliveries", received.len());

        let a_work = a.tick(now, &mut sub_a, &mut a_inbox, &mut a_outbox);
        let b_work = b.tick(now, &mut sub_b, &mut b_inbox, &mut b_outbox);
        received.extend(b_outbox.drain(..));

        // the clock only moves when both endpoints go idle
        if !a_work && !b_work {
            now += Duration::from_millis(1);
        }
    }

    assert_eq!(received, expected, "delivery must be exactly in order");
    assert!(a_outbox.is_empty(), "nothing flows the other way");

    let stats = a.stats();
    assert!(stats.retransmits > 0, "a 30% loss rate must force retransmissions");
    assert!(stats.fast_retransmits >= 1, "duplicate acks must fire fast retransmit");
    assert_eq!(stats.sent, 1000);
}

#[test]
fn a_clean_link_needs_no_retransmissions() {
    let (mut sub_a, mut sub_b) = lossy_pair::<RdtPacket>(0.0, 7);
    let cfg = GbnConfig { w_size: 8, timeout: Duration::from_millis(20) };
    let mut a = Gbn::new(cfg.clone()).unwrap();
    let mut b = Gbn::new(cfg).unwrap();

    let mut a_inbox: VecDeque<String> = (0..50).map(|i| format!("m{i}")).collect();
    let mut a_outbox = VecDeque::new();
    let mut b_inbox = VecDeque::new();
    let mut b_outbox = VecDeque::new();

    let t0 = Instant::now();
    let mut now = t0;
    let mut received = Vec::new();
    let mut steps = 0;

    while received.len() < 50 {
        steps += 1;
        assert!(steps < 100_000);
        let a_work = a.tick(now, &mut sub_a, &mut a_inbox, &mut a_outbox);
        let b_work = b.tick(now, &mut sub_b, &mut b_inbox, &mut b_outbox);
        received.extend(b_outbox.drain(..));
        if !a_work && !b_work {
            now += Duration::from_millis(1);
        }
    }

    assert_eq!(a.stats().retransmits, 0);
    assert_eq!(a.stats().fast_retransmits, 0);
}
