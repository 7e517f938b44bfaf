//! Ring-level protocol scenarios, driven synchronously: packets produced by
//! one member are delivered to the addressed member until the ring goes
//! quiet, so no sockets or timing are involved.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;

use overnet_dht::DhtNode;
use overnet_wire::{hashit, DhtBody, DhtPacket, HashRange, MAX_HASH};

const NUM_ROUTES: usize = 3;

fn addr(port: u16) -> SocketAddr {
    format!("10.0.0.1:{port}").parse().unwrap()
}

fn client() -> SocketAddr {
    addr(9999)
}

/// A key whose hash falls inside `range`.
fn key_in(range: HashRange) -> String {
    (0..)
        .map(|i| format!("probe-{i}"))
        .find(|key| range.contains(hashit(key)))
        .expect("some probe key hashes into the range")
}

struct Ring {
    nodes: HashMap<SocketAddr, DhtNode>,
    cache: bool,
}

impl Ring {
    fn new(cache: bool) -> Self {
        Self { nodes: HashMap::new(), cache }
    }

    fn node(&self, addr: SocketAddr) -> &DhtNode {
        &self.nodes[&addr]
    }

    fn add_solo(&mut self, port: u16) -> SocketAddr {
        let a = addr(port);
        self.nodes.insert(a, DhtNode::new_solo(a, NUM_ROUTES, self.cache, false));
        a
    }

    /// Join a new member through `pred`, completing the handshake the way
    /// the server shell does.
    fn join(&mut self, port: u16, pred: SocketAddr) -> SocketAddr {
        let a = addr(port);
        let outs = self
            .nodes
            .get_mut(&pred)
            .expect("predecessor exists")
            .handle(DhtNode::join_request(a, 77), a);

        let mut reply = None;
        let mut rest = Vec::new();
        for (pkt, to) in outs {
            if reply.is_none() && to == a && matches!(pkt.body, DhtBody::Success { .. }) {
                reply = Some(pkt);
            } else {
                rest.push((pred, pkt, to));
            }
        }
        let reply = reply.expect("join reply");
        let (node, notify) =
            DhtNode::from_join_reply(a, NUM_ROUTES, self.cache, false, &reply).expect("join");
        self.nodes.insert(a, node);

        let mut queue: VecDeque<_> = rest.into();
        queue.extend(notify.into_iter().map(|(pkt, to)| (a, pkt, to)));
        self.pump(queue);
        a
    }

    /// Deliver packets until the ring is quiet; anything addressed off-ring
    /// (a client) is collected and returned.
    fn pump(&mut self, mut queue: VecDeque<(SocketAddr, DhtPacket, SocketAddr)>) -> Vec<DhtPacket> {
        let mut external = Vec::new();
        let mut steps = 0;
        while let Some((from, pkt, to)) = queue.pop_front() {
            steps += 1;
            assert!(steps < 10_000, "ring did not go quiet");
            match self.nodes.get_mut(&to) {
                Some(node) => {
                    for (out, next) in node.handle(pkt, from) {
                        queue.push_back((to, out, next));
                    }
                }
                None => external.push(pkt),
            }
        }
        external
    }

    /// One client request; returns the replies the client saw.
    fn request(&mut self, server: SocketAddr, body: DhtBody, tag: u32) -> Vec<DhtPacket> {
        self.pump(VecDeque::from([(client(), DhtPacket::new(body, tag), server)]))
    }

    fn put(&mut self, server: SocketAddr, key: &str, value: &str, tag: u32) -> DhtPacket {
        let replies = self.request(
            server,
            DhtBody::Put { key: key.into(), value: Some(value.into()) },
            tag,
        );
        assert_eq!(replies.len(), 1, "exactly one reply per request");
        replies.into_iter().next().expect("reply")
    }

    fn get(&mut self, server: SocketAddr, key: &str, tag: u32) -> DhtPacket {
        let replies = self.request(server, DhtBody::Get { key: key.into() }, tag);
        assert_eq!(replies.len(), 1, "exactly one reply per request");
        replies.into_iter().next().expect("reply")
    }

    /// Full departure handshake for one member.
    fn leave(&mut self, leaver: SocketAddr) {
        let outs = self
            .nodes
            .get_mut(&leaver)
            .expect("leaver exists")
            .start_leave()
            .expect("not the bottom-range member");
        self.pump(outs.into_iter().map(|(pkt, to)| (leaver, pkt, to)).collect());
        assert!(self.node(leaver).leave_acked(), "leave announcement must circle back");

        let outs = self.nodes.get_mut(&leaver).expect("leaver exists").finish_leave();
        self.pump(outs.into_iter().map(|(pkt, to)| (leaver, pkt, to)).collect());
        self.nodes.remove(&leaver);
    }

    /// Every hash value must be owned by exactly one live member.
    fn assert_partition(&self) {
        let mut ranges: Vec<HashRange> = self.nodes.values().map(|n| n.range()).collect();
        ranges.sort_by_key(|r| r.lo);
        assert_eq!(ranges[0].lo, 0, "bottom of the space is owned");
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].hi + 1, pair[1].lo, "ranges must tile without gap or overlap");
        }
        assert_eq!(ranges[ranges.len() - 1].hi, MAX_HASH, "top of the space is owned");
    }
}

#[test]
fn solo_ring_serves_put_and_get() {
    let mut ring = Ring::new(false);
    let a = ring.add_solo(4000);

    let reply = ring.put(a, "dungeons", "dragons", 1);
    assert!(matches!(reply.body, DhtBody::Success { .. }));
    assert_eq!(reply.tag, 1);

    let reply = ring.get(a, "dungeons", 2);
    match reply.body {
        DhtBody::Success { value: Some(value), .. } => assert_eq!(value, "dragons"),
        other => panic!("unexpected reply {other:?}"),
    }

    let reply = ring.get(a, "unknown", 3);
    assert!(matches!(reply.body, DhtBody::NoMatch { .. }));
    ring.assert_partition();
}

#[test]
fn repeated_put_is_idempotent() {
    let mut ring = Ring::new(false);
    let a = ring.add_solo(4000);
    ring.put(a, "k", "v", 1);
    ring.put(a, "k", "v", 1);
    let reply = ring.get(a, "k", 2);
    assert!(matches!(reply.body, DhtBody::Success { value: Some(v), .. } if v == "v"));
}

#[test]
fn join_splits_the_range_in_half() {
    let mut ring = Ring::new(false);
    let a = ring.add_solo(4000);
    let b = ring.join(4001, a);

    let half = (MAX_HASH) / 2;
    assert_eq!(ring.node(a).range(), HashRange::new(0, half));
    assert_eq!(ring.node(b).range(), HashRange::new(half + 1, MAX_HASH));

    assert_eq!(ring.node(a).succ().addr, b);
    assert_eq!(ring.node(a).pred().addr, b);
    assert_eq!(ring.node(b).succ().addr, a);
    assert_eq!(ring.node(b).pred().addr, a);
    ring.assert_partition();
}

#[test]
fn request_to_the_wrong_member_is_forwarded() {
    let mut ring = Ring::new(false);
    let a = ring.add_solo(4000);
    let b = ring.join(4001, a);

    let key = key_in(ring.node(b).range());
    let reply = ring.put(a, &key, "payload", 5);
    assert!(matches!(reply.body, DhtBody::Success { .. }));
    assert_eq!(reply.tag, 5);
    // the owner stored it; the first hop did not
    assert_eq!(ring.node(b).local_get(&key), Some("payload"));
    assert_eq!(ring.node(a).local_get(&key), None);
    // reply-path fields were stripped before the client saw the reply
    assert!(reply.relay.is_none());
    assert!(reply.client.is_none());

    let reply = ring.get(a, &key, 6);
    assert!(matches!(reply.body, DhtBody::Success { value: Some(v), .. } if v == "payload"));
}

#[test]
fn join_hands_off_owned_keys() {
    let mut ring = Ring::new(false);
    let a = ring.add_solo(4000);

    // seed keys across the whole space, then split
    let upper = HashRange::new(MAX_HASH / 2 + 1, MAX_HASH);
    let moved = key_in(upper);
    let kept = key_in(HashRange::new(0, MAX_HASH / 2));
    ring.put(a, &moved, "m", 1);
    ring.put(a, &kept, "k", 2);

    let b = ring.join(4001, a);
    assert_eq!(ring.node(b).local_get(&moved), Some("m"));
    assert_eq!(ring.node(a).local_get(&moved), None);
    assert_eq!(ring.node(a).local_get(&kept), Some("k"));
}

#[test]
fn relay_cache_answers_the_second_request() {
    let mut ring = Ring::new(true);
    let a = ring.add_solo(4000);
    let b = ring.join(4001, a);

    let key = key_in(ring.node(b).range());
    ring.put(b, &key, "cached", 1);

    // first request through A reaches the owner B
    let reply = ring.get(a, &key, 2);
    assert!(matches!(reply.body, DhtBody::Success { .. }));

    // second request is served straight from A's cache, no forward
    let outs = ring
        .nodes
        .get_mut(&a)
        .expect("a")
        .handle(DhtPacket::new(DhtBody::Get { key: key.clone() }, 3), client());
    assert_eq!(outs.len(), 1);
    assert_eq!(outs[0].1, client(), "cache hit must answer the client directly");
    assert!(matches!(&outs[0].0.body, DhtBody::Success { value: Some(v), .. } if v == "cached"));
}

#[test]
fn graceful_leave_merges_and_hands_off() {
    let mut ring = Ring::new(false);
    let a = ring.add_solo(4000);
    let b = ring.join(4001, a);
    let c = ring.join(4002, b);
    ring.assert_partition();

    // ring order is a -> b -> c -> a
    assert_eq!(ring.node(a).succ().addr, b);
    assert_eq!(ring.node(b).succ().addr, c);
    assert_eq!(ring.node(c).succ().addr, a);

    // seed a key owned by b
    let key = key_in(ring.node(b).range());
    ring.put(a, &key, "survivor", 1);
    assert_eq!(ring.node(b).local_get(&key), Some("survivor"));

    ring.leave(b);
    ring.assert_partition();

    assert_eq!(ring.node(a).succ().addr, c);
    assert_eq!(ring.node(c).pred().addr, a);
    assert_eq!(ring.node(a).local_get(&key), Some("survivor"));
    assert!(!ring.node(a).routes().contains_addr(b));
    assert!(!ring.node(c).routes().contains_addr(b));

    // the merged owner keeps serving the moved key
    let reply = ring.get(c, &key, 9);
    assert!(matches!(reply.body, DhtBody::Success { value: Some(v), .. } if v == "survivor"));
}

#[test]
fn partition_survives_churn() {
    let mut ring = Ring::new(false);
    let a = ring.add_solo(4000);
    let b = ring.join(4001, a);
    let c = ring.join(4002, b);
    let d = ring.join(4003, a);
    ring.assert_partition();

    ring.leave(d);
    ring.assert_partition();
    ring.leave(b);
    ring.assert_partition();

    assert_eq!(ring.node(a).succ().addr, c);
    assert_eq!(ring.node(c).succ().addr, a);
}
