use std::collections::HashMap;
use std::net::SocketAddr;

use overnet_wire::{hashit, DhtBody, DhtPacket, HashRange, NodeInfo, WireError, MAX_HASH};

use crate::cache::LruCache;
use crate::routes::RouteTable;
use crate::CACHE_CAPACITY;

/// A packet to transmit and where to send it.
pub type Outbound = (DhtPacket, SocketAddr);

/// One ring member's protocol state.
///
/// Purely synchronous: [`DhtNode::handle`] maps an admitted packet to the
/// packets it provokes, and the UDP shell does the actual I/O. All state is
/// owned by the one thread driving the node.
pub struct DhtNode {
    addr: SocketAddr,
    range: HashRange,
    succ: NodeInfo,
    pred: NodeInfo,
    map: HashMap<String, String>,
    cache: Option<LruCache>,
    routes: RouteTable,
    debug: bool,
    stopped: bool,
}

impl DhtNode {
    /// First member of a ring: owns the whole hash space, is its own
    /// successor and predecessor.
    pub fn new_solo(addr: SocketAddr, num_routes: usize, cache: bool, debug: bool) -> Self {
        let this = NodeInfo::new(addr, 0);
        Self {
            addr,
            range: HashRange::new(0, MAX_HASH),
            succ: this,
            pred: this,
            map: HashMap::new(),
            cache: cache.then(|| LruCache::new(CACHE_CAPACITY)),
            routes: RouteTable::new(num_routes),
            debug,
            stopped: false,
        }
    }

    /// The join request a newcomer sends to its chosen predecessor.
    pub fn join_request(addr: SocketAddr, tag: u32) -> DhtPacket {
        let mut pkt = DhtPacket::new(DhtBody::Join, tag);
        pkt.sender = Some(NodeInfo::new(addr, 0));
        pkt
    }

    /// Build a member from the predecessor's join reply.
    ///
    /// Also returns the `update` that repairs the successor's predecessor
    /// pointer, which the caller must transmit.
    pub fn from_join_reply(
        addr: SocketAddr,
        num_routes: usize,
        cache: bool,
        debug: bool,
        reply: &DhtPacket,
    ) -> Result<(Self, Vec<Outbound>), WireError> {
        let DhtBody::Success { succ: Some(succ), pred: Some(pred), range: Some(range), .. } =
            reply.body
        else {
            return Err(WireError::MissingField("succInfo/predInfo/hashRange"));
        };

        let mut node = Self {
            addr,
            range,
            succ,
            pred,
            map: HashMap::new(),
            cache: cache.then(|| LruCache::new(CACHE_CAPACITY)),
            routes: RouteTable::new(num_routes),
            debug,
            stopped: false,
        };
        node.routes.add(succ, succ);
        node.routes.add(pred, succ);

        let mut notify = DhtPacket::new(
            DhtBody::Update { succ: None, pred: Some(node.self_info()), range: None },
            reply.tag,
        );
        notify.sender = Some(node.self_info());
        Ok((node, vec![(notify, succ.addr)]))
    }

    pub fn self_info(&self) -> NodeInfo {
        NodeInfo::new(self.addr, self.range.lo)
    }

    pub fn range(&self) -> HashRange {
        self.range
    }

    pub fn succ(&self) -> NodeInfo {
        self.succ
    }

    pub fn pred(&self) -> NodeInfo {
        self.pred
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Local (authoritative) lookup, bypassing the protocol.
    pub fn local_get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    pub fn key_count(&self) -> usize {
        self.map.len()
    }

    /// Set once this member has seen its own leave packet circle the ring.
    pub fn leave_acked(&self) -> bool {
        self.stopped
    }

    /// Admit one packet and produce the packets it provokes.
    pub fn handle(&mut self, mut pkt: DhtPacket, from: SocketAddr) -> Vec<Outbound> {
        pkt.ttl -= 1;
        if pkt.ttl < 0 {
            log::trace!("dht({}): ttl exhausted, dropping {}", self.addr, pkt.body.kind_str());
            return Vec::new();
        }

        // Passive route warm-up from whoever identified themselves. Join is
        // handled by the split (the joiner's firstHash is not known yet) and
        // leave announces a departure, not a peer.
        if let Some(sender) = pkt.sender {
            if !matches!(pkt.body, DhtBody::Join | DhtBody::Leave) {
                self.add_route(sender);
            }
        }

        match pkt.body {
            DhtBody::Get { .. } | DhtBody::Put { .. } => self.handle_request(pkt, from),
            DhtBody::Success { .. } | DhtBody::NoMatch { .. } | DhtBody::Failure { .. } => {
                self.handle_reply(pkt)
            }
            DhtBody::Join => self.handle_join(pkt, from),
            DhtBody::Leave => self.handle_leave(pkt),
            DhtBody::Transfer { .. } => self.handle_transfer(pkt),
            DhtBody::Update { .. } => self.handle_update(pkt),
        }
    }

    /// Begin a graceful departure: announce it to the successor and let it
    /// circle the ring. Returns `None` for the member holding the bottom of
    /// the hash space, which cannot merge its range downward and simply
    /// exits.
    pub fn start_leave(&mut self) -> Option<Vec<Outbound>> {
        if self.range.lo == 0 {
            log::info!("dht({}): bottom-range member, leaving without handoff", self.addr);
            return None;
        }
        let mut pkt = DhtPacket::new(DhtBody::Leave, 0);
        pkt.sender = Some(self.self_info());
        log::info!("dht({}): leaving, announcing to {}", self.addr, self.succ.addr);
        Some(vec![(pkt, self.succ.addr)])
    }

    /// Hand the ring over: merge our range into the predecessor, repair the
    /// successor's predecessor pointer, and transfer every owned key.
    pub fn finish_leave(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();

        let merged = HashRange::new(self.pred.first_hash, self.range.hi);
        out.push((
            DhtPacket::new(
                DhtBody::Update { succ: Some(self.succ), pred: None, range: Some(merged) },
                0,
            ),
            self.pred.addr,
        ));
        out.push((
            DhtPacket::new(DhtBody::Update { succ: None, pred: Some(self.pred), range: None }, 0),
            self.succ.addr,
        ));

        for (key, value) in self.map.drain() {
            out.push((DhtPacket::new(DhtBody::Transfer { key, value }, 0), self.pred.addr));
        }
        out
    }

    fn add_route(&mut self, info: NodeInfo) {
        if info.addr == self.addr {
            return;
        }
        if self.routes.add(info, self.succ) && self.debug {
            self.print_routes();
        }
    }

    fn handle_request(&mut self, mut pkt: DhtPacket, from: SocketAddr) -> Vec<Outbound> {
        let key = match &pkt.body {
            DhtBody::Get { key } | DhtBody::Put { key, .. } => key.clone(),
            _ => unreachable!("handle_request takes get/put only"),
        };
        let h = hashit(&key);

        if self.range.contains(h) {
            let body = match &pkt.body {
                DhtBody::Get { .. } => match self.map.get(&key) {
                    Some(value) => DhtBody::Success {
                        key: Some(key),
                        value: Some(value.clone()),
                        succ: None,
                        pred: None,
                        range: None,
                    },
                    None => DhtBody::NoMatch { key: Some(key) },
                },
                DhtBody::Put { value, .. } => {
                    let value = value.clone();
                    match value.clone() {
                        Some(value) => {
                            self.map.insert(key.clone(), value);
                        }
                        None => {
                            self.map.remove(&key);
                        }
                    }
                    DhtBody::Success { key: Some(key), value, succ: None, pred: None, range: None }
                }
                _ => unreachable!(),
            };
            return self.reply(body, &pkt, from);
        }

        if let DhtBody::Get { key } = &pkt.body {
            let cached = self.cache.as_mut().and_then(|cache| cache.get(key)).map(String::from);
            if let Some(value) = cached {
                log::debug!("dht({}): cache hit for {key:?}", self.addr);
                let body = DhtBody::Success {
                    key: Some(key.clone()),
                    value: Some(value),
                    succ: None,
                    pred: None,
                    range: None,
                };
                return self.reply(body, &pkt, from);
            }
        }

        // Not ours and not cached: relay toward the closest range start.
        let Some(next) = self.routes.next_hop(h) else {
            log::warn!("dht({}): no route for hash {h}, dropping {}", self.addr, key);
            return Vec::new();
        };
        if pkt.relay.is_none() {
            pkt.relay = Some(self.addr);
            pkt.client = Some(from);
        }
        vec![(pkt, next.addr)]
    }

    /// Wrap a reply body in the request's envelope and aim it along the
    /// reply path.
    fn reply(&self, body: DhtBody, request: &DhtPacket, from: SocketAddr) -> Vec<Outbound> {
        let mut reply = DhtPacket::new(body, request.tag);
        match request.relay {
            Some(relay) if relay != self.addr => {
                reply.client = request.client;
                reply.relay = request.relay;
                reply.sender = Some(self.self_info());
                vec![(reply, relay)]
            }
            Some(_) => {
                // We recorded ourselves as relay and the request came back
                // around to us; answer the recorded client directly.
                match request.client {
                    Some(client) => vec![(reply, client)],
                    None => Vec::new(),
                }
            }
            None => vec![(reply, from)],
        }
    }

    fn handle_reply(&mut self, mut pkt: DhtPacket) -> Vec<Outbound> {
        if pkt.relay != Some(self.addr) {
            log::debug!("dht({}): stray {} reply, dropping", self.addr, pkt.body.kind_str());
            return Vec::new();
        }
        if let DhtBody::Success { key: Some(key), value: Some(value), .. } = &pkt.body {
            if let Some(cache) = &mut self.cache {
                cache.insert(key.clone(), value.clone());
            }
        }
        let Some(client) = pkt.client else {
            log::warn!("dht({}): relayed reply without a client, dropping", self.addr);
            return Vec::new();
        };
        pkt.client = None;
        pkt.relay = None;
        pkt.sender = None;
        vec![(pkt, client)]
    }

    fn handle_join(&mut self, pkt: DhtPacket, from: SocketAddr) -> Vec<Outbound> {
        let joiner_addr = pkt.sender.map(|sender| sender.addr).unwrap_or(from);

        if self.range.lo == self.range.hi {
            let body = DhtBody::Failure { reason: "no hash space left to split".into() };
            let mut reply = DhtPacket::new(body, pkt.tag);
            reply.sender = Some(self.self_info());
            return vec![(reply, joiner_addr)];
        }

        // Split the upper half of our range off for the newcomer.
        let mid = (self.range.hi - self.range.lo) / 2;
        let newcomer_range = HashRange::new(self.range.lo + mid + 1, self.range.hi);
        self.range = HashRange::new(self.range.lo, self.range.lo + mid);

        let old_succ = self.succ;
        let newcomer = NodeInfo::new(joiner_addr, newcomer_range.lo);
        self.succ = newcomer;
        self.add_route(newcomer);

        log::info!(
            "dht({}): {} joined, keeping {}, handing off {}",
            self.addr,
            joiner_addr,
            self.range,
            newcomer_range,
        );

        let mut reply = DhtPacket::new(
            DhtBody::Success {
                key: None,
                value: None,
                succ: Some(old_succ),
                pred: Some(self.self_info()),
                range: Some(newcomer_range),
            },
            pkt.tag,
        );
        reply.sender = Some(self.self_info());
        let mut out = vec![(reply, joiner_addr)];

        // Hand over every key the newcomer now owns.
        let moved: Vec<String> = self
            .map
            .keys()
            .filter(|key| newcomer_range.contains(hashit(key)))
            .cloned()
            .collect();
        for key in moved {
            if let Some(value) = self.map.remove(&key) {
                let mut transfer = DhtPacket::new(DhtBody::Transfer { key, value }, 0);
                transfer.sender = Some(self.self_info());
                out.push((transfer, joiner_addr));
            }
        }
        out
    }

    fn handle_leave(&mut self, pkt: DhtPacket) -> Vec<Outbound> {
        let Some(origin) = pkt.sender else {
            log::warn!("dht({}): leave without senderInfo, dropping", self.addr);
            return Vec::new();
        };
        if origin.addr == self.addr {
            // Our own announcement made it all the way around.
            self.stopped = true;
            return Vec::new();
        }
        if self.routes.remove(origin.addr) && self.debug {
            self.print_routes();
        }
        vec![(pkt, self.succ.addr)]
    }

    fn handle_transfer(&mut self, pkt: DhtPacket) -> Vec<Outbound> {
        let DhtBody::Transfer { key, value } = pkt.body else {
            return Vec::new();
        };
        if self.range.contains(hashit(&key)) {
            self.map.insert(key, value);
        } else {
            // Stale handoff from before a later ring change.
            log::debug!("dht({}): transfer of {key:?} outside our range, dropping", self.addr);
        }
        Vec::new()
    }

    fn handle_update(&mut self, pkt: DhtPacket) -> Vec<Outbound> {
        let DhtBody::Update { succ, pred, range } = pkt.body else {
            return Vec::new();
        };
        if let Some(range) = range {
            log::info!("dht({}): range now {range}", self.addr);
            self.range = range;
        }
        if let Some(succ) = succ {
            self.succ = succ;
            self.add_route(succ);
        }
        if let Some(pred) = pred {
            self.pred = pred;
        }
        Vec::new()
    }

    fn print_routes(&self) {
        log::debug!(
            "dht({}): routes [{}], succ {}, pred {}",
            self.addr,
            self.routes.iter().map(|e| e.to_string()).collect::<Vec<_>>().join(", "),
            self.succ,
            self.pred,
        );
    }
}

/// A `failure` reply for a datagram that did not parse.
pub fn failure_for(err: &WireError) -> DhtPacket {
    DhtPacket::new(DhtBody::Failure { reason: err.to_string() }, 0)
}
