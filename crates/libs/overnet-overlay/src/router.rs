//! The path-vector Router.
//!
//! Liveness first: every second each neighbor gets a hello, and three
//! missed replies take the link down. Reachability second: every ten
//! seconds the router advertises its own prefixes, and received adverts
//! drive the routing table through a fixed update rule. The forwarding
//! table is rewritten whenever a route's outgoing link changes.
//!
//! The protocol core is synchronous with an explicit clock; [`Router::run`]
//! is the polling pump that feeds it.

use std::net::Ipv4Addr;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use overnet_wire::{
    LinkFail, OverlayPacket, PathVec, Prefix, RouterPacket, WireForm, PROTO_RTR,
};

use crate::forwarder::RouterPort;
use crate::fwd_table::SharedFwdTable;

const HELLO_STRIKES: u8 = 3;
const ROUTER_TTL: i32 = 100;
/// An advert this much newer than the stored route replaces it outright.
const REFRESH_AGE: f64 = 20.0;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    pub my_ip: Ipv4Addr,
    /// Prefixes this router originates adverts for.
    pub prefixes: Vec<Prefix>,
    pub advertise_failures: bool,
    pub debug: bool,
    pub hello_interval: f64,
    pub advert_interval: f64,
}

impl RouterConfig {
    pub fn new(my_ip: Ipv4Addr, prefixes: Vec<Prefix>) -> Self {
        Self {
            my_ip,
            prefixes,
            advertise_failures: false,
            debug: false,
            hello_interval: 1.0,
            advert_interval: 10.0,
        }
    }
}

/// Per-neighbor link state: smoothed cost, the three-strike liveness
/// counter, and raw cost statistics.
#[derive(Debug, Clone)]
pub struct LinkInfo {
    pub peer_ip: Ipv4Addr,
    pub cost: f64,
    pub got_reply: bool,
    pub hello_state: u8,
    pub count: u64,
    pub total_cost: f64,
    pub min_cost: f64,
    pub max_cost: f64,
}

impl LinkInfo {
    fn new(peer_ip: Ipv4Addr) -> Self {
        Self {
            peer_ip,
            cost: 1.0,
            got_reply: false,
            hello_state: HELLO_STRIKES,
            count: 0,
            total_cost: 0.0,
            min_cost: f64::INFINITY,
            max_cost: 0.0,
        }
    }

    pub fn is_up(&self) -> bool {
        self.hello_state > 0
    }

    fn record_cost(&mut self, c: f64) {
        self.cost = 0.9 * self.cost + 0.1 * c;
        self.count += 1;
        self.total_cost += c;
        self.min_cost = self.min_cost.min(c);
        self.max_cost = self.max_cost.max(c);
    }
}

/// One routing-table entry. An invalid route is suppressed but retained so
/// later adverts have something to compare against.
#[derive(Debug, Clone)]
pub struct Route {
    pub pfx: Prefix,
    pub timestamp: f64,
    pub cost: f64,
    pub path: Vec<Ipv4Addr>,
    pub out_link: usize,
    pub valid: bool,
}

pub struct Router {
    cfg: RouterConfig,
    links: Vec<LinkInfo>,
    rte_tbl: Vec<Route>,
    table: SharedFwdTable,
}

impl Router {
    pub fn new(cfg: RouterConfig, peer_ips: Vec<Ipv4Addr>, table: SharedFwdTable) -> Self {
        Self { cfg, links: peer_ips.into_iter().map(LinkInfo::new).collect(), rte_tbl: Vec::new(), table }
    }

    pub fn links(&self) -> &[LinkInfo] {
        &self.links
    }

    pub fn routes(&self) -> &[Route] {
        &self.rte_tbl
    }

    pub fn find_route(&self, pfx: Prefix) -> Option<&Route> {
        self.rte_tbl.iter().find(|route| route.pfx == pfx)
    }

    /// The per-second probe pass: score missed replies, take dead links'
    /// routes down, then probe every neighbor again.
    pub fn send_hellos(&mut self, now: f64) -> Vec<(RouterPacket, usize)> {
        let mut out = Vec::new();
        for i in 0..self.links.len() {
            if !self.links[i].got_reply && self.links[i].hello_state > 0 {
                self.links[i].hello_state -= 1;
                if self.links[i].hello_state == 0 {
                    log::info!(
                        "rtr({}): link {i} to {} is down",
                        self.cfg.my_ip,
                        self.links[i].peer_ip
                    );
                    let mut changed = false;
                    for route in &mut self.rte_tbl {
                        if route.out_link == i && route.valid {
                            route.valid = false;
                            changed = true;
                        }
                    }
                    if changed && self.cfg.debug {
                        self.print_table();
                    }
                    if self.cfg.advertise_failures {
                        out.extend(self.failure_advert(i, now));
                    }
                }
            }
            self.links[i].got_reply = false;
            out.push((RouterPacket::Hello { timestamp: now }, i));
        }
        out
    }

    /// The periodic advertisement of our own prefixes, skipping dead links
    /// and locally invalidated prefixes.
    pub fn send_path_vecs(&self, now: f64) -> Vec<(RouterPacket, usize)> {
        let mut out = Vec::new();
        for pfx in &self.cfg.prefixes {
            if self.find_route(*pfx).is_some_and(|route| !route.valid) {
                continue;
            }
            for (i, link) in self.links.iter().enumerate() {
                if !link.is_up() {
                    continue;
                }
                out.push((
                    RouterPacket::Advert(PathVec {
                        pfx: *pfx,
                        timestamp: now,
                        cost: 0.0,
                        path: vec![self.cfg.my_ip],
                    }),
                    i,
                ));
            }
        }
        out
    }

    pub fn handle(&mut self, pkt: RouterPacket, lnk: usize, now: f64) -> Vec<(RouterPacket, usize)> {
        if lnk >= self.links.len() {
            log::warn!("rtr({}): packet on unknown link {lnk}", self.cfg.my_ip);
            return Vec::new();
        }
        match pkt {
            RouterPacket::Hello { timestamp } => {
                vec![(RouterPacket::Hello2u { timestamp }, lnk)]
            }
            RouterPacket::Hello2u { timestamp } => {
                let c = ((now - timestamp) / 2.0).max(0.0);
                let link = &mut self.links[lnk];
                link.record_cost(c);
                link.got_reply = true;
                link.hello_state = HELLO_STRIKES;
                Vec::new()
            }
            RouterPacket::Advert(pv) => self.handle_advert(pv, lnk),
            RouterPacket::FailureAdvert(fa) => self.handle_fadvert(fa, lnk),
        }
    }

    fn handle_advert(&mut self, pv: PathVec, lnk: usize) -> Vec<(RouterPacket, usize)> {
        if pv.path.contains(&self.cfg.my_ip) {
            log::trace!("rtr({}): own ip in path vector, discarding", self.cfg.my_ip);
            return Vec::new();
        }
        if !self.links[lnk].is_up() {
            log::debug!("rtr({}): advert on dead link {lnk}, ignoring", self.cfg.my_ip);
            return Vec::new();
        }

        let cand = Route {
            pfx: pv.pfx,
            timestamp: pv.timestamp,
            cost: self.links[lnk].cost + pv.cost,
            path: pv.path,
            out_link: lnk,
            valid: true,
        };

        let Some(pos) = self.rte_tbl.iter().position(|route| route.pfx == cand.pfx) else {
            if let Ok(mut table) = self.table.lock() {
                table.add_route(cand.pfx, lnk);
            }
            log::info!(
                "rtr({}): new route to {} via link {lnk}, cost {:.3}",
                self.cfg.my_ip,
                cand.pfx,
                cand.cost
            );
            self.rte_tbl.push(cand);
            if self.cfg.debug {
                self.print_table();
            }
            return Vec::new();
        };

        let old_path = self.rte_tbl[pos].path.clone();
        let old_out = self.rte_tbl[pos].out_link;
        let updated = update_route(&mut self.rte_tbl[pos], cand, &self.links);
        if updated {
            if self.rte_tbl[pos].path != old_path && self.cfg.debug {
                self.print_table();
            }
            if self.rte_tbl[pos].out_link != old_out {
                if let Ok(mut table) = self.table.lock() {
                    table.add_route(self.rte_tbl[pos].pfx, self.rte_tbl[pos].out_link);
                }
            }
        }

        // Pass the (possibly refreshed) route along, with ourselves appended
        // so the next hop can spot loops.
        let route = &self.rte_tbl[pos];
        let mut path = route.path.clone();
        path.push(self.cfg.my_ip);
        let advert = PathVec { pfx: route.pfx, timestamp: route.timestamp, cost: route.cost, path };
        self.links
            .iter()
            .enumerate()
            .filter(|(i, link)| *i != lnk && link.is_up())
            .map(|(i, _)| (RouterPacket::Advert(advert.clone()), i))
            .collect()
    }

    fn handle_fadvert(&mut self, fa: LinkFail, _lnk: usize) -> Vec<(RouterPacket, usize)> {
        if fa.path.contains(&self.cfg.my_ip) {
            log::trace!("rtr({}): own ip in failure advert, discarding", self.cfg.my_ip);
            return Vec::new();
        }

        let mut changed = false;
        for route in &mut self.rte_tbl {
            if has_adjacent(&route.path, fa.from, fa.to) {
                if route.valid || route.timestamp != fa.timestamp {
                    changed = true;
                }
                route.valid = false;
                route.timestamp = fa.timestamp;
            }
        }
        if !changed {
            return Vec::new();
        }

        log::info!(
            "rtr({}): link {}-{} reported down, routes through it suppressed",
            self.cfg.my_ip,
            fa.from,
            fa.to
        );
        if self.cfg.debug {
            self.print_table();
        }

        let mut path = fa.path.clone();
        path.push(self.cfg.my_ip);
        let advert = LinkFail { from: fa.from, to: fa.to, timestamp: fa.timestamp, path };
        self.links
            .iter()
            .enumerate()
            .filter(|(_, link)| link.is_up())
            .map(|(i, _)| (RouterPacket::FailureAdvert(advert.clone()), i))
            .collect()
    }

    fn failure_advert(&self, down: usize, now: f64) -> Vec<(RouterPacket, usize)> {
        let advert = LinkFail {
            from: self.cfg.my_ip,
            to: self.links[down].peer_ip,
            timestamp: now,
            path: vec![self.cfg.my_ip],
        };
        self.links
            .iter()
            .enumerate()
            .filter(|(i, link)| *i != down && link.is_up())
            .map(|(i, _)| (RouterPacket::FailureAdvert(advert.clone()), i))
            .collect()
    }

    fn print_table(&self) {
        for route in &self.rte_tbl {
            log::debug!(
                "rtr({}): {} cost {:.3} link {} {} path [{}] at {:.1}",
                self.cfg.my_ip,
                route.pfx,
                route.cost,
                route.out_link,
                if route.valid { "up" } else { "down" },
                route.path.iter().map(|ip| ip.to_string()).collect::<Vec<_>>().join(" "),
                route.timestamp,
            );
        }
    }

    fn log_stats(&self) {
        for (i, link) in self.links.iter().enumerate() {
            if link.count == 0 {
                continue;
            }
            log::info!(
                "rtr({}): link {i} to {}: {} probes, cost avg {:.3} min {:.3} max {:.3}",
                self.cfg.my_ip,
                link.peer_ip,
                link.count,
                link.total_cost / link.count as f64,
                link.min_cost,
                link.max_cost,
            );
        }
    }

    /// Timer-driven pump: hellos every second, adverts every ten, incoming
    /// packets in between, 1 ms naps when idle.
    pub async fn run(mut self, mut port: RouterPort, cancel: CancellationToken) {
        let t0 = tokio::time::Instant::now();
        let mut next_hello = self.cfg.hello_interval;
        let mut next_advert = self.cfg.advert_interval;

        log::info!("rtr({}): running with {} links", self.cfg.my_ip, self.links.len());
        while !cancel.is_cancelled() {
            let now = t0.elapsed().as_secs_f64();
            if now >= next_hello {
                next_hello += self.cfg.hello_interval;
                let outs = self.send_hellos(now);
                self.ship(outs, &port.to_fwdr).await;
            } else if now >= next_advert {
                next_advert += self.cfg.advert_interval;
                let outs = self.send_path_vecs(now);
                self.ship(outs, &port.to_fwdr).await;
            } else if let Ok((pkt, lnk)) = port.from_fwdr.try_recv() {
                match RouterPacket::decode(&pkt.payload) {
                    Ok(rp) => {
                        let outs = self.handle(rp, lnk, now);
                        self.ship(outs, &port.to_fwdr).await;
                    }
                    // malformed advertisements are dropped, never answered
                    Err(err) => {
                        log::warn!("rtr({}): malformed packet on link {lnk}: {err}", self.cfg.my_ip)
                    }
                }
            } else {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        }
        self.log_stats();
        log::info!("rtr({}): stopped", self.cfg.my_ip);
    }

    async fn ship(&self, outs: Vec<(RouterPacket, usize)>, to_fwdr: &mpsc::Sender<(OverlayPacket, usize)>) {
        for (rp, lnk) in outs {
            let pkt = OverlayPacket {
                src: self.cfg.my_ip,
                dest: self.links[lnk].peer_ip,
                protocol: PROTO_RTR,
                ttl: ROUTER_TTL,
                payload: rp.encode(),
            };
            if to_fwdr.send((pkt, lnk)).await.is_err() {
                return;
            }
        }
    }
}

/// The route update rule, first true clause wins:
/// 1. a valid different path revives an invalid route;
/// 2. the same path on the same link only refreshes timestamp and cost;
/// 3. a clearly cheaper, much newer, or dead-link-replacing candidate
///    replaces the route outright;
/// 4. otherwise nothing changes.
fn update_route(route: &mut Route, cand: Route, links: &[LinkInfo]) -> bool {
    if !route.valid && cand.valid && route.path != cand.path {
        *route = cand;
        return true;
    }
    if route.path == cand.path && route.out_link == cand.out_link {
        route.timestamp = cand.timestamp;
        route.cost = cand.cost;
        return true;
    }
    if cand.cost < 0.9 * route.cost
        || cand.timestamp > route.timestamp + REFRESH_AGE
        || !links[route.out_link].is_up()
    {
        *route = cand;
        return true;
    }
    false
}

fn has_adjacent(path: &[Ipv4Addr], a: Ipv4Addr, b: Ipv4Addr) -> bool {
    path.windows(2).any(|pair| (pair[0] == a && pair[1] == b) || (pair[0] == b && pair[1] == a))
}
