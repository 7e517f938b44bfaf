//! One overlay node: Forwarder plus path-vector Router over UDP links.
//!
//! Stdin lines of the form `<destIp> <text>` are injected as application
//! payloads; payloads addressed here are printed to stdout.

use std::net::{Ipv4Addr, SocketAddr};

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use overnet_overlay::{LinkSpec, RouterConfig};
use overnet_substrate::UdpSubstrate;
use overnet_wire::Prefix;

#[derive(Parser, Debug)]
#[command(name = "overlayd")]
struct Args {
    /// This router's IP inside the overlay.
    #[arg(long)]
    ip: Ipv4Addr,
    /// UDP address the substrate binds.
    #[arg(long)]
    bind: SocketAddr,
    /// Neighbor link as `<udpAddr>,<routerIp>`; repeatable, link indexes
    /// follow the order given.
    #[arg(long = "link")]
    links: Vec<LinkSpec>,
    /// Prefix this node originates adverts for; repeatable.
    #[arg(long = "prefix")]
    prefixes: Vec<Prefix>,
    /// Advertise link failures to the neighborhood.
    #[arg(long)]
    advertise_failures: bool,
    /// Log table changes.
    #[arg(long)]
    debug: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    if args.links.is_empty() {
        anyhow::bail!("at least one --link is required");
    }
    let peer_addrs: Vec<SocketAddr> = args.links.iter().map(|link| link.addr).collect();
    let peer_ips: Vec<Ipv4Addr> = args.links.iter().map(|link| link.peer_ip).collect();

    let sub = UdpSubstrate::bind(args.bind, peer_addrs)?;

    let mut cfg = RouterConfig::new(args.ip, args.prefixes.clone());
    cfg.advertise_failures = args.advertise_failures;
    cfg.debug = args.debug;

    let cancel = CancellationToken::new();
    let (mut app, fwdr_task, rtr_task) =
        overnet_overlay::spawn(cfg, peer_ips, sub, cancel.clone())?;

    let stdin_pump = {
        let to_net = app.to_net.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    line = lines.next_line() => match line {
                        Ok(Some(line)) if !line.is_empty() => {
                            if to_net.send(line).await.is_err() {
                                break;
                            }
                        }
                        Ok(Some(_)) => {}
                        _ => break,
                    }
                }
            }
        })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            payload = app.from_net.recv() => match payload {
                Some(payload) => println!("{payload}"),
                None => break,
            }
        }
    }

    cancel.cancel();
    let _ = tokio::join!(fwdr_task, rtr_task, stdin_pump);
    Ok(())
}
