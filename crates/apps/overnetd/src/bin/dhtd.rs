//! DHT ring member daemon.
//!
//! Binds an ephemeral UDP port on the given address and records it in the
//! config file. With `--pred-file` the member joins the live ring through
//! the recorded predecessor; otherwise it boots a fresh solo ring. INT/TERM
//! trigger the graceful-leave handoff before exit.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use overnet_dht::server::{run, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "dhtd")]
struct Args {
    /// Address to serve on (the port is ephemeral and written to CFG_FILE).
    my_ip: IpAddr,
    /// Routing-table bound.
    num_routes: usize,
    /// Where to record our own `ip port`.
    cfg_file: PathBuf,
    /// Cache relayed results.
    #[arg(long)]
    cache: bool,
    /// Log routing-table changes.
    #[arg(long)]
    debug: bool,
    /// Join the ring through the predecessor recorded in this file.
    #[arg(long)]
    pred_file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    let cancel = CancellationToken::new();
    spawn_signal_watcher(cancel.clone());

    let cfg = ServerConfig {
        my_ip: args.my_ip,
        num_routes: args.num_routes,
        cfg_file: args.cfg_file,
        cache: args.cache,
        debug: args.debug,
        pred_file: args.pred_file,
    };
    run(cfg, cancel).await?;
    Ok(())
}

fn spawn_signal_watcher(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut term = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            Ok(term) => term,
            Err(err) => {
                log::warn!("dhtd: no TERM handler: {err}");
                let _ = tokio::signal::ctrl_c().await;
                cancel.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
        cancel.cancel();
    });
}
