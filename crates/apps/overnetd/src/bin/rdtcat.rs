//! Reliable line pipe: stdin lines go to the peer through the Go-Back-N
//! endpoint, the peer's lines come out on stdout, in order, however lossy
//! the path is.

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio_util::sync::CancellationToken;

use overnet_rdt::GbnConfig;
use overnet_substrate::UdpSubstrate;

#[derive(Parser, Debug)]
#[command(name = "rdtcat")]
struct Args {
    /// UDP address to bind.
    #[arg(long)]
    bind: SocketAddr,
    /// The peer endpoint.
    #[arg(long)]
    peer: SocketAddr,
    /// Sender window size.
    #[arg(long, default_value_t = 8)]
    window: u16,
    /// Retransmission timeout in seconds.
    #[arg(long, default_value_t = 1.0)]
    timeout: f64,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    let sub = UdpSubstrate::bind(args.bind, vec![args.peer])?;
    let cfg = GbnConfig { w_size: args.window, timeout: Duration::from_secs_f64(args.timeout) };

    let cancel = CancellationToken::new();
    let (mut handle, task) = overnet_rdt::spawn(cfg, sub, cancel.clone())?;

    let stdin_pump = {
        let to_net = handle.to_net.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let mut lines = tokio::io::BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if to_net.send(line).await.is_err() {
                    break;
                }
            }
            // stdin closed: flush what is in flight, then stop
            cancel.cancel();
        })
    };

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = cancel.cancelled() => break,
            line = handle.from_net.recv() => match line {
                Some(line) => println!("{line}"),
                None => break,
            }
        }
    }

    cancel.cancel();
    let _ = tokio::join!(task, stdin_pump);
    Ok(())
}
