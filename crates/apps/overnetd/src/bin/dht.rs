//! DHT client: one get or put against a ring member found through its
//! config file.

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use overnet_dht::client::{request, ClientConfig};
use overnet_dht::read_bootstrap;
use overnet_wire::DhtBody;

#[derive(Parser, Debug)]
#[command(name = "dht")]
struct Args {
    /// Local address to bind the client socket on.
    my_ip: IpAddr,
    /// Config file written by the server to contact.
    cfg_file: PathBuf,
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Look a key up.
    Get { key: String },
    /// Store a value; omitting it removes the key.
    Put { key: String, value: Option<String> },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::try_parse().unwrap_or_else(|err| {
        let _ = err.print();
        std::process::exit(if err.use_stderr() { 1 } else { 0 });
    });

    let server = read_bootstrap(&args.cfg_file)?;
    let cfg = ClientConfig::new(args.my_ip, server);
    let body = match args.cmd {
        Cmd::Get { key } => DhtBody::Get { key },
        Cmd::Put { key, value } => DhtBody::Put { key, value },
    };

    match request(&cfg, body).await? {
        DhtBody::Success { value: Some(value), .. } => println!("success:{value}"),
        DhtBody::Success { .. } => println!("success"),
        DhtBody::NoMatch { .. } => println!("no match"),
        DhtBody::Failure { reason } => {
            println!("failure:{reason}");
            std::process::exit(1);
        }
        other => anyhow::bail!("unexpected reply: {}", other.kind_str()),
    }
    Ok(())
}
