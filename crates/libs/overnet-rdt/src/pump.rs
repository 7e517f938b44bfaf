//! The polling task that runs a [`Gbn`] endpoint against a substrate and a
//! pair of application channels. On cancellation the loop keeps running
//! until everything in flight has been delivered and acknowledged.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use overnet_substrate::Substrate;
use overnet_wire::RdtPacket;

use crate::error::RdtError;
use crate::gbn::{Gbn, GbnConfig};

const QUEUE_CAPACITY: usize = 1000;

/// Application side of an endpoint: send payload lines, receive the peer's
/// payload lines in order.
pub struct RdtHandle {
    pub to_net: mpsc::Sender<String>,
    pub from_net: mpsc::Receiver<String>,
}

/// Spawn one endpoint over `sub`. Fails up front on a window the sequence
/// space cannot carry.
pub fn spawn<S>(
    cfg: GbnConfig,
    sub: S,
    cancel: CancellationToken,
) -> Result<(RdtHandle, JoinHandle<()>), RdtError>
where
    S: Substrate<RdtPacket> + 'static,
{
    let gbn = Gbn::new(cfg)?;
    let (to_net, from_app) = mpsc::channel(QUEUE_CAPACITY);
    let (to_app, from_net) = mpsc::channel(QUEUE_CAPACITY);
    let task = tokio::spawn(run(gbn, sub, from_app, to_app, cancel));
    Ok((RdtHandle { to_net, from_net }, task))
}

async fn run<S>(
    mut gbn: Gbn,
    mut sub: S,
    mut from_app: mpsc::Receiver<String>,
    to_app: mpsc::Sender<String>,
    cancel: CancellationToken,
) where
    S: Substrate<RdtPacket>,
{
    let mut inbox: VecDeque<String> = VecDeque::new();
    let mut outbox: VecDeque<String> = VecDeque::new();

    log::info!("gbn: endpoint running");
    loop {
        // quit only once the in-flight window has drained
        if cancel.is_cancelled() && gbn.window_empty() && inbox.is_empty() {
            break;
        }

        if inbox.is_empty() {
            if let Ok(line) = from_app.try_recv() {
                inbox.push_back(line);
            }
        }

        let did_work = gbn.tick(Instant::now(), &mut sub, &mut inbox, &mut outbox);

        while let Some(line) = outbox.pop_front() {
            if let Err(err) = to_app.send(line).await {
                log::debug!("gbn: application receiver gone: {err}");
                return;
            }
        }

        if did_work {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    let stats = gbn.stats();
    log::info!(
        "gbn: stopped; sent {} (re {} fast {}), delivered {}",
        stats.sent,
        stats.retransmits,
        stats.fast_retransmits,
        stats.delivered,
    );
}
