//! Monitor feed: periodic polling and a TCP line server
//!
//! Every connected client receives one feed line per monitor tick until it
//! disconnects or the server shuts down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::agent::{JoinOutcome, Lifecycle, StopSignal};
use crate::casino::Casino;
use crate::core::error::Result;
use crate::monitor::FloorSnapshot;

/// Capture a snapshot every `every` and hand it to `sink` until stopped
pub async fn poll_feed<F>(casino: Arc<Casino>, every: Duration, mut stop: StopSignal, mut sink: F)
where
    F: FnMut(&FloorSnapshot),
{
    loop {
        sink(&FloorSnapshot::capture(&casino));
        if stop.sleep(every).await.is_err() {
            break;
        }
    }
}

#[derive(Debug)]
pub struct FeedServer {
    addr: SocketAddr,
    lifecycle: Lifecycle,
}

impl FeedServer {
    /// Listen on `port` (0 picks a free one) and start serving the feed
    pub async fn bind(casino: Arc<Casino>, port: u16) -> Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let addr = listener.local_addr()?;
        info!(%addr, "Monitor feed listening");

        let lifecycle = Lifecycle::new();
        let every = casino.config().timings.monitor();
        let stop = lifecycle.stop_signal();
        lifecycle.spawn(accept_loop(listener, casino, every, stop));
        Ok(Self { addr, lifecycle })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and disconnect every client
    pub async fn shutdown(&self) -> JoinOutcome {
        self.lifecycle.request_stop();
        self.lifecycle.join(Some(Duration::from_secs(1))).await
    }
}

async fn accept_loop(listener: TcpListener, casino: Arc<Casino>, every: Duration, mut stop: StopSignal) {
    let mut clients = tokio::task::JoinSet::new();
    loop {
        let accepted = tokio::select! {
            accepted = listener.accept() => accepted,
            _ = stop.stopped() => break,
        };
        match accepted {
            Ok((stream, peer)) => {
                debug!(%peer, "Monitor client connected");
                clients.spawn(serve_client(stream, Arc::clone(&casino), every, stop.clone()));
            }
            Err(err) => warn!(error = %err, "Failed to accept monitor client"),
        }
    }
    while clients.join_next().await.is_some() {}
}

async fn serve_client(mut stream: TcpStream, casino: Arc<Casino>, every: Duration, mut stop: StopSignal) {
    loop {
        let mut line = FloorSnapshot::capture(&casino).feed_line();
        line.push('\n');
        if let Err(err) = stream.write_all(line.as_bytes()).await {
            debug!(error = %err, "Monitor client went away");
            return;
        }
        if stop.sleep(every).await.is_err() {
            break;
        }
    }
    let _ = stream.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::CasinoConfig;
    use tokio::io::{AsyncBufReadExt, BufReader};

    fn casino() -> Arc<Casino> {
        Arc::new(
            Casino::new(CasinoConfig {
                players: 3,
                cashiers: 1,
                ..Default::default()
            })
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_client_receives_feed_lines() {
        let server = FeedServer::bind(casino(), 0).await.unwrap();
        let port = server.local_addr().port();

        let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut lines = BufReader::new(stream).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line.matches("Player: ").count(), 3);
        assert!(line.contains("State: ENTERING"));

        assert_eq!(server.shutdown().await, JoinOutcome::Finished);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_feed_until_stopped() {
        let lifecycle = Lifecycle::new();
        let stop = lifecycle.stop_signal();
        let mut seen = 0;
        let poller = poll_feed(casino(), Duration::from_millis(100), stop, |snapshot| {
            assert_eq!(snapshot.players.len(), 3);
            seen += 1;
            if seen == 3 {
                lifecycle.request_stop();
            }
        });
        poller.await;
        assert_eq!(seen, 3);
    }
}
