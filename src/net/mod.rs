//! Remote launch: seven parameter bytes in, one casino run out
//!
//! Wire format, one unsigned byte each, in this order:
//! players, cashiers, slot machines, croupiers, table capacity, monitor port
//! offset, run duration in minutes.
//!
//! On accepting a connection the server first sends a greeting as a
//! length-prefixed UTF-8 string (big-endian `u16` length, then the bytes).

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::casino::Casino;
use crate::core::config::CasinoConfig;
use crate::core::error::{CasinoError, Result};
use crate::monitor::FeedServer;

pub const PARAM_BYTES: usize = 7;

pub const GREETING: &str = "I can help you with the task assigned by Principal Server.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CasinoParams {
    pub players: u8,
    pub cashiers: u8,
    pub slot_machines: u8,
    pub croupiers: u8,
    pub table_capacity: u8,
    pub monitor_port_offset: u8,
    pub duration_minutes: u8,
}

impl CasinoParams {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let Some(b) = bytes.get(..PARAM_BYTES) else {
            return Err(CasinoError::TruncatedParams {
                expected: PARAM_BYTES,
                got: bytes.len(),
            });
        };
        Ok(Self {
            players: b[0],
            cashiers: b[1],
            slot_machines: b[2],
            croupiers: b[3],
            table_capacity: b[4],
            monitor_port_offset: b[5],
            duration_minutes: b[6],
        })
    }

    pub fn to_bytes(&self) -> [u8; PARAM_BYTES] {
        [
            self.players,
            self.cashiers,
            self.slot_machines,
            self.croupiers,
            self.table_capacity,
            self.monitor_port_offset,
            self.duration_minutes,
        ]
    }

    /// Read exactly seven bytes from `reader`. A stream that ends early is
    /// reported with the number of bytes that did arrive.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self> {
        let mut buf = Vec::with_capacity(PARAM_BYTES);
        reader.take(PARAM_BYTES as u64).read_to_end(&mut buf).await?;
        Self::from_bytes(&buf)
    }

    pub fn run_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_minutes) * 60)
    }

    /// Overlay the received counts on `base`
    pub fn into_config(self, base: &CasinoConfig) -> CasinoConfig {
        CasinoConfig {
            players: self.players.into(),
            cashiers: self.cashiers.into(),
            slot_machines: self.slot_machines.into(),
            croupiers: self.croupiers.into(),
            table_capacity: self.table_capacity.into(),
            monitor_port_offset: self.monitor_port_offset.into(),
            ..base.clone()
        }
    }
}

/// Send a length-prefixed UTF-8 string
pub async fn write_greeting<W: AsyncWrite + Unpin>(writer: &mut W, text: &str) -> Result<()> {
    let bytes = text.as_bytes();
    let len = u16::try_from(bytes.len())
        .map_err(|_| CasinoError::InvalidConfig("greeting longer than 65535 bytes".into()))?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(bytes).await?;
    writer.flush().await?;
    Ok(())
}

/// Read a length-prefixed UTF-8 string
pub async fn read_greeting<R: AsyncRead + Unpin>(reader: &mut R) -> Result<String> {
    let len = reader.read_u16().await?;
    let mut bytes = vec![0u8; usize::from(len)];
    reader.read_exact(&mut bytes).await?;
    String::from_utf8(bytes)
        .map_err(|err| CasinoError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, err)))
}

/// Accept one connection on `listener`, run the casino it asks for, and
/// close it after the requested duration. `run_for` overrides the duration
/// carried on the wire.
pub async fn run_session(
    listener: TcpListener,
    base: &CasinoConfig,
    run_for: Option<Duration>,
) -> Result<CasinoParams> {
    let (mut stream, peer) = listener.accept().await?;
    info!(%peer, "Launch client connected");

    write_greeting(&mut stream, GREETING).await?;
    let params = CasinoParams::read_from(&mut stream).await?;
    info!(?params, "Received casino details");

    let config = params.into_config(base);
    let casino = Arc::new(Casino::new(config)?);
    casino.open()?;

    let feed = match FeedServer::bind(Arc::clone(&casino), casino.config().monitor_port()).await {
        Ok(feed) => Some(feed),
        Err(err) => {
            warn!(error = %err, "Monitor feed unavailable, running without it");
            None
        }
    };

    let duration = run_for.unwrap_or_else(|| params.run_duration());
    info!(seconds = duration.as_secs_f32(), "Simulating casino");
    tokio::time::sleep(duration).await;

    let report = casino.close().await;
    if let Some(feed) = feed {
        feed.shutdown().await;
    }
    if !report.is_clean() {
        warn!(?report, "Casino closed with agents cancelled or lost");
    }
    Ok(params)
}
