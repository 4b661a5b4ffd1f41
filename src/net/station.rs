//! Station link bring-up
//!
//! The network prerequisite every other task waits behind. `TcpStationLink`
//! probes the broker endpoint until a connect succeeds, with capped
//! exponential backoff; the orchestrator signals the startup gate once
//! `bring_up` resolves.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::net::broker::BrokerConfig;

/// Network bring-up seam
#[async_trait]
pub trait StationLink: Send + Sync {
    /// Resolve once the uplink is usable. Implementations retry internally;
    /// an error return is terminal for startup.
    async fn bring_up(&self) -> Result<()>;

    /// Human-readable name for this link
    fn name(&self) -> &'static str;
}

/// Probes the broker endpoint over TCP until it is reachable
pub struct TcpStationLink {
    address: String,
    connect_timeout: Duration,
    retry_delay: Duration,
    max_retry_delay: Duration,
}

impl TcpStationLink {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            address: config.address.clone(),
            connect_timeout: config.connect_timeout,
            retry_delay: config.reconnect_delay,
            max_retry_delay: config.max_reconnect_delay,
        }
    }
}

#[async_trait]
impl StationLink for TcpStationLink {
    async fn bring_up(&self) -> Result<()> {
        let mut delay = self.retry_delay;

        loop {
            match timeout(self.connect_timeout, TcpStream::connect(&self.address)).await {
                Ok(Ok(_probe)) => {
                    info!(address = %self.address, "station link up");
                    return Ok(());
                }
                Ok(Err(e)) => {
                    warn!("station probe failed: {}", e);
                }
                Err(_) => {
                    warn!("station probe timed out");
                }
            }

            sleep(delay).await;
            delay = std::cmp::min(delay * 2, self.max_retry_delay);
        }
    }

    fn name(&self) -> &'static str {
        "tcp-station"
    }
}
