//! Pub/sub broker link with automatic reconnection
//!
//! Carries topic-tagged frames over a persistent TCP connection. The rest of
//! the firmware publishes through a channel and consumes `BrokerEvent`s;
//! framing, reconnection, and backoff all live here.

use anyhow::{anyhow, Result};
use bytes::Bytes;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};
use tracing::warn;

use crate::net::codec::{self, Frame, FrameDecoder};

/// Topic used to register interest in another topic with the broker
pub const TOPIC_SUBSCRIBE: &str = "$ctl/subscribe";

/// Topic used to announce this client after connecting
pub const TOPIC_HELLO: &str = "$ctl/hello";

/// Events emitted by the broker link
#[derive(Debug, Clone)]
pub enum BrokerEvent {
    /// Connection established; subscriptions must be (re)issued now
    Connected,
    /// Connection lost; the link is already reconnecting
    Disconnected { reason: String },
    /// A message arrived on a subscribed topic
    Message(InboundMessage),
}

/// An inbound payload with the topic it arrived on
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Bytes,
}

/// Configuration for the broker link
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Broker address
    pub address: String,
    /// Client identifier, announced in the hello frame after connecting
    pub client_id: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Reconnection delay (initial)
    pub reconnect_delay: Duration,
    /// Maximum reconnection delay
    pub max_reconnect_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:7883".into(),
            client_id: "pinscript-001".into(),
            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_reconnect_delay: Duration::from_secs(30),
        }
    }
}

/// Handle to the broker link
pub struct BrokerClient {
    outbound_tx: mpsc::Sender<Frame>,
    event_rx: mpsc::Receiver<BrokerEvent>,
}

impl BrokerClient {
    /// Create a broker client and start its connection loop
    pub fn new(config: BrokerConfig) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::channel::<Frame>(100);
        let (event_tx, event_rx) = mpsc::channel::<BrokerEvent>(100);

        tokio::spawn(async move {
            connection_loop(config, outbound_rx, event_tx).await;
        });

        Self {
            outbound_tx,
            event_rx,
        }
    }

    /// Register interest in `topic`. Must be re-issued after every
    /// `BrokerEvent::Connected`.
    pub async fn subscribe(&self, topic: &str) -> Result<()> {
        self.publish(TOPIC_SUBSCRIBE, Bytes::copy_from_slice(topic.as_bytes()))
            .await
    }

    /// Queue a payload for publication on `topic`
    pub async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        self.outbound_tx
            .send(Frame::new(topic, payload))
            .await
            .map_err(|_| anyhow!("broker link closed"))
    }

    /// Receive the next broker event
    pub async fn recv(&mut self) -> Option<BrokerEvent> {
        self.event_rx.recv().await
    }

    /// Get a clone of the sender for outbound frames
    pub fn get_sender(&self) -> mpsc::Sender<Frame> {
        self.outbound_tx.clone()
    }
}

/// Main connection loop with reconnection logic
async fn connection_loop(
    config: BrokerConfig,
    mut outbound_rx: mpsc::Receiver<Frame>,
    event_tx: mpsc::Sender<BrokerEvent>,
) {
    let mut reconnect_delay = config.reconnect_delay;

    loop {
        match timeout(config.connect_timeout, TcpStream::connect(&config.address)).await {
            Ok(Ok(stream)) => {
                reconnect_delay = config.reconnect_delay; // Reset delay

                let _ = event_tx.send(BrokerEvent::Connected).await;

                if let Err(reason) =
                    handle_connection(stream, &config, &mut outbound_rx, &event_tx).await
                {
                    let _ = event_tx
                        .send(BrokerEvent::Disconnected {
                            reason: reason.to_string(),
                        })
                        .await;
                }
            }
            Ok(Err(e)) => {
                warn!("broker connect failed: {}", e);
            }
            Err(_) => {
                warn!("broker connect timed out");
            }
        }

        sleep(reconnect_delay).await;

        // Exponential backoff
        reconnect_delay = std::cmp::min(reconnect_delay * 2, config.max_reconnect_delay);
    }
}

/// Handle an active connection
async fn handle_connection(
    stream: TcpStream,
    config: &BrokerConfig,
    outbound_rx: &mut mpsc::Receiver<Frame>,
    event_tx: &mpsc::Sender<BrokerEvent>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.into_split();

    // Announce ourselves before anything else flows
    let hello = Frame::new(
        TOPIC_HELLO,
        Bytes::copy_from_slice(config.client_id.as_bytes()),
    );
    writer.write_all(&codec::encode(&hello)?).await?;

    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            // Send outbound frames
            Some(frame) = outbound_rx.recv() => {
                let encoded = codec::encode(&frame)?;
                writer.write_all(&encoded).await?;
            }

            // Read incoming frames
            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        return Err(anyhow!("broker closed connection"));
                    }
                    Ok(n) => {
                        decoder.extend(&read_buf[..n]);

                        // Process all complete frames
                        while let Some(frame) = decoder.decode_next()? {
                            let _ = event_tx
                                .send(BrokerEvent::Message(InboundMessage {
                                    topic: frame.topic,
                                    payload: frame.payload,
                                }))
                                .await;
                        }
                    }
                    Err(e) => {
                        return Err(anyhow!("read error: {}", e));
                    }
                }
            }
        }
    }
}
