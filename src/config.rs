//! Firmware configuration

use bytes::Bytes;
use std::time::Duration;

use crate::net::broker::BrokerConfig;

/// Knobs for the whole firmware image. There is no CLI surface; deployments
/// bake a config in at the call site.
#[derive(Debug, Clone)]
pub struct FirmwareConfig {
    /// Device ID for this unit
    pub device_id: String,
    /// Broker link configuration (also used by the station bring-up probe)
    pub broker: BrokerConfig,
    /// Topic carrying inbound code payloads
    pub topic_code: String,
    /// Topic for the outbound liveness ping
    pub topic_ping: String,
    /// Fixed payload published as the liveness ping
    pub ping_payload: Bytes,
    /// Interval between liveness pings
    pub ping_interval: Duration,
    /// Code mailbox capacity in bytes; payloads must be strictly smaller
    pub mailbox_capacity: usize,
    /// Number of addressable output pins
    pub pin_count: u8,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            device_id: "pinscript-001".into(),
            broker: BrokerConfig::default(),
            topic_code: "0/pinscript/code/run".into(),
            topic_ping: "0/pinscript/ping".into(),
            ping_payload: Bytes::from_static(b"PING"),
            ping_interval: Duration::from_secs(1),
            mailbox_capacity: 1024,
            pin_count: 40,
        }
    }
}
