mod config;
mod gpio;
mod net;
mod script;
mod sync;

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::runtime::Handle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::FirmwareConfig;
use gpio::SimulatedPins;
use net::{BrokerClient, BrokerEvent, Frame, InboundMessage, StationLink, TcpStationLink};
use script::{CapabilityTable, ScriptRuntime, ThreadSleeper};
use sync::{code_mailbox, readiness_gate, CodeWriter, ReadinessGate, ReadinessSignal};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = FirmwareConfig::default();

    info!("firmware starting: {}", config.device_id);
    info!("  broker: {}", config.broker.address);
    info!("  code topic: {}", config.topic_code);

    // Hardware and interpreter come up before any network activity; a
    // failure here aborts startup instead of running half-initialized.
    let pins = Arc::new(SimulatedPins::new(config.pin_count));
    let table = CapabilityTable::standard(pins, Arc::new(ThreadSleeper));
    let runtime =
        ScriptRuntime::new(table).context("script runtime construction failed")?;
    info!("capability table installed ({} pins)", config.pin_count);

    let (ready_signal, ready_gate) = readiness_gate();
    let (code_writer, code_reader) = code_mailbox(config.mailbox_capacity);
    info!("code mailbox ready ({} bytes)", code_writer.capacity());

    let station = TcpStationLink::new(&config.broker);
    tokio::spawn(station_task(station, ready_signal));

    let inbound = tokio::spawn(inbound_task(config.clone(), ready_gate, code_writer));

    // The interpreter loop is synchronous (evaluation and blink sleeps hold
    // the thread), so it gets a dedicated blocking thread with a runtime
    // handle for the mailbox wait.
    let handle = Handle::current();
    let script = tokio::task::spawn_blocking(move || runtime.run(code_reader, handle));

    // Both long-lived tasks run for the life of the device; either one
    // returning is a fault that should take the process down for a restart.
    tokio::select! {
        res = inbound => match res {
            Ok(Ok(())) => Err(anyhow!("inbound task exited unexpectedly")),
            Ok(Err(e)) => Err(e.context("inbound task failed")),
            Err(e) => Err(anyhow!(e).context("inbound task panicked")),
        },
        res = script => match res {
            Ok(()) => Err(anyhow!("script task exited unexpectedly")),
            Err(e) => Err(anyhow!(e).context("script task panicked")),
        },
    }
}

/// Bring up the network, then release everything parked behind the gate
async fn station_task(link: TcpStationLink, ready: ReadinessSignal) {
    if let Err(e) = link.bring_up().await {
        // Dropping the signal unparks the gate consumer with an error, which
        // aborts startup.
        error!("network bring-up failed: {:#}", e);
        return;
    }
    info!("network ready, signaling startup gate");
    ready.signal();
}

/// Wait for network readiness, then feed accepted code payloads into the
/// mailbox and keep the liveness ping flowing
async fn inbound_task(
    config: FirmwareConfig,
    gate: ReadinessGate,
    writer: CodeWriter,
) -> Result<()> {
    gate.await_and_consume()
        .await
        .context("network never became ready")?;
    info!("inbound task released by startup gate");

    let mut client = BrokerClient::new(config.broker.clone());

    // Liveness ping: observational only, nothing reads it back
    let ping_tx = client.get_sender();
    let topic_ping = config.topic_ping.clone();
    let ping_payload = config.ping_payload.clone();
    let ping_interval = config.ping_interval;
    tokio::spawn(async move {
        let mut ticker = interval(ping_interval);
        loop {
            ticker.tick().await;
            if ping_tx
                .send(Frame::new(&topic_ping, ping_payload.clone()))
                .await
                .is_err()
            {
                warn!("broker link closed, stopping liveness pings");
                break;
            }
            debug!("liveness ping queued");
        }
    });

    loop {
        match client.recv().await {
            Some(BrokerEvent::Connected) => {
                info!("broker connected, subscribing to {}", config.topic_code);
                client.subscribe(&config.topic_code).await?;
            }
            Some(BrokerEvent::Disconnected { reason }) => {
                warn!("broker disconnected: {}", reason);
            }
            Some(BrokerEvent::Message(msg)) => {
                handle_inbound(&config, &writer, msg);
            }
            None => {
                return Err(anyhow!("broker event channel closed"));
            }
        }
    }
}

/// Forward a code payload into the mailbox; everything else is noise
fn handle_inbound(config: &FirmwareConfig, writer: &CodeWriter, msg: InboundMessage) {
    if msg.topic != config.topic_code {
        debug!(topic = %msg.topic, "ignoring message on unrelated topic");
        return;
    }

    match writer.try_accept(&msg.payload) {
        Ok(()) => info!(bytes = msg.payload.len(), "accepted code payload"),
        // Fire-and-forget: the publisher is never notified of a rejection
        Err(e) => warn!("rejected code payload: {}", e),
    }
}
