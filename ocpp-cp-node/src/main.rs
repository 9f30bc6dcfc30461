//! OCPP 1.6 charge point node
//!
//! Runs the message engine against a central system over WebSocket.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults
//! ocpp-cp-node --station CP-001
//!
//! # Connect to a specific central system
//! ocpp-cp-node --station CP-001 \
//!     --csms-url ws://localhost:8180/steve/websocket/CentralSystemService
//!
//! # Tighter retry policy
//! ocpp-cp-node --station CP-001 --timeout 5 --retries 2
//! ```

mod handler;
mod session;
mod ws;

use std::time::Duration;

use clap::Parser;
use ocpp_core::{
    Engine, EngineConfig, EventKind, Message, MessageQueue, MessageRole, StepReport,
    SystemClock,
};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ws::LinkConfig;

/// OCPP 1.6 charge point
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Charge point identity
    #[arg(short, long, default_value = "CP-001")]
    station: String,

    /// Central system WebSocket URL
    #[arg(long, default_value = "ws://localhost:8180/steve/websocket/CentralSystemService")]
    csms_url: String,

    /// Vendor name
    #[arg(long, default_value = "Elektrokombinacija")]
    vendor: String,

    /// Model name
    #[arg(long, default_value = "EK3-OCPP")]
    model: String,

    /// Serial number
    #[arg(long)]
    serial: Option<String>,

    /// Firmware version
    #[arg(long)]
    firmware: Option<String>,

    /// Message pool capacity
    #[arg(long, default_value = "8")]
    capacity: usize,

    /// Response timeout in seconds
    #[arg(long, default_value = "10")]
    timeout: u64,

    /// Send attempts for ordinary messages
    #[arg(long, default_value = "3")]
    retries: u32,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BootNotificationReq {
    charge_point_vendor: String,
    charge_point_model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    charge_point_serial_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    firmware_version: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Setup logging
    let level = match args.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    if std::env::var_os("RUST_LOG").is_some() {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_thread_ids(false)
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    info!("Charge point {} -> {}", args.station, args.csms_url);

    let boot = serde_json::to_vec(&BootNotificationReq {
        charge_point_vendor: args.vendor.clone(),
        charge_point_model: args.model.clone(),
        charge_point_serial_number: args.serial.clone(),
        firmware_version: args.firmware.clone(),
    })?;

    let (transport, mut link_events) = ws::spawn(LinkConfig {
        csms_url: args.csms_url.clone(),
        station_id: args.station.clone(),
        ..Default::default()
    });

    // Requests from the central system are answered outside the callback
    let (requests_tx, mut requests_rx) = mpsc::unbounded_channel::<Message>();
    let on_event = move |kind: EventKind, message: &Message, queue: &MessageQueue| match kind {
        EventKind::Incoming if message.role == MessageRole::Call => {
            let _ = requests_tx.send(message.clone());
        }
        EventKind::Incoming => {
            debug!("{} for {} {}", message.role, message.message_type, message.id)
        }
        EventKind::Outgoing => debug!("Sent {} {}", message.message_type, message.id),
        EventKind::Free => debug!(
            "Released {} {} ({} live)",
            message.message_type,
            message.id,
            queue.len().saturating_sub(1)
        ),
    };

    let config = EngineConfig::default()
        .with_capacity(args.capacity)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_retry_limit(args.retries);
    let mut engine = Engine::builder(transport, SystemClock, on_event)
        .config(config)
        .build();
    let configuration = engine.configuration().clone();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut shutdown => {
                info!("Shutting down with {} messages pending", engine.count_pending());
                break;
            }
        }

        while let Ok(event) = link_events.try_recv() {
            session::on_link_event(&mut engine, event, &boot);
        }

        let report = engine.step();
        if report != StepReport::default() {
            debug!(?report, "step");
        }

        while let Ok(request) = requests_rx.try_recv() {
            let answer = handler::answer(&request, &mut configuration.write());
            if let Err(e) = engine.push_response(&request, answer.payload, answer.is_error) {
                warn!(
                    "Could not answer {} {}: {}",
                    request.message_type, request.id, e
                );
            }
        }
    }

    Ok(())
}
