//! Beacon node over UDP broadcast.
//!
//! ```text
//! beacon-node [CONFIG.toml]      run (configuration from file, else V2X_BEACON_* env)
//! beacon-node --example-config   print a default configuration
//! beacon-node --generate-key     print a fresh hex key
//! ```
//!
//! Own kinematics are read from stdin, one `lat lon speed heading` line per
//! update, typically piped in from the companion computer's GNSS reader. Until
//! the first line arrives the node beacons (0, 0, 0, 0). Validated records are
//! forwarded to the log under the `forward` target.
//!
//! With `node.nonce_file` set, the outgoing nonce counter survives restarts.
//! A block of nonces is reserved on disk before it is used, so even a crash
//! never repeats a nonce under the same key. Without it every start begins at
//! nonce 0, which is only safe with a freshly provisioned key.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use v2x_beacon::config::BeaconConfig;
use v2x_beacon::core::message::Kinematics;
use v2x_beacon::error::Result;
use v2x_beacon::protocol::security::{load_nonce_mark, save_nonce_mark};
use v2x_beacon::protocol::BeaconEngine;
use v2x_beacon::service::{BeaconService, SharedKinematics};
use v2x_beacon::transport::{InboundHandle, UdpBroadcastTransport};
use v2x_beacon::utils::crypto::AuthKey;
use v2x_beacon::utils::logging::init_logging;
use v2x_beacon::utils::metrics::Metrics;
use v2x_beacon::utils::time::SystemClock;

/// Nonces reserved on disk ahead of use (one hour at 10 Hz).
const NONCE_RESERVE: u32 = 36_000;

/// How often the reservation is checked against nonces actually issued.
const RESERVE_CHECK: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!(error = %e, "beacon-node failed");
        eprintln!("beacon-node: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let arg = std::env::args().nth(1);
    let config = match arg.as_deref() {
        Some("--example-config") => {
            println!("{}", BeaconConfig::example_config());
            return Ok(());
        }
        Some("--generate-key") => {
            println!("{}", AuthKey::generate()?.to_hex());
            return Ok(());
        }
        Some(path) => BeaconConfig::from_file(path)?,
        None => BeaconConfig::from_env()?,
    };

    init_logging(&config.logging)?;
    config.validate_strict()?;

    let key = config.node.auth_key()?;
    let nonce_file = config.node.nonce_file.as_ref().map(PathBuf::from);
    let first_nonce = match &nonce_file {
        Some(path) => {
            let mark = load_nonce_mark(path)?.unwrap_or(0);
            save_nonce_mark(path, mark.saturating_add(NONCE_RESERVE))?;
            mark
        }
        None => {
            warn!("No nonce_file configured - nonces restart at 0 on every start");
            0
        }
    };
    let engine = BeaconEngine::with_next_nonce(&config, key, first_nonce)?;

    engine.dispatcher().register_all(|record| {
        debug!(
            target: "forward",
            kind = ?record.kind,
            sender = %record.sender_id,
            nonce = record.nonce,
            latitude = record.latitude,
            longitude = record.longitude,
            speed = record.speed,
            heading = record.heading,
            emergency = record.is_emergency,
            "Record"
        );
        Ok(())
    })?;

    let (inbound, queue) =
        InboundHandle::channel(config.limits.inbound_queue, engine.metrics().clone());
    let transport = UdpBroadcastTransport::from_config(&config.transport).await?;
    let receiver = transport.spawn_receiver(inbound);

    let kinematics = SharedKinematics::default();
    let reader = spawn_kinematics_reader(kinematics.clone());
    let reserver = nonce_file
        .clone()
        .map(|path| spawn_nonce_reserver(path, first_nonce, engine.metrics().clone()));

    let service = BeaconService::new(engine, transport, kinematics, SystemClock, queue, &config);

    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            info!("Received CTRL+C signal, shutting down");
            let _ = shutdown_tx.send(()).await;
        }
    });

    let engine = service.run(shutdown_rx).await?;
    receiver.abort();
    reader.abort();
    if let Some(task) = reserver {
        task.abort();
    }

    if let Some(path) = &nonce_file {
        match engine.pending_nonce() {
            Some(next) => save_nonce_mark(path, next)?,
            // Leave the reservation in place; the key must be replaced anyway.
            None => warn!("Nonce range exhausted - provision a new key before restarting"),
        }
    }
    info!(neighbors = engine.neighbors().len(), "Beacon node stopped");
    Ok(())
}

fn spawn_kinematics_reader(shared: SharedKinematics) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<Kinematics>() {
                    Ok(kinematics) => shared.update(kinematics),
                    Err(e) => warn!(error = %e, "Ignoring kinematics line"),
                },
                Ok(None) => {
                    info!("Kinematics input closed - last position kept");
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Kinematics input failed");
                    break;
                }
            }
        }
    })
}

/// Keeps the on-disk mark at least half a reserve ahead of issued nonces.
fn spawn_nonce_reserver(path: PathBuf, first: u32, metrics: Arc<Metrics>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reserved = u64::from(first.saturating_add(NONCE_RESERVE));
        let mut tick = tokio::time::interval(RESERVE_CHECK);
        loop {
            tick.tick().await;
            let issued = u64::from(first) + metrics.snapshot().beacons_sent;
            if issued + u64::from(NONCE_RESERVE / 2) < reserved {
                continue;
            }
            let mark = u32::try_from(issued + u64::from(NONCE_RESERVE)).unwrap_or(u32::MAX);
            match save_nonce_mark(&path, mark) {
                Ok(()) => reserved = u64::from(mark),
                Err(e) => error!(error = %e, "Failed to extend nonce reservation"),
            }
        }
    })
}
