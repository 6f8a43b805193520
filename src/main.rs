mod codec;
mod config;
mod engine;
mod error;
mod hid;
mod mapping;
mod status;
mod xplane;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::codec::PanelOutputImage;
use crate::config::BridgeConfig;
use crate::engine::{Engine, EngineEvent};
use crate::status::{ControlCmd, StatusEvent, StatusSender};
use crate::xplane::{LinkCmd, LinkConfig};

#[derive(Parser)]
#[command(
    name = "winwing-fcu-bridge",
    version,
    about = "Bridges a WinWing FCU/EFIS panel to X-Plane"
)]
struct Args {
    /// TOML config file; defaults to ./fcu-bridge.toml when present
    #[arg(short, long)]
    config: Option<PathBuf>,
}

/// Minimal status-stream consumer: forwards the one-way adapter feed into the
/// process log. A GUI would subscribe here instead.
fn status_logger(rx: Receiver<StatusEvent>, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Relaxed) {
        match rx.recv_timeout(Duration::from_millis(200)) {
            Ok(StatusEvent::Connection(state)) => info!(?state, "bridge state"),
            Ok(StatusEvent::Log(line)) => debug!("{line}"),
            Ok(StatusEvent::Image(_)) => {}
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = BridgeConfig::load(args.config.as_deref())?;
    let remote = cfg.remote_addr()?;
    info!(
        "bridging WinWing panel to X-Plane at {remote} (local port {})",
        cfg.xplane.local_port
    );

    let stop = Arc::new(AtomicBool::new(false));
    let (engine_tx, engine_rx) = bounded::<EngineEvent>(256);
    let (link_tx, link_rx) = bounded::<LinkCmd>(64);
    let (image_tx, image_rx) = bounded::<PanelOutputImage>(1);
    let (status_tx, status_rx) = StatusSender::channel(256);

    {
        let stop = stop.clone();
        let tx = engine_tx.clone();
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::Relaxed);
            let _ = tx.try_send(EngineEvent::Control(ControlCmd::Shutdown));
        })
        .context("installing Ctrl-C handler")?;
    }

    let hid_handle = {
        let cfg = cfg.device.clone();
        let tx = engine_tx.clone();
        let rx = engine_rx.clone();
        let images = image_rx.clone();
        let stop = stop.clone();
        thread::spawn(move || hid::hid_worker(cfg, tx, rx, images, stop))
    };

    let link_handle = {
        let link_cfg = LinkConfig {
            remote,
            local_port: cfg.xplane.local_port,
            poll_timeout: cfg.poll_timeout(),
            keepalive: cfg.keepalive(),
        };
        let tx = engine_tx.clone();
        let stop = stop.clone();
        thread::spawn(move || {
            xplane::link_worker(link_cfg, mapping::SUBSCRIPTIONS, tx, link_rx, stop)
        })
    };

    let status_handle = {
        let stop = stop.clone();
        thread::spawn(move || status_logger(status_rx, stop))
    };

    // the engine owns the main thread until shutdown
    let mut engine = Engine::new(
        cfg,
        engine_rx,
        link_tx,
        image_tx,
        image_rx,
        status_tx,
        stop.clone(),
    );
    engine.run();

    stop.store(true, Ordering::Relaxed);
    drop(engine);
    let _ = hid_handle.join();
    let _ = link_handle.join();
    let _ = status_handle.join();
    info!("bridge stopped");
    Ok(())
}
