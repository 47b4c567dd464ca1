//! depotd - depot yard monitor daemon
//!
//! This daemon:
//! 1. Loads configuration, the zone map and the RFID audit log
//! 2. Starts the serial RFID bridge in the background
//! 3. Runs the monitoring loop: frame -> (rate-limited) detection -> zone state
//! 4. Drains bridge events every tick until Ctrl-C

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use depot_monitor::bridge::{BridgeEventKind, BridgeMonitor, SerialBridge, SerialCapability};
use depot_monitor::detect::{DetectorBackend, ReplayBackend};
use depot_monitor::{frame, zones, AuditLog, DepotConfig, Monitor};

#[derive(Parser, Debug)]
#[command(author, version, about = "Depot yard monitor: zone occupancy plus RFID gate log")]
struct Args {
    /// Monitoring loop period in milliseconds.
    #[arg(long, env = "DEPOT_TICK_MS", default_value_t = 100)]
    tick_ms: u64,

    /// JSON-lines detection script replayed in place of a live detector.
    #[arg(long, env = "DEPOT_DETECTIONS")]
    detections: Option<PathBuf>,

    /// Run without the serial RFID bridge.
    #[arg(long)]
    no_serial: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let config = DepotConfig::load()?;

    let zone_map = zones::load(&config.zones_path, config.frame_size())?;
    log::info!(
        "loaded {} zones from {}",
        zone_map.len(),
        config.zones_path.display()
    );
    let audit = AuditLog::open(&config.audit.path)?;

    let mut detector: Box<dyn DetectorBackend> = match &args.detections {
        Some(path) => Box::new(ReplayBackend::from_path(path, config.label_filter())?),
        None => Box::new(ReplayBackend::empty(config.label_filter())),
    };
    detector.warm_up()?;
    log::info!("detector backend: {}", detector.name());

    let mut source = frame::open_source(&config.camera_config())?;
    let mut monitor = Monitor::new(zone_map, detector, config.monitor_settings());

    let mut bridge = if args.no_serial {
        log::info!("serial bridge not started (--no-serial)");
        None
    } else {
        let mut bridge = SerialBridge::new(
            config.bridge_config(),
            audit.clone(),
            SerialCapability::detect(),
        );
        bridge.start()?;
        Some(bridge)
    };
    let mut serial = BridgeMonitor::new();

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .expect("error setting Ctrl-C handler");

    log::info!(
        "depotd running: {}, audit log {}",
        source.describe(),
        audit.path().display()
    );

    let tick = Duration::from_millis(args.tick_ms.max(1));
    let mut last_summary = String::new();
    let mut last_warnings = String::new();
    loop {
        monitor.step(source.as_mut(), Instant::now())?;

        let summary = monitor.occupancy_summary();
        if summary != last_summary {
            log::info!("zones: {}", summary);
            last_summary = summary;
        }
        let warnings = monitor.warning_summary();
        if warnings != last_warnings {
            log::info!("warnings: {}", warnings);
            last_warnings = warnings;
        }

        let events = bridge.as_ref().map(|b| b.drain_events()).unwrap_or_default();
        for event in events {
            let changed = serial.observe(&event);
            match event.kind {
                BridgeEventKind::RfidEvent => log::info!("rfid: {}", event.message),
                BridgeEventKind::Status if event.is_fatal() => {
                    log::error!("serial: {}", event.message)
                }
                BridgeEventKind::Status if changed => log::info!("serial: {}", event.message),
                BridgeEventKind::Status => {}
            }
        }

        match rx.recv_timeout(tick) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
    }

    log::info!(
        "shutdown signal received; serial status: {}, {} tag reads",
        serial.status_text(),
        serial.reads()
    );
    if let Some(mut bridge) = bridge.take() {
        if !bridge.stop()? {
            log::warn!("serial bridge still running at exit");
        }
    }
    Ok(())
}
