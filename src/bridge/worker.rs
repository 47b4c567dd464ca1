//! Background serial ingestion worker.
//!
//! ```text
//! Idle -> ResolvingPort -> Connecting -> Connected
//!              ^                             |
//!              +--- (retry delay) <- Disconnected
//! ```
//!
//! Stop requests are checked at every iteration boundary, between reads and
//! while sleeping, so shutdown latency is bounded by the read timeout.
//! Status transitions go to the event queue only; tag reads are appended to
//! the audit log and then published.

use anyhow::{anyhow, bail, Context, Result};
use std::fmt;
use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audit::AuditLog;
use crate::bridge::events::{BridgeEvent, BridgeEventQueue, BridgeStatus};
use crate::bridge::port::{resolve_port, SerialBackend, SerialCapability};
use crate::bridge::protocol::{classify, decode_line, Line, LineBuffer, TagRead};

const WORKER_THREAD_NAME: &str = "rfid-serial-bridge";
const STOP_POLL: Duration = Duration::from_millis(10);
const READ_CHUNK: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Explicit device path; empty means auto-scan (if enabled).
    pub port: String,
    pub baud_rate: u32,
    pub auto_scan: bool,
    pub read_timeout: Duration,
    /// Fixed delay after a disconnect or failed port resolution.
    pub retry_delay: Duration,
    /// Upper bound on how long `stop` waits for the worker.
    pub join_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            port: String::new(),
            baud_rate: 115_200,
            auto_scan: true,
            read_timeout: Duration::from_millis(500),
            retry_delay: Duration::from_secs(2),
            join_timeout: Duration::from_secs(2),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeState {
    Idle,
    ResolvingPort,
    Connecting,
    Connected,
    Disconnected,
    /// Serial access unavailable; the bridge will not run again.
    Disabled,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BridgeState::Idle => "idle",
            BridgeState::ResolvingPort => "resolving port",
            BridgeState::Connecting => "connecting",
            BridgeState::Connected => "connected",
            BridgeState::Disconnected => "disconnected",
            BridgeState::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

/// Owns the ingestion worker thread. At most one worker, and therefore at
/// most one open device, exists per bridge.
pub struct SerialBridge {
    config: BridgeConfig,
    audit: AuditLog,
    capability: SerialCapability,
    queue: BridgeEventQueue,
    state: Arc<Mutex<BridgeState>>,
    shutdown: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl SerialBridge {
    pub fn new(config: BridgeConfig, audit: AuditLog, capability: SerialCapability) -> Self {
        Self {
            config,
            audit,
            capability,
            queue: BridgeEventQueue::new(),
            state: Arc::new(Mutex::new(BridgeState::Idle)),
            shutdown: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Consumer handle onto the event stream.
    pub fn events(&self) -> BridgeEventQueue {
        self.queue.clone()
    }

    /// Everything published since the last drain, in order. Never blocks.
    pub fn drain_events(&self) -> Vec<BridgeEvent> {
        self.queue.drain()
    }

    pub fn state(&self) -> BridgeState {
        read_state(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawns the worker. No-op while a worker is alive or after serial
    /// access was found to be unavailable.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        if self.state() == BridgeState::Disabled {
            log::debug!("serial bridge disabled, not restarting");
            return Ok(());
        }
        if let Some(finished) = self.worker.take() {
            finished
                .join()
                .map_err(|_| anyhow!("serial bridge thread panicked"))?;
        }

        self.shutdown.store(false, Ordering::SeqCst);
        let worker = Worker {
            config: self.config.clone(),
            audit: self.audit.clone(),
            capability: self.capability.clone(),
            queue: self.queue.clone(),
            state: self.state.clone(),
            shutdown: self.shutdown.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_string())
            .spawn(move || worker.run())
            .context("failed to spawn serial bridge thread")?;
        self.worker = Some(handle);
        Ok(())
    }

    /// Requests cooperative shutdown and waits up to the join timeout.
    ///
    /// Returns `true` once the worker has exited (or none was running). On
    /// timeout the worker keeps its handle, so a later `start` stays a no-op
    /// until it has exited.
    pub fn stop(&mut self) -> Result<bool> {
        self.shutdown.store(true, Ordering::SeqCst);
        let Some(handle) = self.worker.take() else {
            return Ok(true);
        };

        let deadline = Instant::now() + self.config.join_timeout;
        while !handle.is_finished() {
            if Instant::now() >= deadline {
                log::warn!(
                    "serial bridge did not stop within {:?}",
                    self.config.join_timeout
                );
                self.worker = Some(handle);
                return Ok(false);
            }
            std::thread::sleep(STOP_POLL);
        }
        handle
            .join()
            .map_err(|_| anyhow!("serial bridge thread panicked"))?;
        Ok(true)
    }
}

impl Drop for SerialBridge {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            log::warn!("serial bridge shutdown: {:#}", err);
        }
    }
}

fn read_state(state: &Mutex<BridgeState>) -> BridgeState {
    match state.lock() {
        Ok(guard) => *guard,
        Err(poisoned) => *poisoned.into_inner(),
    }
}

struct Worker {
    config: BridgeConfig,
    audit: AuditLog,
    capability: SerialCapability,
    queue: BridgeEventQueue,
    state: Arc<Mutex<BridgeState>>,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    fn run(self) {
        let backend = match &self.capability {
            SerialCapability::Available(backend) => backend.clone(),
            SerialCapability::Unavailable(reason) => {
                log::error!("serial bridge disabled: {}", reason);
                self.set_state(BridgeState::Disabled);
                self.publish(BridgeStatus::CapabilityUnavailable {
                    reason: reason.clone(),
                });
                return;
            }
        };
        log::info!("serial bridge started (backend={})", backend.name());

        while !self.stopping() {
            self.set_state(BridgeState::ResolvingPort);
            let Some(port) =
                resolve_port(&self.config.port, self.config.auto_scan, backend.as_ref())
            else {
                log::warn!(
                    "serial port not found, retrying in {:?}",
                    self.config.retry_delay
                );
                self.publish(BridgeStatus::PortNotFound);
                self.pause(self.config.retry_delay);
                continue;
            };

            self.set_state(BridgeState::Connecting);
            log::info!("connecting {} @ {} baud", port, self.config.baud_rate);
            self.publish(BridgeStatus::Connecting { port: port.clone() });

            if let Err(err) = self.session(backend.as_ref(), &port) {
                let reason = format!("{:#}", err);
                log::warn!(
                    "serial {} disconnected: {}; retrying in {:?}",
                    port,
                    reason,
                    self.config.retry_delay
                );
                self.set_state(BridgeState::Disconnected);
                self.publish(BridgeStatus::Disconnected { port, reason });
                self.pause(self.config.retry_delay);
            }
        }

        self.set_state(BridgeState::Idle);
        log::info!("serial bridge stopped");
    }

    /// One device session. `Ok` means a stop was requested; the handle is
    /// closed on return either way.
    fn session(&self, backend: &dyn SerialBackend, port: &str) -> Result<()> {
        let mut device = backend.open(port, self.config.baud_rate, self.config.read_timeout)?;
        self.set_state(BridgeState::Connected);
        log::info!("connected {}", port);
        self.publish(BridgeStatus::Connected {
            port: port.to_string(),
        });

        let mut lines = LineBuffer::new();
        let mut buf = [0u8; READ_CHUNK];
        while !self.stopping() {
            match device.read(&mut buf) {
                Ok(0) => bail!("device closed the stream"),
                Ok(n) => {
                    lines.extend(&buf[..n]);
                    while let Some(raw) = lines.next_line() {
                        self.handle_line(port, &raw);
                    }
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) =>
                {
                    continue
                }
                Err(err) => return Err(err).context("read failed"),
            }
        }
        Ok(())
    }

    fn handle_line(&self, port: &str, raw: &[u8]) {
        let line = decode_line(raw);
        if line.is_empty() {
            return;
        }
        match classify(&line) {
            Some(Line::Ready) => {
                log::info!("device ready on {}", port);
                self.publish(BridgeStatus::DeviceReady {
                    port: port.to_string(),
                });
            }
            Some(Line::Tag(read)) => self.record(port, read),
            None => log::debug!("dropping unparseable line from {}: {:?}", port, line),
        }
    }

    fn record(&self, port: &str, read: TagRead) {
        let note = format!("serial:{}", port);
        if let Err(err) = self.audit.append(read.event, &read.tag_id, &note) {
            log::error!(
                "audit append failed for {} {}: {:#}",
                read.event,
                read.tag_id,
                err
            );
        }
        log::info!("{} {} via {}", read.event, read.tag_id, port);
        self.queue.push(BridgeEvent::rfid(read.event, &read.tag_id, port));
    }

    fn publish(&self, status: BridgeStatus) {
        self.queue.push(BridgeEvent::status(status));
    }

    fn set_state(&self, next: BridgeState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Sleeps up to `delay`, waking early on a stop request.
    fn pause(&self, delay: Duration) {
        let deadline = Instant::now() + delay;
        while !self.stopping() {
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(STOP_POLL.min(deadline - now));
        }
    }
}
