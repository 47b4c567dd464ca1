//! Serial RFID ingestion bridge.
//!
//! A background worker owns the reader's serial port, turns each
//! `EVENT,TAG` line into an audit record and publishes status and tag events
//! on a queue the foreground drains without blocking.

pub mod events;
pub mod port;
pub mod protocol;
mod worker;

pub use events::{BridgeEvent, BridgeEventKind, BridgeEventQueue, BridgeMonitor, BridgeStatus};
pub use port::{
    resolve_port, select_port, PortInfo, ReplaySerial, SerialBackend, SerialCapability,
    SerialStream, KNOWN_HARDWARE,
};
pub use protocol::{parse_line, TagRead, READY_MARKER};
pub use worker::{BridgeConfig, BridgeState, SerialBridge};
