//! Depot yard monitor.
//!
//! Watches a loading yard through one camera and a serial RFID reader:
//!
//! - `zones`: named rectangular regions of the frame (truck spaces and
//!   warning triggers), persisted as JSON.
//! - `detect`: the detector collaborator seam plus the pure zone classifier
//!   that turns detections into free / occupied / warning states.
//! - `monitor`: rate-limited detection and per-tick evaluation.
//! - `audit`: append-only CSV log of ingress/egress tag reads.
//! - `bridge`: background serial worker feeding the audit log and an event
//!   queue the foreground drains.
//! - `config`: JSON file plus environment configuration.

pub mod audit;
pub mod bridge;
pub mod config;
pub mod detect;
pub mod frame;
pub mod geometry;
pub mod monitor;
pub mod zones;

pub use audit::{AuditLog, AuditRecord, TagEvent};
pub use bridge::{
    BridgeConfig, BridgeEvent, BridgeEventKind, BridgeEventQueue, BridgeState, BridgeStatus,
    SerialBridge, SerialCapability,
};
pub use config::DepotConfig;
pub use detect::{evaluate, Detection, Evaluation, ZoneState};
pub use frame::{Frame, FrameSource};
pub use geometry::{BoundingBox, FrameSize, Point};
pub use monitor::{Monitor, MonitorSettings, MonitorStatus};
pub use zones::{Zone, ZoneMap, ZoneRole};
