//! Bridge events and the queue that carries them from the ingestion worker
//! to consumers.

use std::fmt;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};

use crate::audit::TagEvent;

/// Status transitions published by the bridge worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BridgeStatus {
    Connecting { port: String },
    Connected { port: String },
    DeviceReady { port: String },
    Disconnected { port: String, reason: String },
    PortNotFound,
    /// Serial access is not available in this process. Ingestion is
    /// permanently disabled; never retried.
    CapabilityUnavailable { reason: String },
}

impl BridgeStatus {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeStatus::CapabilityUnavailable { .. })
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeStatus::Connecting { port } => write!(f, "connecting {}", port),
            BridgeStatus::Connected { port } => write!(f, "connected {}", port),
            BridgeStatus::DeviceReady { port } => write!(f, "device ready {}", port),
            BridgeStatus::Disconnected { reason, .. } => write!(f, "disconnected ({})", reason),
            BridgeStatus::PortNotFound => f.write_str("serial port not found"),
            BridgeStatus::CapabilityUnavailable { reason } => {
                write!(f, "serial support unavailable: {}", reason)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BridgeEventKind {
    Status,
    RfidEvent,
}

/// One notification from the bridge: a status transition or a tag read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeEvent {
    pub kind: BridgeEventKind,
    /// Human-readable text for the status display.
    pub message: String,
    /// Set for `RfidEvent`.
    pub event: Option<TagEvent>,
    /// Set for `RfidEvent`; uppercase.
    pub tag_id: Option<String>,
    /// Set for `Status`.
    pub status: Option<BridgeStatus>,
}

impl BridgeEvent {
    pub fn status(status: BridgeStatus) -> Self {
        Self {
            kind: BridgeEventKind::Status,
            message: status.to_string(),
            event: None,
            tag_id: None,
            status: Some(status),
        }
    }

    pub fn rfid(event: TagEvent, tag_id: &str, port: &str) -> Self {
        Self {
            kind: BridgeEventKind::RfidEvent,
            message: format!("{}: {} {}", port, event, tag_id),
            event: Some(event),
            tag_id: Some(tag_id.to_string()),
            status: None,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.status.as_ref().is_some_and(BridgeStatus::is_fatal)
    }
}

/// Unbounded FIFO between the ingestion worker and its consumers.
///
/// Pushing never blocks and never drops. `drain` is non-blocking and returns
/// everything queued so far in emission order; concurrent drainers each get a
/// contiguous, ordered slice of the stream.
#[derive(Clone)]
pub struct BridgeEventQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    tx: Sender<BridgeEvent>,
    rx: Mutex<Receiver<BridgeEvent>>,
}

impl BridgeEventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            inner: Arc::new(QueueInner {
                tx,
                rx: Mutex::new(rx),
            }),
        }
    }

    pub fn push(&self, event: BridgeEvent) {
        let _ = self.inner.tx.send(event);
    }

    pub fn drain(&self) -> Vec<BridgeEvent> {
        let rx = match self.inner.rx.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rx.try_iter().collect()
    }
}

impl Default for BridgeEventQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer-side view of the bridge for the status display: the latest
/// status and the most recent tag read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BridgeMonitor {
    status: Option<BridgeStatus>,
    last_read: Option<String>,
    reads: u64,
}

impl BridgeMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one drained event in. Returns `true` when the status changed.
    pub fn observe(&mut self, event: &BridgeEvent) -> bool {
        match (&event.kind, &event.status) {
            (BridgeEventKind::Status, Some(status)) => {
                if self.status.as_ref() == Some(status) {
                    return false;
                }
                self.status = Some(status.clone());
                true
            }
            (BridgeEventKind::RfidEvent, _) => {
                self.reads += 1;
                self.last_read = Some(event.message.clone());
                false
            }
            _ => false,
        }
    }

    pub fn status(&self) -> Option<&BridgeStatus> {
        self.status.as_ref()
    }

    /// Text of the latest status, or `idle` before the first one.
    pub fn status_text(&self) -> String {
        self.status
            .as_ref()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "idle".to_string())
    }

    pub fn is_fatal(&self) -> bool {
        self.status.as_ref().is_some_and(BridgeStatus::is_fatal)
    }

    pub fn last_read(&self) -> Option<&str> {
        self.last_read.as_deref()
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn drain_on_empty_queue_returns_nothing() {
        assert!(BridgeEventQueue::new().drain().is_empty());
    }

    #[test]
    fn drain_preserves_emission_order() {
        let queue = BridgeEventQueue::new();
        for port in ["e1", "e2", "e3"] {
            queue.push(BridgeEvent::status(BridgeStatus::Connecting {
                port: port.to_string(),
            }));
        }
        let messages: Vec<_> = queue.drain().into_iter().map(|e| e.message).collect();
        assert_eq!(messages, vec!["connecting e1", "connecting e2", "connecting e3"]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn concurrent_burst_loses_nothing_and_keeps_order() {
        let queue = BridgeEventQueue::new();
        let producer = {
            let queue = queue.clone();
            thread::spawn(move || {
                for i in 0..5_000 {
                    queue.push(BridgeEvent::rfid(TagEvent::Ingress, &format!("T{}", i), "p"));
                }
            })
        };

        let mut seen = Vec::new();
        while seen.len() < 5_000 {
            seen.extend(queue.drain());
            thread::yield_now();
        }
        producer.join().expect("producer thread");
        seen.extend(queue.drain());

        assert_eq!(seen.len(), 5_000);
        for (i, ev) in seen.iter().enumerate() {
            assert_eq!(ev.tag_id.as_deref(), Some(format!("T{}", i).as_str()));
        }
    }

    #[test]
    fn monitor_tracks_latest_status_and_reads() {
        let mut view = BridgeMonitor::new();
        assert_eq!(view.status_text(), "idle");

        let connected = BridgeEvent::status(BridgeStatus::Connected {
            port: "/dev/ttyUSB0".into(),
        });
        assert!(view.observe(&connected));
        assert!(!view.observe(&connected));
        assert!(!view.observe(&BridgeEvent::rfid(TagEvent::Ingress, "AB12", "/dev/ttyUSB0")));
        assert_eq!(view.status_text(), "connected /dev/ttyUSB0");
        assert_eq!(view.last_read(), Some("/dev/ttyUSB0: ingress AB12"));
        assert_eq!(view.reads(), 1);
        assert!(!view.is_fatal());

        assert!(view.observe(&BridgeEvent::status(BridgeStatus::Disconnected {
            port: "/dev/ttyUSB0".into(),
            reason: "read failed: unplugged".into(),
        })));
        assert_eq!(view.status_text(), "disconnected (read failed: unplugged)");

        assert!(view.observe(&BridgeEvent::status(BridgeStatus::CapabilityUnavailable {
            reason: "no driver".into(),
        })));
        assert!(view.is_fatal());
    }

    #[test]
    fn only_capability_loss_is_fatal() {
        assert!(BridgeEvent::status(BridgeStatus::CapabilityUnavailable {
            reason: "no driver".into()
        })
        .is_fatal());
        assert!(!BridgeEvent::status(BridgeStatus::Disconnected {
            port: "p".into(),
            reason: "unplugged".into()
        })
        .is_fatal());
        assert!(!BridgeEvent::rfid(TagEvent::Egress, "AB12", "p").is_fatal());
    }

    #[test]
    fn rfid_event_message_names_the_port() {
        let ev = BridgeEvent::rfid(TagEvent::Egress, "AB12", "/dev/ttyACM0");
        assert_eq!(ev.message, "/dev/ttyACM0: egress AB12");
        assert_eq!(ev.kind, BridgeEventKind::RfidEvent);
    }
}
