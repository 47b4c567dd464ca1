//! Serial port discovery and the serial access capability.
//!
//! The bridge never talks to a driver directly. It receives a
//! [`SerialCapability`] resolved once at startup: either a backend that can
//! enumerate and open ports, or the reason serial access is unavailable.

use anyhow::{anyhow, Result};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Descriptor fragments of common USB-serial adapters used by the reader.
pub const KNOWN_HARDWARE: &[&str] = &["arduino", "ch340", "usb serial", "cp210"];

/// An enumerated serial device.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PortInfo {
    pub device: String,
    pub description: String,
    pub manufacturer: String,
}

impl PortInfo {
    pub fn new(device: &str, description: &str, manufacturer: &str) -> Self {
        Self {
            device: device.to_string(),
            description: description.to_string(),
            manufacturer: manufacturer.to_string(),
        }
    }

    fn haystack(&self) -> String {
        format!("{} {} {}", self.device, self.description, self.manufacturer).to_lowercase()
    }

    pub fn is_known_hardware(&self) -> bool {
        let hay = self.haystack();
        KNOWN_HARDWARE.iter().any(|fragment| hay.contains(fragment))
    }
}

/// Picks the reader among enumerated devices.
///
/// The first device matching [`KNOWN_HARDWARE`] wins. Without a match, a
/// lone device is used. Anything else is ambiguous and yields `None`.
pub fn select_port(candidates: &[PortInfo]) -> Option<&PortInfo> {
    if let Some(known) = candidates.iter().find(|p| p.is_known_hardware()) {
        return Some(known);
    }
    match candidates {
        [only] => Some(only),
        _ => None,
    }
}

/// An explicitly configured port always wins; otherwise auto-scan, if enabled.
pub fn resolve_port(
    configured: &str,
    auto_scan: bool,
    backend: &dyn SerialBackend,
) -> Option<String> {
    let configured = configured.trim();
    if !configured.is_empty() {
        return Some(configured.to_string());
    }
    if !auto_scan {
        return None;
    }
    let ports = match backend.list_ports() {
        Ok(ports) => ports,
        Err(err) => {
            log::debug!("serial port enumeration failed: {:#}", err);
            return None;
        }
    };
    let selected = select_port(&ports).map(|p| p.device.clone());
    if selected.is_none() && ports.len() > 1 {
        log::debug!(
            "{} serial ports found, none recognised: {:?}",
            ports.len(),
            ports.iter().map(|p| p.device.as_str()).collect::<Vec<_>>()
        );
    }
    selected
}

/// Reads bytes from an open device. Reads return `TimedOut` (or
/// `WouldBlock`) when nothing arrived within the read timeout.
pub type SerialStream = Box<dyn Read + Send>;

/// Serial access backend.
pub trait SerialBackend: Send + Sync {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    fn list_ports(&self) -> Result<Vec<PortInfo>>;

    fn open(&self, port: &str, baud_rate: u32, read_timeout: Duration) -> Result<SerialStream>;
}

/// Serial access, resolved once per process.
#[derive(Clone)]
pub enum SerialCapability {
    Available(Arc<dyn SerialBackend>),
    Unavailable(String),
}

impl SerialCapability {
    /// The system driver when built with the `serial` feature.
    pub fn detect() -> Self {
        #[cfg(feature = "serial")]
        {
            SerialCapability::Available(Arc::new(SystemSerial))
        }
        #[cfg(not(feature = "serial"))]
        {
            SerialCapability::Unavailable("built without the serial feature".to_string())
        }
    }

    pub fn with_backend<B: SerialBackend + 'static>(backend: B) -> Self {
        SerialCapability::Available(Arc::new(backend))
    }

    pub fn is_available(&self) -> bool {
        matches!(self, SerialCapability::Available(_))
    }
}

impl std::fmt::Debug for SerialCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerialCapability::Available(backend) => {
                f.debug_tuple("Available").field(&backend.name()).finish()
            }
            SerialCapability::Unavailable(reason) => {
                f.debug_tuple("Unavailable").field(reason).finish()
            }
        }
    }
}

// ----------------------------------------------------------------------------
// System driver (serialport crate)
// ----------------------------------------------------------------------------

#[cfg(feature = "serial")]
pub struct SystemSerial;

#[cfg(feature = "serial")]
impl SerialBackend for SystemSerial {
    fn name(&self) -> &'static str {
        "serialport"
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        use anyhow::Context;
        use serialport::SerialPortType;

        let ports = serialport::available_ports().context("enumerate serial ports")?;
        Ok(ports
            .into_iter()
            .map(|p| {
                let (description, manufacturer) = match p.port_type {
                    SerialPortType::UsbPort(usb) => (
                        usb.product.unwrap_or_default(),
                        usb.manufacturer.unwrap_or_default(),
                    ),
                    SerialPortType::BluetoothPort => ("bluetooth".to_string(), String::new()),
                    SerialPortType::PciPort => ("pci".to_string(), String::new()),
                    SerialPortType::Unknown => (String::new(), String::new()),
                };
                PortInfo {
                    device: p.port_name,
                    description,
                    manufacturer,
                }
            })
            .collect())
    }

    fn open(&self, port: &str, baud_rate: u32, read_timeout: Duration) -> Result<SerialStream> {
        use anyhow::Context;

        let handle = serialport::new(port, baud_rate)
            .timeout(read_timeout)
            .open()
            .with_context(|| format!("open {}", port))?;
        Ok(Box::new(SystemPort(handle)))
    }
}

#[cfg(feature = "serial")]
struct SystemPort(Box<dyn serialport::SerialPort>);

#[cfg(feature = "serial")]
impl Read for SystemPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

// ----------------------------------------------------------------------------
// Replay backend (no hardware)
// ----------------------------------------------------------------------------

/// In-memory backend that replays a fixed byte script on every open.
///
/// After the script is exhausted the device either idles (reads time out) or
/// hangs up with a `BrokenPipe` error, which exercises the reconnect path.
#[derive(Clone)]
pub struct ReplaySerial {
    ports: Vec<PortInfo>,
    chunks: Vec<Vec<u8>>,
    hang_up: bool,
    opens: Arc<AtomicUsize>,
}

impl ReplaySerial {
    pub fn new(ports: Vec<PortInfo>) -> Self {
        Self {
            ports,
            chunks: Vec::new(),
            hang_up: false,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Raw chunks, delivered one per read.
    pub fn with_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chunks = chunks;
        self
    }

    /// Each line is newline-terminated and delivered in its own read.
    pub fn with_lines(self, lines: &[&str]) -> Self {
        let chunks = lines
            .iter()
            .map(|line| format!("{}\n", line).into_bytes())
            .collect();
        self.with_chunks(chunks)
    }

    pub fn hang_up_after_script(mut self, hang_up: bool) -> Self {
        self.hang_up = hang_up;
        self
    }

    /// Number of successful opens so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl SerialBackend for ReplaySerial {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn list_ports(&self) -> Result<Vec<PortInfo>> {
        Ok(self.ports.clone())
    }

    fn open(&self, port: &str, _baud_rate: u32, read_timeout: Duration) -> Result<SerialStream> {
        if !self.ports.iter().any(|p| p.device == port) {
            return Err(anyhow!("open {}: no such device", port));
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ReplayStream {
            chunks: self.chunks.iter().cloned().collect(),
            hang_up: self.hang_up,
            read_timeout,
        }))
    }
}

struct ReplayStream {
    chunks: VecDeque<Vec<u8>>,
    hang_up: bool,
    read_timeout: Duration,
}

impl Read for ReplayStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let Some(mut chunk) = self.chunks.pop_front() else {
            if self.hang_up {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            std::thread::sleep(self.read_timeout);
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            self.chunks.push_front(chunk.split_off(n));
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn port(device: &str, description: &str) -> PortInfo {
        PortInfo::new(device, description, "")
    }

    #[test]
    fn known_hardware_is_preferred() {
        let ports = vec![
            port("/dev/ttyS0", "16550A"),
            port("/dev/ttyUSB0", "USB2.0-Serial CH340"),
        ];
        assert_eq!(select_port(&ports).map(|p| p.device.as_str()), Some("/dev/ttyUSB0"));
    }

    #[test]
    fn manufacturer_counts_for_matching() {
        let ports = vec![
            port("/dev/ttyS0", ""),
            PortInfo::new("/dev/ttyACM0", "", "Arduino (www.arduino.cc)"),
        ];
        assert_eq!(select_port(&ports).map(|p| p.device.as_str()), Some("/dev/ttyACM0"));
    }

    #[test]
    fn single_unmatched_candidate_is_used() {
        let ports = vec![port("COM3", "Communications Port")];
        assert_eq!(select_port(&ports).map(|p| p.device.as_str()), Some("COM3"));
    }

    #[test]
    fn ambiguous_candidates_resolve_to_none() {
        let backend = ReplaySerial::new(vec![port("/dev/ttyS0", "a"), port("/dev/ttyS1", "b")]);
        assert_eq!(resolve_port("", true, &backend), None);
        assert_eq!(select_port(&[]), None);
    }

    #[test]
    fn configured_port_always_wins() {
        let backend = ReplaySerial::new(vec![port("/dev/ttyUSB0", "CH340")]);
        assert_eq!(
            resolve_port(" /dev/ttyS9 ", true, &backend),
            Some("/dev/ttyS9".to_string())
        );
        assert_eq!(resolve_port("", false, &backend), None);
        assert_eq!(
            resolve_port("", true, &backend),
            Some("/dev/ttyUSB0".to_string())
        );
    }

    #[test]
    fn replay_stream_splits_large_chunks() -> Result<()> {
        let backend = ReplaySerial::new(vec![port("p", "")])
            .with_chunks(vec![b"abcdef".to_vec()])
            .hang_up_after_script(true);
        let mut stream = backend.open("p", 9600, Duration::from_millis(1))?;
        let mut buf = [0u8; 4];
        assert_eq!(stream.read(&mut buf)?, 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(stream.read(&mut buf)?, 2);
        assert_eq!(
            stream.read(&mut buf).map_err(|e| e.kind()).err(),
            Some(io::ErrorKind::BrokenPipe)
        );
        assert_eq!(backend.open_count(), 1);
        Ok(())
    }
}
