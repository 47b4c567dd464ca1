use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::bridge::BridgeConfig;
use crate::detect::LabelFilter;
use crate::frame::CameraConfig;
use crate::geometry::FrameSize;
use crate::monitor::MonitorSettings;

const DEFAULT_CAMERA_SOURCE: &str = "stub://depot";
const DEFAULT_FRAME_WIDTH: u32 = 960;
const DEFAULT_FRAME_HEIGHT: u32 = 540;
const DEFAULT_CONF_THRESHOLD: f32 = 0.15;
const DEFAULT_ALLOWED_LABELS: &[&str] = &["truck", "car"];
const DEFAULT_DETECTIONS_PER_SECOND: u32 = 2;
const DEFAULT_TTL_FRAMES: u32 = 10;
const DEFAULT_ZONES_PATH: &str = "zones.json";
const DEFAULT_AUDIT_PATH: &str = "rfid_log.csv";
const DEFAULT_DISPLAY_LIMIT: usize = 250;
const DEFAULT_BAUD_RATE: u32 = 115_200;
const DEFAULT_READ_TIMEOUT_MS: u64 = 500;
const DEFAULT_RETRY_DELAY_MS: u64 = 2_000;
const DEFAULT_JOIN_TIMEOUT_MS: u64 = 2_000;

#[derive(Debug, Deserialize, Default)]
struct DepotConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    zones: Option<ZonesConfigFile>,
    audit: Option<AuditConfigFile>,
    serial: Option<SerialConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    source: Option<String>,
    frame_width: Option<u32>,
    frame_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    confidence_threshold: Option<f32>,
    allowed_labels: Option<Vec<String>>,
    detections_per_second: Option<u32>,
    ttl_frames: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct ZonesConfigFile {
    path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct AuditConfigFile {
    path: Option<PathBuf>,
    display_limit: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SerialConfigFile {
    port: Option<String>,
    baud_rate: Option<u32>,
    auto_scan: Option<bool>,
    read_timeout_ms: Option<u64>,
    retry_delay_ms: Option<u64>,
    join_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct DepotConfig {
    pub camera: CameraSettings,
    pub detector: DetectorSettings,
    pub zones_path: PathBuf,
    pub audit: AuditSettings,
    pub serial: SerialSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub index: u32,
    pub source: String,
    pub frame_width: u32,
    pub frame_height: u32,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub confidence_threshold: f32,
    pub allowed_labels: Vec<String>,
    /// Detection passes per second; 0 runs detection on every tick.
    pub detections_per_second: u32,
    /// Ticks without a detection refresh before results expire; 0 disables.
    pub ttl_frames: u32,
}

#[derive(Debug, Clone)]
pub struct AuditSettings {
    pub path: PathBuf,
    pub display_limit: usize,
}

impl AuditSettings {
    /// Command-line values win over the configured ones.
    pub fn with_overrides(&self, path: Option<PathBuf>, display_limit: Option<usize>) -> Self {
        Self {
            path: path.unwrap_or_else(|| self.path.clone()),
            display_limit: display_limit.unwrap_or(self.display_limit),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SerialSettings {
    /// Empty means auto-scan.
    pub port: String,
    pub baud_rate: u32,
    pub auto_scan: bool,
    pub read_timeout: Duration,
    pub retry_delay: Duration,
    pub join_timeout: Duration,
}

impl DepotConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("DEPOT_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: DepotConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let detector = file.detector.unwrap_or_default();
        let audit = file.audit.unwrap_or_default();
        let serial = file.serial.unwrap_or_default();

        Self {
            camera: CameraSettings {
                index: camera.index.unwrap_or(0),
                source: camera
                    .source
                    .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string()),
                frame_width: camera.frame_width.unwrap_or(DEFAULT_FRAME_WIDTH),
                frame_height: camera.frame_height.unwrap_or(DEFAULT_FRAME_HEIGHT),
            },
            detector: DetectorSettings {
                confidence_threshold: detector
                    .confidence_threshold
                    .unwrap_or(DEFAULT_CONF_THRESHOLD),
                allowed_labels: detector.allowed_labels.unwrap_or_else(|| {
                    DEFAULT_ALLOWED_LABELS
                        .iter()
                        .map(|label| label.to_string())
                        .collect()
                }),
                detections_per_second: detector
                    .detections_per_second
                    .unwrap_or(DEFAULT_DETECTIONS_PER_SECOND),
                ttl_frames: detector.ttl_frames.unwrap_or(DEFAULT_TTL_FRAMES),
            },
            zones_path: file
                .zones
                .and_then(|zones| zones.path)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ZONES_PATH)),
            audit: AuditSettings {
                path: audit
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_AUDIT_PATH)),
                display_limit: audit.display_limit.unwrap_or(DEFAULT_DISPLAY_LIMIT),
            },
            serial: SerialSettings {
                port: serial.port.unwrap_or_default(),
                baud_rate: serial.baud_rate.unwrap_or(DEFAULT_BAUD_RATE),
                auto_scan: serial.auto_scan.unwrap_or(true),
                read_timeout: Duration::from_millis(
                    serial.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
                ),
                retry_delay: Duration::from_millis(
                    serial.retry_delay_ms.unwrap_or(DEFAULT_RETRY_DELAY_MS),
                ),
                join_timeout: Duration::from_millis(
                    serial.join_timeout_ms.unwrap_or(DEFAULT_JOIN_TIMEOUT_MS),
                ),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(index) = std::env::var("DEPOT_CAMERA_INDEX") {
            self.camera.index = index
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEPOT_CAMERA_INDEX must be a non-negative integer"))?;
        }
        if let Ok(path) = std::env::var("DEPOT_ZONES_PATH") {
            if !path.trim().is_empty() {
                self.zones_path = PathBuf::from(path);
            }
        }
        if let Ok(path) = std::env::var("DEPOT_AUDIT_PATH") {
            if !path.trim().is_empty() {
                self.audit.path = PathBuf::from(path);
            }
        }
        if let Ok(port) = std::env::var("DEPOT_SERIAL_PORT") {
            self.serial.port = port.trim().to_string();
        }
        if let Ok(baud) = std::env::var("DEPOT_SERIAL_BAUD") {
            self.serial.baud_rate = baud
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEPOT_SERIAL_BAUD must be an integer baud rate"))?;
        }
        if let Ok(flag) = std::env::var("DEPOT_SERIAL_AUTO_SCAN") {
            self.serial.auto_scan = parse_bool(&flag)
                .ok_or_else(|| anyhow!("DEPOT_SERIAL_AUTO_SCAN must be true or false"))?;
        }
        if let Ok(labels) = std::env::var("DEPOT_ALLOWED_LABELS") {
            let parsed = split_csv(&labels);
            if !parsed.is_empty() {
                self.detector.allowed_labels = parsed;
            }
        }
        if let Ok(threshold) = std::env::var("DEPOT_CONF_THRESHOLD") {
            self.detector.confidence_threshold = threshold
                .trim()
                .parse()
                .map_err(|_| anyhow!("DEPOT_CONF_THRESHOLD must be a number"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.camera.frame_width == 0 || self.camera.frame_height == 0 {
            return Err(anyhow!("camera frame dimensions must be greater than zero"));
        }
        let threshold = self.detector.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(anyhow!(
                "confidence threshold must be within [0, 1], got {}",
                threshold
            ));
        }

        let mut labels: Vec<String> = Vec::new();
        for label in &self.detector.allowed_labels {
            let label = label.trim().to_lowercase();
            if !label.is_empty() && !labels.contains(&label) {
                labels.push(label);
            }
        }
        self.detector.allowed_labels = labels;

        if self.serial.baud_rate == 0 {
            return Err(anyhow!("serial baud rate must be greater than zero"));
        }
        if self.serial.read_timeout.is_zero() {
            return Err(anyhow!("serial read timeout must be greater than zero"));
        }
        Ok(())
    }

    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.camera.frame_width, self.camera.frame_height)
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            source: self.camera.source.clone(),
            index: self.camera.index,
            frame: self.frame_size(),
        }
    }

    pub fn label_filter(&self) -> LabelFilter {
        LabelFilter::new(
            self.detector.confidence_threshold,
            self.detector.allowed_labels.iter().cloned(),
        )
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            detections_per_second: self.detector.detections_per_second,
            ttl_frames: self.detector.ttl_frames,
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        BridgeConfig {
            port: self.serial.port.clone(),
            baud_rate: self.serial.baud_rate,
            auto_scan: self.serial.auto_scan,
            read_timeout: self.serial.read_timeout,
            retry_delay: self.serial.retry_delay,
            join_timeout: self.serial.join_timeout,
        }
    }
}

fn read_config_file(path: &Path) -> Result<DepotConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
