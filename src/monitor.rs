//! Foreground monitoring loop state.
//!
//! The monitor runs detection at a bounded rate, re-evaluates zone state on
//! every tick from the most recent detection set, and keeps the latest
//! evaluation for display. Detection results persist between passes. With a
//! non-zero `ttl_frames` they expire after that many ticks without a refresh.

use anyhow::Result;
use std::fmt;
use std::time::{Duration, Instant};

use crate::detect::{DetectorBackend, Detection, Evaluation, WarningPolicy};
use crate::frame::{Frame, FrameSource};
use crate::zones::ZoneMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Detection passes per second; 0 runs detection on every tick.
    pub detections_per_second: u32,
    /// Ticks without a detection refresh before results expire; 0 disables.
    pub ttl_frames: u32,
}

impl MonitorSettings {
    pub fn detection_interval(&self) -> Duration {
        match self.detections_per_second {
            0 => Duration::ZERO,
            dps => Duration::from_secs(1) / dps,
        }
    }
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            detections_per_second: 2,
            ttl_frames: 10,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MonitorStatus {
    Starting,
    Running,
    /// Last frame read failed; the loop keeps retrying.
    CameraReadFailed { reason: String },
    /// Last detection pass failed; previous detections are kept.
    DetectionFailed { reason: String },
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorStatus::Starting => f.write_str("starting"),
            MonitorStatus::Running => f.write_str("running"),
            MonitorStatus::CameraReadFailed { reason } => {
                write!(f, "camera read failed: {}", reason)
            }
            MonitorStatus::DetectionFailed { reason } => write!(f, "detection failed: {}", reason),
        }
    }
}

pub struct Monitor {
    zones: ZoneMap,
    detector: Box<dyn DetectorBackend>,
    policy: WarningPolicy,
    settings: MonitorSettings,
    detections: Vec<Detection>,
    last_pass: Option<Instant>,
    ticks_since_refresh: u32,
    evaluation: Evaluation,
    status: MonitorStatus,
}

impl Monitor {
    pub fn new(
        zones: ZoneMap,
        detector: Box<dyn DetectorBackend>,
        settings: MonitorSettings,
    ) -> Self {
        let evaluation = WarningPolicy::default().evaluate(&[], &zones);
        Self {
            zones,
            detector,
            policy: WarningPolicy::default(),
            settings,
            detections: Vec::new(),
            last_pass: None,
            ticks_since_refresh: 0,
            evaluation,
            status: MonitorStatus::Starting,
        }
    }

    pub fn with_policy(mut self, policy: WarningPolicy) -> Self {
        self.policy = policy;
        self.evaluation = self.policy.evaluate(&self.detections, &self.zones);
        self
    }

    pub fn zones(&self) -> &ZoneMap {
        &self.zones
    }

    /// Swaps in an edited zone map; takes effect on the current evaluation.
    pub fn set_zones(&mut self, zones: ZoneMap) {
        self.zones = zones;
        self.evaluation = self.policy.evaluate(&self.detections, &self.zones);
    }

    pub fn detections(&self) -> &[Detection] {
        &self.detections
    }

    pub fn evaluation(&self) -> &Evaluation {
        &self.evaluation
    }

    pub fn status(&self) -> &MonitorStatus {
        &self.status
    }

    /// Processes one frame. Detection runs only if the detection interval
    /// has elapsed since the previous pass; evaluation runs every tick.
    pub fn tick(&mut self, frame: &Frame, now: Instant) -> &Evaluation {
        let due = match self.last_pass {
            None => true,
            Some(last) => {
                now.saturating_duration_since(last) >= self.settings.detection_interval()
            }
        };

        if due {
            self.last_pass = Some(now);
            match self.detector.detect(frame) {
                Ok(detections) => {
                    self.detections = detections;
                    self.ticks_since_refresh = 0;
                    self.status = MonitorStatus::Running;
                }
                Err(err) => {
                    log::warn!("detector {} failed: {:#}", self.detector.name(), err);
                    self.status = MonitorStatus::DetectionFailed {
                        reason: format!("{:#}", err),
                    };
                    self.age();
                }
            }
        } else {
            self.age();
            if matches!(self.status, MonitorStatus::CameraReadFailed { .. }) {
                self.status = MonitorStatus::Running;
            }
        }

        self.evaluation = self.policy.evaluate(&self.detections, &self.zones);
        &self.evaluation
    }

    /// Reads a frame from `source` and ticks. A failed read is recorded as
    /// [`MonitorStatus::CameraReadFailed`] and still ages the detections.
    pub fn step(&mut self, source: &mut dyn FrameSource, now: Instant) -> Result<&Evaluation> {
        match source.next_frame() {
            Ok(frame) => Ok(self.tick(&frame, now)),
            Err(err) => {
                log::warn!("{}: frame read failed: {:#}", source.describe(), err);
                self.status = MonitorStatus::CameraReadFailed {
                    reason: format!("{:#}", err),
                };
                self.age();
                self.evaluation = self.policy.evaluate(&self.detections, &self.zones);
                Ok(&self.evaluation)
            }
        }
    }

    fn age(&mut self) {
        self.ticks_since_refresh = self.ticks_since_refresh.saturating_add(1);
        let ttl = self.settings.ttl_frames;
        if ttl > 0 && self.ticks_since_refresh > ttl && !self.detections.is_empty() {
            log::debug!(
                "detections stale after {} ticks, clearing",
                self.ticks_since_refresh
            );
            self.detections.clear();
        }
    }

    /// `truck_space_1: free | truck_space_2: occupied | ...`
    pub fn occupancy_summary(&self) -> String {
        self.zones
            .truck_spaces()
            .map(|zone| {
                let state = self.evaluation.state_of(&zone.key).unwrap_or_default();
                format!("{}: {}", zone.key, state)
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }

    pub fn warning_summary(&self) -> String {
        if self.evaluation.warnings.is_empty() {
            "No warnings".to_string()
        } else {
            self.evaluation.warnings.join(" | ")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{LabelFilter, ReplayBackend, ZoneState};
    use crate::frame::{CameraConfig, SyntheticSource};
    use crate::geometry::{BoundingBox, FrameSize};
    use anyhow::anyhow;

    const FRAME: FrameSize = FrameSize::new(960, 540);

    fn truck_in_space_1() -> Detection {
        Detection::new("truck", 0.9, BoundingBox::new(100, 300, 200, 400))
    }

    fn frame() -> Frame {
        Frame::blank(0, FRAME)
    }

    fn monitor(script: Vec<Vec<Detection>>, settings: MonitorSettings) -> Monitor {
        Monitor::new(
            ZoneMap::defaults(FRAME),
            Box::new(ReplayBackend::new(script, LabelFilter::default())),
            settings,
        )
    }

    struct FailingSource;

    impl FrameSource for FailingSource {
        fn next_frame(&mut self) -> Result<Frame> {
            Err(anyhow!("device busy"))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[test]
    fn detection_is_rate_limited() {
        let settings = MonitorSettings {
            detections_per_second: 2,
            ttl_frames: 0,
        };
        let mut m = monitor(vec![vec![truck_in_space_1()], vec![]], settings);
        let t0 = Instant::now();

        m.tick(&frame(), t0);
        assert_eq!(m.evaluation().state_of("truck_space_1"), Some(ZoneState::Occupied));

        // Within the 500ms interval the truck detection is reused.
        m.tick(&frame(), t0 + Duration::from_millis(100));
        assert_eq!(m.detections().len(), 1);

        m.tick(&frame(), t0 + Duration::from_millis(500));
        assert!(m.detections().is_empty());
        assert_eq!(m.evaluation().state_of("truck_space_1"), Some(ZoneState::Free));
    }

    #[test]
    fn zero_rate_detects_every_tick() {
        let settings = MonitorSettings {
            detections_per_second: 0,
            ttl_frames: 0,
        };
        let mut m = monitor(vec![vec![truck_in_space_1()], vec![]], settings);
        let t0 = Instant::now();
        m.tick(&frame(), t0);
        m.tick(&frame(), t0);
        assert!(m.detections().is_empty());
    }

    #[test]
    fn stale_detections_expire_after_ttl() -> Result<()> {
        let settings = MonitorSettings {
            detections_per_second: 2,
            ttl_frames: 3,
        };
        let mut m = monitor(vec![vec![truck_in_space_1()]], settings);
        let t0 = Instant::now();
        m.tick(&frame(), t0);

        let mut camera = FailingSource;
        for i in 1..=3 {
            m.step(&mut camera, t0 + Duration::from_millis(10 * i))?;
            assert_eq!(m.detections().len(), 1);
        }
        m.step(&mut camera, t0 + Duration::from_millis(40))?;
        assert!(m.detections().is_empty());
        assert_eq!(m.evaluation().state_of("truck_space_1"), Some(ZoneState::Free));
        assert!(matches!(m.status(), MonitorStatus::CameraReadFailed { .. }));
        Ok(())
    }

    #[test]
    fn zero_ttl_keeps_last_state() -> Result<()> {
        let settings = MonitorSettings {
            detections_per_second: 1,
            ttl_frames: 0,
        };
        let mut m = monitor(vec![vec![truck_in_space_1()]], settings);
        let t0 = Instant::now();
        m.tick(&frame(), t0);
        let mut camera = FailingSource;
        for i in 1..50 {
            m.step(&mut camera, t0 + Duration::from_millis(i))?;
        }
        assert_eq!(m.evaluation().state_of("truck_space_1"), Some(ZoneState::Occupied));
        Ok(())
    }

    #[test]
    fn summaries_follow_zone_order() -> Result<()> {
        let car = Detection::new("car", 0.8, BoundingBox::new(400, 300, 500, 400));
        let mut m = monitor(vec![vec![truck_in_space_1(), car]], MonitorSettings::default());
        assert_eq!(m.warning_summary(), "No warnings");

        let mut source = SyntheticSource::new(CameraConfig::default());
        m.step(&mut source, Instant::now())?;
        assert_eq!(
            m.occupancy_summary(),
            "truck_space_1: occupied | truck_space_2: warning | truck_space_3: free"
        );
        assert_eq!(m.warning_summary(), "car detected");
        assert_eq!(m.status(), &MonitorStatus::Running);
        Ok(())
    }

    #[test]
    fn zone_edits_apply_immediately() -> Result<()> {
        let mut m = monitor(vec![vec![truck_in_space_1()]], MonitorSettings::default());
        m.tick(&frame(), Instant::now());
        let mut zones = m.zones().clone();
        zones.set_box("truck_space_1", BoundingBox::new(600, 0, 700, 100))?;
        m.set_zones(zones);
        assert_eq!(m.evaluation().state_of("truck_space_1"), Some(ZoneState::Free));
        Ok(())
    }
}
