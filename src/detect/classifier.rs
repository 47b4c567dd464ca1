//! Zone occupancy / warning classification.
//!
//! [`evaluate`] is a pure function of the detections and the zone map. For
//! every truck-space zone:
//!
//! - a non-truck centroid inside the zone makes it `Warning`,
//! - otherwise a truck centroid inside the zone makes it `Occupied`,
//! - otherwise it is `Free`.
//!
//! Warning wins over occupancy when both hold. Independently, detections
//! whose label has a [`WarningRule`] and whose centroid falls inside any
//! warning-trigger zone produce that rule's message, deduplicated in
//! first-seen order.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::detect::result::Detection;
use crate::zones::{Zone, ZoneMap};

pub const TRUCK_LABEL: &str = "truck";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneState {
    #[default]
    Free,
    Occupied,
    Warning,
}

impl ZoneState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneState::Free => "free",
            ZoneState::Occupied => "occupied",
            ZoneState::Warning => "warning",
        }
    }
}

impl fmt::Display for ZoneState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-cycle classification output.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    /// Truck-space key -> a truck centroid is inside.
    pub occupancy: BTreeMap<String, bool>,
    /// Deduplicated, first-seen order.
    pub warnings: Vec<String>,
    /// Truck-space key -> classified state.
    pub zone_state: BTreeMap<String, ZoneState>,
}

impl Evaluation {
    pub fn state_of(&self, key: &str) -> Option<ZoneState> {
        self.zone_state.get(key).copied()
    }

    pub fn is_occupied(&self, key: &str) -> bool {
        self.occupancy.get(key).copied().unwrap_or(false)
    }
}

/// Maps a detection label to the message it raises inside a warning-trigger zone.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarningRule {
    pub label: String,
    pub message: String,
}

impl WarningRule {
    pub fn new(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            message: message.into(),
        }
    }
}

/// Which labels generate warning messages. Labels without a rule are silent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WarningPolicy {
    rules: Vec<WarningRule>,
}

impl WarningPolicy {
    pub fn new(rules: Vec<WarningRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[WarningRule] {
        &self.rules
    }

    fn message_for(&self, label: &str) -> Option<&str> {
        if label == TRUCK_LABEL {
            return None;
        }
        self.rules
            .iter()
            .find(|rule| rule.label == label)
            .map(|rule| rule.message.as_str())
    }

    /// Classifies one cycle of detections against the zone map.
    pub fn evaluate(&self, detections: &[Detection], zones: &ZoneMap) -> Evaluation {
        let mut out = Evaluation::default();

        for zone in zones.truck_spaces() {
            let occupied = any_inside(detections, zone, |d| d.is_label(TRUCK_LABEL));
            let warning = any_inside(detections, zone, |d| !d.is_label(TRUCK_LABEL));
            let state = if warning {
                ZoneState::Warning
            } else if occupied {
                ZoneState::Occupied
            } else {
                ZoneState::Free
            };
            out.occupancy.insert(zone.key.clone(), occupied);
            out.zone_state.insert(zone.key.clone(), state);
        }

        for det in detections {
            let Some(message) = self.message_for(&det.label) else {
                continue;
            };
            if !zones.warning_triggers().any(|z| z.bounds.contains(det.centroid)) {
                continue;
            }
            if !out.warnings.iter().any(|w| w == message) {
                out.warnings.push(message.to_string());
            }
        }

        out
    }
}

impl Default for WarningPolicy {
    fn default() -> Self {
        Self::new(vec![WarningRule::new("car", "car detected")])
    }
}

fn any_inside(detections: &[Detection], zone: &Zone, pred: impl Fn(&Detection) -> bool) -> bool {
    detections
        .iter()
        .any(|d| pred(d) && zone.bounds.contains(d.centroid))
}

/// Classifies with the default warning policy (`car` -> "car detected").
pub fn evaluate(detections: &[Detection], zones: &ZoneMap) -> Evaluation {
    WarningPolicy::default().evaluate(detections, zones)
}
