//! Zone registry: named regions of the camera frame.
//!
//! Each zone carries an explicit [`ZoneRole`]; classification never infers a
//! role from the zone key. The on-disk format is a flat JSON object mapping
//! zone key to `[x1, y1, x2, y2]`. Roles for persisted keys come from the
//! built-in zone definitions, and only geometry is read back from the file.

use anyhow::{anyhow, Context, Result};
use serde::ser::{Serialize, Serializer};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::OnceLock;

use crate::geometry::{BoundingBox, FrameSize};

/// What a zone is used for during classification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ZoneRole {
    /// Parking space tracked as free / occupied / warning.
    TruckSpace,
    /// Region that produces textual warnings for specific labels.
    WarningTrigger,
    /// Drawn and persisted, ignored by classification.
    Other,
}

impl ZoneRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ZoneRole::TruckSpace => "truck-space",
            ZoneRole::WarningTrigger => "warning-trigger",
            ZoneRole::Other => "other",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Zone {
    pub key: String,
    pub role: ZoneRole,
    pub bounds: BoundingBox,
}

impl Zone {
    pub fn new(key: impl Into<String>, role: ZoneRole, bounds: BoundingBox) -> Self {
        Self {
            key: key.into(),
            role,
            bounds,
        }
    }
}

const DEFAULT_ZONES: &[(&str, ZoneRole, [i32; 4])] = &[
    ("truck_space_1", ZoneRole::TruckSpace, [40, 260, 300, 520]),
    ("truck_space_2", ZoneRole::TruckSpace, [330, 260, 620, 520]),
    ("truck_space_3", ZoneRole::TruckSpace, [650, 260, 930, 520]),
    ("warn_car", ZoneRole::WarningTrigger, [0, 0, 960, 540]),
];

/// Ordered set of zones, normalized to a fixed frame size.
///
/// Mutated only from the editing path and read from the classification path.
/// Both run on the same thread; wrap it in a lock before sharing it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZoneMap {
    frame: FrameSize,
    zones: Vec<Zone>,
}

impl ZoneMap {
    /// Builds a map from explicit zones. Geometry is normalized to `frame`;
    /// a repeated key replaces the earlier entry.
    pub fn new(frame: FrameSize, zones: impl IntoIterator<Item = Zone>) -> Self {
        let mut map = Self {
            frame,
            zones: Vec::new(),
        };
        for mut zone in zones {
            zone.bounds = zone.bounds.normalize(frame);
            match map.zones.iter_mut().find(|z| z.key == zone.key) {
                Some(existing) => *existing = zone,
                None => map.zones.push(zone),
            }
        }
        map
    }

    /// Built-in depot layout: three truck spaces and a frame-wide car warning zone.
    pub fn defaults(frame: FrameSize) -> Self {
        Self::new(
            frame,
            DEFAULT_ZONES
                .iter()
                .map(|(key, role, b)| Zone::new(*key, *role, BoundingBox::from(*b))),
        )
    }

    pub fn frame(&self) -> FrameSize {
        self.frame
    }

    pub fn get(&self, key: &str) -> Option<&Zone> {
        self.zones.iter().find(|z| z.key == key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Zone> {
        self.zones.iter()
    }

    pub fn with_role(&self, role: ZoneRole) -> impl Iterator<Item = &Zone> {
        self.zones.iter().filter(move |z| z.role == role)
    }

    pub fn truck_spaces(&self) -> impl Iterator<Item = &Zone> {
        self.with_role(ZoneRole::TruckSpace)
    }

    pub fn warning_triggers(&self) -> impl Iterator<Item = &Zone> {
        self.with_role(ZoneRole::WarningTrigger)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.zones.iter().map(|z| z.key.as_str())
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    /// Replaces the geometry of an existing zone. The box is normalized first.
    pub fn set_box(&mut self, key: &str, bounds: BoundingBox) -> Result<BoundingBox> {
        validate_zone_key(key)?;
        let frame = self.frame;
        let zone = self
            .zones
            .iter_mut()
            .find(|z| z.key == key)
            .ok_or_else(|| anyhow!("unknown zone '{}'", key))?;
        zone.bounds = bounds.normalize(frame);
        Ok(zone.bounds)
    }

    /// Restores the built-in layout.
    pub fn reset(&mut self) {
        *self = Self::defaults(self.frame);
    }

    fn apply_file_value(&mut self, key: &str, value: &serde_json::Value) -> bool {
        let Some(corners) = parse_corners(value) else {
            log::warn!("zone '{}': expected [x1, y1, x2, y2], keeping default", key);
            return false;
        };
        let frame = self.frame;
        match self.zones.iter_mut().find(|z| z.key == key) {
            Some(zone) => {
                zone.bounds = BoundingBox::from_f64_corners(corners).normalize(frame);
                true
            }
            None => false,
        }
    }
}

impl Serialize for ZoneMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.zones.iter().map(|z| (&z.key, z.bounds)))
    }
}

fn parse_corners(value: &serde_json::Value) -> Option<[f64; 4]> {
    let items = value.as_array()?;
    if items.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, item) in out.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(out)
}

/// A zone key MUST be a short local identifier: `^[a-z0-9_-]{1,64}$`.
pub fn validate_zone_key(key: &str) -> Result<()> {
    static ZONE_KEY_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = ZONE_KEY_RE.get_or_init(|| {
        regex::Regex::new(r"^[a-z0-9_-]{1,64}$").expect("zone key pattern is valid")
    });
    if !re.is_match(key) {
        return Err(anyhow!("zone key must match ^[a-z0-9_-]{{1,64}}$ (got '{}')", key));
    }
    Ok(())
}

/// Loads zones from `path`.
///
/// A missing file is created with the built-in defaults. Unknown keys and
/// malformed values are ignored, leaving the default geometry for that key.
/// A file that cannot be read, or is not a JSON object, is left untouched
/// and defaults are used.
pub fn load(path: impl AsRef<Path>, frame: FrameSize) -> Result<ZoneMap> {
    let path = path.as_ref();
    let mut zones = ZoneMap::defaults(frame);
    if !path.exists() {
        log::info!("zone file {} missing, writing defaults", path.display());
        save(path, &zones)?;
        return Ok(zones);
    }

    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) => {
            log::warn!(
                "zone file {} could not be read ({}), using defaults",
                path.display(),
                err
            );
            return Ok(zones);
        }
    };
    let parsed: serde_json::Value = match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(err) => {
            log::warn!(
                "zone file {} is not valid JSON ({}), using defaults",
                path.display(),
                err
            );
            return Ok(zones);
        }
    };
    let Some(entries) = parsed.as_object() else {
        log::warn!(
            "zone file {} is not a JSON object, using defaults",
            path.display()
        );
        return Ok(zones);
    };

    let mut applied = 0usize;
    for (key, value) in entries {
        if zones.get(key).is_none() {
            log::debug!("zone file: ignoring unknown key '{}'", key);
            continue;
        }
        if zones.apply_file_value(key, value) {
            applied += 1;
        }
    }
    log::debug!(
        "loaded {} of {} zones from {}",
        applied,
        zones.len(),
        path.display()
    );
    Ok(zones)
}

/// Writes the full zone map, replacing the file atomically.
pub fn save(path: impl AsRef<Path>, zones: &ZoneMap) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(zones)?;
    write_atomic(path, json.as_bytes())
        .with_context(|| format!("failed to write zone file {}", path.display()))
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    fs::rename(tmp_path, path)?;
    Ok(())
}
