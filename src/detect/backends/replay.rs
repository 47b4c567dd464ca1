use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::detect::backend::{DetectorBackend, LabelFilter};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Scripted detector that replays recorded detections, one entry per frame.
///
/// Stands in for the object-detection model in tests and headless runs. The
/// script wraps around when exhausted. Output goes through the configured
/// [`LabelFilter`] exactly like a real backend's raw output would.
pub struct ReplayBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
    filter: LabelFilter,
}

impl ReplayBackend {
    pub fn new(script: Vec<Vec<Detection>>, filter: LabelFilter) -> Self {
        Self {
            script,
            cursor: 0,
            filter,
        }
    }

    /// A detector that never sees anything.
    pub fn empty(filter: LabelFilter) -> Self {
        Self::new(Vec::new(), filter)
    }

    /// Reads a JSON-lines script: each line is an array of
    /// `{"label", "confidence", "bbox": [x1, y1, x2, y2]}` objects.
    /// Blank lines and lines starting with `#` are skipped.
    pub fn from_path(path: impl AsRef<Path>, filter: LabelFilter) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open detection script {}", path.display()))?;
        Self::from_reader(BufReader::new(file), filter)
            .with_context(|| format!("invalid detection script {}", path.display()))
    }

    pub fn from_reader<R: BufRead>(reader: R, filter: LabelFilter) -> Result<Self> {
        let mut script = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            let frame: Vec<Detection> = serde_json::from_str(trimmed)
                .with_context(|| format!("line {}", idx + 1))?;
            script.push(frame);
        }
        Ok(Self::new(script, filter))
    }

    pub fn frames(&self) -> usize {
        self.script.len()
    }
}

impl DetectorBackend for ReplayBackend {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
        let Some(next) = self.script.get(self.cursor) else {
            return Ok(Vec::new());
        };
        let raw = next.clone();
        self.cursor = (self.cursor + 1) % self.script.len();
        Ok(self.filter.apply(raw))
    }
}
