use anyhow::Result;
use std::collections::BTreeSet;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Object detector collaborator.
///
/// The model itself is external. Implementations return labeled boxes that
/// already passed the confidence threshold and the label allow-list, typically
/// by running their raw output through a [`LabelFilter`].
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Confidence threshold plus optional label allow-list.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelFilter {
    pub confidence_threshold: f32,
    /// Lowercase labels; empty admits every label.
    pub allowed_labels: BTreeSet<String>,
}

impl LabelFilter {
    pub fn new<I, S>(confidence_threshold: f32, allowed_labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            confidence_threshold,
            allowed_labels: allowed_labels
                .into_iter()
                .map(|label| label.as_ref().trim().to_lowercase())
                .filter(|label| !label.is_empty())
                .collect(),
        }
    }

    /// Admits everything.
    pub fn permissive() -> Self {
        Self::new(0.0, std::iter::empty::<&str>())
    }

    pub fn admits(&self, detection: &Detection) -> bool {
        detection.confidence >= self.confidence_threshold
            && (self.allowed_labels.is_empty() || self.allowed_labels.contains(&detection.label))
    }

    pub fn apply(&self, detections: Vec<Detection>) -> Vec<Detection> {
        detections.into_iter().filter(|d| self.admits(d)).collect()
    }
}

impl Default for LabelFilter {
    fn default() -> Self {
        Self::new(0.15, ["truck", "car"])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;

    #[test]
    fn filter_applies_threshold_and_allow_list() {
        let filter = LabelFilter::new(0.5, ["Truck"]);
        let b = BoundingBox::new(0, 0, 10, 10);
        let kept = filter.apply(vec![
            Detection::new("truck", 0.9, b),
            Detection::new("truck", 0.2, b),
            Detection::new("car", 0.9, b),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn empty_allow_list_admits_any_label() {
        let filter = LabelFilter::new(0.1, std::iter::empty::<&str>());
        let det = Detection::new("person", 0.3, BoundingBox::new(0, 0, 1, 1));
        assert!(filter.admits(&det));
    }
}
