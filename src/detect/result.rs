use serde::{Deserialize, Serialize};

use crate::geometry::{BoundingBox, Point};

/// One labeled object reported by the detector collaborator.
///
/// Detections arrive already confidence-filtered; nothing downstream filters
/// them again.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "DetectionRecord")]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub centroid: Point,
}

impl Detection {
    /// Lowercases the label, orders the box corners and derives the centroid.
    pub fn new(label: &str, confidence: f32, bbox: BoundingBox) -> Self {
        let bbox = bbox.sorted();
        Self {
            label: label.trim().to_lowercase(),
            confidence,
            bbox,
            centroid: bbox.centroid(),
        }
    }

    pub fn is_label(&self, label: &str) -> bool {
        self.label == label
    }
}

/// Wire form of a detection; the centroid is always recomputed.
#[derive(Deserialize)]
struct DetectionRecord {
    label: String,
    #[serde(default = "full_confidence")]
    confidence: f32,
    bbox: BoundingBox,
}

fn full_confidence() -> f32 {
    1.0
}

impl From<DetectionRecord> for Detection {
    fn from(record: DetectionRecord) -> Self {
        Detection::new(&record.label, record.confidence, record.bbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_normalizes_label_and_corners() {
        let det = Detection::new(" Truck ", 0.9, BoundingBox::new(100, 80, 0, 0));
        assert_eq!(det.label, "truck");
        assert_eq!(det.bbox, BoundingBox::new(0, 0, 100, 80));
        assert_eq!(det.centroid, Point::new(50, 40));
    }

    #[test]
    fn deserialized_centroid_is_derived_from_bbox() -> anyhow::Result<()> {
        let det: Detection = serde_json::from_str(
            r#"{"label":"car","confidence":0.4,"bbox":[10,10,21,31],"centroid":{"x":0,"y":0}}"#,
        )?;
        assert_eq!(det.centroid, Point::new(15, 20));
        Ok(())
    }
}
