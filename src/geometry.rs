//! Pixel-space geometry shared by zones and detections.

use serde::{Deserialize, Serialize};

/// Frame dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSize {
    pub width: u32,
    pub height: u32,
}

impl FrameSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    fn max_x(&self) -> i32 {
        last_index(self.width)
    }

    fn max_y(&self) -> i32 {
        last_index(self.height)
    }
}

fn last_index(dim: u32) -> i32 {
    i32::try_from(dim.saturating_sub(1)).unwrap_or(i32::MAX)
}

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box `[x1, y1, x2, y2]` in pixel coordinates.
///
/// Serialized as a flat 4-element array, which is the zone file format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "[i32; 4]", into = "[i32; 4]")]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub const fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Builds a box from untrusted floating point corners.
    ///
    /// Values are truncated toward zero; NaN becomes 0 and infinities saturate.
    pub fn from_f64_corners(corners: [f64; 4]) -> Self {
        let [x1, y1, x2, y2] = corners.map(|v| v as i32);
        Self { x1, y1, x2, y2 }
    }

    /// Returns the box with its corners ordered so that `x1 <= x2` and `y1 <= y2`.
    pub fn sorted(self) -> Self {
        Self {
            x1: self.x1.min(self.x2),
            y1: self.y1.min(self.y2),
            x2: self.x1.max(self.x2),
            y2: self.y1.max(self.y2),
        }
    }

    /// Sorts the corners, then clamps every coordinate into the frame.
    pub fn normalize(self, frame: FrameSize) -> Self {
        let sorted = self.sorted();
        let (max_x, max_y) = (frame.max_x(), frame.max_y());
        Self {
            x1: sorted.x1.clamp(0, max_x),
            y1: sorted.y1.clamp(0, max_y),
            x2: sorted.x2.clamp(0, max_x),
            y2: sorted.y2.clamp(0, max_y),
        }
    }

    /// Inclusive on all four edges.
    pub fn contains(&self, point: Point) -> bool {
        self.x1 <= point.x && point.x <= self.x2 && self.y1 <= point.y && point.y <= self.y2
    }

    /// Integer midpoint, floor division.
    pub fn centroid(&self) -> Point {
        Point {
            x: floor_mid(self.x1, self.x2),
            y: floor_mid(self.y1, self.y2),
        }
    }

    pub fn to_array(self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

fn floor_mid(a: i32, b: i32) -> i32 {
    (i64::from(a) + i64::from(b)).div_euclid(2) as i32
}

impl From<[i32; 4]> for BoundingBox {
    fn from([x1, y1, x2, y2]: [i32; 4]) -> Self {
        Self { x1, y1, x2, y2 }
    }
}

impl From<BoundingBox> for [i32; 4] {
    fn from(b: BoundingBox) -> Self {
        b.to_array()
    }
}

/// Free-function form of [`BoundingBox::normalize`].
pub fn normalize(bounds: BoundingBox, frame: FrameSize) -> BoundingBox {
    bounds.normalize(frame)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: FrameSize = FrameSize::new(960, 540);

    #[test]
    fn normalize_sorts_and_clamps() {
        let b = normalize(BoundingBox::new(1200, -5, 100, 700), FRAME);
        assert_eq!(b, BoundingBox::new(100, 0, 959, 539));
    }

    #[test]
    fn normalize_holds_for_arbitrary_boxes() {
        let frames = [FrameSize::new(1, 1), FrameSize::new(2, 3), FRAME];
        let values = [i32::MIN, -1, 0, 1, 17, 539, 540, 959, 960, i32::MAX];
        for frame in frames {
            for &a in &values {
                for &b in &values {
                    let n = normalize(BoundingBox::new(a, b, b, a), frame);
                    assert!(n.x1 <= n.x2 && n.y1 <= n.y2, "{:?}", n);
                    for x in [n.x1, n.x2] {
                        assert!((0..frame.width as i32).contains(&x), "{:?}", n);
                    }
                    for y in [n.y1, n.y2] {
                        assert!((0..frame.height as i32).contains(&y), "{:?}", n);
                    }
                }
            }
        }
    }

    #[test]
    fn non_finite_corners_are_coerced() {
        let b = BoundingBox::from_f64_corners([f64::NAN, f64::INFINITY, -3.7, 12.9]);
        assert_eq!(b.normalize(FRAME), BoundingBox::new(0, 12, 0, 539));
    }

    #[test]
    fn contains_is_inclusive_on_every_edge() {
        let b = BoundingBox::new(10, 20, 30, 40);
        for p in [
            Point::new(10, 25),
            Point::new(30, 25),
            Point::new(15, 20),
            Point::new(15, 40),
            Point::new(10, 20),
            Point::new(30, 40),
        ] {
            assert!(b.contains(p), "{:?} should be inside", p);
        }
        assert!(!b.contains(Point::new(9, 25)));
        assert!(!b.contains(Point::new(31, 25)));
        assert!(!b.contains(Point::new(15, 19)));
        assert!(!b.contains(Point::new(15, 41)));
    }

    #[test]
    fn centroid_uses_floor_division() {
        assert_eq!(BoundingBox::new(0, 0, 5, 7).centroid(), Point::new(2, 3));
        assert_eq!(BoundingBox::new(-5, -5, 0, 0).centroid(), Point::new(-3, -3));
    }

    #[test]
    fn serializes_as_flat_array() -> anyhow::Result<()> {
        let json = serde_json::to_string(&BoundingBox::new(1, 2, 3, 4))?;
        assert_eq!(json, "[1,2,3,4]");
        let back: BoundingBox = serde_json::from_str(&json)?;
        assert_eq!(back, BoundingBox::new(1, 2, 3, 4));
        Ok(())
    }
}
