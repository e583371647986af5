//! Detection data structures and utilities

use super::labels::Label;
use serde::Serialize;
use std::fmt;

/// Axis-aligned box in integer pixel coordinates, top-left origin
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl BoundingBox {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Area of the box; degenerate boxes have zero area
    pub fn area(&self) -> i64 {
        if self.width <= 0 || self.height <= 0 {
            return 0;
        }
        self.width as i64 * self.height as i64
    }

    /// Center point of the box
    pub fn center(&self) -> (f64, f64) {
        (
            self.x as f64 + self.width as f64 / 2.0,
            self.y as f64 + self.height as f64 / 2.0,
        )
    }

    /// Calculate Intersection over Union (IoU) with another box
    pub fn iou(&self, other: &BoundingBox) -> f64 {
        let x1 = self.x.max(other.x) as i64;
        let y1 = self.y.max(other.y) as i64;
        let x2 = (self.x as i64 + self.width as i64).min(other.x as i64 + other.width as i64);
        let y2 = (self.y as i64 + self.height as i64).min(other.y as i64 + other.height as i64);

        if x2 <= x1 || y2 <= y1 {
            return 0.0;
        }

        let intersection = (x2 - x1) * (y2 - y1);
        let union = self.area() + other.area() - intersection;
        if union <= 0 {
            return 0.0;
        }

        intersection as f64 / union as f64
    }

    /// Whether the box lies strictly inside a `width` x `height` frame.
    ///
    /// The far edges must stay below the frame dimensions, so a box touching
    /// the right or bottom border does not fit.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let (frame_w, frame_h) = (width as i64, height as i64);
        let (x, y) = (self.x as i64, self.y as i64);
        let (w, h) = (self.width as i64, self.height as i64);

        w > 0
            && h > 0
            && 0 <= x
            && x < frame_w
            && 0 <= y
            && y < frame_h
            && x + w < frame_w
            && y + h < frame_h
    }
}

/// A labeled, scored region in original-frame pixel space
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: Label,
    /// Confidence score (0.0 to 1.0)
    pub score: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(label: Label, score: f32, bbox: BoundingBox) -> Self {
        Self { label, score, bbox }
    }

    pub fn is_exposed(&self) -> bool {
        self.label.is_exposed()
    }
}

impl fmt::Display for Detection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Detection(label={}, score={:.2}, bbox=({}, {}, {}, {}))",
            self.label,
            self.score,
            self.bbox.x,
            self.bbox.y,
            self.bbox.width,
            self.bbox.height
        )
    }
}

/// Greedy non-maximum suppression over candidate boxes.
///
/// Candidates scoring at or below `score_threshold` are dropped. The rest are
/// stable-sorted by score (highest first, ties keep input order) and accepted
/// one by one; a candidate is suppressed when its IoU with an already accepted
/// box exceeds `iou_threshold`. Returns indices into `candidates` in
/// acceptance order.
pub fn apply_nms(candidates: &[Detection], score_threshold: f32, iou_threshold: f32) -> Vec<usize> {
    let mut order: Vec<usize> = (0..candidates.len())
        .filter(|&i| candidates[i].score > score_threshold)
        .collect();

    order.sort_by(|&a, &b| {
        candidates[b]
            .score
            .partial_cmp(&candidates[a].score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<usize> = Vec::new();
    for &index in &order {
        let suppressed = keep.iter().any(|&kept| {
            candidates[kept].bbox.iou(&candidates[index].bbox) > iou_threshold as f64
        });
        if !suppressed {
            keep.push(index);
        }
    }

    keep
}
