//! Raw model output to pixel-space detections
//!
//! Each candidate anchor is a row of `4 + N` values: center x, center y,
//! width, height (model input pixels) followed by one score per catalog
//! label. Only the row parsing depends on the model family; thresholding,
//! scale-back and suppression work on parsed candidates.

use super::RawOutput;
use crate::error::PipelineError;
use crate::preprocessing::TransformContext;
use crate::utils::{apply_nms, BoundingBox, Detection, LabelCatalog};
use ndarray::{ArrayView2, Axis, Ix2};
use serde::{Deserialize, Serialize};

/// Where the anchor axis sits in the model output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowLayout {
    /// `[1, 4 + N, anchors]`, the YOLOv8 export layout
    #[default]
    AnchorsLast,
    /// `[1, anchors, 4 + N]`
    AnchorsFirst,
}

/// Filtering and suppression thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DecoderThresholds {
    /// Rows whose best class score is below this are dropped before suppression
    pub confidence: f32,
    /// Suppression ignores candidates scoring at or below this
    pub score: f32,
    /// Overlap above which the lower-scoring box is suppressed
    pub iou: f32,
}

impl Default for DecoderThresholds {
    fn default() -> Self {
        Self {
            confidence: 0.2,
            score: 0.25,
            iou: 0.45,
        }
    }
}

/// Turns raw model output into deduplicated detections
#[derive(Debug, Clone)]
pub struct DetectionDecoder {
    catalog: LabelCatalog,
    thresholds: DecoderThresholds,
    layout: RowLayout,
}

impl DetectionDecoder {
    pub fn new(catalog: LabelCatalog, thresholds: DecoderThresholds, layout: RowLayout) -> Self {
        Self {
            catalog,
            thresholds,
            layout,
        }
    }

    /// Standard catalog, default thresholds, YOLOv8 layout
    pub fn standard() -> Self {
        Self::new(
            LabelCatalog::standard(),
            DecoderThresholds::default(),
            RowLayout::AnchorsLast,
        )
    }

    pub fn catalog(&self) -> &LabelCatalog {
        &self.catalog
    }

    pub fn thresholds(&self) -> DecoderThresholds {
        self.thresholds
    }

    pub fn layout(&self) -> RowLayout {
        self.layout
    }

    /// Decode one frame's output. Order follows suppression acceptance.
    pub fn decode(
        &self,
        output: &RawOutput,
        context: &TransformContext,
    ) -> Result<Vec<Detection>, PipelineError> {
        let rows = self.rows(output)?;
        let candidates = self.candidates(rows, context);

        let keep = apply_nms(&candidates, self.thresholds.score, self.thresholds.iou);
        Ok(keep.into_iter().map(|i| candidates[i].clone()).collect())
    }

    /// View the output as one row per anchor
    fn rows<'a>(&self, output: &'a RawOutput) -> Result<ArrayView2<'a, f32>, PipelineError> {
        let view = output.array().view();
        let matrix = match view.ndim() {
            3 => {
                if view.shape()[0] != 1 {
                    return Err(PipelineError::Decode(format!(
                        "expected batch size 1, got shape {:?}",
                        view.shape()
                    )));
                }
                view.index_axis_move(Axis(0), 0)
            }
            2 => view,
            _ => {
                return Err(PipelineError::Decode(format!(
                    "expected a 2-D or 3-D output, got shape {:?}",
                    output.shape()
                )))
            }
        };

        let matrix = matrix
            .into_dimensionality::<Ix2>()
            .map_err(|e| PipelineError::Decode(format!("output is not a matrix: {}", e)))?;
        let rows = match self.layout {
            RowLayout::AnchorsLast => matrix.reversed_axes(),
            RowLayout::AnchorsFirst => matrix,
        };

        let expected = 4 + self.catalog.len();
        if rows.ncols() != expected {
            return Err(PipelineError::Decode(format!(
                "row width {} does not match 4 box values + {} labels (output shape {:?})",
                rows.ncols(),
                self.catalog.len(),
                output.shape()
            )));
        }

        Ok(rows)
    }

    /// Confidence pre-filter and scale-back to frame pixels
    fn candidates(&self, rows: ArrayView2<'_, f32>, context: &TransformContext) -> Vec<Detection> {
        let mut candidates = Vec::new();

        for row in rows.outer_iter() {
            let mut best_class = 0usize;
            let mut best_score = f32::NEG_INFINITY;
            for (class_index, &score) in row.iter().skip(4).enumerate() {
                if score > best_score {
                    best_score = score;
                    best_class = class_index;
                }
            }

            if !(best_score >= self.thresholds.confidence) {
                continue;
            }

            let Some(label) = self.catalog.get(best_class) else {
                continue;
            };

            let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
            let factor = context.resize_factor;
            let bbox = BoundingBox::new(
                to_pixel((cx - w * 0.5 - context.pad_left as f64) * factor),
                to_pixel((cy - h * 0.5 - context.pad_top as f64) * factor),
                to_pixel(w * factor),
                to_pixel(h * factor),
            );

            candidates.push(Detection::new(label, best_score, bbox));
        }

        candidates
    }
}

impl Default for DetectionDecoder {
    fn default() -> Self {
        Self::standard()
    }
}

/// Round half to even, saturating at the i32 range
fn to_pixel(value: f64) -> i32 {
    value.round_ties_even() as i32
}
