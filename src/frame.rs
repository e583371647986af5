//! Decoded video frames

use crate::error::PipelineError;
use opencv::{core, prelude::*};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Channel ordering of an 8-bit, 3-channel pixel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelOrder {
    Bgr,
    Rgb,
}

impl fmt::Display for ChannelOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelOrder::Bgr => write!(f, "bgr"),
            ChannelOrder::Rgb => write!(f, "rgb"),
        }
    }
}

/// A mutable height x width x 3 pixel grid, row-major, 8 bits per channel.
///
/// Frames decoded by OpenCV are BGR. The order travels with the pixels so the
/// transformer and the writer never have to guess.
pub struct Frame {
    mat: core::Mat,
    order: ChannelOrder,
}

impl Frame {
    /// Wrap an existing matrix. Non-empty matrices must be `CV_8UC3`.
    pub fn from_mat(mat: core::Mat, order: ChannelOrder) -> Result<Self, PipelineError> {
        let empty = mat.rows() == 0 || mat.cols() == 0;
        if !empty && mat.typ() != core::CV_8UC3 {
            return Err(PipelineError::InvalidFrame {
                width: mat.cols().max(0) as u32,
                height: mat.rows().max(0) as u32,
            });
        }
        Ok(Self { mat, order })
    }

    /// Create a black frame
    pub fn new(width: u32, height: u32, order: ChannelOrder) -> Result<Self, PipelineError> {
        let (cols, rows) = mat_dims(width, height)?;
        let mat = core::Mat::new_rows_cols_with_default(
            rows,
            cols,
            core::CV_8UC3,
            core::Scalar::all(0.0),
        )
        .map_err(|e| PipelineError::Transform(format!("failed to allocate frame: {}", e)))?;
        Ok(Self { mat, order })
    }

    /// Create a frame from packed row-major pixel bytes
    pub fn from_bytes(
        width: u32,
        height: u32,
        order: ChannelOrder,
        bytes: &[u8],
    ) -> Result<Self, PipelineError> {
        mat_dims(width, height)?;
        let expected = width as usize * height as usize * 3;
        if bytes.len() != expected {
            return Err(PipelineError::Transform(format!(
                "pixel buffer size mismatch: expected {}, got {}",
                expected,
                bytes.len()
            )));
        }

        let mut frame = Self::new(width, height, order)?;
        if expected > 0 {
            let data = frame
                .mat
                .data_bytes_mut()
                .map_err(|e| PipelineError::Transform(format!("frame not writable: {}", e)))?;
            data.copy_from_slice(bytes);
        }
        Ok(frame)
    }

    pub fn width(&self) -> u32 {
        self.mat.cols().max(0) as u32
    }

    pub fn height(&self) -> u32 {
        self.mat.rows().max(0) as u32
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    pub fn mat(&self) -> &core::Mat {
        &self.mat
    }

    pub fn mat_mut(&mut self) -> &mut core::Mat {
        &mut self.mat
    }

    pub fn into_mat(self) -> core::Mat {
        self.mat
    }

    /// Copy of the packed pixel bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        if self.is_empty() {
            return Ok(Vec::new());
        }
        if let Ok(data) = self.mat.data_bytes() {
            return Ok(data.to_vec());
        }

        // ROI views are not continuous; clone to pack the rows
        let packed = self
            .mat
            .try_clone()
            .map_err(|e| PipelineError::Transform(format!("failed to pack frame: {}", e)))?;
        let data = packed
            .data_bytes()
            .map_err(|e| PipelineError::Transform(format!("frame not readable: {}", e)))?;
        Ok(data.to_vec())
    }

    /// Pixel at (x, y) in the frame's own channel order
    pub fn pixel(&self, x: u32, y: u32) -> Result<[u8; 3], PipelineError> {
        let px = self
            .mat
            .at_2d::<core::Vec3b>(y as i32, x as i32)
            .map_err(|e| PipelineError::Transform(format!("pixel ({}, {}): {}", x, y, e)))?;
        Ok([px[0], px[1], px[2]])
    }

    /// Deep copy
    pub fn try_clone(&self) -> Result<Self, PipelineError> {
        let mat = self
            .mat
            .try_clone()
            .map_err(|e| PipelineError::Transform(format!("failed to clone frame: {}", e)))?;
        Ok(Self {
            mat,
            order: self.order,
        })
    }
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("order", &self.order)
            .finish()
    }
}

/// Matrix dimensions are `i32` in OpenCV
fn mat_dims(width: u32, height: u32) -> Result<(i32, i32), PipelineError> {
    match (i32::try_from(width), i32::try_from(height)) {
        (Ok(cols), Ok(rows)) => Ok((cols, rows)),
        _ => Err(PipelineError::InvalidFrame { width, height }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_black_frame_creation() {
        let frame = Frame::new(64, 48, ChannelOrder::Bgr).unwrap();
        assert_eq!(frame.width(), 64);
        assert_eq!(frame.height(), 48);
        assert_eq!(frame.order(), ChannelOrder::Bgr);
        assert!(frame.to_bytes().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_from_bytes_round_trip() {
        let bytes: Vec<u8> = (0..(4 * 2 * 3)).map(|i| i as u8).collect();
        let frame = Frame::from_bytes(4, 2, ChannelOrder::Rgb, &bytes).unwrap();

        assert_eq!(frame.to_bytes().unwrap(), bytes);
        assert_eq!(frame.pixel(1, 0).unwrap(), [3, 4, 5]);
        assert_eq!(frame.pixel(0, 1).unwrap(), [12, 13, 14]);
    }

    #[test]
    fn test_from_bytes_size_mismatch() {
        let result = Frame::from_bytes(4, 4, ChannelOrder::Bgr, &[0u8; 10]);
        assert!(matches!(result, Err(PipelineError::Transform(_))));
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        let too_wide = i32::MAX as u32 + 1;
        assert!(matches!(
            Frame::new(too_wide, 2, ChannelOrder::Bgr),
            Err(PipelineError::InvalidFrame { width, height: 2 }) if width == too_wide
        ));
        assert!(matches!(
            Frame::from_bytes(2, u32::MAX, ChannelOrder::Rgb, &[]),
            Err(PipelineError::InvalidFrame { width: 2, .. })
        ));
    }

    #[test]
    fn test_from_mat_rejects_single_channel() {
        let mat = core::Mat::new_rows_cols_with_default(4, 4, core::CV_8UC1, core::Scalar::all(0.0))
            .unwrap();
        let result = Frame::from_mat(mat, ChannelOrder::Bgr);
        assert!(matches!(
            result,
            Err(PipelineError::InvalidFrame {
                width: 4,
                height: 4
            })
        ));
    }

    #[test]
    fn test_empty_mat_is_representable() {
        let frame = Frame::from_mat(core::Mat::default(), ChannelOrder::Bgr).unwrap();
        assert!(frame.is_empty());
        assert!(frame.to_bytes().unwrap().is_empty());
    }
}
