//! Frame to tensor preprocessing
//!
//! Letterboxes a decoded frame into the model's fixed input size and records
//! the inverse mapping needed to bring detections back to frame pixels.

use crate::error::PipelineError;
use crate::frame::{ChannelOrder, Frame};
use ndarray::Array4;
use opencv::{core, imgproc, prelude::*};
use rayon::prelude::*;

/// Spatial input size of the model, in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSize {
    pub width: u32,
    pub height: u32,
}

impl TargetSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(size: u32) -> Self {
        Self::new(size, size)
    }
}

/// Inverse mapping from model input space back to frame pixel space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformContext {
    pub resize_factor: f64,
    pub pad_left: i32,
    pub pad_top: i32,
}

impl TransformContext {
    /// Identity mapping, for frames already at the model's input size
    pub fn identity() -> Self {
        Self {
            resize_factor: 1.0,
            pad_left: 0,
            pad_top: 0,
        }
    }
}

/// Normalized `1 x 3 x H x W` float input tensor
#[derive(Debug, Clone)]
pub struct Tensor {
    data: Array4<f32>,
}

impl Tensor {
    pub fn new(data: Array4<f32>) -> Self {
        Self { data }
    }

    /// Shape as `[batch, channels, height, width]`
    pub fn shape(&self) -> [usize; 4] {
        let dims = self.data.dim();
        [dims.0, dims.1, dims.2, dims.3]
    }

    pub fn array(&self) -> &Array4<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array4<f32> {
        self.data
    }
}

/// Letterbox geometry for one source size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub new_width: i32,
    pub new_height: i32,
    pub pad_left: i32,
    pub pad_top: i32,
    pub resize_factor: f64,
}

impl Letterbox {
    /// Fit `width` x `height` inside `target` preserving aspect ratio.
    ///
    /// The scale-back factor is the ratio of the diagonals, which stays
    /// uniform when rounding makes the two axes scale slightly differently.
    pub fn compute(width: u32, height: u32, target: TargetSize) -> Self {
        let (w, h) = (width as f64, height as f64);
        let (tw, th) = (target.width as f64, target.height as f64);

        let scale = (tw / w).min(th / h);
        let new_width = ((w * scale).round() as i32).clamp(1, target.width as i32);
        let new_height = ((h * scale).round() as i32).clamp(1, target.height as i32);

        let (nw, nh) = (new_width as f64, new_height as f64);
        let resize_factor = ((w * w + h * h) / (nw * nw + nh * nh)).sqrt();

        Self {
            new_width,
            new_height,
            pad_left: (target.width as i32 - new_width) / 2,
            pad_top: (target.height as i32 - new_height) / 2,
            resize_factor,
        }
    }

    pub fn context(&self) -> TransformContext {
        TransformContext {
            resize_factor: self.resize_factor,
            pad_left: self.pad_left,
            pad_top: self.pad_top,
        }
    }
}

/// Converts frames into model input tensors
#[derive(Debug, Clone)]
pub struct FrameTransformer {
    target: TargetSize,
    model_order: ChannelOrder,
}

impl FrameTransformer {
    /// Create a transformer for a model input size and channel order
    pub fn new(target: TargetSize, model_order: ChannelOrder) -> Self {
        Self {
            target,
            model_order,
        }
    }

    pub fn target_size(&self) -> TargetSize {
        self.target
    }

    pub fn model_order(&self) -> ChannelOrder {
        self.model_order
    }

    /// Complete preprocessing: color order + letterbox + normalize + CHW layout
    pub fn transform(&self, frame: &Frame) -> Result<(Tensor, TransformContext), PipelineError> {
        if frame.is_empty() {
            return Err(PipelineError::InvalidFrame {
                width: frame.width(),
                height: frame.height(),
            });
        }

        let geometry = Letterbox::compute(frame.width(), frame.height(), self.target);
        let converted = self.convert_order(frame)?;
        let canvas = self.letterbox(&converted, &geometry)?;
        let tensor = self.to_tensor(&canvas)?;

        Ok((tensor, geometry.context()))
    }

    fn convert_order(&self, frame: &Frame) -> Result<core::Mat, PipelineError> {
        let code = match (frame.order(), self.model_order) {
            (ChannelOrder::Bgr, ChannelOrder::Rgb) => imgproc::COLOR_BGR2RGB,
            (ChannelOrder::Rgb, ChannelOrder::Bgr) => imgproc::COLOR_RGB2BGR,
            _ => {
                return frame.mat().try_clone().map_err(|e| {
                    PipelineError::Transform(format!("failed to copy frame: {}", e))
                })
            }
        };

        let mut converted = core::Mat::default();
        imgproc::cvt_color_def(frame.mat(), &mut converted, code)
            .map_err(|e| PipelineError::Transform(format!("color conversion failed: {}", e)))?;
        Ok(converted)
    }

    /// Resize into a black target-sized canvas at the padding offsets
    fn letterbox(&self, src: &core::Mat, geometry: &Letterbox) -> Result<core::Mat, PipelineError> {
        let mut dst = core::Mat::new_rows_cols_with_default(
            self.target.height as i32,
            self.target.width as i32,
            core::CV_8UC3,
            core::Scalar::all(0.0),
        )
        .map_err(|e| PipelineError::Transform(format!("failed to allocate canvas: {}", e)))?;

        let mut resized = core::Mat::default();
        imgproc::resize(
            src,
            &mut resized,
            core::Size::new(geometry.new_width, geometry.new_height),
            0.0,
            0.0,
            imgproc::INTER_LINEAR,
        )
        .map_err(|e| PipelineError::Transform(format!("resize failed: {}", e)))?;

        let roi_rect = core::Rect::new(
            geometry.pad_left,
            geometry.pad_top,
            geometry.new_width,
            geometry.new_height,
        );
        {
            let mut roi = dst.roi_mut(roi_rect).map_err(|e| {
                PipelineError::Transform(format!("invalid letterbox region: {}", e))
            })?;
            resized
                .copy_to(&mut roi)
                .map_err(|e| PipelineError::Transform(format!("letterbox copy failed: {}", e)))?;
        }

        Ok(dst)
    }

    /// Normalize to [0, 1] and reorder HWC bytes into a CHW tensor
    fn to_tensor(&self, canvas: &core::Mat) -> Result<Tensor, PipelineError> {
        let data = canvas
            .data_bytes()
            .map_err(|e| PipelineError::Transform(format!("canvas not readable: {}", e)))?;

        let height = self.target.height as usize;
        let width = self.target.width as usize;
        let plane = height * width;
        if data.len() != plane * 3 {
            return Err(PipelineError::Transform(format!(
                "canvas size mismatch: {} != {}",
                data.len(),
                plane * 3
            )));
        }

        let mut chw = vec![0.0f32; plane * 3];
        chw.par_chunks_mut(plane)
            .enumerate()
            .for_each(|(channel, out)| {
                for (pixel, value) in out.iter_mut().enumerate() {
                    *value = data[pixel * 3 + channel] as f32 / 255.0;
                }
            });

        let array = Array4::from_shape_vec((1, 3, height, width), chw)
            .map_err(|e| PipelineError::Transform(format!("failed to shape tensor: {}", e)))?;
        Ok(Tensor::new(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, bgr: [u8; 3]) -> Frame {
        let bytes: Vec<u8> = (0..width * height).flat_map(|_| bgr).collect();
        Frame::from_bytes(width, height, ChannelOrder::Bgr, &bytes).unwrap()
    }

    #[test]
    fn test_letterbox_geometry_wide_image() {
        let geometry = Letterbox::compute(1280, 720, TargetSize::square(320));
        assert_eq!(geometry.new_width, 320);
        assert_eq!(geometry.new_height, 180);
        assert_eq!(geometry.pad_left, 0);
        assert_eq!(geometry.pad_top, 70);

        let expected = ((1280.0f64.powi(2) + 720.0f64.powi(2)) / (320.0f64.powi(2) + 180.0f64.powi(2))).sqrt();
        assert!((geometry.resize_factor - expected).abs() < 1e-9);
        assert!((geometry.resize_factor - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_letterbox_geometry_tall_image() {
        let geometry = Letterbox::compute(480, 800, TargetSize::square(640));
        assert_eq!(geometry.new_width, 384);
        assert_eq!(geometry.new_height, 640);
        assert_eq!(geometry.pad_left, 128);
        assert_eq!(geometry.pad_top, 0);
    }

    #[test]
    fn test_letterbox_odd_deficit_floors_padding() {
        // 100x33 scales to 320x105.6, rounded to 106
        let geometry = Letterbox::compute(100, 33, TargetSize::square(320));
        assert_eq!(geometry.new_width, 320);
        assert_eq!(geometry.new_height, 106);
        assert_eq!(geometry.pad_top, 107);

        // 221 columns of padding split as 110 left, 111 right
        let geometry = Letterbox::compute(99, 320, TargetSize::square(320));
        assert_eq!(geometry.new_width, 99);
        assert_eq!(geometry.pad_left, 110);
    }

    #[test]
    fn test_square_frame_is_identity_mapping() {
        let geometry = Letterbox::compute(320, 320, TargetSize::square(320));
        assert_eq!(geometry.context(), TransformContext::identity());
    }

    #[test]
    fn test_transform_shape_and_range() {
        let transformer = FrameTransformer::new(TargetSize::square(64), ChannelOrder::Rgb);
        let frame = solid_frame(128, 72, [10, 20, 200]);

        let (tensor, context) = transformer.transform(&frame).unwrap();
        assert_eq!(tensor.shape(), [1, 3, 64, 64]);
        assert!(tensor.array().iter().all(|&x| (0.0..=1.0).contains(&x)));
        assert_eq!(context.pad_left, 0);
        assert_eq!(context.pad_top, 14);
    }

    #[test]
    fn test_transform_swaps_bgr_to_rgb() {
        let transformer = FrameTransformer::new(TargetSize::square(32), ChannelOrder::Rgb);
        let frame = solid_frame(32, 32, [0, 0, 255]); // pure red in BGR

        let (tensor, _) = transformer.transform(&frame).unwrap();
        let array = tensor.array();
        assert!((array[[0, 0, 16, 16]] - 1.0).abs() < 1e-6); // R
        assert_eq!(array[[0, 1, 16, 16]], 0.0); // G
        assert_eq!(array[[0, 2, 16, 16]], 0.0); // B
    }

    #[test]
    fn test_transform_padding_is_black() {
        let transformer = FrameTransformer::new(TargetSize::square(64), ChannelOrder::Rgb);
        let frame = solid_frame(128, 64, [255, 255, 255]);

        let (tensor, context) = transformer.transform(&frame).unwrap();
        assert_eq!(context.pad_top, 16);
        let array = tensor.array();
        for c in 0..3 {
            assert_eq!(array[[0, c, 0, 32]], 0.0);
            assert_eq!(array[[0, c, 63, 32]], 0.0);
            assert!((array[[0, c, 32, 32]] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_transform_rejects_empty_frame() {
        let transformer = FrameTransformer::new(TargetSize::square(64), ChannelOrder::Rgb);
        let frame = Frame::from_mat(core::Mat::default(), ChannelOrder::Bgr).unwrap();

        match transformer.transform(&frame) {
            Err(PipelineError::InvalidFrame { width, height }) => {
                assert_eq!((width, height), (0, 0));
            }
            other => panic!("Expected InvalidFrame, got {:?}", other.map(|_| ())),
        }
    }
}
