//! ML inference abstractions and implementations

use crate::error::PipelineError;
use crate::preprocessing::{Tensor, TargetSize};
use ndarray::ArrayD;
use thiserror::Error;

pub mod decoder;
pub mod ort_backend;

pub use decoder::{DecoderThresholds, DetectionDecoder, RowLayout};
pub use ort_backend::{Device, OrtBackend, OrtBackendBuilder};

/// Raw first output tensor of a detection model
#[derive(Debug, Clone)]
pub struct RawOutput {
    data: ArrayD<f32>,
}

impl RawOutput {
    pub fn new(data: ArrayD<f32>) -> Self {
        Self { data }
    }

    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    pub fn array(&self) -> &ArrayD<f32> {
        &self.data
    }
}

/// Model-execution backend: one tensor in, one raw output tensor out.
///
/// The input size is read once when a processing session is built and is
/// assumed constant for the lifetime of the backend.
pub trait InferenceBackend {
    /// Spatial size of the model input
    fn input_size(&self) -> Result<TargetSize, PipelineError>;

    /// Name of the input the tensor is bound to
    fn input_name(&self) -> &str;

    /// Run inference on a `1 x 3 x H x W` tensor
    fn run(&mut self, input: &Tensor) -> Result<RawOutput, InferenceError>;
}

impl<B: InferenceBackend + ?Sized> InferenceBackend for Box<B> {
    fn input_size(&self) -> Result<TargetSize, PipelineError> {
        (**self).input_size()
    }

    fn input_name(&self) -> &str {
        (**self).input_name()
    }

    fn run(&mut self, input: &Tensor) -> Result<RawOutput, InferenceError> {
        (**self).run(input)
    }
}

/// Spatial input size of a model declaring an `[N, C, H, W]` input
pub fn input_size_from_shape(shape: &[i64]) -> Result<TargetSize, PipelineError> {
    let [_, _, height, width] = shape else {
        return Err(PipelineError::ModelShape(format!(
            "expected a 4-D input, model declares {:?}",
            shape
        )));
    };

    match (u32::try_from(*width), u32::try_from(*height)) {
        (Ok(width), Ok(height)) => check_input_size(TargetSize::new(width, height)),
        _ => Err(PipelineError::ModelShape(format!(
            "input spatial dimensions are dynamic or invalid: {:?}",
            shape
        ))),
    }
}

/// Sizes the letterbox can lay out: both sides in `1..=i32::MAX`
pub fn check_input_size(size: TargetSize) -> Result<TargetSize, PipelineError> {
    let fits = |side: u32| side > 0 && i32::try_from(side).is_ok();
    if !fits(size.width) || !fits(size.height) {
        return Err(PipelineError::ModelShape(format!(
            "unusable model input size {}x{}",
            size.width, size.height
        )));
    }
    Ok(size)
}

/// Inference-related errors
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Inference failed: {0}")]
    InferenceFailed(String),

    #[error("Invalid input shape: expected {expected:?}, got {actual:?}")]
    InvalidInputShape {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("Invalid output format: {0}")]
    InvalidOutputFormat(String),

    #[error("ORT runtime error: {0}")]
    OrtError(String),
}
