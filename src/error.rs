//! Error types for the detection and mitigation pipeline
//!
//! Every stage either succeeds or fails with a [`PipelineError`]. The stream
//! pipeline wraps the first failure of a run in a [`StreamError`] that names
//! the failing [`Stage`] and, when known, the frame it happened on.

use crate::inference::InferenceError;
use std::fmt;
use thiserror::Error;

/// Errors raised by an individual pipeline stage
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not open video source: {0}")]
    SourceOpen(String),

    #[error("Could not open output sink: {0}")]
    SinkOpen(String),

    #[error("Invalid frame geometry: {width}x{height}")]
    InvalidFrame { width: u32, height: u32 },

    #[error("Model input shape unusable: {0}")]
    ModelShape(String),

    #[error("Inference failed: {0}")]
    Inference(#[from] InferenceError),

    #[error("Malformed model output: {0}")]
    Decode(String),

    #[error("Frame transform failed: {0}")]
    Transform(String),

    #[error("Mitigation failed: {0}")]
    Mitigate(String),

    #[error("Frame read failed: {0}")]
    Read(String),

    #[error("Frame write failed: {0}")]
    Write(String),

    #[error("Output finalisation failed: {0}")]
    Finalize(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

/// Result type alias for convenience
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Pipeline stage in which a run failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Read,
    Transform,
    Infer,
    Decode,
    Mitigate,
    Write,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Open => "open",
            Stage::Read => "read",
            Stage::Transform => "transform",
            Stage::Infer => "infer",
            Stage::Decode => "decode",
            Stage::Mitigate => "mitigate",
            Stage::Write => "write",
            Stage::Finalize => "finalize",
        };
        f.write_str(name)
    }
}

/// First unrecoverable error of a stream run
#[derive(Debug)]
pub struct StreamError {
    stage: Stage,
    frame: Option<u64>,
    cause: PipelineError,
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.frame {
            Some(index) => write!(
                f,
                "{} stage failed at frame {}: {}",
                self.stage, index, self.cause
            ),
            None => write!(f, "{} stage failed: {}", self.stage, self.cause),
        }
    }
}

impl std::error::Error for StreamError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

impl StreamError {
    pub fn new(stage: Stage, cause: PipelineError) -> Self {
        Self {
            stage,
            frame: None,
            cause,
        }
    }

    /// Attach the zero-based index of the frame being processed
    pub fn at_frame(mut self, index: u64) -> Self {
        self.frame = Some(index);
        self
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn frame(&self) -> Option<u64> {
        self.frame
    }

    pub fn cause(&self) -> &PipelineError {
        &self.cause
    }

    pub fn into_cause(self) -> PipelineError {
        self.cause
    }
}

/// Tag a stage result with the stage it came from
pub(crate) trait StageContext<T> {
    fn stage(self, stage: Stage) -> Result<T, StreamError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: Into<PipelineError>,
{
    fn stage(self, stage: Stage) -> Result<T, StreamError> {
        self.map_err(|e| StreamError::new(stage, e.into()))
    }
}
