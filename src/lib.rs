//! Framesafe
//!
//! Frame-by-frame detection of exposed body regions in video with an ONNX
//! object-detection model, irreversible Gaussian blurring of those regions,
//! and re-encoding through OpenCV.

pub mod config;
pub mod error;
pub mod frame;
pub mod inference;
pub mod metrics;
pub mod mitigation;
pub mod pipeline;
pub mod preprocessing;
pub mod utils;

// Re-export commonly used types
pub use config::{AppConfig, ConfigError};
pub use error::{PipelineError, PipelineResult, Stage, StreamError};
pub use frame::{ChannelOrder, Frame};
pub use inference::{
    DetectionDecoder, InferenceBackend, InferenceError, OrtBackend, RawOutput,
};
pub use metrics::{FrameTimer, RunMetrics};
pub use mitigation::{BlurParams, BlurRules, MitigationPolicy, MitigationReport};
pub use pipeline::{
    FrameSink, FrameSource, ProcessingSession, ProgressEvent, ProgressObserver, RunSummary,
    StreamInfo, StreamPipeline,
};
pub use preprocessing::{FrameTransformer, TargetSize, Tensor, TransformContext};
pub use utils::{BoundingBox, Detection, Label, LabelCatalog};

/// Current version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
