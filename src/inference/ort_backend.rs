//! ONNX Runtime backend implementation

use super::{input_size_from_shape, InferenceBackend, InferenceError, RawOutput};
use crate::error::PipelineError;
use crate::preprocessing::{TargetSize, Tensor};
use ort::{
    session::{builder::GraphOptimizationLevel, Session},
    value::TensorRef,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Execution device requested for the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    /// CoreML on Apple platforms when it loads, CPU otherwise
    #[default]
    Auto,
    Cpu,
    /// CoreML or fail; unavailable off Apple platforms
    CoreMl,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Auto => f.write_str("auto"),
            Device::Cpu => f.write_str("cpu"),
            Device::CoreMl => f.write_str("coreml"),
        }
    }
}

/// ONNX Runtime inference backend
pub struct OrtBackend {
    session: Session,
    input_name: String,
    /// Input dimensions as declared by the model, `-1` for dynamic axes
    input_shape: Vec<i64>,
    execution_provider: &'static str,
}

impl fmt::Debug for OrtBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrtBackend")
            .field("input_name", &self.input_name)
            .field("input_shape", &self.input_shape)
            .field("execution_provider", &self.execution_provider)
            .finish()
    }
}

impl OrtBackend {
    /// Load a model with default settings
    pub fn load(model_path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        OrtBackendBuilder::new(model_path.as_ref()).build()
    }

    pub fn builder(model_path: impl Into<PathBuf>) -> OrtBackendBuilder {
        OrtBackendBuilder::new(model_path)
    }

    /// Provider the session actually runs on, `CoreML` or `CPU`
    pub fn execution_provider(&self) -> &'static str {
        self.execution_provider
    }

    pub fn input_shape(&self) -> &[i64] {
        &self.input_shape
    }

    fn create_session(
        model_path: &Path,
        device: Device,
        intra_threads: usize,
    ) -> Result<(Session, &'static str), InferenceError> {
        let session_builder = Session::builder()
            .map_err(|e| {
                InferenceError::OrtError(format!("Failed to create session builder: {}", e))
            })?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(|e| {
                InferenceError::OrtError(format!("Failed to set optimization level: {}", e))
            })?
            .with_intra_threads(intra_threads)
            .map_err(|e| InferenceError::OrtError(format!("Failed to set intra threads: {}", e)))?;

        #[cfg(target_vendor = "apple")]
        if device != Device::Cpu {
            use ort::execution_providers::CoreMLExecutionProvider;

            info!("Attempting to create session with CoreML execution provider");
            let coreml_session = session_builder
                .clone()
                .with_execution_providers([CoreMLExecutionProvider::default().build()]);

            match coreml_session {
                Ok(mut builder) => match builder.commit_from_file(model_path) {
                    Ok(session) => {
                        info!("Successfully created session with CoreML execution provider");
                        return Ok((session, "CoreML"));
                    }
                    Err(e) if device == Device::Auto => {
                        tracing::warn!(
                            "Failed to load model with CoreML execution provider: {}. Falling back to CPU",
                            e
                        );
                    }
                    Err(e) => {
                        return Err(InferenceError::ModelLoadError(format!(
                            "Failed to load model with CoreML provider: {}",
                            e
                        )))
                    }
                },
                Err(e) if device == Device::Auto => {
                    tracing::warn!(
                        "Failed to configure CoreML execution provider: {}. Falling back to CPU",
                        e
                    );
                }
                Err(e) => {
                    return Err(InferenceError::OrtError(format!(
                        "Failed to configure CoreML execution provider: {}",
                        e
                    )))
                }
            }
        }

        #[cfg(not(target_vendor = "apple"))]
        if device == Device::CoreMl {
            return Err(InferenceError::ModelLoadError(
                "CoreML execution provider is only available on Apple platforms".to_string(),
            ));
        }

        info!("Creating session with CPU execution provider");
        let mut session_builder = session_builder;
        let session = session_builder.commit_from_file(model_path).map_err(|e| {
            InferenceError::ModelLoadError(format!("Failed to load model with CPU provider: {}", e))
        })?;

        Ok((session, "CPU"))
    }
}

impl InferenceBackend for OrtBackend {
    fn input_size(&self) -> Result<TargetSize, PipelineError> {
        input_size_from_shape(&self.input_shape)
    }

    fn input_name(&self) -> &str {
        &self.input_name
    }

    fn run(&mut self, input: &Tensor) -> Result<RawOutput, InferenceError> {
        let inference_start = Instant::now();

        let input_tensor = TensorRef::from_array_view(input.array().view()).map_err(|e| {
            InferenceError::OrtError(format!("Failed to create input tensor: {}", e))
        })?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_tensor])
            .map_err(|e| InferenceError::InferenceFailed(format!("Session run failed: {}", e)))?;

        let mut output_values = outputs.values();
        let first_output = output_values.next().ok_or_else(|| {
            InferenceError::InvalidOutputFormat("No outputs received from model".to_string())
        })?;

        let output_array = first_output.try_extract_array::<f32>().map_err(|e| {
            InferenceError::OrtError(format!("Failed to extract output tensor: {}", e))
        })?;
        let data = output_array.to_owned();

        debug!(
            "inference_time_ms={:.2} execution_provider={} output_shape={:?}",
            inference_start.elapsed().as_secs_f64() * 1000.0,
            self.execution_provider,
            data.shape()
        );

        Ok(RawOutput::new(data))
    }
}

/// Builder for ORT backend configuration
#[derive(Debug, Clone)]
pub struct OrtBackendBuilder {
    model_path: PathBuf,
    device: Device,
    intra_threads: usize,
}

impl OrtBackendBuilder {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            device: Device::Auto,
            intra_threads: 4,
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Threads used within a single operator
    pub fn with_intra_threads(mut self, threads: usize) -> Self {
        self.intra_threads = threads.max(1);
        self
    }

    /// Load the model and read its input name and shape
    pub fn build(self) -> Result<OrtBackend, InferenceError> {
        if !self.model_path.exists() {
            return Err(InferenceError::ModelLoadError(format!(
                "Model file does not exist: {}",
                self.model_path.display()
            )));
        }

        let (session, execution_provider) =
            OrtBackend::create_session(&self.model_path, self.device, self.intra_threads)?;

        let input = session.inputs().first().ok_or_else(|| {
            InferenceError::ModelLoadError("Model declares no inputs".to_string())
        })?;
        let input_name = input.name().to_string();
        let input_shape: Vec<i64> = input
            .dtype()
            .tensor_shape()
            .map(|shape| shape.iter().copied().collect())
            .ok_or_else(|| {
                InferenceError::ModelLoadError(format!("Input '{}' is not a tensor", input_name))
            })?;

        info!(
            "Loaded model {} (input '{}' {:?}, provider {})",
            self.model_path.display(),
            input_name,
            input_shape,
            execution_provider
        );

        Ok(OrtBackend {
            session,
            input_name,
            input_shape,
            execution_provider,
        })
    }
}
