//! Frame-sequential detect, blur and re-encode pipeline
//!
//! A run pulls frames from a [`FrameSource`], passes each through the
//! [`ProcessingSession`] (transform, infer, decode, mitigate) and writes it to
//! a [`FrameSink`]. The first stage failure aborts the run: the sink is
//! discarded, the source released and a [`StreamError`] naming the stage is
//! returned.

use crate::config::AppConfig;
use crate::error::{PipelineError, Stage, StageContext, StreamError};
use crate::frame::{ChannelOrder, Frame};
use crate::inference::{check_input_size, DetectionDecoder, InferenceBackend};
use crate::metrics::{as_ms, FrameTimer, RunMetrics};
use crate::mitigation::{MitigationPolicy, MitigationReport};
use crate::preprocessing::FrameTransformer;
use crate::utils::Detection;
use tracing::{debug, error, info};

pub mod memory;
pub mod progress;
pub mod video_io;

pub use memory::{MemorySink, MemorySource};
pub use progress::{ProgressEvent, ProgressObserver};
pub use video_io::{process_video_file, process_video_to_path, VideoFileSink, VideoFileSource};

/// Properties of a decoded stream, copied to the output
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    /// `None` when the container does not report a count
    pub frame_count: Option<u64>,
}

/// Ordered supply of decoded frames
pub trait FrameSource {
    fn info(&self) -> &StreamInfo;

    /// Next frame, or `None` at end of stream
    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError>;
}

/// Ordered consumer of processed frames
pub trait FrameSink {
    type Output;

    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError>;

    /// Finalize the output
    fn close(self) -> Result<Self::Output, PipelineError>
    where
        Self: Sized;

    /// Abandon the output after a failure
    fn discard(self)
    where
        Self: Sized,
    {
        drop(self);
    }
}

/// Result of processing a single frame
#[derive(Debug, Clone)]
pub struct FrameOutcome {
    pub index: u64,
    pub detections: Vec<Detection>,
    pub mitigated: bool,
    pub report: MitigationReport,
}

/// Model, transformer, decoder and policy reused across frames
pub struct ProcessingSession<B> {
    backend: B,
    transformer: FrameTransformer,
    decoder: DetectionDecoder,
    policy: MitigationPolicy,
    metrics: RunMetrics,
}

impl<B: InferenceBackend> ProcessingSession<B> {
    /// Reads the backend's input size once
    pub fn new(
        backend: B,
        model_order: ChannelOrder,
        decoder: DetectionDecoder,
        policy: MitigationPolicy,
    ) -> Result<Self, PipelineError> {
        let target = check_input_size(backend.input_size()?)?;
        info!(
            "Processing session ready: input '{}' {}x{}, {} labels",
            backend.input_name(),
            target.width,
            target.height,
            decoder.catalog().len()
        );

        Ok(Self {
            backend,
            transformer: FrameTransformer::new(target, model_order),
            decoder,
            policy,
            metrics: RunMetrics::new(),
        })
    }

    pub fn from_config(backend: B, config: &AppConfig) -> Result<Self, PipelineError> {
        Self::new(
            backend,
            config.preprocessing.channel_order,
            config.decoder()?,
            config.mitigation_policy()?,
        )
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn transformer(&self) -> &FrameTransformer {
        &self.transformer
    }

    pub fn metrics(&self) -> &RunMetrics {
        &self.metrics
    }

    pub fn reset_metrics(&mut self) {
        self.metrics.reset();
    }

    /// Detect and, when needed, blur one frame in place
    pub fn process_frame(&mut self, frame: &mut Frame, index: u64) -> Result<FrameOutcome, StreamError> {
        let mut timer = FrameTimer::start();

        let (tensor, context) = self
            .transformer
            .transform(frame)
            .stage(Stage::Transform)
            .map_err(|e| e.at_frame(index))?;
        let transform_time = timer.lap();

        let output = self
            .backend
            .run(&tensor)
            .stage(Stage::Infer)
            .map_err(|e| e.at_frame(index))?;
        let inference_time = timer.lap();

        let detections = self
            .decoder
            .decode(&output, &context)
            .stage(Stage::Decode)
            .map_err(|e| e.at_frame(index))?;
        let decode_time = timer.lap();

        let mitigated = self.policy.should_mitigate(&detections);
        let report = if mitigated {
            self.policy
                .mitigate(frame, &detections)
                .stage(Stage::Mitigate)
                .map_err(|e| e.at_frame(index))?
        } else {
            MitigationReport::default()
        };
        let mitigate_time = timer.lap();

        self.metrics.frames_processed += 1;
        self.metrics.detections += detections.len() as u64;
        self.metrics.regions_blurred += report.blurred as u64;
        self.metrics.regions_skipped += report.skipped as u64;
        if mitigated {
            self.metrics.frames_mitigated += 1;
        }
        let timings = &mut self.metrics.timings;
        timings.transform_ms += as_ms(transform_time);
        timings.inference_ms += as_ms(inference_time);
        timings.decode_ms += as_ms(decode_time);
        timings.mitigate_ms += as_ms(mitigate_time);

        debug!(
            "frame={} detections={} mitigated={} transform_ms={:.2} inference_ms={:.2} decode_ms={:.2} mitigate_ms={:.2}",
            index,
            detections.len(),
            mitigated,
            as_ms(transform_time),
            as_ms(inference_time),
            as_ms(decode_time),
            as_ms(mitigate_time)
        );

        Ok(FrameOutcome {
            index,
            detections,
            mitigated,
            report,
        })
    }
}

/// Lifecycle of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Opened,
    Streaming,
    Finalized,
    Failed,
}

/// Outcome of a successful run
#[derive(Debug)]
pub struct RunSummary<T> {
    pub frames: u64,
    pub mitigated_frames: u64,
    pub metrics: RunMetrics,
    pub output: T,
}

/// Opens and drives runs
pub struct StreamPipeline;

impl StreamPipeline {
    /// Acquire the source, then the sink configured from the source's info.
    ///
    /// A sink that fails to open releases the already open source.
    pub fn open<'a, S, K, B, FS, FK>(
        open_source: FS,
        open_sink: FK,
        session: &'a mut ProcessingSession<B>,
        observer: &'a mut dyn ProgressObserver,
    ) -> Result<ActiveStream<'a, S, K, B>, StreamError>
    where
        S: FrameSource,
        K: FrameSink,
        B: InferenceBackend,
        FS: FnOnce() -> Result<S, PipelineError>,
        FK: FnOnce(&StreamInfo) -> Result<K, PipelineError>,
    {
        let source = open_source().stage(Stage::Open)?;
        let info = source.info().clone();
        if info.width == 0 || info.height == 0 {
            return Err(StreamError::new(
                Stage::Open,
                PipelineError::InvalidFrame {
                    width: info.width,
                    height: info.height,
                },
            ));
        }

        let sink = open_sink(&info).stage(Stage::Open)?;

        info!(
            "Stream opened: {}x{} @ {:.2} fps, {} frames",
            info.width,
            info.height,
            info.frame_rate,
            info.frame_count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string())
        );

        session.reset_metrics();
        Ok(ActiveStream {
            source: Some(source),
            sink: Some(sink),
            info,
            session,
            observer,
            state: PipelineState::Opened,
            processed: 0,
            mitigated: 0,
        })
    }

    /// Open, process every frame, then finalize the sink
    pub fn run<'a, S, K, B, FS, FK>(
        open_source: FS,
        open_sink: FK,
        session: &'a mut ProcessingSession<B>,
        observer: &'a mut dyn ProgressObserver,
    ) -> Result<RunSummary<K::Output>, StreamError>
    where
        S: FrameSource,
        K: FrameSink,
        B: InferenceBackend,
        FS: FnOnce() -> Result<S, PipelineError>,
        FK: FnOnce(&StreamInfo) -> Result<K, PipelineError>,
    {
        let mut stream = Self::open(open_source, open_sink, session, observer)?;
        while stream.step()?.is_some() {}
        stream.finish()
    }
}

/// An opened run. Dropping it before [`ActiveStream::finish`] discards the
/// sink and releases the source.
pub struct ActiveStream<'a, S, K, B>
where
    S: FrameSource,
    K: FrameSink,
{
    source: Option<S>,
    sink: Option<K>,
    info: StreamInfo,
    session: &'a mut ProcessingSession<B>,
    observer: &'a mut dyn ProgressObserver,
    state: PipelineState,
    processed: u64,
    mitigated: u64,
}

impl<'a, S, K, B> ActiveStream<'a, S, K, B>
where
    S: FrameSource,
    K: FrameSink,
    B: InferenceBackend,
{
    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Frames written so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Process the next frame. `Ok(None)` at end of stream or after a failure.
    pub fn step(&mut self) -> Result<Option<FrameOutcome>, StreamError> {
        if self.sink.is_none() {
            return Ok(None);
        }
        let index = self.processed;

        let next = match self.source.as_mut() {
            Some(source) => source.next_frame(),
            None => return Ok(None),
        };
        let mut frame = match next.stage(Stage::Read) {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(None),
            Err(e) => return Err(self.fail(e.at_frame(index))),
        };
        self.state = PipelineState::Streaming;

        let outcome = match self.session.process_frame(&mut frame, index) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(e)),
        };

        if let Err(e) = self.write(&frame) {
            return Err(self.fail(e.at_frame(index)));
        }

        self.processed += 1;
        if outcome.mitigated {
            self.mitigated += 1;
        }
        self.observer
            .on_progress(ProgressEvent::new(self.processed, self.info.frame_count));

        Ok(Some(outcome))
    }

    /// Finalize the sink with the frames written so far
    pub fn finish(mut self) -> Result<RunSummary<K::Output>, StreamError> {
        self.source.take();

        let sink = self.sink.take().ok_or_else(|| {
            StreamError::new(
                Stage::Finalize,
                PipelineError::Finalize("stream has already failed".to_string()),
            )
        })?;

        match sink.close() {
            Ok(output) => {
                self.state = PipelineState::Finalized;
                let metrics = self.session.metrics().clone();
                info!(
                    "Stream finalized: {} frames, {} mitigated",
                    self.processed, self.mitigated
                );
                metrics.log_summary();

                Ok(RunSummary {
                    frames: self.processed,
                    mitigated_frames: self.mitigated,
                    metrics,
                    output,
                })
            }
            Err(e) => {
                self.state = PipelineState::Failed;
                error!("Failed to finalize output: {}", e);
                Err(StreamError::new(Stage::Finalize, e))
            }
        }
    }

    fn write(&mut self, frame: &Frame) -> Result<(), StreamError> {
        if frame.width() != self.info.width || frame.height() != self.info.height {
            return Err(StreamError::new(
                Stage::Write,
                PipelineError::InvalidFrame {
                    width: frame.width(),
                    height: frame.height(),
                },
            ));
        }

        match self.sink.as_mut() {
            Some(sink) => sink.write_frame(frame).stage(Stage::Write),
            None => Err(StreamError::new(
                Stage::Write,
                PipelineError::Write("sink is closed".to_string()),
            )),
        }
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        self.state = PipelineState::Failed;
        if let Some(sink) = self.sink.take() {
            sink.discard();
        }
        self.source.take();
        error!("Stream aborted: {}", error);
        error
    }
}

impl<'a, S, K, B> Drop for ActiveStream<'a, S, K, B>
where
    S: FrameSource,
    K: FrameSink,
{
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            debug!("Stream dropped before finish, discarding output");
            sink.discard();
        }
    }
}
