//! Video file source and sink backed by OpenCV `videoio`

use super::{FrameSink, FrameSource, ProcessingSession, ProgressObserver, RunSummary, StreamInfo, StreamPipeline};
use crate::error::{PipelineError, Stage, StreamError};
use crate::frame::{ChannelOrder, Frame};
use crate::inference::InferenceBackend;
use opencv::{core, imgproc, prelude::*, videoio};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Decodes frames from a container file, BGR order
pub struct VideoFileSource {
    capture: videoio::VideoCapture,
    info: StreamInfo,
    path: PathBuf,
}

impl VideoFileSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let location = path
            .to_str()
            .ok_or_else(|| PipelineError::SourceOpen(format!("non UTF-8 path: {}", path.display())))?;

        let capture = videoio::VideoCapture::from_file(location, videoio::CAP_ANY)
            .map_err(|e| PipelineError::SourceOpen(format!("{}: {}", path.display(), e)))?;
        let opened = capture
            .is_opened()
            .map_err(|e| PipelineError::SourceOpen(format!("{}: {}", path.display(), e)))?;
        if !opened {
            return Err(PipelineError::SourceOpen(format!(
                "{}: container could not be opened",
                path.display()
            )));
        }

        let property = |id: i32| -> Result<f64, PipelineError> {
            capture
                .get(id)
                .map_err(|e| PipelineError::SourceOpen(format!("{}: {}", path.display(), e)))
        };
        let frame_rate = property(videoio::CAP_PROP_FPS)?;
        let width = property(videoio::CAP_PROP_FRAME_WIDTH)?;
        let height = property(videoio::CAP_PROP_FRAME_HEIGHT)?;
        let frame_count = property(videoio::CAP_PROP_FRAME_COUNT)?;

        let info = StreamInfo {
            frame_rate,
            width: width.max(0.0) as u32,
            height: height.max(0.0) as u32,
            frame_count: (frame_count > 0.0).then(|| frame_count.round() as u64),
        };
        debug!("Opened {} with {:?}", path.display(), info);

        Ok(Self {
            capture,
            info,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for VideoFileSource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        let mut mat = core::Mat::default();
        let grabbed = self
            .capture
            .read(&mut mat)
            .map_err(|e| PipelineError::Read(format!("{}: {}", self.path.display(), e)))?;

        if !grabbed || mat.rows() == 0 || mat.cols() == 0 {
            return Ok(None);
        }

        Frame::from_mat(mat, ChannelOrder::Bgr).map(Some)
    }
}

/// Encodes frames into a container file.
///
/// The partial file is removed unless the sink is closed successfully.
pub struct VideoFileSink {
    writer: videoio::VideoWriter,
    path: PathBuf,
    closed: bool,
}

impl VideoFileSink {
    /// Open a writer with the source's frame rate and dimensions
    pub fn create(
        path: impl AsRef<Path>,
        fourcc: [char; 4],
        info: &StreamInfo,
    ) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let location = path
            .to_str()
            .ok_or_else(|| PipelineError::SinkOpen(format!("non UTF-8 path: {}", path.display())))?;

        let code = videoio::VideoWriter::fourcc(fourcc[0], fourcc[1], fourcc[2], fourcc[3])
            .map_err(|e| PipelineError::SinkOpen(format!("invalid fourcc {:?}: {}", fourcc, e)))?;
        let size = core::Size::new(info.width as i32, info.height as i32);

        let writer = videoio::VideoWriter::new(location, code, info.frame_rate, size, true)
            .map_err(|e| PipelineError::SinkOpen(format!("{}: {}", path.display(), e)))?;
        let opened = writer
            .is_opened()
            .map_err(|e| PipelineError::SinkOpen(format!("{}: {}", path.display(), e)))?;
        if !opened {
            return Err(PipelineError::SinkOpen(format!(
                "{}: no encoder for fourcc {}",
                path.display(),
                fourcc.iter().collect::<String>()
            )));
        }

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for VideoFileSink {
    type Output = PathBuf;

    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        match frame.order() {
            ChannelOrder::Bgr => self
                .writer
                .write(frame.mat())
                .map_err(|e| PipelineError::Write(format!("encode failed: {}", e))),
            ChannelOrder::Rgb => {
                let mut bgr = core::Mat::default();
                imgproc::cvt_color_def(frame.mat(), &mut bgr, imgproc::COLOR_RGB2BGR)
                    .map_err(|e| PipelineError::Write(format!("color conversion failed: {}", e)))?;
                self.writer
                    .write(&bgr)
                    .map_err(|e| PipelineError::Write(format!("encode failed: {}", e)))
            }
        }
    }

    fn close(mut self) -> Result<PathBuf, PipelineError> {
        self.writer
            .release()
            .map_err(|e| PipelineError::Finalize(format!("{}: {}", self.path.display(), e)))?;
        self.closed = true;
        Ok(self.path.clone())
    }
}

impl Drop for VideoFileSink {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        let _ = self.writer.release();
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Could not remove partial output {}: {}", self.path.display(), e);
        } else {
            debug!("Removed partial output {}", self.path.display());
        }
    }
}

/// Process `input` into `output`, returning the written path
pub fn process_video_to_path<B: InferenceBackend>(
    input: &Path,
    output: &Path,
    fourcc: [char; 4],
    session: &mut ProcessingSession<B>,
    observer: &mut dyn ProgressObserver,
) -> Result<RunSummary<PathBuf>, StreamError> {
    info!("Processing {} -> {}", input.display(), output.display());
    StreamPipeline::run(
        || VideoFileSource::open(input),
        |info| VideoFileSink::create(output, fourcc, info),
        session,
        observer,
    )
}

/// Process `input` and return the encoded output bytes.
///
/// The output is staged in a temporary file that is removed afterwards.
pub fn process_video_file<B: InferenceBackend>(
    input: &Path,
    fourcc: [char; 4],
    session: &mut ProcessingSession<B>,
    observer: &mut dyn ProgressObserver,
) -> Result<RunSummary<Vec<u8>>, StreamError> {
    let staging = tempfile::Builder::new()
        .prefix("framesafe-")
        .suffix(".mp4")
        .tempfile()
        .map_err(|e| {
            StreamError::new(
                Stage::Open,
                PipelineError::SinkOpen(format!("temporary output: {}", e)),
            )
        })?;

    let summary = process_video_to_path(input, staging.path(), fourcc, session, observer)?;
    let bytes = std::fs::read(&summary.output).map_err(|e| {
        StreamError::new(
            Stage::Finalize,
            PipelineError::Finalize(format!("reading {}: {}", summary.output.display(), e)),
        )
    })?;

    Ok(RunSummary {
        frames: summary.frames,
        mitigated_frames: summary.mitigated_frames,
        metrics: summary.metrics,
        output: bytes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_fails_to_open() {
        match VideoFileSource::open("does/not/exist.mp4") {
            Err(PipelineError::SourceOpen(message)) => assert!(message.contains("exist.mp4")),
            Err(other) => panic!("Expected SourceOpen, got {}", other),
            Ok(_) => panic!("Expected SourceOpen error"),
        }
    }

    #[test]
    fn test_sink_into_missing_directory_fails_to_open() {
        let info = StreamInfo {
            frame_rate: 25.0,
            width: 64,
            height: 64,
            frame_count: None,
        };
        let result = VideoFileSink::create("no/such/dir/out.mp4", ['m', 'p', '4', 'v'], &info);
        assert!(matches!(result, Err(PipelineError::SinkOpen(_))));
    }
}
