//! In-memory frame source and sink

use super::{FrameSink, FrameSource, StreamInfo};
use crate::error::PipelineError;
use crate::frame::Frame;
use std::collections::VecDeque;

/// Serves a fixed list of frames
#[derive(Debug)]
pub struct MemorySource {
    info: StreamInfo,
    frames: VecDeque<Frame>,
}

impl MemorySource {
    /// Stream info is taken from the first frame; an empty list reports 0x0
    pub fn new(frames: Vec<Frame>, frame_rate: f64) -> Self {
        let (width, height) = frames
            .first()
            .map(|frame| (frame.width(), frame.height()))
            .unwrap_or((0, 0));
        let info = StreamInfo {
            frame_rate,
            width,
            height,
            frame_count: Some(frames.len() as u64),
        };
        Self::with_info(frames, info)
    }

    pub fn with_info(frames: Vec<Frame>, info: StreamInfo) -> Self {
        Self {
            info,
            frames: frames.into(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        Ok(self.frames.pop_front())
    }
}

/// Collects written frames
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Vec<Frame>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }
}

impl FrameSink for MemorySink {
    type Output = Vec<Frame>;

    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        self.frames.push(frame.try_clone()?);
        Ok(())
    }

    fn close(self) -> Result<Self::Output, PipelineError> {
        Ok(self.frames)
    }
}
