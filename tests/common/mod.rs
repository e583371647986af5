//! Shared fixtures for integration tests

#![allow(dead_code)]

use framesafe::inference::{InferenceBackend, InferenceError, RawOutput};
use framesafe::pipeline::{FrameSink, FrameSource, MemorySink, StreamInfo};
use framesafe::{ChannelOrder, Frame, PipelineError, Tensor, TargetSize};
use ndarray::Array3;
use std::cell::RefCell;
use std::rc::Rc;

/// Columns per anchor row for the standard 18-label catalog
pub const ROW_WIDTH: usize = 4 + 18;

/// One anchor: (cx, cy, w, h), class index, score
pub type Row = ([f32; 4], usize, f32);

/// `[1, 22, anchors]` output with one anchor per row. Empty input yields a
/// single all-zero anchor.
pub fn anchors_last(rows: &[Row]) -> RawOutput {
    let anchors = rows.len().max(1);
    let mut data = Array3::<f32>::zeros((1, ROW_WIDTH, anchors));
    for (anchor, (bbox, class, score)) in rows.iter().enumerate() {
        for (i, v) in bbox.iter().enumerate() {
            data[[0, i, anchor]] = *v;
        }
        data[[0, 4 + class, anchor]] = *score;
    }
    RawOutput::new(data.into_dyn())
}

type Script = Box<dyn FnMut(usize) -> Result<RawOutput, InferenceError>>;

/// Backend that answers each call from a script keyed by call index
pub struct ScriptedBackend {
    size: TargetSize,
    calls: Rc<RefCell<usize>>,
    script: Script,
}

impl ScriptedBackend {
    pub fn new<F>(size: TargetSize, script: F) -> Self
    where
        F: FnMut(usize) -> Result<RawOutput, InferenceError> + 'static,
    {
        Self {
            size,
            calls: Rc::new(RefCell::new(0)),
            script: Box::new(script),
        }
    }

    /// Never detects anything
    pub fn silent(size: TargetSize) -> Self {
        Self::new(size, |_| Ok(anchors_last(&[])))
    }

    /// Detects `rows` on call `index` only
    pub fn detect_on(size: TargetSize, index: usize, rows: Vec<Row>) -> Self {
        Self::new(size, move |call| {
            if call == index {
                Ok(anchors_last(&rows))
            } else {
                Ok(anchors_last(&[]))
            }
        })
    }

    /// Shared call counter, readable after the backend moves into a session
    pub fn call_counter(&self) -> Rc<RefCell<usize>> {
        Rc::clone(&self.calls)
    }
}

impl InferenceBackend for ScriptedBackend {
    fn input_size(&self) -> Result<TargetSize, PipelineError> {
        Ok(self.size)
    }

    fn input_name(&self) -> &str {
        "images"
    }

    fn run(&mut self, input: &Tensor) -> Result<RawOutput, InferenceError> {
        let expected = [1, 3, self.size.height as usize, self.size.width as usize];
        if input.shape() != expected {
            return Err(InferenceError::InvalidInputShape {
                expected: expected.to_vec(),
                actual: input.shape().to_vec(),
            });
        }

        let call = {
            let mut calls = self.calls.borrow_mut();
            let call = *calls;
            *calls += 1;
            call
        };
        (self.script)(call)
    }
}

/// Black and white checkerboard with `cell`-pixel squares
pub fn checkerboard(width: u32, height: u32, cell: u32) -> Frame {
    let mut bytes = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let value = if ((x / cell) + (y / cell)) % 2 == 0 { 0 } else { 255 };
            bytes.extend_from_slice(&[value, value, value]);
        }
    }
    Frame::from_bytes(width, height, ChannelOrder::Bgr, &bytes).unwrap()
}

pub fn checkerboards(count: usize, width: u32, height: u32) -> Vec<Frame> {
    (0..count).map(|_| checkerboard(width, height, 8)).collect()
}

/// What happened to a [`TrackingSink`]
#[derive(Debug, Default)]
pub struct SinkLog {
    pub opened: bool,
    pub written: usize,
    pub closed: bool,
    pub discarded: bool,
}

/// Memory sink that records its lifecycle
pub struct TrackingSink {
    inner: MemorySink,
    log: Rc<RefCell<SinkLog>>,
}

impl TrackingSink {
    pub fn open(log: &Rc<RefCell<SinkLog>>) -> Self {
        log.borrow_mut().opened = true;
        Self {
            inner: MemorySink::new(),
            log: Rc::clone(log),
        }
    }
}

impl FrameSink for TrackingSink {
    type Output = Vec<Frame>;

    fn write_frame(&mut self, frame: &Frame) -> Result<(), PipelineError> {
        self.log.borrow_mut().written += 1;
        self.inner.write_frame(frame)
    }

    fn close(self) -> Result<Self::Output, PipelineError> {
        self.log.borrow_mut().closed = true;
        self.inner.close()
    }

    fn discard(self) {
        self.log.borrow_mut().discarded = true;
    }
}

/// Wraps a source and flags when it is released
pub struct TrackingSource<S> {
    inner: S,
    released: Rc<RefCell<bool>>,
}

impl<S> TrackingSource<S> {
    pub fn new(inner: S, released: &Rc<RefCell<bool>>) -> Self {
        Self {
            inner,
            released: Rc::clone(released),
        }
    }
}

impl<S: FrameSource> FrameSource for TrackingSource<S> {
    fn info(&self) -> &StreamInfo {
        self.inner.info()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>, PipelineError> {
        self.inner.next_frame()
    }
}

impl<S> Drop for TrackingSource<S> {
    fn drop(&mut self) {
        *self.released.borrow_mut() = true;
    }
}
