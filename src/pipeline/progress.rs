//! One-way progress reporting

use std::sync::mpsc;

/// Progress after a frame has been written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressEvent {
    /// Frames written so far
    pub processed: u64,
    /// Expected frame count, when the source reports one
    pub total: Option<u64>,
    /// `processed * 100 / total`, capped at 100
    pub percent: Option<u8>,
}

impl ProgressEvent {
    pub fn new(processed: u64, total: Option<u64>) -> Self {
        let percent = total
            .filter(|&total| total > 0)
            .map(|total| (processed.saturating_mul(100) / total).min(100) as u8);
        Self {
            processed,
            total,
            percent,
        }
    }
}

/// Receives progress events. Observers cannot influence the run.
pub trait ProgressObserver {
    fn on_progress(&mut self, event: ProgressEvent);
}

/// Ignore progress
impl ProgressObserver for () {
    fn on_progress(&mut self, _event: ProgressEvent) {}
}

impl<F> ProgressObserver for F
where
    F: FnMut(ProgressEvent),
{
    fn on_progress(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// Forward events to another thread; a hung-up receiver is ignored
impl ProgressObserver for mpsc::Sender<ProgressEvent> {
    fn on_progress(&mut self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}
