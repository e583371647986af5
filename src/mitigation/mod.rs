//! Blur decisions and in-place region blurring

use crate::config::ConfigError;
use crate::error::PipelineError;
use crate::frame::Frame;
use crate::utils::{Detection, Label};
use opencv::{core, imgproc, prelude::*};
use std::collections::HashMap;
use tracing::warn;

/// Which labels get blurred.
///
/// Defaults to every exposed label. Rules can only turn blurring off; covered
/// and face labels are never blurred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlurRules {
    rules: HashMap<Label, bool>,
}

impl BlurRules {
    pub fn new() -> Self {
        let rules = Label::ALL
            .iter()
            .map(|label| (*label, label.is_exposed()))
            .collect();
        Self { rules }
    }

    /// Default rules with blurring disabled for `labels`
    pub fn with_disabled(labels: &[Label]) -> Self {
        let mut rules = Self::new();
        for label in labels {
            rules.rules.insert(*label, false);
        }
        rules
    }

    /// Build from explicit label settings. Enabling a non-exposed label fails.
    pub fn from_overrides<I>(overrides: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (Label, bool)>,
    {
        let mut rules = Self::new();
        for (label, enabled) in overrides {
            if enabled && !label.is_exposed() {
                return Err(ConfigError::InvalidValue(format!(
                    "blurring cannot be enabled for non-exposed label {}",
                    label
                )));
            }
            rules.rules.insert(label, enabled);
        }
        Ok(rules)
    }

    pub fn is_enabled(&self, label: Label) -> bool {
        self.rules.get(&label).copied().unwrap_or(false)
    }
}

impl Default for BlurRules {
    fn default() -> Self {
        Self::new()
    }
}

/// Gaussian blur parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlurParams {
    kernel_size: i32,
    sigma: f64,
}

impl BlurParams {
    /// Kernel must be odd and positive, sigma positive
    pub fn new(kernel_size: i32, sigma: f64) -> Result<Self, ConfigError> {
        if kernel_size <= 0 || kernel_size % 2 == 0 {
            return Err(ConfigError::InvalidValue(format!(
                "blur kernel size must be a positive odd number, got {}",
                kernel_size
            )));
        }
        if !(sigma > 0.0) {
            return Err(ConfigError::InvalidValue(format!(
                "blur sigma must be positive, got {}",
                sigma
            )));
        }
        Ok(Self { kernel_size, sigma })
    }

    pub fn kernel_size(&self) -> i32 {
        self.kernel_size
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Default for BlurParams {
    fn default() -> Self {
        Self {
            kernel_size: 99,
            sigma: 30.0,
        }
    }
}

/// Outcome of mitigating one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MitigationReport {
    pub blurred: usize,
    /// Rule-enabled detections whose box did not fit inside the frame
    pub skipped: usize,
}

/// Decides whether a frame needs blurring and applies it
#[derive(Debug, Clone, Default)]
pub struct MitigationPolicy {
    rules: BlurRules,
    params: BlurParams,
}

impl MitigationPolicy {
    pub fn new(rules: BlurRules, params: BlurParams) -> Self {
        Self { rules, params }
    }

    pub fn rules(&self) -> &BlurRules {
        &self.rules
    }

    pub fn params(&self) -> BlurParams {
        self.params
    }

    fn applies_to(&self, detection: &Detection) -> bool {
        detection.is_exposed() && self.rules.is_enabled(detection.label)
    }

    /// True iff some detection is exposed and enabled in the rules
    pub fn should_mitigate(&self, detections: &[Detection]) -> bool {
        detections.iter().any(|d| self.applies_to(d))
    }

    /// Blur every applicable detection region of `frame` in place.
    ///
    /// Boxes not strictly inside the frame are skipped, never clamped. With no
    /// applicable detections the frame is left untouched.
    pub fn mitigate(
        &self,
        frame: &mut Frame,
        detections: &[Detection],
    ) -> Result<MitigationReport, PipelineError> {
        let (width, height) = (frame.width(), frame.height());
        let mut report = MitigationReport::default();

        for detection in detections.iter().filter(|d| self.applies_to(d)) {
            if !detection.bbox.fits_within(width, height) {
                warn!(
                    "Skipping {} outside {}x{} frame",
                    detection, width, height
                );
                report.skipped += 1;
                continue;
            }

            self.blur_region(frame, detection)?;
            report.blurred += 1;
        }

        Ok(report)
    }

    fn blur_region(&self, frame: &mut Frame, detection: &Detection) -> Result<(), PipelineError> {
        let bbox = detection.bbox;
        let rect = core::Rect::new(bbox.x, bbox.y, bbox.width, bbox.height);
        let kernel = core::Size::new(self.params.kernel_size, self.params.kernel_size);

        let region = frame
            .mat()
            .roi(rect)
            .and_then(|roi| roi.try_clone())
            .map_err(|e| PipelineError::Mitigate(format!("invalid region {:?}: {}", bbox, e)))?;

        let mut blurred = core::Mat::default();
        imgproc::gaussian_blur_def(&region, &mut blurred, kernel, self.params.sigma)
            .map_err(|e| PipelineError::Mitigate(format!("gaussian blur failed: {}", e)))?;

        let mut target = frame
            .mat_mut()
            .roi_mut(rect)
            .map_err(|e| PipelineError::Mitigate(format!("invalid region {:?}: {}", bbox, e)))?;
        blurred
            .copy_to(&mut target)
            .map_err(|e| PipelineError::Mitigate(format!("region copy failed: {}", e)))?;

        Ok(())
    }
}
