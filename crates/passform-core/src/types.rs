// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Passform: frames, features, matches, per-cycle results
// and the analyzer diagnostics snapshot.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PassformError, RejectionReason, Result};

/// A 2D point in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// Axis-aligned rectangle. Also used as the on-screen alignment guide.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Whether `p` lies inside the rectangle grown by `margin` on every side.
    pub fn contains_with_margin(&self, p: &Point, margin: f64) -> bool {
        p.x >= self.x - margin
            && p.x <= self.right() + margin
            && p.y >= self.y - margin
            && p.y <= self.bottom() + margin
    }

    /// Smallest rectangle enclosing all points. `None` for an empty slice.
    pub fn bounding(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

/// Guide rectangle the user is asked to align the document within.
pub type OverlayRect = Rect;

/// Pixel layout of a camera buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// One byte per pixel.
    Gray8,
    /// Packed RGB, three bytes per pixel.
    Rgb8,
    /// Packed RGBA, four bytes per pixel.
    Rgba8,
    /// Planar YUV 4:2:0 (NV21/I420 style). Only the leading luma plane is read.
    Yuv420,
}

impl PixelFormat {
    /// Minimum buffer length for a `width` x `height` frame.
    pub fn required_len(&self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            Self::Gray8 => pixels,
            Self::Rgb8 => pixels * 3,
            Self::Rgba8 => pixels * 4,
            Self::Yuv420 => pixels + pixels / 2,
        }
    }
}

/// Clockwise rotation needed to bring a frame upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Map a sensor orientation in degrees to the nearest quarter turn.
    pub fn from_degrees(degrees: i32) -> Self {
        match (degrees.rem_euclid(360) + 45) / 90 % 4 {
            1 => Self::Deg90,
            2 => Self::Deg180,
            3 => Self::Deg270,
            _ => Self::Deg0,
        }
    }

    /// Whether applying this rotation swaps width and height.
    pub fn swaps_axes(&self) -> bool {
        matches!(self, Self::Deg90 | Self::Deg270)
    }
}

/// One raw camera frame. Consumed by a single analysis cycle.
#[derive(Debug, Clone)]
pub struct FrameSample {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub rotation: Rotation,
    /// Monotonic capture time.
    pub timestamp: Instant,
}

impl FrameSample {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            pixels,
            width,
            height,
            format,
            rotation: Rotation::Deg0,
            timestamp: Instant::now(),
        }
    }

    /// Convenience constructor for single-channel buffers.
    pub fn gray(pixels: Vec<u8>, width: u32, height: u32) -> Self {
        Self::new(pixels, width, height, PixelFormat::Gray8)
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    /// Frame size after rotation metadata is applied.
    pub fn upright_size(&self) -> (u32, u32) {
        if self.rotation.swaps_axes() {
            (self.height, self.width)
        } else {
            (self.width, self.height)
        }
    }

    /// Check that the buffer is large enough for the declared layout.
    pub fn check(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(PassformError::InvalidFrame(format!(
                "empty frame {}x{}",
                self.width, self.height
            )));
        }
        let required = self.format.required_len(self.width, self.height);
        if self.pixels.len() < required {
            return Err(PassformError::InvalidFrame(format!(
                "{:?} frame {}x{} needs {} bytes, got {}",
                self.format,
                self.width,
                self.height,
                required,
                self.pixels.len()
            )));
        }
        Ok(())
    }
}

/// A distinctive image location with scale and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    /// Position in the coordinates of the full-resolution normalized image.
    pub x: f32,
    pub y: f32,
    /// Pyramid scale the keypoint was detected at (1.0 = base level).
    pub scale: f32,
    /// Orientation in radians.
    pub orientation: f32,
    /// Corner strength.
    pub response: f32,
    /// Pyramid level index.
    pub octave: u8,
}

/// 256-bit binary descriptor, compared with Hamming distance.
pub type Descriptor = [u8; 32];

/// Number of bits that differ between two descriptors.
#[inline]
pub fn hamming_distance(a: &Descriptor, b: &Descriptor) -> u32 {
    a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum()
}

/// An accepted frame → reference correspondence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    pub frame_point: Point,
    pub reference_point: Point,
    pub distance: u32,
}

/// Per-signal contribution to the fused confidence.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfidenceBreakdown {
    pub matches: f64,
    pub geometry: f64,
    pub size: f64,
    pub centering: f64,
    /// Weighted, clamped total.
    pub total: f64,
}

/// Outcome of one analysis cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub confidence: f64,
    pub total_matches: usize,
    pub good_matches: usize,
    pub homography_found: bool,
    pub perspective_corrected: bool,
    pub scale_ratio: f64,
    pub rotation_angle_degrees: f64,
    /// Reference corners projected into frame pixel coordinates
    /// (top-left, top-right, bottom-right, bottom-left).
    pub corner_polygon: Option<[Point; 4]>,
    pub bounding_box: Option<Rect>,
    pub processing_time_ms: u64,
    pub reason: Option<RejectionReason>,
    pub error_message: Option<String>,
    pub breakdown: ConfidenceBreakdown,
}

impl ValidationResult {
    /// An invalid result with zero confidence and no geometry.
    pub fn rejected(reason: RejectionReason, detail: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            confidence: 0.0,
            total_matches: 0,
            good_matches: 0,
            homography_found: false,
            perspective_corrected: false,
            scale_ratio: 0.0,
            rotation_angle_degrees: 0.0,
            corner_polygon: None,
            bounding_box: None,
            processing_time_ms: 0,
            reason: Some(reason),
            error_message: Some(error_message(reason, &detail.into())),
            breakdown: ConfidenceBreakdown::default(),
        }
    }

    /// Attach a rejection reason to an otherwise populated result.
    pub fn reject(mut self, reason: RejectionReason, detail: impl Into<String>) -> Self {
        self.is_valid = false;
        self.reason = Some(reason);
        self.error_message = Some(error_message(reason, &detail.into()));
        self
    }

    pub fn with_processing_time(mut self, elapsed_ms: u64) -> Self {
        self.processing_time_ms = elapsed_ms;
        self
    }

    /// Gate for the downstream text-recognition stage.
    pub fn should_trigger_recognition(&self) -> bool {
        self.is_valid
    }
}

fn error_message(reason: RejectionReason, detail: &str) -> String {
    if detail.is_empty() {
        reason.code().to_string()
    } else {
        format!("{}: {}", reason.code(), detail)
    }
}

/// Unique identifier for one accepted analysis cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CycleId(pub Uuid);

impl CycleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CycleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for CycleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduler mode of the stream analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalyzerMode {
    /// Ready to accept the next frame.
    Idle,
    /// Waiting for the adaptive interval to elapse.
    Throttled,
    /// A validation is in flight.
    Analyzing,
    /// A valid document was seen recently; analysis is suppressed.
    SuccessCooldown,
    /// Switched off by the caller.
    Disabled,
}

/// Read-only diagnostics view of the analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSnapshot {
    pub mode: AnalyzerMode,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub successful_count: u64,
    pub total_count: u64,
    pub dropped_count: u64,
    pub current_interval_ms: u64,
    /// Mean processing time over the rolling window.
    pub average_processing_ms: f64,
    pub last_processing_ms: Option<u64>,
    pub last_success_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_snaps_to_quarter_turns() {
        assert_eq!(Rotation::from_degrees(0), Rotation::Deg0);
        assert_eq!(Rotation::from_degrees(90), Rotation::Deg90);
        assert_eq!(Rotation::from_degrees(-90), Rotation::Deg270);
        assert_eq!(Rotation::from_degrees(181), Rotation::Deg180);
        assert_eq!(Rotation::from_degrees(350), Rotation::Deg0);
    }

    #[test]
    fn upright_size_swaps_for_portrait_sensors() {
        let frame = FrameSample::gray(vec![0; 12], 4, 3).with_rotation(Rotation::Deg90);
        assert_eq!(frame.upright_size(), (3, 4));
    }

    #[test]
    fn short_buffer_is_rejected() {
        let frame = FrameSample::new(vec![0; 10], 4, 4, PixelFormat::Rgb8);
        assert!(matches!(frame.check(), Err(PassformError::InvalidFrame(_))));

        let ok = FrameSample::new(vec![0; 24], 4, 4, PixelFormat::Yuv420);
        assert!(ok.check().is_ok());
    }

    #[test]
    fn hamming_counts_differing_bits() {
        let a = [0u8; 32];
        let mut b = [0u8; 32];
        b[0] = 0b1011;
        b[31] = 0xff;
        assert_eq!(hamming_distance(&a, &b), 11);
        assert_eq!(hamming_distance(&b, &b), 0);
    }

    #[test]
    fn bounding_rect_encloses_points() {
        let pts = [
            Point::new(10.0, 20.0),
            Point::new(50.0, 5.0),
            Point::new(30.0, 40.0),
        ];
        let r = Rect::bounding(&pts).unwrap();
        assert_eq!(r, Rect::new(10.0, 5.0, 40.0, 35.0));
        assert!(Rect::bounding(&[]).is_none());
    }

    #[test]
    fn rejected_result_carries_code_and_detail() {
        let r = ValidationResult::rejected(RejectionReason::NoFeatures, "frame produced 0 descriptors");
        assert!(!r.is_valid);
        assert_eq!(r.confidence, 0.0);
        assert_eq!(r.reason, Some(RejectionReason::NoFeatures));
        assert_eq!(
            r.error_message.as_deref(),
            Some("NoFeatures: frame produced 0 descriptors")
        );
        assert!(!r.should_trigger_recognition());
    }
}
