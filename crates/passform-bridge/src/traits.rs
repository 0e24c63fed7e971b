// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic collaborators around the analyzer.
//
// The core never talks to a camera, a UI or a recognizer directly; the host
// supplies these through the traits below.

use passform_core::error::Result;
use passform_core::{FrameSample, OverlayRect, ValidationResult};

/// Everything a host platform provides, grouped.
pub trait PlatformBridge: CameraSource + OverlayProvider + RecognitionGate {
    /// Human-readable platform name (e.g. "iOS 18", "Android 15").
    fn platform_name(&self) -> &str;
}

/// Delivers camera frames at its own cadence. Shared with the outcome
/// consumer, so sources keep their cursor behind interior mutability.
pub trait CameraSource: Send + Sync {
    /// Next frame, or `Ok(None)` once the source is exhausted.
    fn next_frame(&self) -> Result<Option<FrameSample>>;
}

/// The on-screen guide rectangle in upright frame pixels.
pub trait OverlayProvider: Send + Sync {
    /// `None` when no guide is shown.
    fn overlay(&self) -> Option<OverlayRect>;
}

/// Receives frames judged to contain the document. Recognition itself happens
/// outside Passform.
pub trait RecognitionGate: Send + Sync {
    fn on_document(&self, frame: &FrameSample, result: &ValidationResult) -> Result<()>;
}
