// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plain-language status text for the capture screen.
//
// Each rejection reason maps to a short instruction the person holding the
// camera can act on. Severity drives the icon and colour in the UI.

use serde::Serialize;

use crate::error::{PassformError, RejectionReason};
use crate::types::ValidationResult;

/// Severity of a status from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    /// Everything is fine.
    Ok,
    /// Keep going, the next frame may succeed.
    Transient,
    /// The user should change something (distance, angle, lighting).
    ActionRequired,
    /// Scanning cannot work until the app is fixed or reconfigured.
    Permanent,
}

/// A human-readable status with an actionable suggestion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Guidance {
    /// Short heading.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether the analyzer keeps trying on its own.
    pub retriable: bool,
    pub severity: Severity,
}

impl Guidance {
    fn new(message: &str, suggestion: &str, retriable: bool, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable,
            severity,
        }
    }
}

/// Map a rejection reason to status text.
pub fn guidance(reason: RejectionReason) -> Guidance {
    use RejectionReason::*;
    use Severity::*;

    match reason {
        ReferenceUnavailable => Guidance::new(
            "Document scanning isn't available.",
            "The document template could not be loaded. Reinstall or update the app.",
            false,
            Permanent,
        ),
        NoFeatures => Guidance::new(
            "We can't see any detail.",
            "Point the camera at the document and make sure it is well lit.",
            true,
            ActionRequired,
        ),
        InsufficientMatches | InsufficientMatchesForHomography => Guidance::new(
            "Looking for your document…",
            "Hold the document flat inside the frame.",
            true,
            Transient,
        ),
        HomographyFailed => Guidance::new(
            "Hold still.",
            "Keep the document and camera steady for a moment.",
            true,
            Transient,
        ),
        CornerOutOfBounds => Guidance::new(
            "Part of the document is cut off.",
            "Move the camera back so all four corners are visible.",
            true,
            ActionRequired,
        ),
        AreaOutOfRange => Guidance::new(
            "The document is too close or too far.",
            "Move the camera until the document fills the guide.",
            true,
            ActionRequired,
        ),
        TooSmall => Guidance::new(
            "The document is too small.",
            "Move the document closer.",
            true,
            ActionRequired,
        ),
        AspectRatioMismatch => Guidance::new(
            "The document looks tilted.",
            "Hold the camera straight above the document.",
            true,
            ActionRequired,
        ),
        OverlayMisaligned => Guidance::new(
            "Line up the document with the guide.",
            "Move the document so its corners sit on the on-screen frame.",
            true,
            ActionRequired,
        ),
        InsufficientCoverage => Guidance::new(
            "The document doesn't fill the guide.",
            "Move the document closer so it fills the on-screen frame.",
            true,
            ActionRequired,
        ),
        LowConfidence => Guidance::new(
            "Almost there.",
            "Hold still and avoid glare on the document.",
            true,
            Transient,
        ),
        InvalidFrame | Timeout | Internal => Guidance::new(
            "Still working…",
            "Keep holding the document in view.",
            true,
            Transient,
        ),
    }
}

/// Status text for a complete cycle result.
pub fn guidance_for(result: &ValidationResult) -> Guidance {
    match result.reason {
        Some(reason) if !result.is_valid => guidance(reason),
        _ if result.is_valid => Guidance::new(
            "Document found.",
            "Hold still while it is read.",
            false,
            Severity::Ok,
        ),
        _ => guidance(RejectionReason::Internal),
    }
}

/// Map a setup error to status text.
pub fn describe_error(err: &PassformError) -> Guidance {
    match err {
        PassformError::ReferenceUnavailable(_) => guidance(RejectionReason::ReferenceUnavailable),
        PassformError::PlatformUnavailable => Guidance::new(
            "The camera isn't available on this device.",
            "Use the replay mode with saved images instead.",
            false,
            Severity::Permanent,
        ),
        PassformError::Bridge(detail) => Guidance::new(
            "The camera stopped responding.",
            &format!("Close other apps using the camera and try again. ({detail})"),
            true,
            Severity::Transient,
        ),
        PassformError::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
            Guidance::new(
                "A file couldn't be found.",
                "Check the path and try again.",
                false,
                Severity::ActionRequired,
            )
        }
        PassformError::Config(detail) | PassformError::InvalidFrame(detail) | PassformError::ImageError(detail) => {
            Guidance::new(
                "Something is wrong with the input.",
                &format!("Check the settings and images you supplied. ({detail})"),
                false,
                Severity::ActionRequired,
            )
        }
        PassformError::Serialization(_) => Guidance::new(
            "The settings file can't be read.",
            "Fix the JSON syntax or remove the file to use defaults.",
            false,
            Severity::ActionRequired,
        ),
        PassformError::Io(_) => Guidance::new(
            "A file couldn't be read.",
            "Check that the file exists and is readable.",
            false,
            Severity::ActionRequired,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ReasonClass, classify_reason};

    #[test]
    fn too_small_suggests_moving_closer() {
        let g = guidance(RejectionReason::TooSmall);
        assert_eq!(g.suggestion, "Move the document closer.");
        assert_eq!(g.severity, Severity::ActionRequired);
    }

    #[test]
    fn retriable_agrees_with_classification() {
        use RejectionReason::*;
        for reason in [
            ReferenceUnavailable,
            NoFeatures,
            InsufficientMatches,
            InsufficientMatchesForHomography,
            HomographyFailed,
            CornerOutOfBounds,
            AreaOutOfRange,
            TooSmall,
            AspectRatioMismatch,
            OverlayMisaligned,
            InsufficientCoverage,
            LowConfidence,
            InvalidFrame,
            Timeout,
            Internal,
        ] {
            let g = guidance(reason);
            assert_eq!(
                g.retriable,
                classify_reason(reason) == ReasonClass::Transient,
                "{reason}"
            );
        }
    }

    #[test]
    fn valid_result_reports_ok() {
        let mut result = ValidationResult::rejected(RejectionReason::Internal, "");
        result.is_valid = true;
        result.reason = None;
        assert_eq!(guidance_for(&result).severity, Severity::Ok);
    }

    #[test]
    fn missing_file_is_action_required() {
        let err = PassformError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        assert_eq!(describe_error(&err).severity, Severity::ActionRequired);
    }
}
