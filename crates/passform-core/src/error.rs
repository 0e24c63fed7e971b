// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Passform.
//
// `PassformError` covers fallible setup work (loading the reference template,
// reading configuration, talking to the camera). Per-frame outcomes are never
// errors: they are `ValidationResult`s carrying a `RejectionReason`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Top-level error type for Passform setup operations.
#[derive(Debug, Error)]
pub enum PassformError {
    // -- Reference / vision errors --
    #[error("reference template unavailable: {0}")]
    ReferenceUnavailable(String),

    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PassformError>;

/// Why a single analysis cycle did not produce a valid judgment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectionReason {
    /// The reference template could not be built. Permanent.
    ReferenceUnavailable,
    /// Frame or reference produced zero descriptors.
    NoFeatures,
    /// Fewer ratio-test survivors than the minimum match count.
    InsufficientMatches,
    /// Enough matches to score, too few to attempt a homography fit.
    InsufficientMatchesForHomography,
    /// RANSAC did not converge on a usable transform.
    HomographyFailed,
    CornerOutOfBounds,
    AreaOutOfRange,
    TooSmall,
    AspectRatioMismatch,
    OverlayMisaligned,
    InsufficientCoverage,
    /// Geometry passed but the fused confidence is below the acceptance floor.
    LowConfidence,
    /// Pixel buffer does not match the declared dimensions/format.
    InvalidFrame,
    /// The cycle exceeded its wall-clock budget.
    Timeout,
    /// An unexpected failure (e.g. a panic) inside the cycle.
    Internal,
}

impl RejectionReason {
    /// Stable identifier used in `ValidationResult::error_message` and logs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ReferenceUnavailable => "ReferenceUnavailable",
            Self::NoFeatures => "NoFeatures",
            Self::InsufficientMatches => "InsufficientMatches",
            Self::InsufficientMatchesForHomography => "InsufficientMatchesForHomography",
            Self::HomographyFailed => "HomographyFailed",
            Self::CornerOutOfBounds => "CornerOutOfBounds",
            Self::AreaOutOfRange => "AreaOutOfRange",
            Self::TooSmall => "TooSmall",
            Self::AspectRatioMismatch => "AspectRatioMismatch",
            Self::OverlayMisaligned => "OverlayMisaligned",
            Self::InsufficientCoverage => "InsufficientCoverage",
            Self::LowConfidence => "LowConfidence",
            Self::InvalidFrame => "InvalidFrame",
            Self::Timeout => "Timeout",
            Self::Internal => "Internal",
        }
    }

    /// Whether this reason comes from the geometric checks.
    pub fn is_geometric(&self) -> bool {
        matches!(
            self,
            Self::CornerOutOfBounds
                | Self::AreaOutOfRange
                | Self::TooSmall
                | Self::AspectRatioMismatch
                | Self::OverlayMisaligned
                | Self::InsufficientCoverage
        )
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Classification of rejection reasons for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonClass {
    /// Expected during normal alignment; the next frame may succeed.
    Transient,
    /// No later frame can succeed without a configuration change.
    Permanent,
}

/// Classify a `RejectionReason` into a `ReasonClass`.
pub fn classify_reason(reason: RejectionReason) -> ReasonClass {
    match reason {
        RejectionReason::ReferenceUnavailable => ReasonClass::Permanent,

        RejectionReason::NoFeatures
        | RejectionReason::InsufficientMatches
        | RejectionReason::InsufficientMatchesForHomography
        | RejectionReason::HomographyFailed
        | RejectionReason::CornerOutOfBounds
        | RejectionReason::AreaOutOfRange
        | RejectionReason::TooSmall
        | RejectionReason::AspectRatioMismatch
        | RejectionReason::OverlayMisaligned
        | RejectionReason::InsufficientCoverage
        | RejectionReason::LowConfidence
        | RejectionReason::InvalidFrame
        | RejectionReason::Timeout
        | RejectionReason::Internal => ReasonClass::Transient,
    }
}
