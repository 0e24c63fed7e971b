// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// passform-vision — Per-frame document template validation.
//
// Normalizes a camera frame, extracts ORB-style features, matches them against
// a reference template, estimates a homography with RANSAC, checks the
// projected outline and fuses the evidence into a confidence.

pub mod confidence;
pub mod features;
pub mod geometry;
pub mod homography;
pub mod judge;
pub mod matcher;
pub mod preprocess;
pub mod reference;
pub mod synthetic;
pub mod validator;

// Re-export the primary structs so callers can use `passform_vision::DocumentValidator` etc.
pub use confidence::ConfidenceScorer;
pub use features::{FeatureExtractor, FeatureSet, OrbExtractor};
pub use geometry::{GeometricValidator, GeometryReport, polygon_area};
pub use homography::{Homography, HomographyEstimate, HomographyEstimator};
pub use judge::{Judge, MatchEvidence};
pub use matcher::{MatchSet, Matcher};
pub use preprocess::{FramePreprocessor, NormalizedImage};
pub use reference::{ReferenceModel, ReferenceSource};
pub use validator::{DocumentValidator, FrameValidator};
