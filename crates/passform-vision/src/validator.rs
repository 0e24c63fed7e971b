// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Per-frame validation pipeline:
//
//   normalize → extract → match → homography → (warp → extract → match →
//   homography) → project reference outline → judge
//
// The deadline is checked at every stage boundary. A frame never produces an
// `Err`: every outcome is a `ValidationResult`.

use std::sync::Arc;
use std::time::Instant;

use passform_core::config::ValidatorConfig;
use passform_core::{FrameSample, MatchPair, Point, Rect, RejectionReason, ValidationResult};
use tracing::{debug, error, instrument};

use crate::features::{FeatureExtractor, FeatureSet, OrbExtractor};
use crate::homography::{Homography, HomographyEstimator, warp_to_reference};
use crate::judge::{Judge, MatchEvidence};
use crate::matcher::{MatchSet, Matcher};
use crate::preprocess::{FramePreprocessor, NormalizedImage};
use crate::reference::{ReferenceModel, ReferenceSource};

/// Anything that can judge one frame against a reference before a deadline.
pub trait FrameValidator: Send + Sync {
    fn validate(&self, frame: &FrameSample, overlay: Option<&Rect>, deadline: Instant) -> ValidationResult;
}

/// Early exit from the pipeline, already shaped as the final result.
type Stage<T> = std::result::Result<T, ValidationResult>;

/// Feature-matching validator against one reference template.
pub struct DocumentValidator {
    reference: std::result::Result<Arc<ReferenceModel>, String>,
    preprocessor: FramePreprocessor,
    extractor: Arc<dyn FeatureExtractor>,
    matcher: Matcher,
    estimator: HomographyEstimator,
    judge: Judge,
    refine: bool,
}

impl DocumentValidator {
    /// Build with the default ORB extractor.
    pub fn new(source: ReferenceSource<'_>, config: ValidatorConfig) -> Self {
        let extractor = Arc::new(OrbExtractor::new(config.detector.clone()));
        Self::with_extractor(source, config, extractor)
    }

    /// Build with a custom extractor. A reference that cannot be built leaves
    /// the validator permanently rejecting with `ReferenceUnavailable`.
    pub fn with_extractor(
        source: ReferenceSource<'_>,
        config: ValidatorConfig,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        let preprocessor = FramePreprocessor::new(config.preprocess.clone());
        let reference = match ReferenceModel::build(source, &preprocessor, extractor.as_ref()) {
            Ok(model) => Ok(Arc::new(model)),
            Err(err) => {
                error!(error = %err, "Reference template unavailable; every frame will be rejected");
                Err(err.to_string())
            }
        };
        Self::assemble(reference, config, extractor)
    }

    /// Wrap an already built reference model.
    pub fn from_model(model: Arc<ReferenceModel>, config: ValidatorConfig, extractor: Arc<dyn FeatureExtractor>) -> Self {
        Self::assemble(Ok(model), config, extractor)
    }

    fn assemble(
        reference: std::result::Result<Arc<ReferenceModel>, String>,
        config: ValidatorConfig,
        extractor: Arc<dyn FeatureExtractor>,
    ) -> Self {
        let mut preprocessor = FramePreprocessor::new(config.preprocess.clone());
        if let Ok(model) = &reference {
            preprocessor = preprocessor.with_reference_width(model.normalized_size().0);
        }
        Self {
            reference,
            preprocessor,
            extractor,
            matcher: Matcher::new(&config.matching),
            estimator: HomographyEstimator::new(config.homography.clone()),
            judge: Judge::new(&config),
            refine: config.homography.refine,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.reference.is_ok()
    }

    pub fn reference(&self) -> Option<&ReferenceModel> {
        self.reference.as_ref().ok().map(|m| m.as_ref())
    }

    fn run(
        &self,
        reference: &ReferenceModel,
        frame: &FrameSample,
        overlay: Option<&Rect>,
        deadline: Instant,
    ) -> Stage<ValidationResult> {
        check_deadline(deadline, "preprocess")?;
        let normalized = self
            .preprocessor
            .normalize(frame, false)
            .map_err(|err| ValidationResult::rejected(RejectionReason::InvalidFrame, err.to_string()))?;

        check_deadline(deadline, "extract")?;
        let features = self.extractor.extract(&normalized.image);
        if features.is_empty() || reference.descriptors().is_empty() {
            return Err(ValidationResult::rejected(
                RejectionReason::NoFeatures,
                format!(
                    "{} frame and {} reference descriptors",
                    features.len(),
                    reference.descriptors().len()
                ),
            ));
        }

        check_deadline(deadline, "match")?;
        let matches = self.matcher.match_descriptors(&features.descriptors, reference.descriptors());
        let pairs = matches.to_pairs(&features.keypoints, reference.keypoints());

        let mut evidence = MatchEvidence {
            total_matches: matches.total,
            good_matches: matches.good_count(),
            corners: None,
            frame_size: normalized.original_size,
            reference_size: reference.normalized_size(),
            perspective_corrected: false,
        };

        if pairs.len() >= self.estimator.min_matches() {
            check_deadline(deadline, "homography")?;
            if let Some(first) = self.estimator.estimate(&pairs) {
                let mut transform = first.homography;

                if self.refine {
                    check_deadline(deadline, "refine")?;
                    if let Some((refined, set)) = self.refine_pass(reference, &normalized, &transform) {
                        transform = refined;
                        evidence.total_matches = set.total;
                        evidence.good_matches = set.good_count();
                        evidence.perspective_corrected = true;
                    }
                }

                check_deadline(deadline, "project")?;
                evidence.corners = project_outline(reference, &transform, &normalized);
            }
        }

        Ok(self.judge.assess(&evidence, overlay))
    }

    /// Warp the frame into reference space and match again. `None` keeps the
    /// first pass.
    fn refine_pass(
        &self,
        reference: &ReferenceModel,
        normalized: &NormalizedImage,
        first: &Homography,
    ) -> Option<(Homography, MatchSet)> {
        let warped = warp_to_reference(&normalized.image, first, reference.normalized_size())?;
        let features: FeatureSet = self.extractor.extract(&warped);
        if features.is_empty() {
            debug!("Corrected frame has no features; keeping first pass");
            return None;
        }
        let set = self.matcher.match_descriptors(&features.descriptors, reference.descriptors());
        let pairs: Vec<MatchPair> = set.to_pairs(&features.keypoints, reference.keypoints());
        let second = self.estimator.estimate(&pairs)?;
        debug!(
            good = set.good_count(),
            inliers = second.inlier_count(),
            "Refinement pass adopted"
        );
        Some((second.homography.after(first), set))
    }
}

impl FrameValidator for DocumentValidator {
    #[instrument(skip_all, fields(w = frame.width, h = frame.height))]
    fn validate(&self, frame: &FrameSample, overlay: Option<&Rect>, deadline: Instant) -> ValidationResult {
        let started = Instant::now();
        let result = match &self.reference {
            Err(cause) => ValidationResult::rejected(RejectionReason::ReferenceUnavailable, cause.clone()),
            Ok(reference) => self
                .run(reference, frame, overlay, deadline)
                .unwrap_or_else(|rejected| rejected),
        };
        let result = result.with_processing_time(started.elapsed().as_millis() as u64);

        debug!(
            valid = result.is_valid,
            reason = ?result.reason,
            confidence = result.confidence,
            good = result.good_matches,
            total = result.total_matches,
            elapsed_ms = result.processing_time_ms,
            "Frame validated"
        );
        result
    }
}

fn check_deadline(deadline: Instant, stage: &str) -> Stage<()> {
    if Instant::now() >= deadline {
        return Err(ValidationResult::rejected(
            RejectionReason::Timeout,
            format!("deadline passed before {stage}"),
        ));
    }
    Ok(())
}

/// Reference outline mapped into upright frame pixels.
fn project_outline(reference: &ReferenceModel, frame_to_reference: &Homography, normalized: &NormalizedImage) -> Option<[Point; 4]> {
    let inverse = frame_to_reference.inverse()?;
    let scale = if normalized.scale > 0.0 { normalized.scale } else { 1.0 };
    let mut out = [Point::default(); 4];
    for (dst, corner) in out.iter_mut().zip(reference.corner_polygon()) {
        let p = inverse.apply(*corner)?;
        *dst = Point::new(p.x / scale, p.y / scale);
    }
    Some(out)
}
