// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Final decision for one cycle, from match counts and the projected outline.
// Pure: no images, no clocks.

use passform_core::config::ValidatorConfig;
use passform_core::{Point, Rect, RejectionReason, ValidationResult};

use crate::confidence::ConfidenceScorer;
use crate::geometry::{GeometricValidator, polygon_area, rotation_angle_degrees};

/// What matching and homography estimation established about a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchEvidence {
    pub total_matches: usize,
    pub good_matches: usize,
    /// Reference outline in upright frame pixels, if a homography was found.
    pub corners: Option<[Point; 4]>,
    /// Upright frame size in pixels.
    pub frame_size: (u32, u32),
    /// Reference size in normalized pixels.
    pub reference_size: (u32, u32),
    pub perspective_corrected: bool,
}

#[derive(Debug, Clone)]
pub struct Judge {
    min_good_matches: usize,
    min_matches_for_homography: usize,
    geometry: GeometricValidator,
    scorer: ConfidenceScorer,
}

impl Judge {
    pub fn new(config: &ValidatorConfig) -> Self {
        Self {
            min_good_matches: config.matching.min_good_matches,
            min_matches_for_homography: config.homography.min_matches,
            geometry: GeometricValidator::new(config.geometry.clone()),
            scorer: ConfidenceScorer::new(
                config.scoring.clone(),
                config.homography.min_matches,
                config.geometry.min_diagonal,
            ),
        }
    }

    pub fn scorer(&self) -> &ConfidenceScorer {
        &self.scorer
    }

    pub fn assess(&self, evidence: &MatchEvidence, overlay: Option<&Rect>) -> ValidationResult {
        let good = evidence.good_matches;
        let mut result = ValidationResult::rejected(RejectionReason::Internal, "");
        result.total_matches = evidence.total_matches;
        result.good_matches = good.min(evidence.total_matches);
        result.perspective_corrected = evidence.perspective_corrected;

        if good == 0 || good < self.min_good_matches {
            return result.reject(
                RejectionReason::InsufficientMatches,
                format!("{good} good matches, need {}", self.min_good_matches),
            );
        }

        let match_only = self.scorer.score(good, None, evidence.frame_size);
        result.breakdown = match_only;
        result.confidence = match_only.total;

        if good < self.min_matches_for_homography {
            return result.reject(
                RejectionReason::InsufficientMatchesForHomography,
                format!("{good} good matches, need {} for a homography", self.min_matches_for_homography),
            );
        }

        let Some(corners) = evidence.corners else {
            return result.reject(RejectionReason::HomographyFailed, "no consistent transform");
        };

        result.homography_found = true;
        result.corner_polygon = Some(corners);
        result.bounding_box = Rect::bounding(&corners);
        result.rotation_angle_degrees = rotation_angle_degrees(&corners);
        let (rw, rh) = evidence.reference_size;
        let reference_area = rw as f64 * rh as f64;
        result.scale_ratio = if reference_area > 0.0 {
            (polygon_area(&corners) / reference_area).sqrt()
        } else {
            0.0
        };

        let report = self.geometry.validate(&corners, evidence.frame_size, overlay);
        let breakdown = self.scorer.score(good, Some((&corners, &report)), evidence.frame_size);
        result.breakdown = breakdown;
        result.confidence = breakdown.total;

        if let Some(reason) = report.reason {
            return result.reject(reason, report.detail);
        }

        if result.confidence < self.scorer.min_confidence() {
            let detail = format!(
                "confidence {:.2} below {:.2}",
                result.confidence,
                self.scorer.min_confidence()
            );
            return result.reject(RejectionReason::LowConfidence, detail);
        }

        result.is_valid = true;
        result.reason = None;
        result.error_message = None;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn judge() -> Judge {
        Judge::new(&ValidatorConfig::default())
    }

    fn evidence(good: usize, corners: Option<[Point; 4]>) -> MatchEvidence {
        MatchEvidence {
            total_matches: 400,
            good_matches: good,
            corners,
            frame_size: (1000, 1000),
            reference_size: (800, 500),
            perspective_corrected: corners.is_some(),
        }
    }

    fn card(x: f64, y: f64, w: f64, h: f64) -> [Point; 4] {
        [
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ]
    }

    #[test]
    fn few_matches_without_homography() {
        let r = judge().assess(&evidence(5, None), None);
        assert!(!r.is_valid);
        assert_eq!(r.reason, Some(RejectionReason::InsufficientMatchesForHomography));
        assert!(!r.homography_found);
        assert!(r.confidence > 0.0 && r.confidence < 0.3);
    }

    #[test]
    fn well_placed_card_is_valid() {
        // 400x250 = 10% of 1000x1000, aspect 1.6.
        let r = judge().assess(&evidence(20, Some(card(300.0, 375.0, 400.0, 250.0))), None);
        assert!(r.is_valid, "{:?}", r.error_message);
        assert!(r.confidence > 0.3);
        assert!(r.should_trigger_recognition());
        assert_eq!(r.reason, None);
        assert_eq!(r.error_message, None);
        assert!((r.scale_ratio - 0.5).abs() < 1e-9);
        assert_eq!(r.rotation_angle_degrees, 0.0);
        assert_eq!(r.bounding_box, Some(Rect::new(300.0, 375.0, 400.0, 250.0)));
    }

    #[test]
    fn oversized_card_is_out_of_range() {
        let r = judge().assess(&evidence(40, Some(card(10.0, 30.0, 960.0, 937.5))), None);
        assert_eq!(r.reason, Some(RejectionReason::AreaOutOfRange));
        assert!(r.error_message.as_deref().unwrap().starts_with("AreaOutOfRange"));
    }

    #[test]
    fn card_off_the_guide_is_misaligned() {
        let guide = Rect::new(290.0, 365.0, 220.0, 270.0);
        let r = judge().assess(&evidence(40, Some(card(300.0, 375.0, 400.0, 250.0))), Some(&guide));
        assert_eq!(r.reason, Some(RejectionReason::OverlayMisaligned));
        assert!(r.corner_polygon.is_some());
    }

    #[test]
    fn zero_matches_is_insufficient() {
        let r = judge().assess(&evidence(0, None), None);
        assert_eq!(r.reason, Some(RejectionReason::InsufficientMatches));
        assert_eq!(r.confidence, 0.0);
    }

    #[test]
    fn missing_transform_is_homography_failure() {
        let r = judge().assess(&evidence(30, None), None);
        assert_eq!(r.reason, Some(RejectionReason::HomographyFailed));
    }

    #[test]
    fn weak_evidence_is_low_confidence() {
        let config = ValidatorConfig {
            scoring: passform_core::config::ScoringConfig {
                min_confidence: 0.95,
                ..Default::default()
            },
            ..ValidatorConfig::default()
        };
        let r = Judge::new(&config).assess(&evidence(12, Some(card(300.0, 375.0, 400.0, 250.0))), None);
        assert_eq!(r.reason, Some(RejectionReason::LowConfidence));
    }

    #[test]
    fn confidence_bounded_and_counts_ordered() {
        for good in [0, 3, 11, 12, 36, 1000] {
            let mut e = evidence(good, Some(card(300.0, 375.0, 400.0, 250.0)));
            e.total_matches = 500;
            let r = judge().assess(&e, None);
            assert!((0.0..=1.0).contains(&r.confidence));
            assert!(r.good_matches <= r.total_matches);
        }
    }
}
