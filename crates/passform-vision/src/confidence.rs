// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Fusion of match count, outline regularity, apparent size and centering into
// a single confidence in [0, 1].

use passform_core::config::ScoringConfig;
use passform_core::{ConfidenceBreakdown, Point};
use tracing::debug;

use crate::geometry::{GeometryReport, centroid, edge_lengths};

#[derive(Debug, Clone)]
pub struct ConfidenceScorer {
    scoring: ScoringConfig,
    min_matches_for_homography: usize,
    min_diagonal: f64,
}

impl ConfidenceScorer {
    pub fn new(scoring: ScoringConfig, min_matches_for_homography: usize, min_diagonal: f64) -> Self {
        Self {
            scoring,
            min_matches_for_homography,
            min_diagonal,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.scoring.min_confidence
    }

    /// `min(good / (3 × minimum for a homography), 1)`.
    pub fn match_score(&self, good_matches: usize) -> f64 {
        let saturation = (self.min_matches_for_homography * 3).max(1) as f64;
        (good_matches as f64 / saturation).min(1.0)
    }

    /// Step function of the mean diagonal.
    pub fn size_score(&self, diagonal: f64) -> f64 {
        if diagonal >= self.scoring.large_diagonal {
            1.0
        } else if diagonal >= self.scoring.good_diagonal {
            0.7
        } else if diagonal >= self.min_diagonal {
            0.4
        } else {
            0.0
        }
    }

    /// Fuse all signals. Without an outline only the match term contributes.
    pub fn score(
        &self,
        good_matches: usize,
        outline: Option<(&[Point; 4], &GeometryReport)>,
        frame_size: (u32, u32),
    ) -> ConfidenceBreakdown {
        let s = &self.scoring;
        let matches = self.match_score(good_matches);

        let mut breakdown = ConfidenceBreakdown {
            matches,
            ..ConfidenceBreakdown::default()
        };
        let mut total = matches * s.match_weight;

        if let Some((quad, report)) = outline {
            breakdown.geometry = geometry_consistency(quad);
            breakdown.size = self.size_score(report.diagonal);
            breakdown.centering = centering_score(s, quad, report.area_ratio, frame_size);
            total += breakdown.geometry * s.geometry_weight
                + breakdown.size * s.size_weight
                + breakdown.centering * s.centering_weight;
        }

        breakdown.total = if total.is_finite() { total.clamp(0.0, 1.0) } else { 0.0 };
        debug!(
            matches = breakdown.matches,
            geometry = breakdown.geometry,
            size = breakdown.size,
            centering = breakdown.centering,
            total = breakdown.total,
            "Confidence computed"
        );
        breakdown
    }
}

/// `1 − mean relative difference` of the opposite edge pairs.
pub fn geometry_consistency(quad: &[Point; 4]) -> f64 {
    let [top, right, bottom, left] = edge_lengths(quad);
    let relative = |a: f64, b: f64| {
        let longest = a.max(b);
        if longest > 0.0 { (a - b).abs() / longest } else { 1.0 }
    };
    let mean = (relative(top, bottom) + relative(left, right)) / 2.0;
    (1.0 - mean).clamp(0.0, 1.0)
}

/// Mean of an area-fraction step and a centre-offset step.
pub fn centering_score(
    scoring: &ScoringConfig,
    quad: &[Point; 4],
    area_ratio: f64,
    frame_size: (u32, u32),
) -> f64 {
    let within = |(lo, hi): (f64, f64)| (lo..=hi).contains(&area_ratio);
    let area = if within(scoring.ideal_area_ratio) {
        1.0
    } else if within(scoring.acceptable_area_ratio) {
        scoring.near_area_score
    } else {
        scoring.far_area_score
    };

    let (w, h) = (frame_size.0 as f64, frame_size.1 as f64);
    let half_diagonal = (w * w + h * h).sqrt() / 2.0;
    let offset = match centroid(quad) {
        Some(c) if half_diagonal > 0.0 => c.distance(&Point::new(w / 2.0, h / 2.0)) / half_diagonal,
        _ => f64::INFINITY,
    };
    let center = scoring
        .center_steps
        .iter()
        .find(|step| offset <= step.limit)
        .map_or(scoring.far_center_score, |step| step.score);

    (area + center) / 2.0
}
