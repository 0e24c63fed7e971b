// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tunable configuration. Every threshold used by the validator and the stream
// analyzer lives here; `Default` holds the shipped values.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PassformError, Result};

/// Top-level settings, loadable from a JSON file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PassformConfig {
    pub validator: ValidatorConfig,
    pub analyzer: AnalyzerConfig,
}

impl PassformConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.check()?;
        Ok(config)
    }

    /// Reject settings that would make the pipeline meaningless.
    pub fn check(&self) -> Result<()> {
        let v = &self.validator;
        if v.preprocess.target_width == 0 || v.preprocess.target_height == 0 {
            return Err(PassformError::Config("target envelope must be non-zero".into()));
        }
        if v.preprocess.frame_scale_factor <= 0.0 {
            return Err(PassformError::Config("frame_scale_factor must be positive".into()));
        }
        if !(v.detector.scale_factor > 1.0) || v.detector.levels == 0 {
            return Err(PassformError::Config(
                "detector needs scale_factor > 1 and at least one level".into(),
            ));
        }
        if !(0.0..=1.0).contains(&v.matching.ratio) {
            return Err(PassformError::Config("ratio must be in [0, 1]".into()));
        }
        if v.homography.min_matches < 4 {
            return Err(PassformError::Config("homography needs at least 4 matches".into()));
        }
        if v.geometry.min_area_ratio > v.geometry.max_area_ratio {
            return Err(PassformError::Config("min_area_ratio exceeds max_area_ratio".into()));
        }
        let s = &v.scoring;
        let inverted = |(lo, hi): (f64, f64)| lo > hi;
        if inverted(s.ideal_area_ratio) || inverted(s.acceptable_area_ratio) {
            return Err(PassformError::Config("scoring area bands are inverted".into()));
        }
        if s.center_steps.windows(2).any(|pair| pair[0].limit > pair[1].limit) {
            return Err(PassformError::Config("center_steps must be in ascending limit order".into()));
        }
        let a = &self.analyzer;
        if a.min_interval_ms == 0 || a.min_interval_ms > a.max_interval_ms {
            return Err(PassformError::Config(
                "analyzer interval bounds are inverted or zero".into(),
            ));
        }
        if !(a.interval_step > 1.0) {
            return Err(PassformError::Config("interval_step must be > 1".into()));
        }
        Ok(())
    }
}

/// Settings for the per-frame validation pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    pub preprocess: PreprocessConfig,
    pub detector: DetectorConfig,
    pub matching: MatchingConfig,
    pub homography: HomographyConfig,
    pub geometry: GeometryConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Envelope the reference template is fitted into (aspect preserved).
    pub target_width: u32,
    pub target_height: u32,
    /// Live frame width = adapted reference width × this factor.
    pub frame_scale_factor: f64,
    /// Sigma of the Gaussian denoise pass. Zero disables it.
    pub blur_sigma: f32,
    pub clahe_tiles_x: u32,
    pub clahe_tiles_y: u32,
    pub clahe_clip_limit: f32,
    /// Bilateral filter window radius in pixels. Zero disables it.
    pub bilateral_radius: u32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_space: f32,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            target_width: 1920,
            target_height: 1200,
            frame_scale_factor: 1.0,
            blur_sigma: 0.8,
            clahe_tiles_x: 8,
            clahe_tiles_y: 8,
            clahe_clip_limit: 2.0,
            bilateral_radius: 2,
            bilateral_sigma_color: 25.0,
            bilateral_sigma_space: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub max_features: usize,
    pub scale_factor: f32,
    pub levels: usize,
    pub fast_threshold: u8,
    /// Keypoints closer than this to a level border are discarded.
    pub edge_threshold: u32,
    /// Cell size of the non-maximum suppression grid.
    pub grid_cell: u32,
    /// Half-size of the orientation / descriptor patch.
    pub patch_radius: u32,
    /// Seed for the BRIEF sampling pattern.
    pub pattern_seed: u64,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            max_features: 2000,
            scale_factor: 1.2,
            levels: 10,
            fast_threshold: 10,
            edge_threshold: 20,
            grid_cell: 8,
            patch_radius: 15,
            pattern_seed: 0x5eed_0f_b41e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchingConfig {
    /// Lowe ratio: accept iff best < ratio × second best.
    pub ratio: f32,
    /// Fewer survivors than this is `InsufficientMatches`.
    pub min_good_matches: usize,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            ratio: 0.65,
            min_good_matches: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomographyConfig {
    /// Pairs required before a fit is attempted.
    pub min_matches: usize,
    /// Reprojection error in reference pixels for an inlier.
    pub ransac_threshold: f64,
    pub ransac_confidence: f64,
    pub ransac_max_iterations: usize,
    pub ransac_seed: u64,
    pub min_inliers: usize,
    /// Warp the frame into reference space and match again.
    pub refine: bool,
}

impl Default for HomographyConfig {
    fn default() -> Self {
        Self {
            min_matches: 12,
            ransac_threshold: 3.0,
            ransac_confidence: 0.99,
            ransac_max_iterations: 2000,
            ransac_seed: 42,
            min_inliers: 8,
            refine: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub min_area_ratio: f64,
    pub max_area_ratio: f64,
    pub min_width: f64,
    pub min_height: f64,
    pub min_diagonal: f64,
    /// Expected width / height of the document (ID-1 card ≈ 1.59).
    pub expected_aspect_ratio: f64,
    pub aspect_tolerance: f64,
    pub overlay_margin: f64,
    /// Maximum number of corners allowed outside the expanded overlay.
    pub max_corners_outside_overlay: usize,
    pub min_overlay_coverage: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            min_area_ratio: 0.05,
            max_area_ratio: 0.80,
            min_width: 120.0,
            min_height: 75.0,
            min_diagonal: 150.0,
            expected_aspect_ratio: 1.59,
            aspect_tolerance: 0.20,
            overlay_margin: 5.0,
            max_corners_outside_overlay: 1,
            min_overlay_coverage: 0.65,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub match_weight: f64,
    pub geometry_weight: f64,
    pub size_weight: f64,
    pub centering_weight: f64,
    /// Mean diagonal (px) scoring 1.0.
    pub large_diagonal: f64,
    /// Mean diagonal (px) scoring 0.7. The geometry minimum scores 0.4.
    pub good_diagonal: f64,
    /// Acceptance floor on the fused confidence.
    pub min_confidence: f64,
    /// Frame-area fraction band whose area term scores 1.0.
    pub ideal_area_ratio: (f64, f64),
    /// Wider band scoring `near_area_score`. Anything outside scores `far_area_score`.
    pub acceptable_area_ratio: (f64, f64),
    pub near_area_score: f64,
    pub far_area_score: f64,
    /// Centre offset steps, as a fraction of the frame half-diagonal, in
    /// ascending `limit` order. The first step the offset fits under wins.
    pub center_steps: Vec<ScoreStep>,
    /// Centre term for offsets beyond the last step.
    pub far_center_score: f64,
}

/// One rung of a step-function score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreStep {
    pub limit: f64,
    pub score: f64,
}

impl ScoreStep {
    pub const fn new(limit: f64, score: f64) -> Self {
        Self { limit, score }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            match_weight: 0.30,
            geometry_weight: 0.25,
            size_weight: 0.25,
            centering_weight: 0.20,
            large_diagonal: 600.0,
            good_diagonal: 400.0,
            min_confidence: 0.30,
            ideal_area_ratio: (0.15, 0.60),
            acceptable_area_ratio: (0.08, 0.75),
            near_area_score: 0.6,
            far_area_score: 0.3,
            center_steps: vec![
                ScoreStep::new(0.10, 1.0),
                ScoreStep::new(0.25, 0.7),
                ScoreStep::new(0.50, 0.4),
            ],
            far_center_score: 0.1,
        }
    }
}

/// Settings for the streaming scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub initial_interval_ms: u64,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Multiplier applied when backing off, divisor when speeding up.
    pub interval_step: f64,
    pub failures_before_backoff: u32,
    pub successes_before_speedup: u32,
    /// Wall-clock budget for one validation cycle.
    pub cycle_budget_ms: u64,
    pub success_cooldown_ms: u64,
    /// Number of recent cycles kept for the processing-time average.
    pub perf_window: usize,
    /// Capacity of the outcome broadcast channel.
    pub broadcast_capacity: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: 200,
            min_interval_ms: 100,
            max_interval_ms: 1000,
            interval_step: 1.5,
            failures_before_backoff: 3,
            successes_before_speedup: 2,
            cycle_budget_ms: 500,
            success_cooldown_ms: 3000,
            perf_window: 20,
            broadcast_capacity: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_pass_checks() {
        PassformConfig::default().check().unwrap();
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = PassformConfig::from_json_str(
            r#"{ "validator": { "matching": { "ratio": 0.7 } }, "analyzer": { "success_cooldown_ms": 1500 } }"#,
        )
        .unwrap();
        assert_eq!(cfg.validator.matching.ratio, 0.7);
        assert_eq!(cfg.validator.matching.min_good_matches, 4);
        assert_eq!(cfg.validator.homography.min_matches, 12);
        assert_eq!(cfg.analyzer.success_cooldown_ms, 1500);
        assert_eq!(cfg.analyzer.initial_interval_ms, 200);
    }

    #[test]
    fn inverted_interval_bounds_are_rejected() {
        let err = PassformConfig::from_json_str(
            r#"{ "analyzer": { "min_interval_ms": 2000, "max_interval_ms": 1000 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, PassformError::Config(_)));
    }

    #[test]
    fn centering_steps_load_from_json() {
        let cfg = PassformConfig::from_json_str(
            r#"{ "validator": { "scoring": {
                "center_steps": [ { "limit": 0.2, "score": 1.0 } ],
                "far_center_score": 0.0
            } } }"#,
        )
        .unwrap();
        assert_eq!(cfg.validator.scoring.center_steps, vec![ScoreStep::new(0.2, 1.0)]);
        assert_eq!(cfg.validator.scoring.far_center_score, 0.0);
        assert_eq!(cfg.validator.scoring.ideal_area_ratio, (0.15, 0.60));
    }

    #[test]
    fn unordered_center_steps_are_rejected() {
        let err = PassformConfig::from_json_str(
            r#"{ "validator": { "scoring": { "center_steps": [
                { "limit": 0.5, "score": 0.4 }, { "limit": 0.1, "score": 1.0 }
            ] } } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, PassformError::Config(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "validator": {{ "geometry": {{ "overlay_margin": 8.0 }} }} }}"#).unwrap();
        let cfg = PassformConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.validator.geometry.overlay_margin, 8.0);
        assert_eq!(cfg.validator.geometry.max_area_ratio, 0.80);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        let err = PassformConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, PassformError::Serialization(_)));
    }
}
