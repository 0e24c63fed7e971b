// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Keypoint detection and binary description.
//
// The default extractor is ORB-style: FAST corners on a scale pyramid with
// per-level quotas, grid non-maximum suppression, intensity-centroid
// orientation and a rotated 256-bit BRIEF descriptor sampled from a seeded
// test pattern on a Gaussian-smoothed copy of each level.

use image::GrayImage;
use image::imageops::{self, FilterType};
use imageproc::corners::{Corner, corners_fast9};
use imageproc::filter::gaussian_blur_f32;
use passform_core::config::DetectorConfig;
use passform_core::{Descriptor, Keypoint};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, instrument};

/// Keypoints with their descriptors, index-aligned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureSet {
    pub keypoints: Vec<Keypoint>,
    pub descriptors: Vec<Descriptor>,
}

impl FeatureSet {
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

/// Anything producing Hamming-comparable descriptors from a grayscale image.
///
/// Implementations must be deterministic for a fixed image and configuration.
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image: &GrayImage) -> FeatureSet;
}

/// Number of binary tests in a descriptor.
const DESCRIPTOR_BITS: usize = 256;
/// Maximum absolute offset of a BRIEF test point from the keypoint.
const PATTERN_EXTENT: i32 = 13;
/// Sigma of the smoothing applied before descriptor sampling.
const DESCRIPTOR_BLUR_SIGMA: f32 = 2.0;

/// One BRIEF intensity comparison: `(x1, y1, x2, y2)` offsets.
type TestPair = (i8, i8, i8, i8);

/// Oriented FAST + rotated BRIEF.
#[derive(Debug, Clone)]
pub struct OrbExtractor {
    config: DetectorConfig,
    pattern: Vec<TestPair>,
}

impl OrbExtractor {
    pub fn new(config: DetectorConfig) -> Self {
        let pattern = test_pattern(config.pattern_seed);
        Self { config, pattern }
    }

    /// Feature budget of each pyramid level, following the geometric scale
    /// distribution. The last level takes the remainder.
    pub fn level_quotas(&self, levels: usize) -> Vec<usize> {
        if levels == 0 {
            return Vec::new();
        }
        let total = self.config.max_features;
        let inv = 1.0 / self.config.scale_factor as f64;
        let first = if (1.0 - inv).abs() < f64::EPSILON {
            total as f64 / levels as f64
        } else {
            total as f64 * (1.0 - inv) / (1.0 - inv.powi(levels as i32))
        };

        let mut quotas = Vec::with_capacity(levels);
        let mut assigned = 0usize;
        let mut desired = first;
        for _ in 0..levels - 1 {
            let n = (desired.round() as usize).min(total - assigned);
            quotas.push(n);
            assigned += n;
            desired *= inv;
        }
        quotas.push(total - assigned);
        quotas
    }

    fn build_pyramid(&self, image: &GrayImage) -> Vec<(GrayImage, f32)> {
        let (w, h) = image.dimensions();
        let min_side = 2 * self.config.edge_threshold + 1;
        let mut levels = Vec::with_capacity(self.config.levels);
        levels.push((image.clone(), 1.0f32));

        for level in 1..self.config.levels {
            let scale = self.config.scale_factor.powi(level as i32);
            let lw = (w as f32 / scale).round() as u32;
            let lh = (h as f32 / scale).round() as u32;
            if lw < min_side || lh < min_side {
                break;
            }
            levels.push((imageops::resize(image, lw, lh, FilterType::Triangle), scale));
        }
        levels
    }

    fn detect_level(&self, level: &GrayImage, quota: usize) -> Vec<Corner> {
        let (w, h) = level.dimensions();
        let border = self.config.edge_threshold;
        if quota == 0 || w <= 2 * border || h <= 2 * border {
            return Vec::new();
        }

        let inside: Vec<Corner> = corners_fast9(level, self.config.fast_threshold)
            .into_iter()
            .filter(|c| c.x >= border && c.y >= border && c.x < w - border && c.y < h - border)
            .collect();

        let mut kept = grid_suppression(inside, w, h, self.config.grid_cell.max(1));
        kept.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.y.cmp(&b.y))
                .then(a.x.cmp(&b.x))
        });
        kept.truncate(quota);
        kept
    }

    fn describe(&self, smoothed: &GrayImage, x: u32, y: u32, angle: f32) -> Descriptor {
        let (w, h) = smoothed.dimensions();
        let (sin, cos) = angle.sin_cos();
        let sample = |dx: i8, dy: i8| {
            let (dx, dy) = (dx as f32, dy as f32);
            let px = (x as f32 + (dx * cos - dy * sin)).round() as i64;
            let py = (y as f32 + (dx * sin + dy * cos)).round() as i64;
            let px = px.clamp(0, w as i64 - 1) as u32;
            let py = py.clamp(0, h as i64 - 1) as u32;
            smoothed.get_pixel(px, py).0[0]
        };

        let mut descriptor = [0u8; 32];
        for (bit, &(x1, y1, x2, y2)) in self.pattern.iter().enumerate() {
            if sample(x1, y1) < sample(x2, y2) {
                descriptor[bit / 8] |= 1 << (bit % 8);
            }
        }
        descriptor
    }
}

impl FeatureExtractor for OrbExtractor {
    #[instrument(skip_all, fields(w = image.width(), h = image.height()))]
    fn extract(&self, image: &GrayImage) -> FeatureSet {
        let pyramid = self.build_pyramid(image);
        let quotas = self.level_quotas(pyramid.len());
        let mut features = FeatureSet::default();

        for (octave, ((level, scale), quota)) in pyramid.iter().zip(quotas).enumerate() {
            let corners = self.detect_level(level, quota);
            if corners.is_empty() {
                continue;
            }
            let smoothed = gaussian_blur_f32(level, DESCRIPTOR_BLUR_SIGMA);
            let sx = image.width() as f32 / level.width() as f32;
            let sy = image.height() as f32 / level.height() as f32;

            for corner in corners {
                let angle = intensity_centroid_angle(level, corner.x, corner.y, self.config.patch_radius);
                features.keypoints.push(Keypoint {
                    x: corner.x as f32 * sx,
                    y: corner.y as f32 * sy,
                    scale: *scale,
                    orientation: angle,
                    response: corner.score,
                    octave: octave as u8,
                });
                features
                    .descriptors
                    .push(self.describe(&smoothed, corner.x, corner.y, angle));
            }
        }

        debug!(
            levels = pyramid.len(),
            features = features.len(),
            "Features extracted"
        );
        features
    }
}

/// Deterministic BRIEF test pattern drawn from a seeded generator.
fn test_pattern(seed: u64) -> Vec<TestPair> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut offset = || rng.gen_range(-PATTERN_EXTENT..=PATTERN_EXTENT) as i8;
    (0..DESCRIPTOR_BITS)
        .map(|_| (offset(), offset(), offset(), offset()))
        .collect()
}

/// Keep the strongest corner in every `cell` × `cell` block.
fn grid_suppression(corners: Vec<Corner>, width: u32, height: u32, cell: u32) -> Vec<Corner> {
    let cols = width.div_ceil(cell) as usize;
    let rows = height.div_ceil(cell) as usize;
    let mut best: Vec<Option<Corner>> = vec![None; cols * rows];

    for corner in corners {
        let idx = (corner.y / cell) as usize * cols + (corner.x / cell) as usize;
        let replace = match &best[idx] {
            None => true,
            Some(current) => corner.score > current.score,
        };
        if replace {
            best[idx] = Some(corner);
        }
    }

    best.into_iter().flatten().collect()
}

/// Orientation of the patch's intensity centroid relative to its centre.
fn intensity_centroid_angle(image: &GrayImage, x: u32, y: u32, radius: u32) -> f32 {
    let (w, h) = image.dimensions();
    let r = radius as i64;
    let mut m01 = 0f64;
    let mut m10 = 0f64;

    for dy in -r..=r {
        let py = y as i64 + dy;
        if py < 0 || py >= h as i64 {
            continue;
        }
        for dx in -r..=r {
            let px = x as i64 + dx;
            if px < 0 || px >= w as i64 || dx * dx + dy * dy > r * r {
                continue;
            }
            let v = image.get_pixel(px as u32, py as u32).0[0] as f64;
            m10 += dx as f64 * v;
            m01 += dy as f64 * v;
        }
    }

    m01.atan2(m10) as f32
}
