// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Planar projective estimation: exact 4-point solve, least-squares DLT refit
// and a seeded RANSAC loop with an adaptive iteration count.

use image::{GrayImage, Luma};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use nalgebra::{DMatrix, Matrix3, SMatrix, SVector, Vector3};
use passform_core::config::HomographyConfig;
use passform_core::{MatchPair, Point};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::index;
use tracing::{debug, instrument};

/// A 3×3 projective transform. Only meaningful for the image size it was
/// estimated against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    /// Map a point. `None` when it lands on the line at infinity.
    pub fn apply(&self, p: Point) -> Option<Point> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        if v[2].abs() < 1e-12 {
            return None;
        }
        Some(Point::new(v[0] / v[2], v[1] / v[2]))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    /// `self ∘ first`: apply `first`, then `self`.
    pub fn after(&self, first: &Homography) -> Self {
        Self::new(self.h * first.h)
    }

    /// Row-major projection for `imageproc` warping.
    pub fn to_projection(&self) -> Option<Projection> {
        let h = self.h;
        Projection::from_matrix([
            h[(0, 0)] as f32,
            h[(0, 1)] as f32,
            h[(0, 2)] as f32,
            h[(1, 0)] as f32,
            h[(1, 1)] as f32,
            h[(1, 2)] as f32,
            h[(2, 0)] as f32,
            h[(2, 1)] as f32,
            h[(2, 2)] as f32,
        ])
    }

    fn is_well_conditioned(&self) -> bool {
        let det = self.h.determinant();
        det.is_finite() && det.abs() > 1e-10 && self.h.iter().all(|v| v.is_finite())
    }
}

/// Outcome of a successful robust fit.
#[derive(Debug, Clone, PartialEq)]
pub struct HomographyEstimate {
    /// Maps frame points to reference points.
    pub homography: Homography,
    /// Indices into the input pairs that agree with the model.
    pub inliers: Vec<usize>,
    pub iterations: usize,
}

impl HomographyEstimate {
    pub fn inlier_count(&self) -> usize {
        self.inliers.len()
    }
}

/// RANSAC homography fitter over frame → reference pairs.
#[derive(Debug, Clone)]
pub struct HomographyEstimator {
    config: HomographyConfig,
}

impl HomographyEstimator {
    pub fn new(config: HomographyConfig) -> Self {
        Self { config }
    }

    pub fn min_matches(&self) -> usize {
        self.config.min_matches
    }

    /// Robustly fit `reference ~ H · frame`. `None` below the minimum pair
    /// count, on degenerate data, or when too few inliers support the model.
    #[instrument(skip_all, fields(pairs = pairs.len()))]
    pub fn estimate(&self, pairs: &[MatchPair]) -> Option<HomographyEstimate> {
        let n = pairs.len();
        if n < self.config.min_matches.max(4) {
            debug!(min = self.config.min_matches, "Too few pairs for a homography");
            return None;
        }

        let src: Vec<Point> = pairs.iter().map(|p| p.frame_point).collect();
        let dst: Vec<Point> = pairs.iter().map(|p| p.reference_point).collect();
        let threshold_sq = self.config.ransac_threshold * self.config.ransac_threshold;
        let max_iterations = self.config.ransac_max_iterations.max(1);

        let mut rng = StdRng::seed_from_u64(self.config.ransac_seed);
        let mut best: Option<(Homography, Vec<usize>)> = None;
        let mut needed = max_iterations;
        let mut iterations = 0;

        while iterations < needed.min(max_iterations) {
            iterations += 1;
            let sample = index::sample(&mut rng, n, 4).into_vec();
            let s: [Point; 4] = [src[sample[0]], src[sample[1]], src[sample[2]], src[sample[3]]];
            let d: [Point; 4] = [dst[sample[0]], dst[sample[1]], dst[sample[2]], dst[sample[3]]];
            if is_degenerate(&s) || is_degenerate(&d) {
                continue;
            }
            let Some(model) = homography_from_4pt(&s, &d) else {
                continue;
            };

            let inliers = inlier_indices(&model, &src, &dst, threshold_sq);
            let improves = best
                .as_ref()
                .is_none_or(|(_, current)| inliers.len() > current.len());
            if improves {
                let ratio = inliers.len() as f64 / n as f64;
                needed = adaptive_iterations(self.config.ransac_confidence, ratio, max_iterations);
                best = Some((model, inliers));
            }
        }

        let (model, inliers) = best?;
        let min_inliers = self.config.min_inliers.max(4);
        if inliers.len() < min_inliers {
            debug!(inliers = inliers.len(), min_inliers, "Homography rejected: too few inliers");
            return None;
        }

        // Least-squares refit on the consensus set; keep the sample model if
        // the refit loses support.
        let (in_src, in_dst): (Vec<Point>, Vec<Point>) =
            inliers.iter().map(|&i| (src[i], dst[i])).unzip();
        let (homography, inliers) = match homography_dlt(&in_src, &in_dst) {
            Some(refit) => {
                let refit_inliers = inlier_indices(&refit, &src, &dst, threshold_sq);
                if refit_inliers.len() >= inliers.len() {
                    (refit, refit_inliers)
                } else {
                    (model, inliers)
                }
            }
            None => (model, inliers),
        };

        if !homography.is_well_conditioned() || homography.inverse().is_none() {
            debug!("Homography rejected: not invertible");
            return None;
        }

        debug!(
            inliers = inliers.len(),
            iterations,
            "Homography estimated"
        );
        Some(HomographyEstimate {
            homography,
            inliers,
            iterations,
        })
    }
}

/// Warp a normalized frame into reference space.
pub fn warp_to_reference(frame: &GrayImage, frame_to_reference: &Homography, size: (u32, u32)) -> Option<GrayImage> {
    let projection = frame_to_reference.to_projection()?;
    let mut out = GrayImage::new(size.0, size.1);
    warp_into(frame, &projection, Interpolation::Bilinear, Luma([0u8]), &mut out);
    Some(out)
}

/// RANSAC trials needed to draw one all-inlier 4-sample with the given
/// confidence.
pub fn adaptive_iterations(confidence: f64, inlier_ratio: f64, max_iterations: usize) -> usize {
    let w4 = inlier_ratio.clamp(0.0, 1.0).powi(4);
    if w4 >= 1.0 - f64::EPSILON {
        return 1;
    }
    let denom = (1.0 - w4).ln();
    if denom >= 0.0 || !denom.is_finite() {
        return max_iterations;
    }
    let k = (1.0 - confidence.clamp(0.0, 1.0 - 1e-12)).ln() / denom;
    if !k.is_finite() {
        return max_iterations;
    }
    (k.ceil().max(1.0) as usize).min(max_iterations)
}

fn inlier_indices(model: &Homography, src: &[Point], dst: &[Point], threshold_sq: f64) -> Vec<usize> {
    src.iter()
        .zip(dst)
        .enumerate()
        .filter_map(|(i, (s, d))| {
            let p = model.apply(*s)?;
            let err = (p.x - d.x).powi(2) + (p.y - d.y).powi(2);
            (err <= threshold_sq).then_some(i)
        })
        .collect()
}

/// Any three of the four points (nearly) collinear.
fn is_degenerate(pts: &[Point; 4]) -> bool {
    const TRIPLES: [(usize, usize, usize); 4] = [(0, 1, 2), (0, 1, 3), (0, 2, 3), (1, 2, 3)];
    TRIPLES.iter().any(|&(a, b, c)| {
        let (p, q, r) = (pts[a], pts[b], pts[c]);
        let cross = (q.x - p.x) * (r.y - p.y) - (q.y - p.y) * (r.x - p.x);
        cross.abs() < 1.0
    })
}

// -- Solvers ------------------------------------------------------------------

fn hartley_normalization(pts: &[Point]) -> (Vec<Point>, Matrix3<f64>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p.x).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p.y).sum::<f64>() / n;
    let mean_dist = pts
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts
        .iter()
        .map(|p| Point::new(s * (p.x - cx), s * (p.y - cy)))
        .collect();
    (normalized, t)
}

fn denormalize(hn: Matrix3<f64>, t_src: Matrix3<f64>, t_dst: Matrix3<f64>) -> Option<Homography> {
    let h = t_dst.try_inverse()? * hn * t_src;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(Homography::new(h / s))
}

/// Exact homography with `dst ~ H · src` from four correspondences.
pub fn homography_from_4pt(src: &[Point; 4], dst: &[Point; 4]) -> Option<Homography> {
    let (src_n, t_src) = hartley_normalization(src);
    let (dst_n, t_dst) = hartley_normalization(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for k in 0..4 {
        let (x, y) = (src_n[k].x, src_n[k].y);
        let (u, v) = (dst_n[k].x, dst_n[k].y);

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;
    let hn = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);
    denormalize(hn, t_src, t_dst)
}

/// Least-squares homography (normalized DLT) over all correspondences.
pub fn homography_dlt(src: &[Point], dst: &[Point]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if src.len() == 4 {
        let s: &[Point; 4] = src.try_into().ok()?;
        let d: &[Point; 4] = dst.try_into().ok()?;
        return homography_from_4pt(s, d);
    }

    let (s, t_src) = hartley_normalization(src);
    let (d, t_dst) = hartley_normalization(dst);

    let n = s.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for k in 0..n {
        let (x, y) = (s[k].x, s[k].y);
        let (u, v) = (d[k].x, d[k].y);

        a[(2 * k, 0)] = -x;
        a[(2 * k, 1)] = -y;
        a[(2 * k, 2)] = -1.0;
        a[(2 * k, 6)] = u * x;
        a[(2 * k, 7)] = u * y;
        a[(2 * k, 8)] = u;

        a[(2 * k + 1, 3)] = -x;
        a[(2 * k + 1, 4)] = -y;
        a[(2 * k + 1, 5)] = -1.0;
        a[(2 * k + 1, 6)] = v * x;
        a[(2 * k + 1, 7)] = v * y;
        a[(2 * k + 1, 8)] = v;
    }

    // Right singular vector of the smallest singular value.
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd
        .singular_values
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.total_cmp(y.1))
        .map(|(i, _)| i)?;
    let h = v_t.row(smallest);
    let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], h[8]);
    denormalize(hn, t_src, t_dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn truth() -> Homography {
        Homography::new(Matrix3::new(
            0.9, 0.08, 25.0, //
            -0.05, 1.1, 12.0, //
            0.0004, -0.0002, 1.0,
        ))
    }

    fn grid_pairs(h: &Homography) -> Vec<MatchPair> {
        let mut pairs = Vec::new();
        for gy in 0..6 {
            for gx in 0..8 {
                let frame_point = Point::new(20.0 + gx as f64 * 37.0, 15.0 + gy as f64 * 29.0);
                let reference_point = h.apply(frame_point).unwrap();
                pairs.push(MatchPair {
                    frame_point,
                    reference_point,
                    distance: 10,
                });
            }
        }
        pairs
    }

    fn assert_close(a: Point, b: Point, tol: f64) {
        assert!(a.distance(&b) < tol, "{a:?} vs {b:?}");
    }

    #[test]
    fn four_point_recovers_transform() {
        let h = truth();
        let src = [
            Point::new(0.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(200.0, 120.0),
            Point::new(0.0, 120.0),
        ];
        let dst = src.map(|p| h.apply(p).unwrap());
        let fit = homography_from_4pt(&src, &dst).unwrap();
        for p in [Point::new(50.0, 60.0), Point::new(180.0, 10.0)] {
            assert_close(fit.apply(p).unwrap(), h.apply(p).unwrap(), 1e-6);
        }
    }

    #[test]
    fn dlt_recovers_overdetermined_transform() {
        let pairs = grid_pairs(&truth());
        let src: Vec<Point> = pairs.iter().map(|p| p.frame_point).collect();
        let dst: Vec<Point> = pairs.iter().map(|p| p.reference_point).collect();
        let fit = homography_dlt(&src, &dst).unwrap();
        assert_close(
            fit.apply(Point::new(100.0, 100.0)).unwrap(),
            truth().apply(Point::new(100.0, 100.0)).unwrap(),
            1e-6,
        );
    }

    #[test]
    fn ransac_ignores_outliers() {
        let h = truth();
        let mut pairs = grid_pairs(&h);
        // Corrupt every fourth pair.
        for (i, pair) in pairs.iter_mut().enumerate() {
            if i % 4 == 0 {
                pair.reference_point.x += 40.0 + i as f64;
                pair.reference_point.y -= 25.0;
            }
        }
        let estimator = HomographyEstimator::new(HomographyConfig::default());
        let est = estimator.estimate(&pairs).unwrap();
        assert_eq!(est.inlier_count(), 36);

        // Reference corners map back within the inlier threshold.
        let inverse = est.homography.inverse().unwrap();
        let truth_inverse = h.inverse().unwrap();
        for corner in [
            Point::new(0.0, 0.0),
            Point::new(300.0, 0.0),
            Point::new(300.0, 180.0),
            Point::new(0.0, 180.0),
        ] {
            assert_close(
                inverse.apply(corner).unwrap(),
                truth_inverse.apply(corner).unwrap(),
                3.0,
            );
        }
    }

    #[test]
    fn estimation_is_deterministic() {
        let pairs = grid_pairs(&truth());
        let estimator = HomographyEstimator::new(HomographyConfig::default());
        assert_eq!(estimator.estimate(&pairs), estimator.estimate(&pairs));
    }

    #[test]
    fn too_few_pairs_are_not_fitted() {
        let pairs: Vec<MatchPair> = grid_pairs(&truth()).into_iter().take(11).collect();
        let estimator = HomographyEstimator::new(HomographyConfig::default());
        assert!(estimator.estimate(&pairs).is_none());
    }

    #[test]
    fn collinear_pairs_fail_cleanly() {
        let pairs: Vec<MatchPair> = (0..20)
            .map(|i| MatchPair {
                frame_point: Point::new(i as f64 * 10.0, 5.0),
                reference_point: Point::new(i as f64 * 10.0, 5.0),
                distance: 1,
            })
            .collect();
        let estimator = HomographyEstimator::new(HomographyConfig::default());
        assert!(estimator.estimate(&pairs).is_none());
    }

    #[test]
    fn adaptive_iterations_shrink_with_inlier_ratio() {
        assert_eq!(adaptive_iterations(0.99, 1.0, 2000), 1);
        assert_eq!(adaptive_iterations(0.99, 0.0, 2000), 2000);
        let few = adaptive_iterations(0.99, 0.9, 2000);
        let many = adaptive_iterations(0.99, 0.5, 2000);
        assert!(few < many, "{few} !< {many}");
        assert_eq!(many, 72);
    }

    #[test]
    fn warp_with_identity_keeps_content() {
        let img = GrayImage::from_fn(30, 20, |x, y| Luma([((x + y) * 4) as u8]));
        let out = warp_to_reference(&img, &Homography::identity(), (30, 20)).unwrap();
        assert_eq!(out.get_pixel(10, 10), img.get_pixel(10, 10));
    }
}
