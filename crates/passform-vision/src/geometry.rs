// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Plausibility checks on the reference outline projected into the frame.

use passform_core::config::GeometryConfig;
use passform_core::{Point, Rect, RejectionReason};
use serde::Serialize;
use tracing::debug;

/// Metrics of a projected outline and the first failed check, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryReport {
    pub valid: bool,
    pub reason: Option<RejectionReason>,
    /// Human-readable detail for the failed check.
    pub detail: String,
    pub area: f64,
    pub area_ratio: f64,
    /// Mean of the top and bottom edge lengths.
    pub width: f64,
    /// Mean of the left and right edge lengths.
    pub height: f64,
    /// Mean of the two diagonals.
    pub diagonal: f64,
    pub aspect_ratio: f64,
}

impl GeometryReport {
    fn fail(mut self, reason: RejectionReason, detail: String) -> Self {
        self.valid = false;
        self.reason = Some(reason);
        self.detail = detail;
        self
    }
}

/// Shoelace area of a simple polygon. Zero for fewer than three vertices or
/// collinear input.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let mut twice = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        twice += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    twice.abs() / 2.0
}

/// Edge lengths of a quad ordered TL, TR, BR, BL: `[top, right, bottom, left]`.
pub fn edge_lengths(quad: &[Point; 4]) -> [f64; 4] {
    [
        quad[0].distance(&quad[1]),
        quad[1].distance(&quad[2]),
        quad[2].distance(&quad[3]),
        quad[3].distance(&quad[0]),
    ]
}

/// Centroid of the vertices.
pub fn centroid(points: &[Point]) -> Option<Point> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    Some(Point::new(
        points.iter().map(|p| p.x).sum::<f64>() / n,
        points.iter().map(|p| p.y).sum::<f64>() / n,
    ))
}

/// In-plane rotation of the quad: angle of the top edge, in degrees.
pub fn rotation_angle_degrees(quad: &[Point; 4]) -> f64 {
    (quad[1].y - quad[0].y).atan2(quad[1].x - quad[0].x).to_degrees()
}

fn quad_metrics(points: &[Point]) -> (f64, f64, f64) {
    let Ok(quad) = <&[Point; 4]>::try_from(points) else {
        return (0.0, 0.0, 0.0);
    };
    let [top, right, bottom, left] = edge_lengths(quad);
    let diagonal = (quad[0].distance(&quad[2]) + quad[1].distance(&quad[3])) / 2.0;
    ((top + bottom) / 2.0, (left + right) / 2.0, diagonal)
}

#[derive(Debug, Clone)]
pub struct GeometricValidator {
    config: GeometryConfig,
}

impl GeometricValidator {
    pub fn new(config: GeometryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeometryConfig {
        &self.config
    }

    /// Run the checks in order, stopping at the first failure.
    pub fn validate(&self, corners: &[Point], frame_size: (u32, u32), overlay: Option<&Rect>) -> GeometryReport {
        let (fw, fh) = (frame_size.0 as f64, frame_size.1 as f64);
        let frame_area = fw * fh;
        let area = polygon_area(corners);
        let (width, height, diagonal) = quad_metrics(corners);

        let report = GeometryReport {
            valid: true,
            reason: None,
            detail: String::new(),
            area,
            area_ratio: if frame_area > 0.0 { area / frame_area } else { 0.0 },
            width,
            height,
            diagonal,
            aspect_ratio: if height > 0.0 { width / height } else { 0.0 },
        };

        let report = self.check(report, corners, fw, fh, overlay);
        if let Some(reason) = report.reason {
            debug!(%reason, detail = %report.detail, "Geometry rejected");
        }
        report
    }

    fn check(&self, report: GeometryReport, corners: &[Point], fw: f64, fh: f64, overlay: Option<&Rect>) -> GeometryReport {
        let c = &self.config;

        if let Some(p) = corners
            .iter()
            .find(|p| !(0.0..=fw).contains(&p.x) || !(0.0..=fh).contains(&p.y))
        {
            let detail = format!("corner ({:.1}, {:.1}) outside {fw}x{fh}", p.x, p.y);
            return report.fail(RejectionReason::CornerOutOfBounds, detail);
        }

        if !(c.min_area_ratio..=c.max_area_ratio).contains(&report.area_ratio) {
            let detail = format!(
                "area ratio {:.3} outside [{}, {}]",
                report.area_ratio, c.min_area_ratio, c.max_area_ratio
            );
            return report.fail(RejectionReason::AreaOutOfRange, detail);
        }

        if report.width < c.min_width || report.height < c.min_height || report.diagonal < c.min_diagonal {
            let detail = format!(
                "{:.0}x{:.0} (diagonal {:.0}) below {}x{} (diagonal {})",
                report.width, report.height, report.diagonal, c.min_width, c.min_height, c.min_diagonal
            );
            return report.fail(RejectionReason::TooSmall, detail);
        }

        if (report.aspect_ratio - c.expected_aspect_ratio).abs() > c.aspect_tolerance {
            let detail = format!(
                "aspect {:.2} not within {} of {}",
                report.aspect_ratio, c.aspect_tolerance, c.expected_aspect_ratio
            );
            return report.fail(RejectionReason::AspectRatioMismatch, detail);
        }

        if let Some(overlay) = overlay {
            let outside = corners
                .iter()
                .filter(|p| !overlay.contains_with_margin(p, c.overlay_margin))
                .count();
            if outside > c.max_corners_outside_overlay {
                let detail = format!("{outside} corners outside the guide");
                return report.fail(RejectionReason::OverlayMisaligned, detail);
            }

            let coverage = if overlay.area() > 0.0 {
                report.area / overlay.area()
            } else {
                0.0
            };
            if coverage < c.min_overlay_coverage {
                let detail = format!(
                    "covers {:.0}% of the guide, need {:.0}%",
                    coverage * 100.0,
                    c.min_overlay_coverage * 100.0
                );
                return report.fail(RejectionReason::InsufficientCoverage, detail);
            }
        }

        report
    }
}
