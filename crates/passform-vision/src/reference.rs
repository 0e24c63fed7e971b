// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The reference template: decoded once, normalized and described, then shared
// read-only by every analysis cycle.

use std::path::Path;

use image::DynamicImage;
use passform_core::error::{PassformError, Result};
use passform_core::{Descriptor, Keypoint, Point};
use tracing::{info, instrument};

use crate::features::FeatureExtractor;
use crate::preprocess::FramePreprocessor;

/// Where the template image comes from.
#[derive(Debug, Clone, Copy)]
pub enum ReferenceSource<'a> {
    Bytes(&'a [u8]),
    Path(&'a Path),
    Image(&'a DynamicImage),
}

/// Immutable descriptor set of the template in normalized coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceModel {
    keypoints: Vec<Keypoint>,
    descriptors: Vec<Descriptor>,
    corner_polygon: [Point; 4],
    normalized_size: (u32, u32),
}

impl ReferenceModel {
    /// Decode, normalize and describe the template.
    ///
    /// Fails with `ReferenceUnavailable` if the image cannot be decoded or
    /// yields no descriptors.
    #[instrument(skip_all)]
    pub fn build(
        source: ReferenceSource<'_>,
        preprocessor: &FramePreprocessor,
        extractor: &dyn FeatureExtractor,
    ) -> Result<Self> {
        let decoded;
        let image = match source {
            ReferenceSource::Image(image) => image,
            ReferenceSource::Bytes(data) => {
                decoded = image::load_from_memory(data).map_err(|err| {
                    PassformError::ReferenceUnavailable(format!("failed to decode template: {err}"))
                })?;
                &decoded
            }
            ReferenceSource::Path(path) => {
                decoded = image::open(path).map_err(|err| {
                    PassformError::ReferenceUnavailable(format!(
                        "failed to open template {}: {err}",
                        path.display()
                    ))
                })?;
                &decoded
            }
        };

        let normalized = preprocessor.normalize_gray(image.to_luma8(), true);
        let features = extractor.extract(&normalized.image);
        if features.is_empty() {
            return Err(PassformError::ReferenceUnavailable(
                "template yields no descriptors".into(),
            ));
        }

        let (w, h) = normalized.size();
        let (wf, hf) = (w as f64, h as f64);
        info!(
            width = w,
            height = h,
            descriptors = features.len(),
            "Reference model built"
        );

        Ok(Self {
            keypoints: features.keypoints,
            descriptors: features.descriptors,
            corner_polygon: [
                Point::new(0.0, 0.0),
                Point::new(wf, 0.0),
                Point::new(wf, hf),
                Point::new(0.0, hf),
            ],
            normalized_size: (w, h),
        })
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.descriptors
    }

    /// Template outline (TL, TR, BR, BL) in normalized reference pixels.
    pub fn corner_polygon(&self) -> &[Point; 4] {
        &self.corner_polygon
    }

    pub fn normalized_size(&self) -> (u32, u32) {
        self.normalized_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::OrbExtractor;
    use crate::synthetic::{compact_config, textured_card};
    use image::{GrayImage, ImageFormat, Luma};
    use std::io::Cursor;

    fn parts() -> (FramePreprocessor, OrbExtractor) {
        let config = compact_config();
        (
            FramePreprocessor::new(config.preprocess.clone()),
            OrbExtractor::new(config.detector.clone()),
        )
    }

    #[test]
    fn textured_template_builds() {
        let (pre, orb) = parts();
        let image = DynamicImage::ImageLuma8(textured_card(320, 200, 11));
        let model = ReferenceModel::build(ReferenceSource::Image(&image), &pre, &orb).unwrap();
        assert_eq!(model.normalized_size(), (320, 200));
        assert_eq!(model.corner_polygon()[2], Point::new(320.0, 200.0));
        assert!(!model.descriptors().is_empty());
        assert_eq!(model.keypoints().len(), model.descriptors().len());
    }

    #[test]
    fn encoded_bytes_and_files_build() {
        let (pre, orb) = parts();
        let mut png = Vec::new();
        DynamicImage::ImageLuma8(textured_card(320, 200, 11))
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .unwrap();
        let from_bytes = ReferenceModel::build(ReferenceSource::Bytes(&png), &pre, &orb).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.png");
        std::fs::write(&path, &png).unwrap();
        let from_path = ReferenceModel::build(ReferenceSource::Path(&path), &pre, &orb).unwrap();
        assert_eq!(from_bytes, from_path);
    }

    #[test]
    fn undecodable_bytes_are_unavailable() {
        let (pre, orb) = parts();
        let err = ReferenceModel::build(ReferenceSource::Bytes(b"not an image"), &pre, &orb).unwrap_err();
        assert!(matches!(err, PassformError::ReferenceUnavailable(_)));
    }

    #[test]
    fn featureless_template_is_unavailable() {
        let (pre, orb) = parts();
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 200, Luma([200])));
        let err = ReferenceModel::build(ReferenceSource::Image(&blank), &pre, &orb).unwrap_err();
        assert!(matches!(err, PassformError::ReferenceUnavailable(_)));
    }
}
