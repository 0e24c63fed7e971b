// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Desktop collaborators: a camera that replays still images from a directory,
// a fixed overlay and a gate that only logs, bundled as a `PlatformBridge`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use passform_core::error::{PassformError, Result};
use passform_core::{FrameSample, OverlayRect, PixelFormat, Rotation, ValidationResult};
use tracing::{debug, info};

use crate::traits::{CameraSource, OverlayProvider, PlatformBridge, RecognitionGate};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff", "webp"];

/// Plays back the images of a directory in file-name order as RGB frames.
#[derive(Debug)]
pub struct ReplayCamera {
    files: Vec<PathBuf>,
    next: AtomicUsize,
    rotation: Rotation,
}

impl ReplayCamera {
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if path.is_file() && is_image {
                files.push(path);
            }
        }
        files.sort();
        info!(dir = %dir.display(), frames = files.len(), "Replay camera ready");
        Ok(Self {
            files,
            next: AtomicUsize::new(0),
            rotation: Rotation::Deg0,
        })
    }

    /// Tag every frame with sensor rotation metadata.
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// File behind the most recently delivered frame.
    pub fn current_path(&self) -> Option<&Path> {
        let delivered = self.next.load(Ordering::Acquire);
        delivered.checked_sub(1).and_then(|i| self.files.get(i)).map(|p| p.as_path())
    }
}

impl CameraSource for ReplayCamera {
    fn next_frame(&self) -> Result<Option<FrameSample>> {
        let total = self.files.len();
        let claimed = self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| (i < total).then_some(i + 1));
        let Ok(index) = claimed else {
            return Ok(None);
        };
        let path = &self.files[index];

        let rgb = image::open(path)
            .map_err(|e| PassformError::ImageError(format!("{}: {e}", path.display())))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        debug!(file = %path.display(), width, height, "Replaying frame");
        Ok(Some(
            FrameSample::new(rgb.into_raw(), width, height, PixelFormat::Rgb8).with_rotation(self.rotation),
        ))
    }
}

/// A guide rectangle that never moves.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedOverlay(pub Option<OverlayRect>);

impl OverlayProvider for FixedOverlay {
    fn overlay(&self) -> Option<OverlayRect> {
        self.0
    }
}

/// Logs accepted documents instead of recognizing them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogGate;

impl RecognitionGate for LogGate {
    fn on_document(&self, frame: &FrameSample, result: &ValidationResult) -> Result<()> {
        info!(
            width = frame.width,
            height = frame.height,
            confidence = result.confidence,
            "Document ready for recognition"
        );
        Ok(())
    }
}

/// Directory replay with a fixed guide and a logging gate.
#[derive(Debug)]
pub struct ReplayBridge {
    camera: ReplayCamera,
    overlay: FixedOverlay,
    gate: LogGate,
}

impl ReplayBridge {
    pub fn new(camera: ReplayCamera, overlay: FixedOverlay) -> Self {
        Self {
            camera,
            overlay,
            gate: LogGate,
        }
    }

    pub fn camera(&self) -> &ReplayCamera {
        &self.camera
    }
}

impl PlatformBridge for ReplayBridge {
    fn platform_name(&self) -> &str {
        "Desktop replay"
    }
}

impl CameraSource for ReplayBridge {
    fn next_frame(&self) -> Result<Option<FrameSample>> {
        self.camera.next_frame()
    }
}

impl OverlayProvider for ReplayBridge {
    fn overlay(&self) -> Option<OverlayRect> {
        self.overlay.overlay()
    }
}

impl RecognitionGate for ReplayBridge {
    fn on_document(&self, frame: &FrameSample, result: &ValidationResult) -> Result<()> {
        self.gate.on_document(frame, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn replays_images_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(8, 6, Luma([10])).save(dir.path().join("b.png")).unwrap();
        GrayImage::from_pixel(4, 3, Luma([200])).save(dir.path().join("a.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let camera = ReplayCamera::from_dir(dir.path()).unwrap();
        assert_eq!(camera.len(), 2);

        let first = camera.next_frame().unwrap().unwrap();
        assert_eq!((first.width, first.height), (4, 3));
        assert_eq!(first.format, PixelFormat::Rgb8);
        assert_eq!(first.pixels.len(), 4 * 3 * 3);
        assert_eq!(camera.current_path().unwrap().file_name().unwrap(), "a.png");

        let second = camera.next_frame().unwrap().unwrap();
        assert_eq!((second.width, second.height), (8, 6));
        assert!(camera.next_frame().unwrap().is_none());
    }

    #[test]
    fn rotation_is_tagged() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(4, 2, Luma([0])).save(dir.path().join("f.png")).unwrap();
        let camera = ReplayCamera::from_dir(dir.path()).unwrap().with_rotation(Rotation::Deg90);
        let frame = camera.next_frame().unwrap().unwrap();
        assert_eq!(frame.upright_size(), (2, 4));
    }

    #[test]
    fn unreadable_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.png"), b"not a png").unwrap();
        let camera = ReplayCamera::from_dir(dir.path()).unwrap();
        assert!(matches!(camera.next_frame(), Err(PassformError::ImageError(_))));
        assert!(camera.next_frame().unwrap().is_none());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = ReplayCamera::from_dir(Path::new("/nonexistent/passform-frames")).unwrap_err();
        assert!(matches!(err, PassformError::Io(_)));
    }

    #[test]
    fn fixed_overlay_and_log_gate() {
        let guide = OverlayRect::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(FixedOverlay(Some(guide)).overlay(), Some(guide));
        assert_eq!(FixedOverlay::default().overlay(), None);
        let frame = FrameSample::gray(vec![0; 4], 2, 2);
        let result = ValidationResult::rejected(passform_core::RejectionReason::NoFeatures, "");
        assert!(LogGate.on_document(&frame, &result).is_ok());
    }

    #[test]
    fn replay_bridge_serves_every_collaborator() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(6, 4, Luma([30])).save(dir.path().join("only.png")).unwrap();
        let guide = OverlayRect::new(0.0, 0.0, 6.0, 4.0);
        let bridge: std::sync::Arc<dyn PlatformBridge> = std::sync::Arc::new(ReplayBridge::new(
            ReplayCamera::from_dir(dir.path()).unwrap(),
            FixedOverlay(Some(guide)),
        ));

        assert_eq!(bridge.platform_name(), "Desktop replay");
        assert_eq!(bridge.overlay(), Some(guide));
        let frame = bridge.next_frame().unwrap().unwrap();
        assert_eq!((frame.width, frame.height), (6, 4));
        assert!(bridge.next_frame().unwrap().is_none());

        let result = ValidationResult::rejected(passform_core::RejectionReason::NoFeatures, "");
        assert!(bridge.on_document(&frame, &result).is_ok());
    }

    #[test]
    fn exhausted_camera_stays_exhausted() {
        let dir = tempfile::tempdir().unwrap();
        GrayImage::from_pixel(2, 2, Luma([0])).save(dir.path().join("a.png")).unwrap();
        let camera = ReplayCamera::from_dir(dir.path()).unwrap();
        assert!(camera.next_frame().unwrap().is_some());
        for _ in 0..3 {
            assert!(camera.next_frame().unwrap().is_none());
        }
        assert_eq!(camera.current_path().unwrap().file_name().unwrap(), "a.png");
    }
}
