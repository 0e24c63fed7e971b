// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Stub bridge for desktop/CI builds where no native camera is available.
//
// Camera and recognition calls return `PlatformUnavailable`; no overlay is shown.

use passform_core::error::{PassformError, Result};
use passform_core::{FrameSample, OverlayRect, ValidationResult};

use crate::traits::*;

/// No-op bridge returned on non-mobile platforms.
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl CameraSource for StubBridge {
    fn next_frame(&self) -> Result<Option<FrameSample>> {
        tracing::warn!("CameraSource::next_frame called on stub bridge");
        Err(PassformError::PlatformUnavailable)
    }
}

impl OverlayProvider for StubBridge {
    fn overlay(&self) -> Option<OverlayRect> {
        None
    }
}

impl RecognitionGate for StubBridge {
    fn on_document(&self, _frame: &FrameSample, _result: &ValidationResult) -> Result<()> {
        tracing::warn!("RecognitionGate::on_document called on stub bridge");
        Err(PassformError::PlatformUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_reports_unavailable() {
        let stub = StubBridge;
        assert_eq!(stub.platform_name(), "Desktop (stub)");
        assert!(matches!(stub.next_frame(), Err(PassformError::PlatformUnavailable)));
        assert!(stub.overlay().is_none());
        let frame = FrameSample::gray(vec![0; 4], 2, 2);
        let result = ValidationResult::rejected(passform_core::RejectionReason::NoFeatures, "");
        assert!(matches!(
            stub.on_document(&frame, &result),
            Err(PassformError::PlatformUnavailable)
        ));
    }
}
