// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// passform-bridge — Host platform collaborators: camera, overlay, recognition gate.
//
// Native mobile bridges plug in behind `PlatformBridge`; desktop and CI builds
// get the stub for live capture plus a file-based replay bridge.

use std::sync::Arc;

pub mod replay;
pub mod stub;
pub mod traits;

pub use replay::{FixedOverlay, LogGate, ReplayBridge, ReplayCamera};
pub use stub::StubBridge;
pub use traits::{CameraSource, OverlayProvider, PlatformBridge, RecognitionGate};

/// The live-camera bridge for the platform this binary was built for.
pub fn platform_bridge() -> Arc<dyn PlatformBridge> {
    Arc::new(StubBridge)
}

#[cfg(test)]
mod tests {
    use super::*;
    use passform_core::error::PassformError;

    #[test]
    fn desktop_build_gets_the_stub() {
        let bridge = platform_bridge();
        assert_eq!(bridge.platform_name(), "Desktop (stub)");
        assert!(matches!(bridge.next_frame(), Err(PassformError::PlatformUnavailable)));
    }
}
