// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// `check`, `replay` and `live` subcommands.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use passform_bridge::{FixedOverlay, PlatformBridge, ReplayBridge, ReplayCamera, platform_bridge};
use passform_core::error::{PassformError, Result};
use passform_core::guidance::guidance_for;
use passform_core::{AnalyzerSnapshot, FrameSample, OverlayRect, PassformConfig, PixelFormat, ValidationResult};
use passform_stream::{StreamAnalyzer, Submission};
use passform_vision::{DocumentValidator, FrameValidator, ReferenceSource};
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::cli::CommonArgs;

fn load_config(path: Option<&Path>) -> Result<PassformConfig> {
    match path {
        Some(path) => {
            let config = PassformConfig::from_json_file(path)?;
            info!(path = %path.display(), "Configuration loaded");
            Ok(config)
        }
        None => Ok(PassformConfig::default()),
    }
}

fn build_validator(template: &Path, config: &PassformConfig) -> Result<DocumentValidator> {
    let validator = DocumentValidator::new(ReferenceSource::Path(template), config.validator.clone());
    if !validator.is_ready() {
        return Err(PassformError::ReferenceUnavailable(template.display().to_string()));
    }
    Ok(validator)
}

fn log_guidance(result: &ValidationResult) {
    let guidance = guidance_for(result);
    if result.is_valid {
        info!(message = %guidance.message, "Document detected");
    } else {
        warn!(
            message = %guidance.message,
            suggestion = %guidance.suggestion,
            retriable = guidance.retriable,
            "Document not accepted"
        );
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Validate one still image.
pub fn check(template: &Path, image_path: &Path, common: &CommonArgs) -> Result<ValidationResult> {
    let config = load_config(common.config.as_deref())?;
    let validator = build_validator(template, &config)?;

    let rgb = image::open(image_path)
        .map_err(|e| PassformError::ImageError(format!("{}: {e}", image_path.display())))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    let frame = FrameSample::new(rgb.into_raw(), width, height, PixelFormat::Rgb8).with_rotation(common.rotation());

    let deadline = Instant::now() + Duration::from_millis(config.analyzer.cycle_budget_ms);
    let result = validator.validate(&frame, common.overlay.as_ref(), deadline);
    log_guidance(&result);
    print_json(&result)?;
    Ok(result)
}

fn check_fps(fps: f64) -> Result<()> {
    if !(fps.is_finite() && fps > 0.0) {
        return Err(PassformError::Config(format!("fps must be positive, got {fps}")));
    }
    Ok(())
}

/// Replay a directory through the stream analyzer at a fixed frame rate.
pub async fn replay(template: &Path, dir: &Path, fps: f64, common: &CommonArgs) -> Result<()> {
    check_fps(fps)?;
    let config = load_config(common.config.as_deref())?;
    let validator = Arc::new(build_validator(template, &config)?);
    let camera = ReplayCamera::from_dir(dir)?.with_rotation(common.rotation());
    let bridge = Arc::new(ReplayBridge::new(camera, FixedOverlay(common.overlay)));

    let snapshot = stream(bridge, validator, &config, fps, None).await?;
    print_json(&snapshot)
}

/// Analyze the host platform's live camera. `--overlay` applies only while the
/// platform shows no guide of its own.
pub async fn live(template: &Path, fps: f64, common: &CommonArgs) -> Result<()> {
    check_fps(fps)?;
    let config = load_config(common.config.as_deref())?;
    let validator = Arc::new(build_validator(template, &config)?);
    let bridge = platform_bridge();
    info!(platform = bridge.platform_name(), "Opening live camera");

    let snapshot = stream(bridge, validator, &config, fps, common.overlay).await?;
    print_json(&snapshot)
}

/// Pull frames from `bridge` at `fps` until it runs dry, hand accepted
/// documents to its recognition gate, and report the final analyzer state.
pub async fn stream(
    bridge: Arc<dyn PlatformBridge>,
    validator: Arc<dyn FrameValidator>,
    config: &PassformConfig,
    fps: f64,
    fallback_overlay: Option<OverlayRect>,
) -> Result<AnalyzerSnapshot> {
    let analyzer = StreamAnalyzer::new(validator, config.analyzer.clone());

    let mut outcomes = analyzer.subscribe();
    let gate = Arc::clone(&bridge);
    let printer = tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(outcome) => {
                    log_guidance(&outcome.result);
                    if let Some(frame) = &outcome.frame {
                        if let Err(err) = gate.on_document(frame, &outcome.result) {
                            warn!(error = %err, "Recognition gate refused the frame");
                        }
                    }
                    match serde_json::to_string(&outcome) {
                        Ok(line) => println!("{line}"),
                        Err(err) => warn!(error = %err, "Could not serialize outcome"),
                    }
                }
                Err(RecvError::Lagged(missed)) => warn!(missed, "Outcome printer fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let fed = feed(bridge.as_ref(), &analyzer, fps, fallback_overlay).await;

    let snapshot = analyzer.snapshot();
    drop(analyzer);
    if printer.await.is_err() {
        warn!("Outcome printer task failed");
    }

    let submitted = fed?;
    info!(
        platform = bridge.platform_name(),
        submitted,
        analyzed = snapshot.total_count,
        valid = snapshot.successful_count,
        dropped = snapshot.dropped_count,
        "Stream finished"
    );
    Ok(snapshot)
}

/// Submit every camera frame on a fixed tick and wait for the last accepted
/// cycle. Returns the number of frames submitted.
async fn feed(
    bridge: &dyn PlatformBridge,
    analyzer: &StreamAnalyzer,
    fps: f64,
    fallback_overlay: Option<OverlayRect>,
) -> Result<usize> {
    let period = Duration::from_secs_f64(1.0 / fps);
    let mut ticker = tokio::time::interval(period);
    let mut pending = None;
    let mut submitted = 0usize;

    let pulled = loop {
        let frame = match bridge.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        };
        ticker.tick().await;
        submitted += 1;
        let overlay = bridge.overlay().or(fallback_overlay);
        if let Submission::Accepted { outcome, .. } = analyzer.submit(frame, overlay) {
            pending = Some(outcome);
        }
    };

    if let Some(last) = pending {
        // The sender only disappears if the cycle task was torn down.
        if last.await.is_err() {
            warn!("Last analysis cycle was cancelled");
        }
    }
    pulled.map(|()| submitted)
}
