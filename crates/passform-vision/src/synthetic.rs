// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic document targets for tests and benchmarks.

use image::imageops;
use image::{GrayImage, Luma};
use passform_core::FrameSample;
use passform_core::config::ValidatorConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A card-like texture: a smooth wavy background with overlapping shaded
/// rectangles, reproducible from `seed`.
pub fn textured_card(width: u32, height: u32, seed: u64) -> GrayImage {
    let mut rng = StdRng::seed_from_u64(seed);
    let fx: f32 = rng.gen_range(0.02..0.06);
    let fy: f32 = rng.gen_range(0.02..0.06);
    let phase: f32 = rng.gen_range(0.0..6.0);

    let mut card = GrayImage::from_fn(width, height, |x, y| {
        let wave = (x as f32 * fx + phase).sin() * (y as f32 * fy).cos();
        Luma([(128.0 + 40.0 * wave) as u8])
    });

    let count = (width * height / 1500).max(8);
    for _ in 0..count {
        let w = rng.gen_range(6..(width / 4).max(7));
        let h = rng.gen_range(6..(height / 4).max(7));
        let x0 = rng.gen_range(0..width.saturating_sub(w).max(1));
        let y0 = rng.gen_range(0..height.saturating_sub(h).max(1));
        let base: f32 = rng.gen_range(10.0..245.0);
        let gx: f32 = rng.gen_range(-1.5..1.5);
        let gy: f32 = rng.gen_range(-1.5..1.5);

        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                let v = base + gx * (x - x0) as f32 + gy * (y - y0) as f32;
                card.put_pixel(x, y, Luma([v.clamp(0.0, 255.0) as u8]));
            }
        }
    }
    card
}

/// A uniform gray frame with `card` pasted at `(x, y)`.
pub fn frame_with_card(card: &GrayImage, width: u32, height: u32, x: i64, y: i64) -> FrameSample {
    let mut canvas = GrayImage::from_pixel(width, height, Luma([128]));
    imageops::replace(&mut canvas, card, x, y);
    FrameSample::gray(canvas.into_raw(), width, height)
}

/// Validator settings sized for a 320×200 synthetic card seen 1:1 in a
/// 640-pixel-wide frame.
pub fn compact_config() -> ValidatorConfig {
    let mut config = ValidatorConfig::default();
    config.preprocess.target_width = 320;
    config.preprocess.target_height = 200;
    config.preprocess.frame_scale_factor = 2.0;
    config.detector.max_features = 800;
    config.detector.levels = 4;
    config
}
