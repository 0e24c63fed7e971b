// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Frame normalization: grayscale conversion, rotation, resolution adaptation,
// denoising, tiled contrast equalization and edge-preserving smoothing.
//
// Every intermediate buffer is an owned `GrayImage` local to the call and is
// dropped on return, including early error returns.

use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage, RgbaImage};
use imageproc::filter::{bilateral_filter, gaussian_blur_f32};
use passform_core::config::PreprocessConfig;
use passform_core::error::{PassformError, Result};
use passform_core::{FrameSample, PixelFormat, Rotation};
use tracing::{debug, instrument};

/// A single-channel image ready for feature extraction.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub image: GrayImage,
    /// Factor applied to upright frame coordinates: `normalized = original × scale`.
    pub scale: f64,
    /// Upright (post-rotation) size of the input before resizing.
    pub original_size: (u32, u32),
}

impl NormalizedImage {
    pub fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// Brings reference templates and live frames to a comparable resolution and
/// contrast.
#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    config: PreprocessConfig,
    /// Width of the adapted reference. Live frames are scaled relative to it.
    reference_width: Option<u32>,
}

impl FramePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self {
            config,
            reference_width: None,
        }
    }

    pub fn with_reference_width(mut self, width: u32) -> Self {
        self.reference_width = Some(width);
        self
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Normalize a raw camera frame.
    #[instrument(skip(self, frame), fields(w = frame.width, h = frame.height, format = ?frame.format))]
    pub fn normalize(&self, frame: &FrameSample, is_reference: bool) -> Result<NormalizedImage> {
        let gray = to_gray(frame)?;
        let upright = rotate(gray, frame.rotation);
        Ok(self.normalize_gray(upright, is_reference))
    }

    /// Normalize an already upright single-channel image.
    pub fn normalize_gray(&self, upright: GrayImage, is_reference: bool) -> NormalizedImage {
        let original_size = upright.dimensions();
        let scale = self.target_scale(original_size, is_reference);
        let (w, h) = original_size;
        let target_w = ((w as f64 * scale).round() as u32).max(1);
        let target_h = ((h as f64 * scale).round() as u32).max(1);

        let resized = if (target_w, target_h) == original_size {
            upright
        } else {
            imageops::resize(&upright, target_w, target_h, FilterType::Triangle)
        };

        let denoised = if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&resized, self.config.blur_sigma)
        } else {
            resized
        };

        let equalized = clahe(
            &denoised,
            self.config.clahe_tiles_x,
            self.config.clahe_tiles_y,
            self.config.clahe_clip_limit,
        );

        let image = self.smooth(equalized);

        debug!(
            original_w = w,
            original_h = h,
            target_w,
            target_h,
            scale,
            is_reference,
            "Frame normalized"
        );

        NormalizedImage {
            image,
            scale,
            original_size,
        }
    }

    /// Edge-preserving smoothing over a `2 × radius + 1` window.
    fn smooth(&self, image: GrayImage) -> GrayImage {
        let radius = self.config.bilateral_radius;
        if radius == 0 {
            return image;
        }
        bilateral_filter(
            &image,
            2 * radius + 1,
            self.config.bilateral_sigma_color,
            self.config.bilateral_sigma_space,
        )
    }

    fn target_scale(&self, (w, h): (u32, u32), is_reference: bool) -> f64 {
        if w == 0 || h == 0 {
            return 1.0;
        }
        if is_reference {
            let sx = self.config.target_width as f64 / w as f64;
            let sy = self.config.target_height as f64 / h as f64;
            sx.min(sy)
        } else {
            match self.reference_width {
                Some(ref_w) => ref_w as f64 * self.config.frame_scale_factor / w as f64,
                None => 1.0,
            }
        }
    }
}

/// Extract a single luminance channel from any supported pixel layout.
pub fn to_gray(frame: &FrameSample) -> Result<GrayImage> {
    frame.check()?;
    let (w, h) = (frame.width, frame.height);
    let len = frame.format.required_len(w, h);
    let data = frame.pixels[..len].to_vec();
    let invalid = || PassformError::InvalidFrame(format!("cannot wrap {w}x{h} buffer"));

    match frame.format {
        PixelFormat::Gray8 => GrayImage::from_raw(w, h, data).ok_or_else(invalid),
        PixelFormat::Rgb8 => {
            let rgb = RgbImage::from_raw(w, h, data).ok_or_else(invalid)?;
            Ok(imageops::grayscale(&rgb))
        }
        PixelFormat::Rgba8 => {
            let rgba = RgbaImage::from_raw(w, h, data).ok_or_else(invalid)?;
            Ok(imageops::grayscale(&rgba))
        }
        PixelFormat::Yuv420 => {
            let luma = frame.pixels[..w as usize * h as usize].to_vec();
            GrayImage::from_raw(w, h, luma).ok_or_else(invalid)
        }
    }
}

/// Apply clockwise rotation metadata.
pub fn rotate(image: GrayImage, rotation: Rotation) -> GrayImage {
    match rotation {
        Rotation::Deg0 => image,
        Rotation::Deg90 => imageops::rotate90(&image),
        Rotation::Deg180 => imageops::rotate180(&image),
        Rotation::Deg270 => imageops::rotate270(&image),
    }
}

// -- Contrast-limited adaptive histogram equalization -------------------------

/// Tiled histogram equalization with a clip limit, blending the four nearest
/// tile mappings bilinearly for every pixel.
pub fn clahe(image: &GrayImage, tiles_x: u32, tiles_y: u32, clip_limit: f32) -> GrayImage {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let tx = tiles_x.clamp(1, w);
    let ty = tiles_y.clamp(1, h);

    let mut luts = vec![[0u8; 256]; (tx * ty) as usize];
    for j in 0..ty {
        for i in 0..tx {
            let (x0, x1) = (i * w / tx, (i + 1) * w / tx);
            let (y0, y1) = (j * h / ty, (j + 1) * h / ty);
            luts[(j * tx + i) as usize] = tile_mapping(image, x0, x1, y0, y1, clip_limit);
        }
    }

    let tile_w = w as f32 / tx as f32;
    let tile_h = h as f32 / ty as f32;
    let mut out = GrayImage::new(w, h);

    for y in 0..h {
        let (j0, j1, fy) = blend_position(y, tile_h, ty);
        for x in 0..w {
            let (i0, i1, fx) = blend_position(x, tile_w, tx);
            let v = image.get_pixel(x, y).0[0] as usize;
            let lut = |i: u32, j: u32| luts[(j * tx + i) as usize][v] as f32;

            let top = lut(i0, j0) * (1.0 - fx) + lut(i1, j0) * fx;
            let bottom = lut(i0, j1) * (1.0 - fx) + lut(i1, j1) * fx;
            let value = top * (1.0 - fy) + bottom * fy;
            out.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }

    out
}

/// Clipped, redistributed cumulative histogram of one tile as a lookup table.
fn tile_mapping(image: &GrayImage, x0: u32, x1: u32, y0: u32, y1: u32, clip_limit: f32) -> [u8; 256] {
    let mut histogram = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            histogram[image.get_pixel(x, y).0[0] as usize] += 1;
        }
    }

    let count = (x1 - x0) * (y1 - y0);
    let mut lut = [0u8; 256];
    if count == 0 {
        for (k, entry) in lut.iter_mut().enumerate() {
            *entry = k as u8;
        }
        return lut;
    }

    if clip_limit > 0.0 {
        let limit = ((clip_limit * count as f32 / 256.0) as u32).max(1);
        let mut excess = 0u32;
        for bin in histogram.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }
        let bonus = excess / 256;
        let remainder = excess % 256;
        for (k, bin) in histogram.iter_mut().enumerate() {
            *bin += bonus + u32::from((k as u32) < remainder);
        }
    }

    let mut cdf = 0u64;
    for (k, bin) in histogram.iter().enumerate() {
        cdf += *bin as u64;
        lut[k] = ((cdf * 255 + count as u64 / 2) / count as u64).min(255) as u8;
    }
    lut
}

/// Neighbouring tile indices and blend weight for a pixel coordinate.
fn blend_position(p: u32, tile_size: f32, tiles: u32) -> (u32, u32, f32) {
    let g = (p as f32 + 0.5) / tile_size - 0.5;
    if g <= 0.0 {
        return (0, 0, 0.0);
    }
    let last = tiles - 1;
    let lo = g.floor() as u32;
    if lo >= last {
        return (last, last, 0.0);
    }
    (lo, lo + 1, g - lo as f32)
}
