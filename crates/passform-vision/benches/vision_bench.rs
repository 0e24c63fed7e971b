// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the passform-vision pipeline on a synthetic card:
// feature extraction alone, and a full validation cycle including the
// refinement pass.

use std::time::{Duration, Instant};

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::DynamicImage;

use passform_vision::synthetic::{compact_config, frame_with_card, textured_card};
use passform_vision::{DocumentValidator, FeatureExtractor, FrameValidator, OrbExtractor, ReferenceSource};

/// ORB extraction on the 320x200 card.
fn bench_extract(c: &mut Criterion) {
    let card = textured_card(320, 200, 11);
    let orb = OrbExtractor::new(compact_config().detector);

    c.bench_function("orb_extract (320x200)", |b| {
        b.iter(|| black_box(orb.extract(black_box(&card))));
    });
}

/// One full validation of a 640x480 frame containing the card.
fn bench_validate(c: &mut Criterion) {
    let card = textured_card(320, 200, 11);
    let template = DynamicImage::ImageLuma8(card.clone());
    let validator = DocumentValidator::new(ReferenceSource::Image(&template), compact_config());
    let frame = frame_with_card(&card, 640, 480, 160, 140);

    c.bench_function("validate (640x480)", |b| {
        b.iter(|| {
            let deadline = Instant::now() + Duration::from_secs(10);
            black_box(validator.validate(black_box(&frame), None, deadline))
        });
    });
}

criterion_group!(benches, bench_extract, bench_validate);
criterion_main!(benches);
