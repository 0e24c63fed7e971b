// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Brute-force Hamming matching with a nearest/second-nearest ratio test.

use passform_core::config::MatchingConfig;
use passform_core::{Descriptor, Keypoint, MatchPair, Point, hamming_distance};
use tracing::debug;

/// Index-level correspondence between a frame and a reference descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorMatch {
    pub frame_idx: usize,
    pub reference_idx: usize,
    pub distance: u32,
}

/// Result of matching one frame against the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchSet {
    /// Frame descriptors that found a nearest neighbour.
    pub total: usize,
    /// Ratio-test survivors, in frame order.
    pub good: Vec<DescriptorMatch>,
}

impl MatchSet {
    pub fn good_count(&self) -> usize {
        self.good.len()
    }

    /// Resolve indices to point pairs.
    pub fn to_pairs(&self, frame: &[Keypoint], reference: &[Keypoint]) -> Vec<MatchPair> {
        self.good
            .iter()
            .filter_map(|m| {
                let f = frame.get(m.frame_idx)?;
                let r = reference.get(m.reference_idx)?;
                Some(MatchPair {
                    frame_point: Point::new(f.x as f64, f.y as f64),
                    reference_point: Point::new(r.x as f64, r.y as f64),
                    distance: m.distance,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct Matcher {
    ratio: f32,
}

impl Matcher {
    pub fn new(config: &MatchingConfig) -> Self {
        Self {
            ratio: config.ratio,
        }
    }

    /// Two nearest reference descriptors per frame descriptor; the best is
    /// accepted iff `best < ratio × second`. With a single reference
    /// descriptor there is no second neighbour and the best is accepted.
    pub fn match_descriptors(&self, frame: &[Descriptor], reference: &[Descriptor]) -> MatchSet {
        if frame.is_empty() || reference.is_empty() {
            return MatchSet::default();
        }

        let mut good = Vec::new();
        for (frame_idx, query) in frame.iter().enumerate() {
            let mut best: Option<(usize, u32)> = None;
            let mut second = u32::MAX;

            for (reference_idx, train) in reference.iter().enumerate() {
                let d = hamming_distance(query, train);
                match best {
                    Some((_, b)) if d >= b => second = second.min(d),
                    Some((_, b)) => {
                        second = b;
                        best = Some((reference_idx, d));
                    }
                    None => best = Some((reference_idx, d)),
                }
            }

            let Some((reference_idx, distance)) = best else {
                continue;
            };
            let unambiguous =
                second == u32::MAX || (distance as f32) < self.ratio * second as f32;
            if unambiguous {
                good.push(DescriptorMatch {
                    frame_idx,
                    reference_idx,
                    distance,
                });
            }
        }

        debug!(total = frame.len(), good = good.len(), "Descriptors matched");
        MatchSet {
            total: frame.len(),
            good,
        }
    }
}
