// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scheduler bookkeeping as one value with pure transitions.
//
// Every method takes the state by value and returns the next one. The
// analyzer applies them under its single lock; clocks are passed in.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use passform_core::config::AnalyzerConfig;
use passform_core::{AnalyzerMode, AnalyzerSnapshot};
use serde::{Deserialize, Serialize};

/// Why a frame was not analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DropReason {
    Disabled,
    Cooldown,
    Busy,
    Throttled,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Disabled => "analyzer disabled",
            Self::Cooldown => "in success cooldown",
            Self::Busy => "analysis in progress",
            Self::Throttled => "interval not elapsed",
        };
        f.write_str(text)
    }
}

/// Decision for an arriving frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accept,
    Drop(DropReason),
}

/// What a finished cycle reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub valid: bool,
    pub processing_ms: u64,
    pub finished_at: Instant,
    pub finished_wall: DateTime<Utc>,
    /// State generation the cycle was admitted under.
    pub generation: u64,
}

impl CycleReport {
    /// A cycle that ended without a result (panic or cancellation).
    pub fn aborted(processing_ms: u64, generation: u64) -> Self {
        Self {
            valid: false,
            processing_ms,
            finished_at: Instant::now(),
            finished_wall: Utc::now(),
            generation,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzerState {
    disabled: bool,
    analyzing: bool,
    /// Bumped by `enable`; reports from older generations only free the slot.
    generation: u64,
    cooldown_until: Option<Instant>,
    last_start: Option<Instant>,
    interval: Duration,
    consecutive_failures: u32,
    consecutive_successes: u32,
    successful_count: u64,
    total_count: u64,
    dropped_count: u64,
    recent_ms: VecDeque<u64>,
    last_success_at: Option<DateTime<Utc>>,
}

impl Default for AnalyzerState {
    fn default() -> Self {
        Self::new(&AnalyzerConfig::default())
    }
}

impl AnalyzerState {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            disabled: false,
            analyzing: false,
            generation: 0,
            cooldown_until: None,
            last_start: None,
            interval: Duration::from_millis(config.initial_interval_ms),
            consecutive_failures: 0,
            consecutive_successes: 0,
            successful_count: 0,
            total_count: 0,
            dropped_count: 0,
            recent_ms: VecDeque::with_capacity(config.perf_window),
            last_success_at: None,
        }
    }

    /// Decide whether a frame arriving at `now` starts a cycle.
    ///
    /// An expired cooldown is cleared here rather than by a timer.
    pub fn admit(mut self, now: Instant) -> (Self, Admission) {
        if let Some(until) = self.cooldown_until {
            if now >= until {
                self.cooldown_until = None;
            }
        }

        let dropped = if self.disabled {
            Some(DropReason::Disabled)
        } else if self.cooldown_until.is_some() {
            Some(DropReason::Cooldown)
        } else if self.analyzing {
            Some(DropReason::Busy)
        } else if self.last_start.is_some_and(|start| now < start + self.interval) {
            Some(DropReason::Throttled)
        } else {
            None
        };

        match dropped {
            Some(reason) => {
                self.dropped_count += 1;
                (self, Admission::Drop(reason))
            }
            None => {
                self.analyzing = true;
                self.last_start = Some(now);
                (self, Admission::Accept)
            }
        }
    }

    /// Record the end of the in-flight cycle and adapt the interval.
    ///
    /// A cycle admitted before the last `enable` releases the slot but leaves
    /// the reset counters alone.
    pub fn finish(mut self, report: CycleReport, config: &AnalyzerConfig) -> Self {
        self.analyzing = false;
        if report.generation != self.generation {
            return self;
        }
        self.total_count += 1;
        self.recent_ms.push_back(report.processing_ms);
        while self.recent_ms.len() > config.perf_window.max(1) {
            self.recent_ms.pop_front();
        }

        let step = config.interval_step.max(1.0);
        let current = self.interval.as_millis() as f64;

        if report.valid {
            self.successful_count += 1;
            self.consecutive_successes += 1;
            self.consecutive_failures = 0;
            self.last_success_at = Some(report.finished_wall);
            if self.consecutive_successes >= config.successes_before_speedup {
                let next = ((current / step).round() as u64).max(config.min_interval_ms);
                self.interval = Duration::from_millis(next);
            }
            if !self.disabled {
                self.cooldown_until =
                    Some(report.finished_at + Duration::from_millis(config.success_cooldown_ms));
            }
        } else {
            self.consecutive_failures += 1;
            self.consecutive_successes = 0;
            if self.consecutive_failures >= config.failures_before_backoff {
                let next = ((current * step).round() as u64).min(config.max_interval_ms);
                self.interval = Duration::from_millis(next);
            }
        }
        self
    }

    /// Stop admitting frames. An in-flight cycle still finishes.
    pub fn disable(mut self) -> Self {
        self.disabled = true;
        self.cooldown_until = None;
        self
    }

    /// Back to Idle with every counter and the interval reset. An in-flight
    /// cycle keeps its slot until it finishes.
    pub fn enable(self, config: &AnalyzerConfig) -> Self {
        Self {
            analyzing: self.analyzing,
            generation: self.generation.wrapping_add(1),
            ..Self::new(config)
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn mode(&self, now: Instant) -> AnalyzerMode {
        if self.disabled {
            AnalyzerMode::Disabled
        } else if self.analyzing {
            AnalyzerMode::Analyzing
        } else if self.cooldown_until.is_some_and(|until| now < until) {
            AnalyzerMode::SuccessCooldown
        } else if self.last_start.is_some_and(|start| now < start + self.interval) {
            AnalyzerMode::Throttled
        } else {
            AnalyzerMode::Idle
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn snapshot(&self, now: Instant) -> AnalyzerSnapshot {
        let average = if self.recent_ms.is_empty() {
            0.0
        } else {
            self.recent_ms.iter().sum::<u64>() as f64 / self.recent_ms.len() as f64
        };
        AnalyzerSnapshot {
            mode: self.mode(now),
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
            successful_count: self.successful_count,
            total_count: self.total_count,
            dropped_count: self.dropped_count,
            current_interval_ms: self.interval.as_millis() as u64,
            average_processing_ms: average,
            last_processing_ms: self.recent_ms.back().copied(),
            last_success_at: self.last_success_at,
        }
    }
}
