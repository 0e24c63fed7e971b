// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming front end over a `FrameValidator`.
//
// Frames are admitted or dropped synchronously. An admitted frame is validated
// on the tokio blocking pool under a wall-clock budget; its outcome is
// delivered on a per-frame oneshot and broadcast to every subscriber. A cycle
// that overruns its budget reports a timeout at once but keeps the slot until
// the blocking worker returns, so at most one validation ever runs.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use passform_core::config::AnalyzerConfig;
use passform_core::{AnalyzerSnapshot, CycleId, FrameSample, Rect, RejectionReason, ValidationResult};
use passform_vision::FrameValidator;
use serde::Serialize;
use tokio::sync::{broadcast, oneshot};
use tracing::{debug, error, info, instrument, warn};

use crate::state::{Admission, AnalyzerState, CycleReport, DropReason};

/// Result of one analysis cycle.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub cycle_id: CycleId,
    pub result: ValidationResult,
    pub completed_at: DateTime<Utc>,
    /// The analyzed frame, present only when it should go on to recognition.
    #[serde(skip)]
    pub frame: Option<Arc<FrameSample>>,
}

/// What happened to a submitted frame.
#[derive(Debug)]
pub enum Submission {
    Dropped(DropReason),
    Accepted {
        cycle_id: CycleId,
        outcome: oneshot::Receiver<AnalysisOutcome>,
    },
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

type SharedState = Arc<Mutex<AnalyzerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, AnalyzerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Throttled, single-slot scheduler feeding frames to a validator.
pub struct StreamAnalyzer {
    validator: Arc<dyn FrameValidator>,
    config: AnalyzerConfig,
    state: SharedState,
    outcomes: broadcast::Sender<AnalysisOutcome>,
}

impl StreamAnalyzer {
    pub fn new(validator: Arc<dyn FrameValidator>, config: AnalyzerConfig) -> Self {
        let (outcomes, _) = broadcast::channel(config.broadcast_capacity.max(1));
        Self {
            validator,
            state: Arc::new(Mutex::new(AnalyzerState::new(&config))),
            config,
            outcomes,
        }
    }

    /// Offer a frame. Dropped frames are never queued.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip_all)]
    pub fn submit(&self, frame: FrameSample, overlay: Option<Rect>) -> Submission {
        let (admission, generation) = {
            let mut state = lock(&self.state);
            let (next, admission) = std::mem::take(&mut *state).admit(Instant::now());
            let generation = next.generation();
            *state = next;
            (admission, generation)
        };

        if let Admission::Drop(reason) = admission {
            debug!(%reason, "Frame dropped");
            return Submission::Dropped(reason);
        }

        let cycle_id = CycleId::new();
        let (reply, outcome) = oneshot::channel();
        let guard = InFlightGuard::new(Arc::clone(&self.state), self.config.clone(), generation);
        let cycle = Cycle {
            id: cycle_id,
            validator: Arc::clone(&self.validator),
            frame: Arc::new(frame),
            overlay,
            budget: Duration::from_millis(self.config.cycle_budget_ms),
            broadcast: self.outcomes.clone(),
            reply,
        };
        debug!(cycle = %cycle_id, "Frame accepted");
        tokio::spawn(cycle.run(guard));

        Submission::Accepted { cycle_id, outcome }
    }

    pub fn disable(&self) {
        let mut state = lock(&self.state);
        *state = std::mem::take(&mut *state).disable();
        info!("Stream analysis disabled");
    }

    pub fn enable(&self) {
        let mut state = lock(&self.state);
        *state = std::mem::take(&mut *state).enable(&self.config);
        info!("Stream analysis enabled");
    }

    pub fn snapshot(&self) -> AnalyzerSnapshot {
        lock(&self.state).snapshot(Instant::now())
    }

    /// Receive every future cycle outcome.
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisOutcome> {
        self.outcomes.subscribe()
    }
}

/// Holds the single analysis slot. Dropping it records the cycle, with a
/// failed report if none was set.
struct InFlightGuard {
    state: SharedState,
    config: AnalyzerConfig,
    generation: u64,
    started: Instant,
    report: Option<CycleReport>,
}

impl InFlightGuard {
    fn new(state: SharedState, config: AnalyzerConfig, generation: u64) -> Self {
        Self {
            state,
            config,
            generation,
            started: Instant::now(),
            report: None,
        }
    }

    /// Set the report the slot is released with.
    fn record(&mut self, result: &ValidationResult) {
        self.report = Some(CycleReport {
            valid: result.is_valid,
            processing_ms: result.processing_time_ms,
            finished_at: Instant::now(),
            finished_wall: Utc::now(),
            generation: self.generation,
        });
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let report = self.report.take().unwrap_or_else(|| {
            warn!("Analysis cycle ended without a result");
            CycleReport::aborted(self.started.elapsed().as_millis() as u64, self.generation)
        });
        let mut state = lock(&self.state);
        *state = std::mem::take(&mut *state).finish(report, &self.config);
    }
}

struct Cycle {
    id: CycleId,
    validator: Arc<dyn FrameValidator>,
    frame: Arc<FrameSample>,
    overlay: Option<Rect>,
    budget: Duration,
    broadcast: broadcast::Sender<AnalysisOutcome>,
    reply: oneshot::Sender<AnalysisOutcome>,
}

impl Cycle {
    async fn run(self, mut guard: InFlightGuard) {
        let id = self.id;
        let deadline = Instant::now() + self.budget;
        let validator = Arc::clone(&self.validator);
        let frame = Arc::clone(&self.frame);
        let overlay = self.overlay;
        let mut work = tokio::task::spawn_blocking(move || validator.validate(&frame, overlay.as_ref(), deadline));

        let budget_ms = self.budget.as_millis() as u64;
        match tokio::time::timeout(self.budget, &mut work).await {
            Ok(joined) => {
                let result = joined.unwrap_or_else(|err| {
                    error!(cycle = %id, error = %err, "Validation worker failed");
                    ValidationResult::rejected(RejectionReason::Internal, format!("validation worker failed: {err}"))
                        .with_processing_time(guard.started.elapsed().as_millis() as u64)
                });
                guard.record(&result);
                drop(guard);
                self.deliver(result);
            }
            Err(_) => {
                warn!(cycle = %id, budget_ms, "Validation exceeded its budget");
                let result =
                    ValidationResult::rejected(RejectionReason::Timeout, format!("cycle exceeded {budget_ms} ms"))
                        .with_processing_time(budget_ms);
                guard.record(&result);
                self.deliver(result);

                // Blocking work cannot be cancelled; its late result is discarded.
                if let Err(err) = work.await {
                    warn!(cycle = %id, error = %err, "Timed-out validation worker failed");
                }
                debug!(
                    cycle = %id,
                    held_ms = guard.started.elapsed().as_millis() as u64,
                    "Timed-out worker returned, slot released"
                );
                drop(guard);
            }
        }
    }

    fn deliver(self, result: ValidationResult) {
        info!(
            cycle = %self.id,
            valid = result.is_valid,
            reason = ?result.reason,
            confidence = result.confidence,
            elapsed_ms = result.processing_time_ms,
            "Analysis cycle finished"
        );

        let outcome = AnalysisOutcome {
            cycle_id: self.id,
            frame: result.should_trigger_recognition().then_some(self.frame),
            result,
            completed_at: Utc::now(),
        };
        // No subscribers, or a caller that stopped waiting, is fine.
        let _ = self.broadcast.send(outcome.clone());
        let _ = self.reply.send(outcome);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use passform_core::AnalyzerMode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fixed-answer validator that counts its calls.
    struct Scripted {
        valid: bool,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(valid: bool, delay_ms: u64) -> Arc<Self> {
            Arc::new(Self {
                valid,
                delay: Duration::from_millis(delay_ms),
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl FrameValidator for Scripted {
        fn validate(&self, _: &FrameSample, _: Option<&Rect>, _: Instant) -> ValidationResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            let mut result = ValidationResult::rejected(RejectionReason::LowConfidence, "scripted");
            if self.valid {
                result.is_valid = true;
                result.confidence = 0.9;
                result.reason = None;
                result.error_message = None;
            }
            result.with_processing_time(self.delay.as_millis() as u64)
        }
    }

    struct Panicking;

    impl FrameValidator for Panicking {
        fn validate(&self, _: &FrameSample, _: Option<&Rect>, _: Instant) -> ValidationResult {
            panic!("validator blew up");
        }
    }

    fn frame() -> FrameSample {
        FrameSample::gray(vec![0; 16], 4, 4)
    }

    async fn outcome_of(submission: Submission) -> AnalysisOutcome {
        match submission {
            Submission::Accepted { outcome, .. } => outcome.await.unwrap(),
            Submission::Dropped(reason) => panic!("frame dropped: {reason}"),
        }
    }

    #[tokio::test]
    async fn burst_within_interval_runs_one_cycle() {
        let validator = Scripted::new(false, 20);
        let analyzer = StreamAnalyzer::new(validator.clone(), AnalyzerConfig::default());

        let mut accepted = Vec::new();
        let mut dropped = 0;
        for _ in 0..10 {
            match analyzer.submit(frame(), None) {
                Submission::Dropped(_) => dropped += 1,
                s => accepted.push(s),
            }
        }
        assert_eq!(accepted.len(), 1);
        assert_eq!(dropped, 9);

        let outcome = outcome_of(accepted.remove(0)).await;
        assert!(!outcome.result.is_valid);
        assert!(outcome.frame.is_none());
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);

        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.total_count, 1);
        assert_eq!(snapshot.dropped_count, 9);
    }

    #[tokio::test]
    async fn frames_during_cooldown_are_dropped() {
        let analyzer = StreamAnalyzer::new(Scripted::new(true, 0), AnalyzerConfig::default());
        let outcome = outcome_of(analyzer.submit(frame(), None)).await;
        assert!(outcome.result.is_valid);
        assert!(outcome.frame.is_some());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.mode, AnalyzerMode::SuccessCooldown);
        assert!(snapshot.last_success_at.is_some());
        assert!(matches!(
            analyzer.submit(frame(), None),
            Submission::Dropped(DropReason::Cooldown)
        ));

        analyzer.enable();
        assert!(analyzer.submit(frame(), None).is_accepted());
    }

    fn fast_timeout_config() -> AnalyzerConfig {
        AnalyzerConfig {
            cycle_budget_ms: 30,
            min_interval_ms: 10,
            initial_interval_ms: 10,
            ..AnalyzerConfig::default()
        }
    }

    #[tokio::test]
    async fn timed_out_cycle_holds_the_slot_until_the_worker_returns() {
        let validator = Scripted::new(true, 300);
        let analyzer = StreamAnalyzer::new(validator.clone(), fast_timeout_config());
        let outcome = outcome_of(analyzer.submit(frame(), None)).await;
        assert_eq!(outcome.result.reason, Some(RejectionReason::Timeout));
        assert!(!outcome.result.is_valid);
        assert!(outcome.frame.is_none());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(analyzer.snapshot().mode, AnalyzerMode::Analyzing);
        assert!(matches!(
            analyzer.submit(frame(), None),
            Submission::Dropped(DropReason::Busy)
        ));

        tokio::time::sleep(Duration::from_millis(350)).await;
        let snapshot = analyzer.snapshot();
        assert_eq!(snapshot.mode, AnalyzerMode::Idle);
        assert_eq!(snapshot.total_count, 1);
        assert_eq!(snapshot.successful_count, 0);
        assert_eq!(validator.calls.load(Ordering::SeqCst), 1);
        assert!(analyzer.submit(frame(), None).is_accepted());
    }

    /// Records the highest number of overlapping `validate` calls.
    struct Overlap {
        delay: Duration,
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    impl FrameValidator for Overlap {
        fn validate(&self, _: &FrameSample, _: Option<&Rect>, _: Instant) -> ValidationResult {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.current.fetch_sub(1, Ordering::SeqCst);
            ValidationResult::rejected(RejectionReason::LowConfidence, "overlap")
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn timeouts_never_overlap_validations() {
        let validator = Arc::new(Overlap {
            delay: Duration::from_millis(300),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let analyzer = StreamAnalyzer::new(validator.clone(), fast_timeout_config());

        let mut busy = 0;
        for _ in 0..5 {
            match analyzer.submit(frame(), None) {
                Submission::Dropped(DropReason::Busy) => busy += 1,
                Submission::Dropped(_) => {}
                accepted => {
                    let outcome = outcome_of(accepted).await;
                    assert_eq!(outcome.result.reason, Some(RejectionReason::Timeout));
                }
            }
            tokio::time::sleep(Duration::from_millis(15)).await;
        }
        tokio::time::sleep(Duration::from_millis(400)).await;

        assert_eq!(validator.peak.load(Ordering::SeqCst), 1);
        assert!(busy >= 1, "later frames should find the slot busy");
        assert_eq!(validator.current.load(Ordering::SeqCst), 0);
        assert_eq!(analyzer.snapshot().mode, AnalyzerMode::Idle);
    }

    #[tokio::test]
    async fn panicking_validator_is_internal() {
        let config = AnalyzerConfig {
            min_interval_ms: 10,
            initial_interval_ms: 10,
            ..AnalyzerConfig::default()
        };
        let analyzer = StreamAnalyzer::new(Arc::new(Panicking), config);
        let outcome = outcome_of(analyzer.submit(frame(), None)).await;
        assert_eq!(outcome.result.reason, Some(RejectionReason::Internal));

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(analyzer.submit(frame(), None).is_accepted());
        assert_eq!(analyzer.snapshot().consecutive_failures, 1);
    }

    #[tokio::test]
    async fn disabled_analyzer_drops_everything() {
        let analyzer = StreamAnalyzer::new(Scripted::new(true, 0), AnalyzerConfig::default());
        analyzer.disable();
        assert!(matches!(
            analyzer.submit(frame(), None),
            Submission::Dropped(DropReason::Disabled)
        ));
        assert_eq!(analyzer.snapshot().mode, AnalyzerMode::Disabled);
        analyzer.enable();
        assert_eq!(analyzer.snapshot().dropped_count, 0);
        assert!(analyzer.submit(frame(), None).is_accepted());
    }

    #[tokio::test]
    async fn subscribers_see_every_outcome() {
        let analyzer = StreamAnalyzer::new(Scripted::new(false, 0), AnalyzerConfig::default());
        let mut rx = analyzer.subscribe();
        let Submission::Accepted { cycle_id, outcome } = analyzer.submit(frame(), None) else {
            panic!("first frame must be accepted");
        };
        let direct = outcome.await.unwrap();
        let broadcast = rx.recv().await.unwrap();
        assert_eq!(direct.cycle_id, cycle_id);
        assert_eq!(broadcast.cycle_id, cycle_id);
        assert_eq!(broadcast.result, direct.result);
    }
}
