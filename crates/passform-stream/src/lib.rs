// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// passform-stream — Decides which camera frames get analyzed and runs them.

pub mod analyzer;
pub mod state;

pub use analyzer::{AnalysisOutcome, StreamAnalyzer, Submission};
pub use state::{Admission, AnalyzerState, CycleReport, DropReason};
