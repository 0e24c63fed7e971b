// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Passform — Core types, configuration and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod guidance;
pub mod types;

pub use config::PassformConfig;
pub use error::{PassformError, ReasonClass, RejectionReason};
pub use types::*;
