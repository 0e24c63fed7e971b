// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Passform — live camera document-template gating
//
// Entry point. Initialises logging and dispatches the subcommand.

mod cli;
mod commands;

use std::process::ExitCode;

use clap::Parser;
use passform_core::guidance::describe_error;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Passform starting");

    let outcome = match &cli.command {
        Commands::Check { template, image, common } => {
            commands::check(template, image, common).map(|result| result.is_valid)
        }
        Commands::Replay { template, dir, fps, common } => {
            commands::replay(template, dir, *fps, common).await.map(|()| true)
        }
        Commands::Live { template, fps, common } => commands::live(template, *fps, common).await.map(|()| true),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(err) => {
            let guidance = describe_error(&err);
            tracing::error!(error = %err, suggestion = %guidance.suggestion, "{}", guidance.message);
            ExitCode::FAILURE
        }
    }
}
