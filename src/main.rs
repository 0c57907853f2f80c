// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use data_wallet_demo::config::DemoConfig;
use data_wallet_demo::error::DemoError;
use data_wallet_demo::logging::{init_tracing, LogFormat};
use data_wallet_demo::pipeline::{DemoReport, Orchestrator, StepStatus};
use data_wallet_demo::state::DemoServices;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing(LogFormat::from_env());

    match run().await {
        Ok(report) if report.succeeded() => {
            tracing::info!(run_id = %report.run_id, "Demo finished");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            let failed = report
                .steps
                .iter()
                .filter(|r| r.status == StepStatus::Failed)
                .count();
            let skipped = report
                .steps
                .iter()
                .filter(|r| r.status == StepStatus::Skipped)
                .count();
            tracing::error!(run_id = %report.run_id, failed, skipped, "Demo finished with errors");
            ExitCode::FAILURE
        }
        Err(e) => {
            tracing::error!(error = %e, "Demo could not start");
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<DemoReport, DemoError> {
    let config = DemoConfig::from_env()?;
    let services = DemoServices::from_config(&config)?;
    let orchestrator = Orchestrator::new(config, services)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, skipping remaining steps");
            signal_token.cancel();
        }
    });

    Ok(orchestrator.run(shutdown).await)
}
