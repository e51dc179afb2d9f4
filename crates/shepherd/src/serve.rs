// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `shepherd serve`: run the scheduler until SIGINT or SIGTERM.

use std::time::Duration;

use shepherd_core::ShepherdError;
use shepherd_messaging::{Scheduler, SchedulerSettings};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::App;

/// How long shutdown waits for in-flight sweeps.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub async fn run_serve(app: &App) -> Result<(), ShepherdError> {
    if let Err(e) = app.archive_expired(None).await {
        warn!(error = %e, "start-up retention pass failed");
    }

    let scheduler = Scheduler::new(
        app.sender.clone(),
        SchedulerSettings::from_config(&app.config.scheduler),
    );
    scheduler.start();
    info!(church = %app.config.church.name, "shepherd is running");

    let cancel = install_signal_handler();
    cancel.cancelled().await;

    if scheduler.drain(DRAIN_TIMEOUT).await {
        info!("scheduler drained");
    }
    Ok(())
}

/// Returns a token cancelled on SIGINT (Ctrl+C) or SIGTERM.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => info!("received SIGINT, shutting down"),
                        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
                    }
                }
                Err(e) => {
                    warn!(error = %e, "SIGTERM handler unavailable, waiting for Ctrl+C only");
                    let _ = ctrl_c.await;
                    info!("received SIGINT, shutting down");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, shutting down");
        }

        trigger.cancel();
    });

    token
}
