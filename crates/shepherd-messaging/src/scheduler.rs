// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic queue sweeps.
//!
//! The scheduler owns a timer task that fires once immediately and then
//! every interval. Each tick spawns its own sweep so a slow provider never
//! delays the timer; overlapping sweeps are dropped by the sender's busy
//! flag. Stopping cancels the timer only, in-flight sweeps run to completion.
//! Every spawned sweep is tracked, so [`Scheduler::drain`] can wait for the
//! ones still running at shutdown.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use shepherd_config::SchedulerConfig;
use strum::Display;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::sender::MessageSender;

/// Most sent items checked for delivery reports per tick.
const REPORT_BATCH: usize = 100;

/// Whether the timer task is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    pub interval: Duration,
    /// Poll delivery reports after each sweep.
    pub refresh_status: bool,
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs.max(1)),
            refresh_status: config.status_refresh,
        }
    }
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Drives [`MessageSender::process_pending_messages`] on a fixed interval.
pub struct Scheduler {
    sender: Arc<MessageSender>,
    settings: SchedulerSettings,
    run: Mutex<Option<RunHandle>>,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new(sender: Arc<MessageSender>, settings: SchedulerSettings) -> Self {
        Self {
            sender,
            settings,
            run: Mutex::new(None),
            tracker: TaskTracker::new(),
        }
    }

    fn run_handle(&self) -> MutexGuard<'_, Option<RunHandle>> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start the timer task. Returns false if it was already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) -> bool {
        let mut run = self.run_handle();
        if run.as_ref().is_some_and(|h| !h.task.is_finished()) {
            warn!("message scheduler already running");
            return false;
        }

        self.tracker.reopen();
        let cancel = CancellationToken::new();
        let task = self.tracker.spawn(tick_loop(
            self.sender.clone(),
            self.settings,
            cancel.clone(),
            self.tracker.clone(),
        ));
        *run = Some(RunHandle { cancel, task });
        info!(
            interval_secs = self.settings.interval.as_secs_f64(),
            "message scheduler started"
        );
        true
    }

    /// Cancel the timer task. Safe to call at any time, any number of times.
    pub fn stop(&self) {
        if let Some(handle) = self.run_handle().take() {
            handle.cancel.cancel();
            info!("message scheduler stopped");
        }
    }

    /// Stop the timer and wait up to `timeout` for every sweep and report
    /// refresh it spawned. Returns false if some were still running.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.stop();
        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            debug!("no sweep in flight");
            true
        } else {
            warn!(
                remaining = self.tracker.len(),
                "in-flight sweeps did not finish before shutdown"
            );
            false
        }
    }

    pub fn is_running(&self) -> bool {
        self.run_handle()
            .as_ref()
            .is_some_and(|h| !h.task.is_finished())
    }

    pub fn state(&self) -> SchedulerState {
        if self.is_running() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn tick_loop(
    sender: Arc<MessageSender>,
    settings: SchedulerSettings,
    cancel: CancellationToken,
    tracker: TaskTracker,
) {
    let mut ticker = tokio::time::interval(settings.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("scheduler timer exiting");
                break;
            }
            _ = ticker.tick() => {
                tracker.spawn(sweep(sender.clone(), settings.refresh_status));
            }
        }
    }
}

async fn sweep(sender: Arc<MessageSender>, refresh_status: bool) {
    match sender.process_pending_messages().await {
        Ok(report) if report.skipped => {}
        Ok(report) => debug!(
            due = report.due,
            sent = report.sent,
            "scheduled sweep finished"
        ),
        Err(e) => error!(error = %e, "scheduled sweep failed"),
    }

    if refresh_status
        && let Err(e) = sender.refresh_delivery_status(REPORT_BATCH).await
    {
        warn!(error = %e, "delivery report refresh failed");
    }
}
