// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sermon follow-up messaging: weekly generation, queueing, sending, and
//! periodic scheduling.

pub mod generator;
pub mod schedule;
pub mod scheduler;
pub mod sender;

pub use generator::{ChurchProfile, MessageGenerator};
pub use schedule::{ScheduleSummary, schedule_sermon};
pub use scheduler::{Scheduler, SchedulerSettings, SchedulerState};
pub use sender::{DispatchOutcome, MessageSender, RefreshReport, SenderSettings, SweepReport};
