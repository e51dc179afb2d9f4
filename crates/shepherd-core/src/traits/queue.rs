// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits for the message queue, the scheduled-message records,
//! and the sending statistics.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::ShepherdError;
use crate::types::{DailyStats, MessageRecord, NewQueueItem, QueueItem, QueueStatus, SentReceipt};

/// Durable message queue.
///
/// Every method is a single atomic unit with respect to every other method:
/// no two calls observe a half-applied read-modify-write.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Assigns a fresh id, sets `PENDING`, retry count 0, and created-at now.
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, ShepherdError>;

    /// Fetches a single item by id.
    async fn get(&self, id: &str) -> Result<Option<QueueItem>, ShepherdError>;

    /// Lists items newest first, optionally filtered by status.
    async fn list(
        &self,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<QueueItem>, ShepherdError>;

    /// Items due for dispatch right now.
    async fn get_pending(&self) -> Result<Vec<QueueItem>, ShepherdError> {
        self.get_pending_at(Utc::now()).await
    }

    /// Items that are `PENDING`, scheduled at or before `now`, and still have
    /// retry budget, ordered by priority rank and then insertion order.
    async fn get_pending_at(&self, now: DateTime<Utc>) -> Result<Vec<QueueItem>, ShepherdError>;

    /// Moves the still-`PENDING` items among `ids` to `PROCESSING` with a
    /// lease until `lease_until`, and returns them in the order of `ids`.
    ///
    /// An item can be claimed by at most one caller until it leaves
    /// `PROCESSING` or its lease runs out.
    async fn claim(
        &self,
        ids: &[String],
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, ShepherdError>;

    /// Returns `PROCESSING` items whose lease ran out before `now` to
    /// `PENDING`, spending one retry on each (`FAILED` when none is left).
    async fn recover_stale(&self, now: DateTime<Utc>) -> Result<usize, ShepherdError>;

    /// Sets the status, stamping `sent_at`/`delivered_at` as appropriate and
    /// mirroring the status to the linked message record.
    async fn update_status(
        &self,
        id: &str,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), ShepherdError>;

    /// Bumps the retry count, never past `max_retries`.
    async fn increment_retry(&self, id: &str) -> Result<(), ShepherdError>;

    /// Consumes one retry and decides the next status in one step.
    ///
    /// Returns `FAILED` (and counts a failed stat) when the budget is spent,
    /// `PENDING` otherwise.
    async fn record_failure(&self, id: &str, error: &str) -> Result<QueueStatus, ShepherdError>;

    /// Marks the item `FAILED` without consuming a retry.
    async fn fail_permanently(&self, id: &str, error: &str) -> Result<(), ShepherdError>;

    /// Marks the item `SENT` and records cost, provider id, and the sent stat.
    async fn record_sent(&self, id: &str, receipt: &SentReceipt) -> Result<(), ShepherdError>;

    /// Applies a provider delivery report (`DELIVERED`, `READ`, or `FAILED`)
    /// together with its statistics action.
    ///
    /// Only `SENT` items accept a report; returns false when the item has
    /// already moved on.
    async fn record_report(
        &self,
        id: &str,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<bool, ShepherdError>;

    /// `PENDING -> CANCELLED`. Returns false when the item was not pending.
    async fn cancel(&self, id: &str) -> Result<bool, ShepherdError>;

    /// `SENT` items carrying a provider message id, oldest first.
    async fn awaiting_report(&self, limit: usize) -> Result<Vec<QueueItem>, ShepherdError>;

    /// Moves terminal items created before `older_than` to the archive.
    async fn archive_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, ShepherdError>;

    /// Deletes archived items archived before `older_than`.
    async fn prune_archive(&self, older_than: DateTime<Utc>) -> Result<usize, ShepherdError>;
}

/// Per-day sending counters.
#[async_trait]
pub trait StatsStore: Send + Sync {
    /// Every day from `since` (inclusive) that has counters, oldest first.
    async fn sending_stats(&self, since: NaiveDate) -> Result<Vec<DailyStats>, ShepherdError>;
}

/// Generated weekly message records.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Persists records and their queue items in one transaction.
    ///
    /// `items[i]` belongs to `records[i]`. Records whose id already exists are
    /// skipped along with their item. Returns the newly enqueued items.
    async fn save_scheduled(
        &self,
        records: Vec<MessageRecord>,
        items: Vec<NewQueueItem>,
    ) -> Result<Vec<QueueItem>, ShepherdError>;

    /// Pending records whose scheduled instant falls on `date` (UTC).
    async fn scheduled_for_date(&self, date: NaiveDate)
    -> Result<Vec<MessageRecord>, ShepherdError>;

    /// Deletes records created before `older_than` that no live queue item
    /// references. Their sermons are never scheduled again.
    async fn prune_records(&self, older_than: DateTime<Utc>) -> Result<usize, ShepherdError>;
}

/// Everything the messaging services need from persistence.
pub trait MessageStore: QueueStore + StatsStore + ScheduleStore {}

impl<T: QueueStore + StatsStore + ScheduleStore> MessageStore for T {}
