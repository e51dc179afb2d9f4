// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the storage traits.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use shepherd_config::model::StorageConfig;
use shepherd_core::types::{
    DailyStats, Member, MessageCategory, MessageRecord, NewQueueItem, QueueItem, QueueStatus,
    Recipient, SentReceipt,
};
use shepherd_core::{
    AdapterType, HealthStatus, MemberDirectory, PluginAdapter, QueueStore, ScheduleStore,
    ShepherdError, StatsStore, StorageAdapter,
};

use crate::database::{Database, map_tr_err};
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates to the typed query modules.
/// The database is opened on the first call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    ///
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    /// Wrap an already-open database.
    pub fn with_database(db: Database) -> Self {
        Self {
            config: StorageConfig {
                database_path: ":memory:".to_string(),
                wal_mode: false,
            },
            db: OnceCell::from(db),
        }
    }

    /// A ready-to-use store over a private in-memory database.
    pub async fn in_memory() -> Result<Self, ShepherdError> {
        Ok(Self::with_database(Database::open_in_memory().await?))
    }

    /// Returns a reference to the underlying Database, or an error if not initialized.
    fn db(&self) -> Result<&Database, ShepherdError> {
        self.db.get().ok_or_else(|| ShepherdError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    /// Insert or update directory members.
    pub async fn upsert_members(&self, members: Vec<Member>) -> Result<usize, ShepherdError> {
        queries::members::upsert_members(self.db()?, members).await
    }

    /// Every directory member.
    pub async fn list_members(&self) -> Result<Vec<Member>, ShepherdError> {
        queries::members::list_members(self.db()?).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, ShepherdError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), ShepherdError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| ShepherdError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), ShepherdError> {
        let db = self.db()?;
        if self.config.wal_mode {
            db.connection()
                .call(|conn| {
                    conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                    Ok(())
                })
                .await
                .map_err(map_tr_err)?;
            debug!("WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteStorage {
    async fn enqueue(&self, item: NewQueueItem) -> Result<QueueItem, ShepherdError> {
        queries::queue::enqueue(self.db()?, item).await
    }

    async fn get(&self, id: &str) -> Result<Option<QueueItem>, ShepherdError> {
        queries::queue::get(self.db()?, id).await
    }

    async fn list(
        &self,
        status: Option<QueueStatus>,
        limit: usize,
    ) -> Result<Vec<QueueItem>, ShepherdError> {
        queries::queue::list(self.db()?, status, limit).await
    }

    async fn get_pending_at(&self, now: DateTime<Utc>) -> Result<Vec<QueueItem>, ShepherdError> {
        queries::queue::get_pending_at(self.db()?, now).await
    }

    async fn claim(
        &self,
        ids: &[String],
        lease_until: DateTime<Utc>,
    ) -> Result<Vec<QueueItem>, ShepherdError> {
        queries::queue::claim(self.db()?, ids, lease_until).await
    }

    async fn recover_stale(&self, now: DateTime<Utc>) -> Result<usize, ShepherdError> {
        queries::queue::recover_stale(self.db()?, now).await
    }

    async fn update_status(
        &self,
        id: &str,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<(), ShepherdError> {
        queries::queue::update_status(self.db()?, id, status, error).await
    }

    async fn increment_retry(&self, id: &str) -> Result<(), ShepherdError> {
        queries::queue::increment_retry(self.db()?, id).await
    }

    async fn record_failure(&self, id: &str, error: &str) -> Result<QueueStatus, ShepherdError> {
        queries::queue::record_failure(self.db()?, id, error).await
    }

    async fn fail_permanently(&self, id: &str, error: &str) -> Result<(), ShepherdError> {
        queries::queue::fail_permanently(self.db()?, id, error).await
    }

    async fn record_sent(&self, id: &str, receipt: &SentReceipt) -> Result<(), ShepherdError> {
        queries::queue::record_sent(self.db()?, id, receipt).await
    }

    async fn record_report(
        &self,
        id: &str,
        status: QueueStatus,
        error: Option<&str>,
    ) -> Result<bool, ShepherdError> {
        queries::queue::record_report(self.db()?, id, status, error).await
    }

    async fn cancel(&self, id: &str) -> Result<bool, ShepherdError> {
        queries::queue::cancel(self.db()?, id).await
    }

    async fn awaiting_report(&self, limit: usize) -> Result<Vec<QueueItem>, ShepherdError> {
        queries::queue::awaiting_report(self.db()?, limit).await
    }

    async fn archive_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, ShepherdError> {
        queries::queue::archive_terminal(self.db()?, older_than).await
    }

    async fn prune_archive(&self, older_than: DateTime<Utc>) -> Result<usize, ShepherdError> {
        queries::queue::prune_archive(self.db()?, older_than).await
    }
}

#[async_trait]
impl StatsStore for SqliteStorage {
    async fn sending_stats(&self, since: NaiveDate) -> Result<Vec<DailyStats>, ShepherdError> {
        queries::stats::sending_stats(self.db()?, since).await
    }
}

#[async_trait]
impl ScheduleStore for SqliteStorage {
    async fn save_scheduled(
        &self,
        records: Vec<MessageRecord>,
        items: Vec<NewQueueItem>,
    ) -> Result<Vec<QueueItem>, ShepherdError> {
        queries::scheduled::save_scheduled(self.db()?, records, items).await
    }

    async fn scheduled_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<MessageRecord>, ShepherdError> {
        queries::scheduled::scheduled_for_date(self.db()?, date).await
    }

    async fn prune_records(&self, older_than: DateTime<Utc>) -> Result<usize, ShepherdError> {
        queries::scheduled::prune_records(self.db()?, older_than).await
    }
}

#[async_trait]
impl MemberDirectory for SqliteStorage {
    async fn message_recipients(
        &self,
        category: MessageCategory,
    ) -> Result<Vec<Recipient>, ShepherdError> {
        let result = match self.db() {
            Ok(db) => queries::members::message_recipients(db, category).await,
            Err(e) => Err(e),
        };
        result.map_err(|e| ShepherdError::Directory {
            message: format!("member lookup failed for {category}"),
            source: Some(Box::new(e)),
        })
    }
}
