// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Service assembly shared by every subcommand.

use std::sync::Arc;

use chrono::{DateTime, Days, Utc};
use shepherd_config::ShepherdConfig;
use shepherd_core::{QueueStore, ScheduleStore, ShepherdError, StorageAdapter};
use shepherd_messaging::{ChurchProfile, MessageGenerator, MessageSender, SenderSettings};
use shepherd_storage::SqliteStorage;
use shepherd_templates::TemplateCatalog;
use tracing::info;

/// Opened store, selected delivery client, and the services over them.
pub struct App {
    pub config: ShepherdConfig,
    pub storage: Arc<SqliteStorage>,
    pub catalog: Arc<TemplateCatalog>,
    pub sender: Arc<MessageSender>,
}

impl App {
    pub async fn open(config: ShepherdConfig) -> Result<Self, ShepherdError> {
        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await?;
        let storage = Arc::new(storage);

        let catalog = TemplateCatalog::builtin();
        catalog.validate()?;
        let catalog = Arc::new(catalog);
        let client = shepherd_kakao::create_delivery_client(&config.kakao)?;
        let sender = Arc::new(MessageSender::new(
            storage.clone(),
            client,
            catalog.clone(),
            SenderSettings::from_config(&config.sender),
        ));

        Ok(Self {
            config,
            storage,
            catalog,
            sender,
        })
    }

    /// A generator reading recipients from the member table.
    pub fn generator(&self) -> Result<MessageGenerator, ShepherdError> {
        Ok(MessageGenerator::new(
            self.catalog.clone(),
            self.storage.clone(),
            ChurchProfile::from_config(&self.config.church)?,
        ))
    }

    /// Apply retention with `days` as the age limit (the retention setting
    /// when `None`).
    ///
    /// Terminal queue items older than the limit move to the archive, message
    /// records of that age with no queue item left are pruned, and archive
    /// rows past `retention.archive_keep_days` are deleted.
    pub async fn archive_expired(&self, days: Option<u32>) -> Result<RetentionReport, ShepherdError> {
        let retention = &self.config.retention;
        let days = days.unwrap_or(retention.archive_after_days);
        let now = Utc::now();
        let cutoff = days_before(now, days);

        let archived = self.storage.archive_terminal(cutoff).await?;
        let pruned_records = self.storage.prune_records(cutoff).await?;
        let expired_archive = if retention.archive_keep_days == 0 {
            0
        } else {
            let keep_cutoff = days_before(now, retention.archive_keep_days);
            self.storage.prune_archive(keep_cutoff).await?
        };

        let report = RetentionReport {
            archived,
            pruned_records,
            expired_archive,
        };
        info!(
            archived,
            pruned_records,
            expired_archive,
            days,
            "retention applied"
        );
        Ok(report)
    }

    pub async fn close(&self) -> Result<(), ShepherdError> {
        self.storage.close().await
    }
}

/// Row counts from one retention pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    pub archived: usize,
    pub pruned_records: usize,
    pub expired_archive: usize,
}

fn days_before(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    now.checked_sub_days(Days::new(u64::from(days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
