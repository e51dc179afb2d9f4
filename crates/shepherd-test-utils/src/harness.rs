// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Temp-file SQLite store for integration tests.

use std::sync::Arc;

use shepherd_config::StorageConfig;
use shepherd_core::types::Member;
use shepherd_core::{ShepherdError, StorageAdapter};
use shepherd_storage::SqliteStorage;

/// Builder for a [`TestHarness`].
#[derive(Default)]
pub struct TestHarnessBuilder {
    members: Vec<Member>,
    wal_mode: bool,
}

impl TestHarnessBuilder {
    /// Seed the member table.
    pub fn with_members(mut self, members: Vec<Member>) -> Self {
        self.members = members;
        self
    }

    pub fn with_wal(mut self, wal_mode: bool) -> Self {
        self.wal_mode = wal_mode;
        self
    }

    pub async fn build(self) -> Result<TestHarness, ShepherdError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| ShepherdError::Storage { source: e.into() })?;
        let db_path = temp_dir.path().join("shepherd.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: self.wal_mode,
        });
        storage.initialize().await?;
        if !self.members.is_empty() {
            storage.upsert_members(self.members).await?;
        }

        Ok(TestHarness {
            storage: Arc::new(storage),
            temp_dir,
        })
    }
}

/// An initialized on-disk store, removed on drop.
pub struct TestHarness {
    pub storage: Arc<SqliteStorage>,
    temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::default()
    }

    /// Path of the database file.
    pub fn db_path(&self) -> std::path::PathBuf {
        self.temp_dir.path().join("shepherd.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;
    use shepherd_core::MemberDirectory;
    use shepherd_core::types::MessageCategory;

    #[tokio::test]
    async fn seeds_members_into_a_temp_database() {
        let harness = TestHarness::builder()
            .with_members(vec![
                fixtures::member("m1", "010-1111-2222"),
                fixtures::member("m2", "010-3333-4444"),
            ])
            .build()
            .await
            .unwrap();

        assert!(harness.db_path().exists());
        let recipients = harness
            .storage
            .message_recipients(MessageCategory::SermonSummary)
            .await
            .unwrap();
        assert_eq!(recipients.len(), 2);
    }
}
