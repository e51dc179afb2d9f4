// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter lifecycle trait.

use async_trait::async_trait;

use crate::error::ShepherdError;
use crate::traits::adapter::PluginAdapter;

/// Lifecycle of a persistence backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Opens the backend and applies pending schema migrations.
    async fn initialize(&self) -> Result<(), ShepherdError>;

    /// Flushes pending writes and releases connections.
    async fn close(&self) -> Result<(), ShepherdError>;
}
