// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Shepherd messaging service.

use thiserror::Error;

/// The primary error type used across all Shepherd traits and core operations.
#[derive(Debug, Error)]
pub enum ShepherdError {
    /// Configuration errors (missing API key, invalid settings).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Delivery client errors (simulated failure, HTTP non-2xx, transport).
    #[error("delivery error: {message}")]
    Delivery {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A message referenced a template code that is not in the catalog.
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// The member directory could not produce a recipient list.
    #[error("member directory error: {message}")]
    Directory {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A keyed record does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ShepherdError {
    /// Whether retrying the same operation later may succeed.
    ///
    /// Only transport-level failures qualify. Configuration problems such as an
    /// unknown template will fail identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Delivery { .. } | Self::Timeout { .. })
    }

    /// Shorthand for a delivery error without an underlying source.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery {
            message: message.into(),
            source: None,
        }
    }
}
