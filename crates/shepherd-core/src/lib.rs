// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Shepherd messaging service.
//!
//! This crate provides the error type, the domain types, and the adapter
//! traits shared by every other crate in the workspace. Backends (SQLite,
//! the Kakao clients) implement the traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ShepherdError;
pub use types::{AdapterType, HealthStatus};

// Re-export all adapter traits at crate root.
pub use traits::{
    DeliveryClient, MemberDirectory, MessageStore, PluginAdapter, QueueStore, ScheduleStore,
    StatsStore, StorageAdapter,
};
