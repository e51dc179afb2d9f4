// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! Services depend on these traits, never on concrete backends, so the
//! delivery client, the store, and the member directory are chosen once at
//! start-up and injected.

pub mod adapter;
pub mod delivery;
pub mod directory;
pub mod queue;
pub mod storage;

pub use adapter::PluginAdapter;
pub use delivery::DeliveryClient;
pub use directory::MemberDirectory;
pub use queue::{MessageStore, QueueStore, ScheduleStore, StatsStore};
pub use storage::StorageAdapter;
