// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Shepherd integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic tests without a provider account or a real member list.
//!
//! # Components
//!
//! - [`MockDelivery`] - Delivery client with scripted responses and request capture
//! - [`StaticDirectory`] / [`FailingDirectory`] - Member directories
//! - [`TestHarness`] - Temp-file SQLite store seeded with members
//! - [`fixtures`] - Sample sermons, members, and queue items

pub mod fixtures;
pub mod harness;
pub mod mock_delivery;
pub mod mock_directory;

pub use harness::TestHarness;
pub use mock_delivery::{MockDelivery, Scripted};
pub use mock_directory::{FailingDirectory, StaticDirectory};
