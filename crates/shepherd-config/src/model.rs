// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Shepherd messaging service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Shepherd configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ShepherdConfig {
    /// Process-level settings.
    #[serde(default)]
    pub app: AppConfig,

    /// Church identity used as template variables.
    #[serde(default)]
    pub church: ChurchConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Kakao Alimtalk delivery settings.
    #[serde(default)]
    pub kakao: KakaoConfig,

    /// Sender service batching and pricing.
    #[serde(default)]
    pub sender: SenderConfig,

    /// Periodic sweep settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Queue retention settings.
    #[serde(default)]
    pub retention: RetentionConfig,
}

/// Process-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Church identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChurchConfig {
    /// Church name shown in message bodies.
    #[serde(default = "default_church_name")]
    pub name: String,

    /// Pastor's phone number for call buttons.
    #[serde(default = "default_pastor_phone")]
    pub pastor_phone: String,

    /// Base URL of the church web app used in link buttons.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Offset of the church's local time from UTC, in hours.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i32,
}

impl Default for ChurchConfig {
    fn default() -> Self {
        Self {
            name: default_church_name(),
            pastor_phone: default_pastor_phone(),
            domain: default_domain(),
            utc_offset_hours: default_utc_offset_hours(),
        }
    }
}

fn default_church_name() -> String {
    "은혜교회".to_string()
}

fn default_pastor_phone() -> String {
    "010-1234-5678".to_string()
}

fn default_domain() -> String {
    "https://your-domain.com".to_string()
}

fn default_utc_offset_hours() -> i32 {
    9
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("shepherd").join("shepherd.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("shepherd.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Kakao Alimtalk delivery configuration.
///
/// Without an `api_key` the simulated client is used.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct KakaoConfig {
    /// Messaging API key. `None` selects the simulated client.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Secret used to sign requests.
    #[serde(default)]
    pub api_secret: Option<String>,

    /// Kakao channel sender key (pfId).
    #[serde(default)]
    pub sender_key: Option<String>,

    /// Caller number registered with the provider.
    #[serde(default)]
    pub sender_phone: Option<String>,

    /// Base URL of the messaging API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// HTTP request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Lower bound of simulated send latency in milliseconds.
    #[serde(default = "default_mock_min_latency_ms")]
    pub mock_min_latency_ms: u64,

    /// Upper bound of simulated send latency in milliseconds.
    #[serde(default = "default_mock_max_latency_ms")]
    pub mock_max_latency_ms: u64,

    /// Probability that a simulated send succeeds.
    #[serde(default = "default_mock_success_rate")]
    pub mock_success_rate: f64,
}

impl Default for KakaoConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_secret: None,
            sender_key: None,
            sender_phone: None,
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            mock_min_latency_ms: default_mock_min_latency_ms(),
            mock_max_latency_ms: default_mock_max_latency_ms(),
            mock_success_rate: default_mock_success_rate(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.solapi.com/messages/v4".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_mock_min_latency_ms() -> u64 {
    1000
}

fn default_mock_max_latency_ms() -> u64 {
    3000
}

fn default_mock_success_rate() -> f64 {
    0.9
}

/// Sender service configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SenderConfig {
    /// Items dispatched concurrently per batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds.
    #[serde(default = "default_batch_pause_ms")]
    pub batch_pause_ms: u64,

    /// Charge per accepted message in KRW.
    #[serde(default = "default_cost_per_message")]
    pub cost_per_message: i64,

    /// Retry budget for generated messages.
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// Seconds a claimed item stays reserved for the sweep that claimed it.
    /// An item still `PROCESSING` after its lease is treated as interrupted.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_ms: default_batch_pause_ms(),
            cost_per_message: default_cost_per_message(),
            default_max_retries: default_max_retries(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    5
}

fn default_batch_pause_ms() -> u64 {
    1000
}

fn default_cost_per_message() -> i64 {
    9
}

fn default_max_retries() -> u32 {
    3
}

fn default_claim_lease_secs() -> u64 {
    300
}

/// Periodic sweep configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Seconds between sweeps.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Poll the provider for delivery reports after each sweep.
    #[serde(default = "default_status_refresh")]
    pub status_refresh: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            status_refresh: default_status_refresh(),
        }
    }
}

fn default_interval_secs() -> u64 {
    60
}

fn default_status_refresh() -> bool {
    true
}

/// Queue and message record retention.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Terminal queue items older than this many days are archived, and
    /// message records of the same age with no live queue item are pruned.
    #[serde(default = "default_archive_after_days")]
    pub archive_after_days: u32,

    /// Archived queue items are deleted this many days after archiving.
    /// `0` keeps the archive forever.
    #[serde(default = "default_archive_keep_days")]
    pub archive_keep_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            archive_after_days: default_archive_after_days(),
            archive_keep_days: default_archive_keep_days(),
        }
    }
}

fn default_archive_after_days() -> u32 {
    90
}

fn default_archive_keep_days() -> u32 {
    365
}
