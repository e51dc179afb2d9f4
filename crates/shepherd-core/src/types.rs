// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the store, the delivery clients, and the
//! messaging services.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Retry budget for queue items that do not specify one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Response code the Alimtalk API uses for an accepted message.
pub const SUCCESS_CODE: &str = "2000";

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Delivery,
    Storage,
    Directory,
}

// --- Queue vocabulary ---

/// Outbound message channel.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Alimtalk,
    Sms,
    Lms,
}

/// Dispatch priority. Lower rank is dispatched first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl Priority {
    /// Sort rank: `HIGH` < `NORMAL` < `LOW`.
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

/// Lifecycle of a queue item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Delivered,
    Read,
    Failed,
    Cancelled,
}

impl QueueStatus {
    /// True once the sender will never pick the item up again.
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Processing)
    }

    /// The scheduled-message status mirrored for this queue status, if any.
    pub fn record_status(self) -> Option<RecordStatus> {
        match self {
            Self::Sent => Some(RecordStatus::Sent),
            Self::Delivered => Some(RecordStatus::Delivered),
            Self::Read => Some(RecordStatus::Read),
            Self::Failed => Some(RecordStatus::Failed),
            Self::Pending | Self::Processing | Self::Cancelled => None,
        }
    }
}

/// Status of a generated scheduled-message record.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Counter bucket in the sending statistics.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StatAction {
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Messaging category a member can opt in to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageCategory {
    SermonSummary,
    Meditation,
    PracticeCheck,
    Announcements,
}

// --- Buttons ---

/// What a button does when tapped. Every payload may carry placeholders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ButtonAction {
    WebLink { url: String },
    Phone { phone_number: String },
    Message { message_text: String },
}

/// An action button attached to a template or a rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Button {
    pub id: String,
    pub text: String,
    #[serde(flatten)]
    pub action: ButtonAction,
}

// --- Generated messages ---

/// One rendered message for one recipient, produced by the weekly generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageRecord {
    /// `{sermon_id}-{template_id}-{recipient_phone}`.
    pub id: String,
    pub template_id: String,
    pub sermon_id: String,
    pub recipient_phone: String,
    pub member_id: Option<String>,
    pub content: String,
    pub buttons: Vec<Button>,
    /// Merged variable map the content was rendered with.
    pub variables: BTreeMap<String, String>,
    pub scheduled_time: DateTime<Utc>,
    pub status: RecordStatus,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Deterministic record key; re-generating a sermon yields the same keys.
    pub fn record_id(sermon_id: &str, template_id: &str, phone: &str) -> String {
        format!("{sermon_id}-{template_id}-{phone}")
    }
}

// --- Queue items ---

/// Everything the caller supplies when enqueueing. The store assigns the
/// id, status, retry count, and creation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub message_type: MessageType,
    pub template_code: Option<String>,
    pub recipient_phone: String,
    pub content: String,
    pub template_variables: BTreeMap<String, String>,
    pub buttons: Vec<Button>,
    pub scheduled_time: DateTime<Utc>,
    pub priority: Priority,
    pub max_retries: u32,
    pub sermon_id: Option<String>,
    pub member_id: Option<String>,
    pub record_id: Option<String>,
}

impl NewQueueItem {
    /// A normal-priority Alimtalk item with the default retry budget.
    pub fn alimtalk(
        template_code: impl Into<String>,
        recipient_phone: impl Into<String>,
        content: impl Into<String>,
        scheduled_time: DateTime<Utc>,
    ) -> Self {
        Self {
            message_type: MessageType::Alimtalk,
            template_code: Some(template_code.into()),
            recipient_phone: recipient_phone.into(),
            content: content.into(),
            template_variables: BTreeMap::new(),
            buttons: Vec::new(),
            scheduled_time,
            priority: Priority::Normal,
            max_retries: DEFAULT_MAX_RETRIES,
            sermon_id: None,
            member_id: None,
            record_id: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, String>) -> Self {
        self.template_variables = variables;
        self
    }
}

/// A unit of outbound work tracked from `PENDING` to a terminal state.
///
/// Field names form the read-only reporting contract consumed by dashboards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub template_code: Option<String>,
    pub recipient_phone: String,
    pub content: String,
    pub template_variables: BTreeMap<String, String>,
    pub buttons: Vec<Button>,
    pub scheduled_time: DateTime<Utc>,
    pub priority: Priority,
    pub retry_count: u32,
    pub max_retries: u32,
    pub status: QueueStatus,
    pub sermon_id: Option<String>,
    pub member_id: Option<String>,
    pub record_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub cost: Option<i64>,
    pub provider_message_id: Option<u64>,
}

impl QueueItem {
    /// Whether the sender may dispatch this item at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == QueueStatus::Pending
            && self.scheduled_time <= now
            && self.retry_count < self.max_retries
    }
}

/// Outcome details persisted when the delivery client accepts a message.
#[derive(Debug, Clone, PartialEq)]
pub struct SentReceipt {
    /// Charge for this message in KRW.
    pub cost: i64,
    pub provider_message_id: Option<u64>,
}

// --- Statistics ---

/// Per-template counters for one day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateStats {
    pub sent: i64,
    pub delivered: i64,
    pub read: i64,
    pub failed: i64,
    pub cost: i64,
}

/// Aggregate counters for one UTC calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyStats {
    /// `YYYY-MM-DD`.
    pub date: String,
    pub total_sent: i64,
    pub total_delivered: i64,
    pub total_read: i64,
    pub total_failed: i64,
    pub total_cost: i64,
    pub templates: BTreeMap<String, TemplateStats>,
}

// --- Members and sermons ---

/// Per-category messaging opt-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePreferences {
    pub receive_sermon_summary: bool,
    pub receive_meditation: bool,
    pub receive_practice_check: bool,
    pub receive_announcements: bool,
}

impl Default for MessagePreferences {
    fn default() -> Self {
        Self {
            receive_sermon_summary: true,
            receive_meditation: true,
            receive_practice_check: true,
            receive_announcements: true,
        }
    }
}

impl MessagePreferences {
    /// Whether the member opted in to `category`.
    pub fn allows(&self, category: MessageCategory) -> bool {
        match category {
            MessageCategory::SermonSummary => self.receive_sermon_summary,
            MessageCategory::Meditation => self.receive_meditation,
            MessageCategory::PracticeCheck => self.receive_practice_check,
            MessageCategory::Announcements => self.receive_announcements,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A church member as seen by the member directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    pub name: String,
    pub phone: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub message_settings: MessagePreferences,
}

/// A resolved message recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub member_id: Option<String>,
    pub phone: String,
}

/// A sermon after AI processing, as supplied by the sermon store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedSermon {
    pub id: String,
    pub title: String,
    pub scripture: String,
    /// Local calendar date of the sermon.
    pub date: NaiveDate,
    pub summary: String,
    #[serde(default)]
    pub meditation: String,
    #[serde(default)]
    pub practical_tasks: Vec<String>,
}

// --- Alimtalk wire types ---

/// Alimtalk button kinds: web link, app link, delivery search, bot keyword,
/// message delivery, add channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlimtalkButtonType {
    #[serde(rename = "WL")]
    WebLink,
    #[serde(rename = "AL")]
    AppLink,
    #[serde(rename = "DS")]
    DeliverySearch,
    #[serde(rename = "BK")]
    BotKeyword,
    #[serde(rename = "MD")]
    MessageDelivery,
    #[serde(rename = "AC")]
    AddChannel,
}

/// A button as sent to the Alimtalk API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlimtalkButton {
    pub name: String,
    #[serde(rename = "type")]
    pub button_type: AlimtalkButtonType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_pc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme_android: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheme_ios: Option<String>,
}

/// An Alimtalk send request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlimtalkSendRequest {
    pub template_code: String,
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Template variables.
    pub content: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<AlimtalkButton>,
}

/// Provider-side delivery state of a message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Delivered,
    Read,
    Failed,
}

/// Details of an accepted message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub mid: u64,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub country: String,
    pub subject: String,
    pub content: String,
    pub to: String,
    pub from: String,
    pub status: DeliveryStatus,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
    pub prepaid: bool,
    pub account: String,
}

/// Response to an Alimtalk send request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlimtalkSendResponse {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub data: Option<SendResult>,
    #[serde(default, rename = "errorMessage")]
    pub error_message: Option<String>,
}

impl AlimtalkSendResponse {
    /// Accepted by the provider with a message id attached.
    pub fn is_success(&self) -> bool {
        self.code == SUCCESS_CODE && self.data.is_some()
    }

    /// Best human-readable failure reason.
    pub fn failure_reason(&self) -> String {
        self.error_message
            .clone()
            .unwrap_or_else(|| format!("send failed: {} ({})", self.message, self.code))
    }
}

/// Status report for a single provider message id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageStatusEntry {
    pub mid: u64,
    pub status: DeliveryStatus,
    pub result_code: String,
    pub result_message: String,
    #[serde(default)]
    pub sent_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub delivered_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub read_time: Option<DateTime<Utc>>,
}

/// Response to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageStatusResponse {
    pub code: String,
    pub message: String,
    #[serde(default)]
    pub data: Vec<MessageStatusEntry>,
}

/// Prepaid account balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub balance: i64,
    pub currency: String,
}
