// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Draining the message queue through the delivery client.
//!
//! A sweep reads every due item, claims and sends them in fixed-size
//! concurrent batches, and turns each outcome into a queue transition.
//! Individual failures never abort a sweep; only a failed store read or
//! claim does. A claim carries a lease, so items left `PROCESSING` by an
//! interrupted sweep go back to the queue once the lease runs out.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Days, NaiveDate, Utc};
use futures::future::join_all;
use serde::Serialize;
use shepherd_config::SenderConfig;
use shepherd_core::types::{
    AlimtalkButton, AlimtalkButtonType, AlimtalkSendRequest, Balance, Button, ButtonAction,
    DailyStats, DeliveryStatus, MessageType, NewQueueItem, Priority, QueueItem, QueueStatus,
    SentReceipt,
};
use shepherd_core::{DeliveryClient, MessageStore, ShepherdError};
use shepherd_templates::TemplateCatalog;
use tracing::{debug, error, info, warn};

/// Upper bound on a claim lease.
const MAX_CLAIM_LEASE: Duration = Duration::from_secs(86_400);

/// Sweep tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderSettings {
    pub batch_size: usize,
    pub batch_pause: Duration,
    /// Charge per accepted message in KRW.
    pub cost_per_message: i64,
    /// How long a claimed item stays reserved for this sender.
    pub claim_lease: Duration,
}

impl SenderSettings {
    pub fn from_config(config: &SenderConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_pause: Duration::from_millis(config.batch_pause_ms),
            cost_per_message: config.cost_per_message,
            claim_lease: Duration::from_secs(config.claim_lease_secs.clamp(1, 86_400)),
        }
    }
}

impl Default for SenderSettings {
    fn default() -> Self {
        Self::from_config(&SenderConfig::default())
    }
}

/// What happened to one dispatched item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Accepted by the provider; the item is `SENT`.
    Sent { provider_message_id: Option<u64> },
    /// Rejected or unreachable; the item is `PENDING` again.
    Retrying { error: String },
    /// The item is `FAILED`.
    Failed { error: String },
    /// The store could not record the outcome.
    Errored { error: String },
    /// Someone else claimed the item first, or it is no longer pending.
    NotClaimed,
}

/// Counts for one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// Another sweep was running, nothing was read.
    pub skipped: bool,
    pub due: usize,
    pub sent: usize,
    pub retried: usize,
    pub failed: usize,
    pub errored: usize,
    /// Due items another sender claimed first.
    pub unclaimed: usize,
}

impl SweepReport {
    fn tally(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent { .. } => self.sent += 1,
            DispatchOutcome::Retrying { .. } => self.retried += 1,
            DispatchOutcome::Failed { .. } => self.failed += 1,
            DispatchOutcome::Errored { .. } => self.errored += 1,
            DispatchOutcome::NotClaimed => self.unclaimed += 1,
        }
    }
}

/// Counts for one delivery report refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub queried: usize,
    pub delivered: usize,
    pub read: usize,
    pub failed: usize,
}

/// Map a stored button to its Alimtalk form.
pub fn alimtalk_button(button: &Button) -> AlimtalkButton {
    let (button_type, url) = match &button.action {
        ButtonAction::WebLink { url } => (AlimtalkButtonType::WebLink, Some(url.clone())),
        ButtonAction::Phone { phone_number } => (
            AlimtalkButtonType::AppLink,
            Some(format!("tel:{phone_number}")),
        ),
        ButtonAction::Message { .. } => (AlimtalkButtonType::MessageDelivery, None),
    };
    AlimtalkButton {
        name: button.text.clone(),
        button_type,
        url_mobile: url.clone(),
        url_pc: url,
        scheme_android: None,
        scheme_ios: None,
    }
}

/// Releases the busy flag on every exit path.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Sends queued messages through a [`DeliveryClient`].
pub struct MessageSender {
    store: Arc<dyn MessageStore>,
    client: Arc<dyn DeliveryClient>,
    catalog: Arc<TemplateCatalog>,
    settings: SenderSettings,
    busy: AtomicBool,
}

impl MessageSender {
    pub fn new(
        store: Arc<dyn MessageStore>,
        client: Arc<dyn DeliveryClient>,
        catalog: Arc<TemplateCatalog>,
        settings: SenderSettings,
    ) -> Self {
        Self {
            store,
            client,
            catalog,
            settings,
            busy: AtomicBool::new(false),
        }
    }

    /// True while a sweep is in progress.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Send every due item. Overlapping calls return a skipped report.
    pub async fn process_pending_messages(&self) -> Result<SweepReport, ShepherdError> {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            warn!("message sweep already in progress, skipping");
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        };

        let now = Utc::now();
        self.store.recover_stale(now).await?;
        let pending = self.store.get_pending_at(now).await?;
        let mut report = SweepReport {
            due: pending.len(),
            ..SweepReport::default()
        };
        if pending.is_empty() {
            debug!("no pending messages");
            return Ok(report);
        }
        info!(count = pending.len(), "processing pending messages");

        for (index, batch) in pending.chunks(self.settings.batch_size.max(1)).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.settings.batch_pause).await;
            }
            let ids: Vec<String> = batch.iter().map(|item| item.id.clone()).collect();
            let claimed = self.store.claim(&ids, self.lease_until()).await?;
            report.unclaimed += batch.len() - claimed.len();
            let outcomes = join_all(claimed.iter().map(|item| self.deliver(item))).await;
            for outcome in &outcomes {
                report.tally(outcome);
            }
        }

        info!(
            sent = report.sent,
            retried = report.retried,
            failed = report.failed,
            errored = report.errored,
            unclaimed = report.unclaimed,
            "message sweep complete"
        );
        Ok(report)
    }

    /// Claim one item and dispatch it. Never returns an error; store
    /// failures surface as [`DispatchOutcome::Errored`].
    pub async fn send_single(&self, item: &QueueItem) -> DispatchOutcome {
        let claimed = match self
            .store
            .claim(std::slice::from_ref(&item.id), self.lease_until())
            .await
        {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(id = %item.id, error = %e, "failed to claim message");
                return DispatchOutcome::Errored {
                    error: e.to_string(),
                };
            }
        };
        match claimed.first() {
            Some(claimed) => self.deliver(claimed).await,
            None => {
                debug!(id = %item.id, "message is no longer pending, not sending");
                DispatchOutcome::NotClaimed
            }
        }
    }

    fn lease_until(&self) -> DateTime<Utc> {
        let lease = chrono::Duration::from_std(self.settings.claim_lease.min(MAX_CLAIM_LEASE))
            .unwrap_or_else(|_| chrono::Duration::zero());
        Utc::now() + lease
    }

    /// Dispatch a claimed item and record the outcome.
    async fn deliver(&self, item: &QueueItem) -> DispatchOutcome {
        match self.dispatch(item).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(id = %item.id, error = %e, "failed to record dispatch outcome");
                DispatchOutcome::Errored {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn dispatch(&self, item: &QueueItem) -> Result<DispatchOutcome, ShepherdError> {
        debug!(id = %item.id, to = %item.recipient_phone, "dispatching message");
        let request = match self.build_request(item) {
            Ok(request) => request,
            Err(e) => {
                let error = e.to_string();
                self.store.fail_permanently(&item.id, &error).await?;
                warn!(id = %item.id, error = %error, "message cannot be sent, marked failed");
                return Ok(DispatchOutcome::Failed { error });
            }
        };

        let error = match self.client.send(request).await {
            Ok(response) if response.is_success() => {
                let provider_message_id = response.data.as_ref().map(|d| d.mid);
                let receipt = SentReceipt {
                    cost: self.settings.cost_per_message,
                    provider_message_id,
                };
                self.store.record_sent(&item.id, &receipt).await?;
                info!(id = %item.id, mid = ?provider_message_id, "message sent");
                return Ok(DispatchOutcome::Sent {
                    provider_message_id,
                });
            }
            Ok(response) => response.failure_reason(),
            Err(e) => e.to_string(),
        };

        match self.store.record_failure(&item.id, &error).await? {
            QueueStatus::Failed => {
                error!(
                    id = %item.id,
                    attempts = item.retry_count + 1,
                    error = %error,
                    "retries exhausted, message failed"
                );
                Ok(DispatchOutcome::Failed { error })
            }
            _ => {
                warn!(
                    id = %item.id,
                    attempt = item.retry_count + 1,
                    max = item.max_retries,
                    error = %error,
                    "send failed, will retry"
                );
                Ok(DispatchOutcome::Retrying { error })
            }
        }
    }

    fn build_request(&self, item: &QueueItem) -> Result<AlimtalkSendRequest, ShepherdError> {
        if item.message_type != MessageType::Alimtalk {
            return Err(ShepherdError::Config(format!(
                "unsupported message type {}",
                item.message_type
            )));
        }
        let code = item
            .template_code
            .as_deref()
            .ok_or_else(|| ShepherdError::Config("Alimtalk item has no template code".into()))?;
        let template = self
            .catalog
            .by_code(code)
            .ok_or_else(|| ShepherdError::TemplateNotFound(code.to_string()))?;

        Ok(AlimtalkSendRequest {
            template_code: template.code.clone(),
            to: item.recipient_phone.clone(),
            from: None,
            content: item.template_variables.clone(),
            buttons: item.buttons.iter().map(alimtalk_button).collect(),
        })
    }

    /// Queue a high-priority single-attempt message and send it immediately.
    pub async fn send_test_message(
        &self,
        phone: &str,
        template_code: &str,
        variables: BTreeMap<String, String>,
    ) -> Result<(QueueItem, DispatchOutcome), ShepherdError> {
        let template = self
            .catalog
            .by_code(template_code)
            .ok_or_else(|| ShepherdError::TemplateNotFound(template_code.to_string()))?;

        let mut new_item = NewQueueItem::alimtalk(
            template_code,
            phone,
            template.render(&variables),
            Utc::now(),
        )
        .with_priority(Priority::High)
        .with_max_retries(1)
        .with_variables(variables.clone());
        new_item.buttons = template.render_buttons(&variables);

        let item = self.store.enqueue(new_item).await?;
        info!(id = %item.id, to = %phone, template = template_code, "sending test message");
        let outcome = self.send_single(&item).await;
        Ok((item, outcome))
    }

    /// Apply provider delivery reports to up to `limit` sent items.
    pub async fn refresh_delivery_status(
        &self,
        limit: usize,
    ) -> Result<RefreshReport, ShepherdError> {
        let awaiting = self.store.awaiting_report(limit).await?;
        let by_mid: HashMap<u64, &QueueItem> = awaiting
            .iter()
            .filter_map(|item| item.provider_message_id.map(|mid| (mid, item)))
            .collect();
        let mut report = RefreshReport {
            queried: by_mid.len(),
            ..RefreshReport::default()
        };
        if by_mid.is_empty() {
            return Ok(report);
        }

        let mids: Vec<u64> = by_mid.keys().copied().collect();
        let response = self.client.query_status(&mids).await?;

        for entry in response.data {
            let Some(item) = by_mid.get(&entry.mid) else {
                continue;
            };
            let (status, error) = match entry.status {
                DeliveryStatus::Delivered => (QueueStatus::Delivered, None),
                DeliveryStatus::Read => (QueueStatus::Read, None),
                DeliveryStatus::Failed => (QueueStatus::Failed, Some(entry.result_message)),
                DeliveryStatus::Pending | DeliveryStatus::Sent => continue,
            };
            match self
                .store
                .record_report(&item.id, status, error.as_deref())
                .await
            {
                Ok(true) => match status {
                    QueueStatus::Delivered => report.delivered += 1,
                    QueueStatus::Read => report.read += 1,
                    _ => report.failed += 1,
                },
                Ok(false) => {}
                Err(e) => warn!(id = %item.id, error = %e, "failed to apply delivery report"),
            }
        }

        debug!(
            queried = report.queried,
            delivered = report.delivered,
            read = report.read,
            failed = report.failed,
            "delivery reports applied"
        );
        Ok(report)
    }

    /// Statistics for today and the `days - 1` UTC days before it.
    pub async fn sending_stats(&self, days: u32) -> Result<Vec<DailyStats>, ShepherdError> {
        let today = Utc::now().date_naive();
        let since = today
            .checked_sub_days(Days::new(u64::from(days.max(1) - 1)))
            .unwrap_or(NaiveDate::MIN);
        self.store.sending_stats(since).await
    }

    pub async fn balance(&self) -> Result<Balance, ShepherdError> {
        self.client.balance().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as TimeDelta;
    use shepherd_core::QueueStore;
    use shepherd_storage::SqliteStorage;
    use shepherd_test_utils::{MockDelivery, Scripted, fixtures};
    use tracing_test::traced_test;

    struct Fixture {
        storage: Arc<SqliteStorage>,
        client: Arc<MockDelivery>,
        sender: Arc<MessageSender>,
    }

    async fn fixture(client: MockDelivery, settings: SenderSettings) -> Fixture {
        let storage = Arc::new(SqliteStorage::in_memory().await.unwrap());
        let client = Arc::new(client);
        let sender = Arc::new(MessageSender::new(
            storage.clone(),
            client.clone(),
            Arc::new(TemplateCatalog::builtin()),
            settings,
        ));
        Fixture {
            storage,
            client,
            sender,
        }
    }

    fn quick() -> SenderSettings {
        SenderSettings {
            batch_size: 5,
            batch_pause: Duration::ZERO,
            cost_per_message: 9,
            claim_lease: Duration::from_secs(60),
        }
    }

    fn due_item(code: &str) -> NewQueueItem {
        fixtures::queue_item(code, "010-1111-2222", Utc::now() - TimeDelta::minutes(1))
    }

    #[test]
    fn buttons_map_to_alimtalk_kinds() {
        let web = alimtalk_button(&Button {
            id: "a".into(),
            text: "보기".into(),
            action: ButtonAction::WebLink {
                url: "https://x/y".into(),
            },
        });
        assert_eq!(web.button_type, AlimtalkButtonType::WebLink);
        assert_eq!(web.url_mobile.as_deref(), Some("https://x/y"));
        assert_eq!(web.url_pc.as_deref(), Some("https://x/y"));

        let phone = alimtalk_button(&Button {
            id: "b".into(),
            text: "전화".into(),
            action: ButtonAction::Phone {
                phone_number: "010-1234-5678".into(),
            },
        });
        assert_eq!(phone.button_type, AlimtalkButtonType::AppLink);
        assert_eq!(phone.url_mobile.as_deref(), Some("tel:010-1234-5678"));

        let message = alimtalk_button(&Button {
            id: "c".into(),
            text: "나누기".into(),
            action: ButtonAction::Message {
                message_text: "hi".into(),
            },
        });
        assert_eq!(message.button_type, AlimtalkButtonType::MessageDelivery);
        assert_eq!(message.url_mobile, None);
    }

    #[tokio::test]
    async fn successful_send_records_cost_and_stats() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let item = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();

        let report = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.sent, 1);

        let stored = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Sent);
        assert_eq!(stored.cost, Some(9));
        assert_eq!(stored.provider_message_id, Some(1));
        assert!(stored.sent_at.is_some());

        let stats = f.sender.sending_stats(1).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_sent, 1);
        assert_eq!(stats[0].total_cost, 9);
        assert_eq!(stats[0].templates["SERMON_SUMMARY_001"].sent, 1);

        let request = &f.client.requests().await[0];
        assert_eq!(request.template_code, "SERMON_SUMMARY_001");
        assert_eq!(request.to, "010-1111-2222");
    }

    #[tokio::test]
    async fn rejection_is_retried_until_budget_is_spent() {
        let f = fixture(
            MockDelivery::with_script(vec![
                Scripted::reject("first"),
                Scripted::TransportError("second".into()),
                Scripted::reject("third"),
            ]),
            quick(),
        )
        .await;
        let item = f.storage.enqueue(due_item("MEDITATION_002")).await.unwrap();

        let first = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(first.retried, 1);
        let after_one = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(after_one.status, QueueStatus::Pending);
        assert_eq!(after_one.retry_count, 1);
        assert_eq!(after_one.error_message.as_deref(), Some("first"));

        assert_eq!(f.sender.process_pending_messages().await.unwrap().retried, 1);
        let last = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(last.failed, 1);

        let failed = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(failed.status, QueueStatus::Failed);
        assert_eq!(failed.retry_count, failed.max_retries);
        assert_eq!(failed.error_message.as_deref(), Some("third"));

        // Exhausted items are never picked up again.
        let idle = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(idle.due, 0);
        assert_eq!(f.client.send_count().await, 3);

        let stats = f.sender.sending_stats(1).await.unwrap();
        assert_eq!(stats[0].total_failed, 1);
        assert_eq!(stats[0].templates["MEDITATION_002"].failed, 1);
    }

    #[tokio::test]
    async fn unknown_template_fails_without_consuming_a_retry() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let item = f.storage.enqueue(due_item("NOPE_999")).await.unwrap();

        let report = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(report.failed, 1);

        let stored = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.retry_count, 0);
        assert!(stored.error_message.unwrap().contains("NOPE_999"));
        assert_eq!(f.client.send_count().await, 0);
    }

    #[tokio::test]
    async fn non_alimtalk_and_missing_code_fail_immediately() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let mut sms = due_item("SERMON_SUMMARY_001");
        sms.message_type = MessageType::Sms;
        let sms = f.storage.enqueue(sms).await.unwrap();
        let mut codeless = due_item("SERMON_SUMMARY_001");
        codeless.template_code = None;
        let codeless = f.storage.enqueue(codeless).await.unwrap();

        let report = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(report.failed, 2);
        for id in [&sms.id, &codeless.id] {
            let stored = f.storage.get(id).await.unwrap().unwrap();
            assert_eq!(stored.status, QueueStatus::Failed);
            assert_eq!(stored.retry_count, 0);
        }
        assert_eq!(f.client.send_count().await, 0);
    }

    #[tokio::test]
    async fn future_items_are_left_alone() {
        let f = fixture(MockDelivery::new(), quick()).await;
        f.storage
            .enqueue(fixtures::queue_item(
                "SERMON_SUMMARY_001",
                "010-1111-2222",
                Utc::now() + TimeDelta::hours(1),
            ))
            .await
            .unwrap();

        let report = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(report, SweepReport::default());
        assert_eq!(f.client.send_count().await, 0);
    }

    #[tokio::test]
    async fn batches_run_concurrently_with_pause_between() {
        let settings = SenderSettings {
            batch_size: 5,
            batch_pause: Duration::from_millis(200),
            cost_per_message: 9,
            claim_lease: Duration::from_secs(60),
        };
        let f = fixture(
            MockDelivery::new().with_latency(Duration::from_millis(50)),
            settings,
        )
        .await;
        for _ in 0..12 {
            f.storage.enqueue(due_item("PRACTICE_CHECK_003")).await.unwrap();
        }

        let started = std::time::Instant::now();
        let report = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(report.sent, 12);
        assert!(f.client.max_in_flight() > 1);
        assert!(f.client.max_in_flight() <= 5);
        // Three batches, two pauses.
        assert!(started.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    #[traced_test]
    async fn overlapping_sweep_is_skipped() {
        let f = fixture(
            MockDelivery::new().with_latency(Duration::from_millis(300)),
            quick(),
        )
        .await;
        f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();

        let sender = f.sender.clone();
        let first = tokio::spawn(async move { sender.process_pending_messages().await });
        // Let the first sweep reach the client.
        while f.client.max_in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(f.sender.is_busy());

        let second = f.sender.process_pending_messages().await.unwrap();
        assert!(second.skipped);
        assert!(logs_contain("already in progress"));

        let first = first.await.unwrap().unwrap();
        assert_eq!(first.sent, 1);
        assert!(!f.sender.is_busy());
        assert_eq!(f.client.send_count().await, 1);
    }

    #[tokio::test]
    async fn busy_flag_is_released_after_a_failed_read() {
        // Never initialized, so every read fails.
        let storage = Arc::new(SqliteStorage::new(shepherd_config::StorageConfig::default()));
        let sender = MessageSender::new(
            storage,
            Arc::new(MockDelivery::new()),
            Arc::new(TemplateCatalog::builtin()),
            quick(),
        );

        assert!(sender.process_pending_messages().await.is_err());
        assert!(!sender.is_busy());
    }

    #[tokio::test]
    async fn priority_items_are_dispatched_first() {
        let settings = SenderSettings {
            batch_size: 1,
            ..quick()
        };
        let f = fixture(MockDelivery::new(), settings).await;
        f.storage
            .enqueue(due_item("SERMON_SUMMARY_001").with_priority(Priority::Low))
            .await
            .unwrap();
        let urgent = fixtures::queue_item(
            "MEDITATION_002",
            "010-9999-9999",
            Utc::now() - TimeDelta::minutes(1),
        );
        f.storage
            .enqueue(urgent.with_priority(Priority::High))
            .await
            .unwrap();

        f.sender.process_pending_messages().await.unwrap();
        let requests = f.client.requests().await;
        assert_eq!(requests[0].to, "010-9999-9999");
    }

    #[tokio::test]
    async fn test_message_is_high_priority_single_attempt() {
        let f = fixture(MockDelivery::with_script(vec![Scripted::reject("nope")]), quick()).await;
        let vars = BTreeMap::from([
            ("church_name".to_string(), "은혜교회".to_string()),
            ("sermon_title".to_string(), "믿음".to_string()),
        ]);

        let (item, outcome) = f
            .sender
            .send_test_message("010-5555-6666", "MEDITATION_002", vars)
            .await
            .unwrap();
        assert_eq!(item.priority, Priority::High);
        assert_eq!(item.max_retries, 1);
        assert!(item.content.starts_with("은혜교회 교인 여러분"));
        assert_eq!(outcome, DispatchOutcome::Failed { error: "nope".into() });

        let stored = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Failed);
        assert_eq!(stored.retry_count, 1);
    }

    #[tokio::test]
    async fn test_message_with_unknown_template_is_rejected() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let err = f
            .sender
            .send_test_message("010-5555-6666", "UNKNOWN", BTreeMap::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShepherdError::TemplateNotFound(_)));
        assert!(f.storage.list(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delivery_reports_advance_sent_items() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let a = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        let b = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        let c = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        f.sender.process_pending_messages().await.unwrap();

        let mid = |id: &str| {
            let storage = f.storage.clone();
            let id = id.to_string();
            async move {
                storage
                    .get(&id)
                    .await
                    .unwrap()
                    .unwrap()
                    .provider_message_id
                    .unwrap()
            }
        };
        f.client.set_report(mid(&a.id).await, DeliveryStatus::Delivered).await;
        f.client.set_report(mid(&b.id).await, DeliveryStatus::Read).await;
        f.client.set_report(mid(&c.id).await, DeliveryStatus::Failed).await;

        let report = f.sender.refresh_delivery_status(100).await.unwrap();
        assert_eq!(
            report,
            RefreshReport {
                queried: 3,
                delivered: 1,
                read: 1,
                failed: 1
            }
        );

        let delivered = f.storage.get(&a.id).await.unwrap().unwrap();
        assert_eq!(delivered.status, QueueStatus::Delivered);
        assert!(delivered.delivered_at.is_some());
        assert_eq!(
            f.storage.get(&c.id).await.unwrap().unwrap().status,
            QueueStatus::Failed
        );

        let stats = f.sender.sending_stats(7).await.unwrap();
        let today = &stats[0].templates["SERMON_SUMMARY_001"];
        assert_eq!(today.sent, 3);
        assert_eq!(today.delivered, 1);
        assert_eq!(today.read, 1);
        assert_eq!(today.failed, 1);

        // Nothing left awaiting a report.
        assert_eq!(f.sender.refresh_delivery_status(100).await.unwrap().queried, 0);
    }

    #[tokio::test]
    async fn balance_is_passed_through() {
        let f = fixture(MockDelivery::new(), quick()).await;
        assert_eq!(f.sender.balance().await.unwrap().balance, 1_000);
    }

    #[tokio::test]
    async fn overlapping_refreshes_count_each_report_once() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let item = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        f.sender.process_pending_messages().await.unwrap();
        let mid = f
            .storage
            .get(&item.id)
            .await
            .unwrap()
            .unwrap()
            .provider_message_id
            .unwrap();
        f.client.set_report(mid, DeliveryStatus::Delivered).await;

        let (first, second) = tokio::join!(
            f.sender.refresh_delivery_status(100),
            f.sender.refresh_delivery_status(100)
        );
        let (first, second) = (first.unwrap(), second.unwrap());
        assert_eq!(first.delivered + second.delivered, 1);

        let stats = f.sender.sending_stats(1).await.unwrap();
        assert_eq!(stats[0].templates["SERMON_SUMMARY_001"].delivered, 1);
        assert_eq!(stats[0].total_delivered, 1);
    }

    #[tokio::test]
    async fn read_report_after_delivery_does_not_rewind() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let item = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        f.sender.process_pending_messages().await.unwrap();
        let mid = f
            .storage
            .get(&item.id)
            .await
            .unwrap()
            .unwrap()
            .provider_message_id
            .unwrap();
        f.client.set_report(mid, DeliveryStatus::Read).await;
        f.sender.refresh_delivery_status(100).await.unwrap();

        // A late report for an item that already left SENT changes nothing.
        let applied = f
            .storage
            .record_report(&item.id, QueueStatus::Delivered, None)
            .await
            .unwrap();
        assert!(!applied);
        let stored = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Read);
        let stats = f.sender.sending_stats(1).await.unwrap();
        assert_eq!(stats[0].templates["SERMON_SUMMARY_001"].delivered, 0);
        assert_eq!(stats[0].templates["SERMON_SUMMARY_001"].read, 1);
    }

    #[tokio::test]
    async fn interrupted_sweep_is_recovered_by_the_next_one() {
        let settings = SenderSettings {
            claim_lease: Duration::from_millis(100),
            ..quick()
        };
        let f = fixture(
            MockDelivery::new().with_latency(Duration::from_millis(500)),
            settings,
        )
        .await;
        let item = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();

        let sender = f.sender.clone();
        let sweep = tokio::spawn(async move { sender.process_pending_messages().await });
        while f.client.max_in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        sweep.abort();
        assert!(sweep.await.unwrap_err().is_cancelled());
        assert!(!f.sender.is_busy());

        let stranded = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stranded.status, QueueStatus::Processing);

        tokio::time::sleep(Duration::from_millis(150)).await;
        let report = f.sender.process_pending_messages().await.unwrap();
        assert_eq!(report.due, 1);
        assert_eq!(report.sent, 1);

        let stored = f.storage.get(&item.id).await.unwrap().unwrap();
        assert_eq!(stored.status, QueueStatus::Sent);
        assert_eq!(stored.retry_count, 1);
        assert_eq!(f.client.send_count().await, 1);
    }

    #[tokio::test]
    async fn live_claim_is_not_stolen_by_another_sender() {
        let f = fixture(
            MockDelivery::new().with_latency(Duration::from_millis(300)),
            quick(),
        )
        .await;
        let item = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        let other_client = Arc::new(MockDelivery::new());
        let other = MessageSender::new(
            f.storage.clone(),
            other_client.clone(),
            Arc::new(TemplateCatalog::builtin()),
            quick(),
        );

        let sender = f.sender.clone();
        let first = tokio::spawn(async move { sender.process_pending_messages().await });
        while f.client.max_in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let second = other.process_pending_messages().await.unwrap();
        assert_eq!(second.due, 0);
        assert_eq!(other.send_single(&item).await, DispatchOutcome::NotClaimed);

        assert_eq!(first.await.unwrap().unwrap().sent, 1);
        assert_eq!(f.client.send_count().await, 1);
        assert_eq!(other_client.send_count().await, 0);
    }

    #[tokio::test]
    async fn item_claimed_between_read_and_send_is_skipped() {
        let f = fixture(MockDelivery::new(), quick()).await;
        let item = f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        let lease = Utc::now() + TimeDelta::minutes(5);
        assert_eq!(
            f.storage.claim(&[item.id.clone()], lease).await.unwrap().len(),
            1
        );

        assert_eq!(f.sender.send_single(&item).await, DispatchOutcome::NotClaimed);
        assert_eq!(f.client.send_count().await, 0);
    }

    #[tokio::test]
    async fn huge_stats_window_does_not_overflow() {
        let f = fixture(MockDelivery::new(), quick()).await;
        f.storage.enqueue(due_item("SERMON_SUMMARY_001")).await.unwrap();
        f.sender.process_pending_messages().await.unwrap();

        let stats = f.sender.sending_stats(u32::MAX).await.unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].total_sent, 1);
    }
}
