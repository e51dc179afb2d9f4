// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests for the sermon-to-delivery pipeline.
//!
//! Each test builds an isolated TestHarness with a temp SQLite file and
//! mock delivery. Tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use shepherd_config::{ChurchConfig, KakaoConfig};
use shepherd_core::types::{DeliveryStatus, QueueStatus};
use shepherd_core::{QueueStore, ScheduleStore};
use shepherd_kakao::MockKakaoClient;
use shepherd_messaging::{
    ChurchProfile, MessageGenerator, MessageSender, ScheduleSummary, Scheduler,
    SchedulerSettings, SenderSettings, schedule_sermon,
};
use shepherd_templates::TemplateCatalog;
use shepherd_test_utils::{MockDelivery, Scripted, TestHarness, fixtures};

fn fast_sender_settings() -> SenderSettings {
    SenderSettings {
        batch_size: 5,
        batch_pause: Duration::ZERO,
        cost_per_message: 9,
        claim_lease: Duration::from_secs(60),
    }
}

async fn harness() -> TestHarness {
    TestHarness::builder()
        .with_members(vec![
            fixtures::member("m1", "010-1111-2222"),
            fixtures::member("m2", "010-3333-4444"),
            fixtures::member("m3", "010-5555-6666"),
        ])
        .with_wal(true)
        .build()
        .await
        .unwrap()
}

fn generator(harness: &TestHarness) -> MessageGenerator {
    MessageGenerator::new(
        Arc::new(TemplateCatalog::builtin()),
        harness.storage.clone(),
        ChurchProfile::from_config(&ChurchConfig::default()).unwrap(),
    )
}

// ---- Generation to delivery ----

#[tokio::test]
async fn sermon_is_scheduled_sent_and_reported() {
    let harness = harness().await;
    let client = Arc::new(MockDelivery::new());
    let sender = MessageSender::new(
        harness.storage.clone(),
        client.clone(),
        Arc::new(TemplateCatalog::builtin()),
        fast_sender_settings(),
    );

    let summary = schedule_sermon(&generator(&harness), harness.storage.as_ref(), &fixtures::sermon(), 3)
        .await
        .unwrap();
    assert_eq!(summary, ScheduleSummary { generated: 9, queued: 9 });

    // The sermon is from 2025, so every slot is already due.
    let report = sender.process_pending_messages().await.unwrap();
    assert_eq!(report.due, 9);
    assert_eq!(report.sent, 9);
    assert_eq!(client.send_count().await, 9);

    let monday = harness
        .storage
        .scheduled_for_date(NaiveDate::from_ymd_opt(2025, 1, 6).unwrap())
        .await
        .unwrap();
    assert!(monday.is_empty(), "sent records are no longer pending");

    let sent = harness.storage.list(Some(QueueStatus::Sent), 100).await.unwrap();
    assert_eq!(sent.len(), 9);
    for mid in 1..=9u64 {
        client.set_report(mid, DeliveryStatus::Read).await;
    }
    let refreshed = sender.refresh_delivery_status(100).await.unwrap();
    assert_eq!(refreshed.read, 9);

    let stats = sender.sending_stats(1).await.unwrap();
    assert_eq!(stats[0].total_sent, 9);
    assert_eq!(stats[0].total_read, 9);
    assert_eq!(stats[0].total_cost, 81);
    assert_eq!(stats[0].templates.len(), 3);
    assert_eq!(stats[0].templates["MEDITATION_002"].sent, 3);
}

#[tokio::test]
async fn meditation_request_carries_rendered_variables() {
    let harness = harness().await;
    let client = Arc::new(MockDelivery::new());
    let sender = MessageSender::new(
        harness.storage.clone(),
        client.clone(),
        Arc::new(TemplateCatalog::builtin()),
        fast_sender_settings(),
    );
    schedule_sermon(&generator(&harness), harness.storage.as_ref(), &fixtures::sermon(), 3)
        .await
        .unwrap();
    sender.process_pending_messages().await.unwrap();

    let requests = client.requests().await;
    let meditation = requests
        .iter()
        .find(|r| r.template_code == "MEDITATION_002")
        .unwrap();
    assert_eq!(
        meditation.content["meditation_questions"],
        "1. 오늘 나의 믿음은 어디에 뿌리내리고 있나요?\n2. 하나님의 약속을 묵상해 봅시다."
    );
    assert_eq!(meditation.content["church_name"], "은혜교회");
    assert_eq!(meditation.buttons.len(), 2);
    assert_eq!(
        meditation.buttons[1].url_mobile.as_deref(),
        Some("tel:010-1234-5678")
    );

    let practice = requests
        .iter()
        .find(|r| r.template_code == "PRACTICE_CHECK_003")
        .unwrap();
    assert_eq!(
        practice.content["practical_tasks"],
        "1. 매일 아침 10분 말씀 읽기\n2. 한 사람에게 격려의 말 전하기\n3. 감사 일기 쓰기"
    );
}

// ---- Failure handling ----

#[tokio::test]
async fn failed_sends_mirror_to_records_after_retries() {
    let harness = TestHarness::builder()
        .with_members(vec![fixtures::member("m1", "010-1111-2222")])
        .build()
        .await
        .unwrap();
    let client = Arc::new(MockDelivery::with_script(vec![
        Scripted::reject("invalid recipient"); 9
    ]));
    let sender = MessageSender::new(
        harness.storage.clone(),
        client.clone(),
        Arc::new(TemplateCatalog::builtin()),
        fast_sender_settings(),
    );
    schedule_sermon(&generator(&harness), harness.storage.as_ref(), &fixtures::sermon(), 3)
        .await
        .unwrap();

    for _ in 0..3 {
        sender.process_pending_messages().await.unwrap();
    }
    assert_eq!(client.send_count().await, 9);

    let failed = harness.storage.list(Some(QueueStatus::Failed), 100).await.unwrap();
    assert_eq!(failed.len(), 3);
    for item in &failed {
        assert_eq!(item.retry_count, 3);
        assert_eq!(item.error_message.as_deref(), Some("invalid recipient"));
    }

    // Exhausted items stay out of later sweeps and their records are no
    // longer pending.
    assert_eq!(sender.process_pending_messages().await.unwrap().due, 0);
    let wednesday = harness
        .storage
        .scheduled_for_date(NaiveDate::from_ymd_opt(2025, 1, 8).unwrap())
        .await
        .unwrap();
    assert!(wednesday.is_empty());

    let stats = sender.sending_stats(1).await.unwrap();
    assert_eq!(stats[0].total_failed, 3);
    assert_eq!(stats[0].total_sent, 0);
}

#[tokio::test]
async fn cancelled_items_are_never_sent_and_archive_keeps_pending() {
    let harness = harness().await;
    let client = Arc::new(MockDelivery::new());
    let sender = MessageSender::new(
        harness.storage.clone(),
        client.clone(),
        Arc::new(TemplateCatalog::builtin()),
        fast_sender_settings(),
    );

    let past = Utc::now() - chrono::Duration::minutes(5);
    let keep = harness
        .storage
        .enqueue(fixtures::queue_item("SERMON_SUMMARY_001", "010-1111-2222", past))
        .await
        .unwrap();
    let withdrawn = harness
        .storage
        .enqueue(fixtures::queue_item("SERMON_SUMMARY_001", "010-3333-4444", past))
        .await
        .unwrap();
    let later = harness
        .storage
        .enqueue(fixtures::queue_item(
            "SERMON_SUMMARY_001",
            "010-5555-6666",
            Utc::now() + chrono::Duration::days(1),
        ))
        .await
        .unwrap();
    assert!(harness.storage.cancel(&withdrawn.id).await.unwrap());

    let report = sender.process_pending_messages().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(client.requests().await[0].to, "010-1111-2222");

    // Everything created so far is older than a cutoff in the future.
    let archived = harness
        .storage
        .archive_terminal(Utc::now() + chrono::Duration::seconds(1))
        .await
        .unwrap();
    assert_eq!(archived, 2);
    assert!(harness.storage.get(&keep.id).await.unwrap().is_none());
    assert!(harness.storage.get(&withdrawn.id).await.unwrap().is_none());
    assert_eq!(
        harness.storage.get(&later.id).await.unwrap().unwrap().status,
        QueueStatus::Pending
    );
}

#[tokio::test]
async fn retention_clears_records_without_rescheduling_the_sermon() {
    let harness = harness().await;
    let sermon = fixtures::sermon();
    let first = schedule_sermon(&generator(&harness), harness.storage.as_ref(), &sermon, 3)
        .await
        .unwrap();
    assert_eq!(first.queued, 9);

    for item in harness.storage.list(None, 100).await.unwrap() {
        assert!(harness.storage.cancel(&item.id).await.unwrap());
    }

    let cutoff = Utc::now() + chrono::Duration::seconds(1);
    assert_eq!(harness.storage.archive_terminal(cutoff).await.unwrap(), 9);
    assert_eq!(harness.storage.prune_records(cutoff).await.unwrap(), 9);
    assert_eq!(harness.storage.prune_archive(cutoff).await.unwrap(), 9);

    // The sermon stays retired after its rows are gone.
    let again = schedule_sermon(&generator(&harness), harness.storage.as_ref(), &sermon, 3)
        .await
        .unwrap();
    assert_eq!(again.generated, 9);
    assert_eq!(again.queued, 0);
    assert!(harness.storage.list(None, 100).await.unwrap().is_empty());
}

// ---- Scheduler with the simulated provider ----

#[tokio::test]
async fn scheduler_drains_queue_through_simulated_provider() {
    let harness = harness().await;
    let config = KakaoConfig {
        mock_min_latency_ms: 0,
        mock_max_latency_ms: 5,
        mock_success_rate: 1.0,
        ..KakaoConfig::default()
    };
    let sender = Arc::new(MessageSender::new(
        harness.storage.clone(),
        Arc::new(MockKakaoClient::from_config(&config).with_status_delay(Duration::ZERO)),
        Arc::new(TemplateCatalog::builtin()),
        fast_sender_settings(),
    ));
    schedule_sermon(&generator(&harness), harness.storage.as_ref(), &fixtures::sermon(), 3)
        .await
        .unwrap();

    let scheduler = Scheduler::new(
        sender.clone(),
        SchedulerSettings {
            interval: Duration::from_millis(100),
            refresh_status: false,
        },
    );
    scheduler.start();

    let mut remaining = usize::MAX;
    for _ in 0..100 {
        remaining = harness
            .storage
            .list(Some(QueueStatus::Pending), 100)
            .await
            .unwrap()
            .len();
        if remaining == 0 && !sender.is_busy() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(scheduler.drain(Duration::from_secs(5)).await);

    assert_eq!(remaining, 0);
    let sent = harness.storage.list(Some(QueueStatus::Sent), 100).await.unwrap();
    assert_eq!(sent.len(), 9);
    assert!(sent.iter().all(|i| i.cost == Some(9) && i.provider_message_id.is_some()));
}
