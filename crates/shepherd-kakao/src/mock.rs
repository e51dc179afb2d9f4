// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Simulated Alimtalk client for development and tests.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use shepherd_config::KakaoConfig;
use shepherd_core::types::{
    AdapterType, AlimtalkSendRequest, AlimtalkSendResponse, Balance, DeliveryStatus,
    HealthStatus, MessageStatusEntry, MessageStatusResponse, MessageType, SUCCESS_CODE,
    SendResult,
};
use shepherd_core::{DeliveryClient, PluginAdapter, ShepherdError};
use shepherd_templates::{TemplateCatalog, render};
use tracing::debug;

const FAILURE_CODE: &str = "4000";
const FAILURE_MESSAGE: &str = "발송 실패: 수신자 번호가 유효하지 않습니다.";
const MOCK_BALANCE_KRW: i64 = 50_000;

const REPORT_STATUSES: [DeliveryStatus; 4] = [
    DeliveryStatus::Sent,
    DeliveryStatus::Delivered,
    DeliveryStatus::Read,
    DeliveryStatus::Failed,
];

/// Delivery client that never leaves the process.
///
/// Each send sleeps for a random latency and succeeds with a configured
/// probability. Accepted messages echo the catalog body rendered with the
/// request variables.
#[derive(Debug, Clone)]
pub struct MockKakaoClient {
    latency_ms: RangeInclusive<u64>,
    success_rate: f64,
    status_delay: Duration,
    sender_key: String,
    catalog: Arc<TemplateCatalog>,
}

impl Default for MockKakaoClient {
    fn default() -> Self {
        Self {
            latency_ms: 1000..=3000,
            success_rate: 0.9,
            status_delay: Duration::from_millis(500),
            sender_key: String::new(),
            catalog: Arc::new(TemplateCatalog::builtin()),
        }
    }
}

impl MockKakaoClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulation knobs from the `[kakao]` config section.
    pub fn from_config(config: &KakaoConfig) -> Self {
        Self::default()
            .with_latency(config.mock_min_latency_ms, config.mock_max_latency_ms)
            .with_success_rate(config.mock_success_rate)
            .with_sender_key(config.sender_key.clone().unwrap_or_default())
    }

    /// Uniform send latency between `min_ms` and `max_ms`.
    pub fn with_latency(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.latency_ms = min_ms.min(max_ms)..=max_ms.max(min_ms);
        self
    }

    /// Probability that a send is accepted, clamped to `0.0..=1.0`.
    pub fn with_success_rate(mut self, rate: f64) -> Self {
        self.success_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Delay before answering a status query.
    pub fn with_status_delay(mut self, delay: Duration) -> Self {
        self.status_delay = delay;
        self
    }

    pub fn with_sender_key(mut self, sender_key: String) -> Self {
        self.sender_key = sender_key;
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<TemplateCatalog>) -> Self {
        self.catalog = catalog;
        self
    }
}

#[async_trait]
impl PluginAdapter for MockKakaoClient {
    fn name(&self) -> &str {
        "kakao-mock"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Delivery
    }

    async fn health_check(&self) -> Result<HealthStatus, ShepherdError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl DeliveryClient for MockKakaoClient {
    async fn send(
        &self,
        request: AlimtalkSendRequest,
    ) -> Result<AlimtalkSendResponse, ShepherdError> {
        let (latency, accepted, mid) = {
            let mut rng = rand::thread_rng();
            (
                rng.gen_range(self.latency_ms.clone()),
                rng.gen_bool(self.success_rate),
                rng.gen_range(1..1_000_000_000u64),
            )
        };
        tokio::time::sleep(Duration::from_millis(latency)).await;

        if !accepted {
            debug!(to = %request.to, template = %request.template_code, "simulated send rejected");
            return Ok(AlimtalkSendResponse {
                code: FAILURE_CODE.to_string(),
                message: "Bad Request".to_string(),
                data: None,
                error_message: Some(FAILURE_MESSAGE.to_string()),
            });
        }

        let content = self
            .catalog
            .by_code(&request.template_code)
            .map(|t| render(&t.body, &request.content))
            .unwrap_or_default();
        let now = Utc::now();
        debug!(to = %request.to, template = %request.template_code, mid, "simulated send accepted");

        Ok(AlimtalkSendResponse {
            code: SUCCESS_CODE.to_string(),
            message: "Success".to_string(),
            data: Some(SendResult {
                mid,
                message_type: MessageType::Alimtalk,
                country: "KR".to_string(),
                subject: request.template_code.clone(),
                content,
                to: request.to.clone(),
                from: request.from.clone().unwrap_or_else(|| self.sender_key.clone()),
                status: DeliveryStatus::Sent,
                date_created: now,
                date_updated: now,
                prepaid: true,
                account: "shepherd-care".to_string(),
            }),
            error_message: None,
        })
    }

    async fn query_status(
        &self,
        message_ids: &[u64],
    ) -> Result<MessageStatusResponse, ShepherdError> {
        tokio::time::sleep(self.status_delay).await;

        let statuses: Vec<DeliveryStatus> = {
            let mut rng = rand::thread_rng();
            message_ids
                .iter()
                .map(|_| REPORT_STATUSES[rng.gen_range(0..REPORT_STATUSES.len())])
                .collect()
        };
        let now = Utc::now();

        let data = message_ids
            .iter()
            .zip(statuses)
            .map(|(&mid, status)| {
                let failed = status == DeliveryStatus::Failed;
                MessageStatusEntry {
                    mid,
                    status,
                    result_code: if failed { "4001" } else { SUCCESS_CODE }.to_string(),
                    result_message: if failed { "발송 실패" } else { "성공" }.to_string(),
                    sent_time: (!failed).then_some(now),
                    delivered_time: matches!(
                        status,
                        DeliveryStatus::Delivered | DeliveryStatus::Read
                    )
                    .then_some(now),
                    read_time: (status == DeliveryStatus::Read).then_some(now),
                }
            })
            .collect();

        Ok(MessageStatusResponse {
            code: SUCCESS_CODE.to_string(),
            message: "Success".to_string(),
            data,
        })
    }

    async fn balance(&self) -> Result<Balance, ShepherdError> {
        Ok(Balance {
            balance: MOCK_BALANCE_KRW,
            currency: "KRW".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn instant_client(rate: f64) -> MockKakaoClient {
        MockKakaoClient::new()
            .with_latency(0, 0)
            .with_success_rate(rate)
            .with_status_delay(Duration::ZERO)
    }

    fn request() -> AlimtalkSendRequest {
        let mut content = BTreeMap::new();
        content.insert("church_name".to_string(), "은혜교회".to_string());
        content.insert("sermon_title".to_string(), "사랑의 계명".to_string());
        AlimtalkSendRequest {
            template_code: "PRACTICE_CHECK_003".to_string(),
            to: "010-1234-5678".to_string(),
            from: None,
            content,
            buttons: vec![],
        }
    }

    #[tokio::test]
    async fn accepted_send_renders_catalog_body() {
        let client = instant_client(1.0).with_sender_key("pf-test".into());
        let response = client.send(request()).await.unwrap();
        assert!(response.is_success());
        let data = response.data.unwrap();
        assert_eq!(data.subject, "PRACTICE_CHECK_003");
        assert_eq!(data.from, "pf-test");
        assert_eq!(data.account, "shepherd-care");
        assert!(data.content.starts_with("은혜교회 교인 여러분"));
        assert!(data.content.contains("\"사랑의 계명\""));
        assert!(data.mid > 0);
    }

    #[tokio::test]
    async fn rejected_send_carries_fixed_error() {
        let client = instant_client(0.0);
        let response = client.send(request()).await.unwrap();
        assert!(!response.is_success());
        assert_eq!(response.code, "4000");
        assert_eq!(response.message, "Bad Request");
        assert_eq!(response.error_message.as_deref(), Some(FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn success_rate_is_roughly_ninety_percent() {
        let client = instant_client(0.9);
        let mut accepted = 0;
        for _ in 0..1000 {
            if client.send(request()).await.unwrap().is_success() {
                accepted += 1;
            }
        }
        assert!(
            (850..=950).contains(&accepted),
            "accepted {accepted} of 1000"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn send_latency_stays_in_range() {
        let client = MockKakaoClient::new().with_success_rate(1.0);
        let started = tokio::time::Instant::now();
        client.send(request()).await.unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1000), "{elapsed:?}");
        assert!(elapsed <= Duration::from_millis(3000), "{elapsed:?}");
    }

    #[tokio::test]
    async fn status_report_is_consistent_per_mid() {
        let client = instant_client(1.0);
        let response = client.query_status(&[1, 2, 3, 4, 5]).await.unwrap();
        assert_eq!(response.code, "2000");
        assert_eq!(response.data.len(), 5);
        for entry in &response.data {
            match entry.status {
                DeliveryStatus::Failed => {
                    assert_eq!(entry.result_code, "4001");
                    assert!(entry.sent_time.is_none());
                }
                DeliveryStatus::Read => {
                    assert!(entry.read_time.is_some());
                    assert!(entry.delivered_time.is_some());
                }
                _ => assert_eq!(entry.result_code, "2000"),
            }
        }
    }

    #[tokio::test]
    async fn balance_is_fixed() {
        let balance = MockKakaoClient::new().balance().await.unwrap();
        assert_eq!(balance.balance, 50_000);
        assert_eq!(balance.currency, "KRW");
    }
}
