// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock delivery client for deterministic testing.
//!
//! `MockDelivery` implements `DeliveryClient` with a FIFO of scripted
//! outcomes, captures every send request, and tracks how many sends were in
//! flight at once.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use shepherd_core::types::{
    AdapterType, AlimtalkSendRequest, AlimtalkSendResponse, Balance, DeliveryStatus,
    HealthStatus, MessageStatusEntry, MessageStatusResponse, MessageType, SUCCESS_CODE,
    SendResult,
};
use shepherd_core::{DeliveryClient, PluginAdapter, ShepherdError};

/// One scripted reaction to a send request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scripted {
    /// `2000` with a fresh message id.
    Accept,
    /// A provider-level rejection with the given code and error message.
    Reject { code: String, error: String },
    /// A transport error.
    TransportError(String),
}

impl Scripted {
    pub fn reject(error: &str) -> Self {
        Self::Reject {
            code: "4000".to_string(),
            error: error.to_string(),
        }
    }
}

/// A delivery client that follows a script.
///
/// When the script is empty every request is accepted.
pub struct MockDelivery {
    script: Arc<Mutex<VecDeque<Scripted>>>,
    requests: Arc<Mutex<Vec<AlimtalkSendRequest>>>,
    reports: Arc<Mutex<HashMap<u64, DeliveryStatus>>>,
    next_mid: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    latency: Duration,
}

impl MockDelivery {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            reports: Arc::new(Mutex::new(HashMap::new())),
            next_mid: AtomicUsize::new(1),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// A client pre-loaded with the given outcomes.
    pub fn with_script(outcomes: Vec<Scripted>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(outcomes))),
            ..Self::new()
        }
    }

    /// Delay every send by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Append an outcome to the script.
    pub async fn push(&self, outcome: Scripted) {
        self.script.lock().await.push_back(outcome);
    }

    /// Status reported by `query_status` for `mid`. Unknown ids report `SENT`.
    pub async fn set_report(&self, mid: u64, status: DeliveryStatus) {
        self.reports.lock().await.insert(mid, status);
    }

    /// Every request passed to `send`, in arrival order.
    pub async fn requests(&self) -> Vec<AlimtalkSendRequest> {
        self.requests.lock().await.clone()
    }

    pub async fn send_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Highest number of concurrent `send` calls observed.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockDelivery {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockDelivery {
    fn name(&self) -> &str {
        "mock-delivery"
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
impl DeliveryClient for MockDelivery {
    async fn send(
        &self,
        request: AlimtalkSendRequest,
    ) -> Result<AlimtalkSendResponse, ShepherdError> {
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.requests.lock().await.push(request.clone());
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(Scripted::Accept);

        match outcome {
            Scripted::Accept => {
                let mid = self.next_mid.fetch_add(1, Ordering::SeqCst) as u64;
                let now = Utc::now();
                Ok(AlimtalkSendResponse {
                    code: SUCCESS_CODE.to_string(),
                    message: "Success".to_string(),
                    data: Some(SendResult {
                        mid,
                        message_type: MessageType::Alimtalk,
                        country: "KR".to_string(),
                        subject: request.template_code,
                        content: String::new(),
                        to: request.to,
                        from: request.from.unwrap_or_default(),
                        status: DeliveryStatus::Sent,
                        date_created: now,
                        date_updated: now,
                        prepaid: true,
                        account: "mock".to_string(),
                    }),
                    error_message: None,
                })
            }
            Scripted::Reject { code, error } => Ok(AlimtalkSendResponse {
                code,
                message: "Bad Request".to_string(),
                data: None,
                error_message: Some(error),
            }),
            Scripted::TransportError(message) => Err(ShepherdError::delivery(message)),
        }
    }

    async fn query_status(
        &self,
        message_ids: &[u64],
    ) -> Result<MessageStatusResponse, ShepherdError> {
        let reports = self.reports.lock().await;
        let data = message_ids
            .iter()
            .map(|&mid| {
                let status = reports.get(&mid).copied().unwrap_or(DeliveryStatus::Sent);
                MessageStatusEntry {
                    mid,
                    status,
                    result_code: SUCCESS_CODE.to_string(),
                    result_message: format!("{status}"),
                    sent_time: None,
                    delivered_time: None,
                    read_time: None,
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
            balance: 1_000,
            currency: "KRW".to_string(),
        })
    }
}
