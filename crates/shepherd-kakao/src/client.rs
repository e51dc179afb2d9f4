// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the Alimtalk messaging API.
//!
//! Every request is signed with an HMAC-SHA256 `Authorization` header built
//! from the API key, a timestamp, a random salt, and the API secret.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use hmac::{Hmac, Mac};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use shepherd_config::KakaoConfig;
use shepherd_core::types::{
    AdapterType, AlimtalkSendRequest, AlimtalkSendResponse, Balance, HealthStatus,
    MessageStatusResponse,
};
use shepherd_core::{DeliveryClient, PluginAdapter, ShepherdError};
use tracing::debug;

use crate::types::{KakaoOptions, OutboundMessage, SendBody};

type HmacSha256 = Hmac<Sha256>;

/// Signed HTTP client for the messaging API.
#[derive(Debug, Clone)]
pub struct KakaoHttpClient {
    client: reqwest::Client,
    api_key: String,
    api_secret: String,
    sender_key: String,
    sender_phone: Option<String>,
    base_url: String,
}

impl KakaoHttpClient {
    /// Build a client from the `[kakao]` section. Requires `api_key` and `api_secret`.
    pub fn from_config(config: &KakaoConfig) -> Result<Self, ShepherdError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ShepherdError::Config("kakao.api_key is not set".into()))?;
        let api_secret = config
            .api_secret
            .clone()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| ShepherdError::Config("kakao.api_secret is not set".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ShepherdError::Delivery {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            api_key,
            api_secret,
            sender_key: config.sender_key.clone().unwrap_or_default(),
            sender_phone: config.sender_phone.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    /// `Authorization` header value for a request made at `date` with `salt`.
    pub fn authorization(&self, date: &str, salt: &str) -> Result<String, ShepherdError> {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes())
            .map_err(|e| ShepherdError::Config(format!("invalid kakao.api_secret: {e}")))?;
        mac.update(date.as_bytes());
        mac.update(salt.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());
        Ok(format!(
            "HMAC-SHA256 apiKey={}, date={date}, salt={salt}, signature={signature}",
            self.api_key
        ))
    }

    fn signed_header(&self) -> Result<HeaderValue, ShepherdError> {
        let date = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let salt = uuid::Uuid::new_v4().simple().to_string();
        HeaderValue::from_str(&self.authorization(&date, &salt)?)
            .map_err(|e| ShepherdError::Config(format!("invalid authorization header: {e}")))
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<T, ShepherdError> {
        let response = request
            .header(AUTHORIZATION, self.signed_header()?)
            .send()
            .await
            .map_err(|e| ShepherdError::Delivery {
                message: format!("HTTP request to {endpoint} failed: {e}"),
                source: Some(Box::new(e)),
            })?;

        let status = response.status();
        debug!(status = %status, endpoint, "messaging API response received");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShepherdError::delivery(format!(
                "messaging API returned {status} for {endpoint}: {body}"
            )));
        }

        let body = response.text().await.map_err(|e| ShepherdError::Delivery {
            message: format!("failed to read response body: {e}"),
            source: Some(Box::new(e)),
        })?;
        serde_json::from_str(&body).map_err(|e| ShepherdError::Delivery {
            message: format!("failed to parse {endpoint} response: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

#[async_trait]
impl PluginAdapter for KakaoHttpClient {
    fn name(&self) -> &str {
        "kakao-http"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Delivery
    }

    async fn health_check(&self) -> Result<HealthStatus, ShepherdError> {
        match self.balance().await {
            Ok(_) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }
}

#[async_trait]
impl DeliveryClient for KakaoHttpClient {
    async fn send(
        &self,
        request: AlimtalkSendRequest,
    ) -> Result<AlimtalkSendResponse, ShepherdError> {
        let body = SendBody {
            message: OutboundMessage {
                to: request.to,
                from: request.from.or_else(|| self.sender_phone.clone()),
                kakao_options: KakaoOptions {
                    pf_id: self.sender_key.clone(),
                    template_id: request.template_code,
                    variables: request.content,
                    buttons: request.buttons,
                },
            },
        };
        let url = format!("{}/send", self.base_url);
        self.execute(self.client.post(url).json(&body), "/send").await
    }

    async fn query_status(
        &self,
        message_ids: &[u64],
    ) -> Result<MessageStatusResponse, ShepherdError> {
        let query = message_ids
            .iter()
            .map(|id| format!("messageIds={id}"))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}/status?{query}", self.base_url);
        self.execute(self.client.get(url), "/status").await
    }

    async fn balance(&self) -> Result<Balance, ShepherdError> {
        let url = format!("{}/balance", self.base_url);
        self.execute(self.client.get(url), "/balance").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use wiremock::matchers::{body_partial_json, header_regex, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> KakaoHttpClient {
        let config = KakaoConfig {
            api_key: Some("test-key".into()),
            api_secret: Some("test-secret".into()),
            sender_key: Some("pf-123".into()),
            sender_phone: Some("02-000-0000".into()),
            ..KakaoConfig::default()
        };
        KakaoHttpClient::from_config(&config)
            .unwrap()
            .with_base_url(base_url.to_string())
    }

    fn request() -> AlimtalkSendRequest {
        let mut content = BTreeMap::new();
        content.insert("church_name".to_string(), "은혜교회".to_string());
        AlimtalkSendRequest {
            template_code: "SERMON_SUMMARY_001".into(),
            to: "010-1111-2222".into(),
            from: None,
            content,
            buttons: vec![],
        }
    }

    #[test]
    fn signature_is_hmac_of_date_and_salt() {
        let client = test_client("http://localhost");
        let header = client
            .authorization("2025-01-06T00:00:00.000Z", "abc")
            .unwrap();

        let mut mac = HmacSha256::new_from_slice(b"test-secret").unwrap();
        mac.update(b"2025-01-06T00:00:00.000Zabc");
        let expected = hex::encode(mac.finalize().into_bytes());

        assert_eq!(
            header,
            format!(
                "HMAC-SHA256 apiKey=test-key, date=2025-01-06T00:00:00.000Z, salt=abc, signature={expected}"
            )
        );
    }

    #[test]
    fn missing_secret_is_a_config_error() {
        let config = KakaoConfig {
            api_key: Some("key".into()),
            ..KakaoConfig::default()
        };
        assert!(matches!(
            KakaoHttpClient::from_config(&config),
            Err(ShepherdError::Config(_))
        ));
    }

    #[tokio::test]
    async fn send_posts_signed_kakao_payload() {
        let server = MockServer::start().await;

        let response_body = serde_json::json!({
            "code": "2000",
            "message": "Success",
            "data": {
                "mid": 77,
                "type": "ALIMTALK",
                "country": "KR",
                "subject": "SERMON_SUMMARY_001",
                "content": "안녕하세요",
                "to": "010-1111-2222",
                "from": "02-000-0000",
                "status": "SENT",
                "dateCreated": "2025-01-06T00:00:00Z",
                "dateUpdated": "2025-01-06T00:00:00Z",
                "prepaid": true,
                "account": "shepherd-care"
            }
        });

        Mock::given(method("POST"))
            .and(path("/send"))
            .and(header_regex(
                "authorization",
                r"^HMAC-SHA256 apiKey=test-key, date=\S+, salt=[0-9a-f]{32}, signature=[0-9a-f]{64}$",
            ))
            .and(body_partial_json(serde_json::json!({
                "message": {
                    "to": "010-1111-2222",
                    "from": "02-000-0000",
                    "kakaoOptions": {
                        "pfId": "pf-123",
                        "templateId": "SERMON_SUMMARY_001",
                        "variables": {"church_name": "은혜교회"}
                    }
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(&response_body))
            .expect(1)
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.send(request()).await.unwrap();
        assert!(response.is_success());
        assert_eq!(response.data.unwrap().mid, 77);
    }

    #[tokio::test]
    async fn provider_rejection_is_a_response_not_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "4000",
                "message": "Bad Request",
                "errorMessage": "invalid recipient"
            })))
            .mount(&server)
            .await;

        let response = test_client(&server.uri()).send(request()).await.unwrap();
        assert!(!response.is_success());
        assert_eq!(response.failure_reason(), "invalid recipient");
    }

    #[tokio::test]
    async fn non_2xx_is_a_delivery_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/send"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .send(request())
            .await
            .unwrap_err();
        assert!(matches!(err, ShepherdError::Delivery { .. }));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("503"), "got: {err}");
    }

    #[tokio::test]
    async fn status_query_passes_message_ids() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/status"))
            .and(query_param("messageIds", "42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "code": "2000",
                "message": "Success",
                "data": [{
                    "mid": 42,
                    "status": "DELIVERED",
                    "resultCode": "2000",
                    "resultMessage": "성공",
                    "deliveredTime": "2025-01-06T00:05:00Z"
                }]
            })))
            .mount(&server)
            .await;

        let response = test_client(&server.uri())
            .query_status(&[42])
            .await
            .unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(
            response.data[0].status,
            shepherd_core::types::DeliveryStatus::Delivered
        );
    }

    #[tokio::test]
    async fn balance_and_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/balance"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"balance": 12000, "currency": "KRW"})),
            )
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        assert_eq!(client.balance().await.unwrap().balance, 12000);
        assert_eq!(client.health_check().await.unwrap(), HealthStatus::Healthy);
    }
}
