// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Kakao Alimtalk delivery clients.
//!
//! [`MockKakaoClient`] simulates the provider in-process; [`KakaoHttpClient`]
//! talks to the real messaging API. [`create_delivery_client`] picks one from
//! configuration at start-up.

pub mod client;
pub mod mock;
pub mod types;

use std::sync::Arc;

use shepherd_config::KakaoConfig;
use shepherd_core::{DeliveryClient, ShepherdError};
use tracing::info;

pub use client::KakaoHttpClient;
pub use mock::MockKakaoClient;

/// The HTTP client when an API key is configured, the simulator otherwise.
pub fn create_delivery_client(
    config: &KakaoConfig,
) -> Result<Arc<dyn DeliveryClient>, ShepherdError> {
    let has_key = config
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());

    if has_key {
        info!(base_url = %config.base_url, "using Kakao HTTP delivery client");
        Ok(Arc::new(KakaoHttpClient::from_config(config)?))
    } else {
        info!(
            success_rate = config.mock_success_rate,
            "no kakao.api_key configured, using simulated delivery client"
        );
        Ok(Arc::new(MockKakaoClient::from_config(config)))
    }
}
