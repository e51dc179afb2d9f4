// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery client trait for the Alimtalk messaging API.

use async_trait::async_trait;

use crate::error::ShepherdError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AlimtalkSendRequest, AlimtalkSendResponse, Balance, MessageStatusResponse};

/// Outbound message dispatcher.
///
/// Implemented by the simulated client and the HTTP client. The sender
/// service only ever sees `Arc<dyn DeliveryClient>`.
#[async_trait]
pub trait DeliveryClient: PluginAdapter {
    /// Submits one Alimtalk message.
    ///
    /// A rejected message is an `Ok` response with a non-success code;
    /// `Err` is reserved for transport failures.
    async fn send(&self, request: AlimtalkSendRequest)
    -> Result<AlimtalkSendResponse, ShepherdError>;

    /// Queries the provider-side status of previously accepted messages.
    async fn query_status(&self, message_ids: &[u64])
    -> Result<MessageStatusResponse, ShepherdError>;

    /// Returns the prepaid account balance.
    async fn balance(&self) -> Result<Balance, ShepherdError>;
}
