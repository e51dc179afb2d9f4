// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member directory trait consumed by the weekly message generator.

use async_trait::async_trait;

use crate::error::ShepherdError;
use crate::types::{MessageCategory, Recipient};

/// Source of message recipients.
#[async_trait]
pub trait MemberDirectory: Send + Sync {
    /// Active members opted in to `category`, in directory order.
    ///
    /// An unreachable directory is an error; callers must not substitute
    /// a default recipient list.
    async fn message_recipients(
        &self,
        category: MessageCategory,
    ) -> Result<Vec<Recipient>, ShepherdError>;
}
