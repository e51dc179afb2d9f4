// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Member directories with a fixed answer.

use async_trait::async_trait;
use shepherd_core::types::{MessageCategory, Recipient};
use shepherd_core::{MemberDirectory, ShepherdError};

/// Returns the same recipients for every category.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    recipients: Vec<Recipient>,
}

impl StaticDirectory {
    pub fn new(recipients: Vec<Recipient>) -> Self {
        Self { recipients }
    }

    /// Recipients without member ids.
    pub fn from_phones(phones: &[&str]) -> Self {
        Self::new(
            phones
                .iter()
                .map(|phone| Recipient {
                    member_id: None,
                    phone: phone.to_string(),
                })
                .collect(),
        )
    }
}

#[async_trait]
impl MemberDirectory for StaticDirectory {
    async fn message_recipients(
        &self,
        _category: MessageCategory,
    ) -> Result<Vec<Recipient>, ShepherdError> {
        Ok(self.recipients.clone())
    }
}

/// Always fails, like an unreachable member store.
#[derive(Debug, Clone, Default)]
pub struct FailingDirectory;

#[async_trait]
impl MemberDirectory for FailingDirectory {
    async fn message_recipients(
        &self,
        category: MessageCategory,
    ) -> Result<Vec<Recipient>, ShepherdError> {
        Err(ShepherdError::Directory {
            message: format!("member directory unavailable for {category}"),
            source: None,
        })
    }
}
