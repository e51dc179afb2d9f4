// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Request bodies of the HTTP messaging API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use shepherd_core::types::AlimtalkButton;

/// `POST /send` body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendBody {
    pub message: OutboundMessage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(rename = "kakaoOptions")]
    pub kakao_options: KakaoOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KakaoOptions {
    /// Channel sender key.
    pub pf_id: String,
    pub template_id: String,
    pub variables: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<AlimtalkButton>,
}
