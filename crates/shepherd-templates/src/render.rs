// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `{{placeholder}}` substitution for message bodies and buttons.
//!
//! Substitution is a single left-to-right pass: a substituted value is never
//! scanned again, and a key with no value stays in the output verbatim.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use shepherd_core::types::{Button, ButtonAction};

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").unwrap());

/// Replace every `{{key}}` in `template` with `vars[key]`.
pub fn render(template: &str, vars: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render the text and every payload of each button.
pub fn render_buttons(buttons: &[Button], vars: &BTreeMap<String, String>) -> Vec<Button> {
    buttons
        .iter()
        .map(|button| Button {
            id: button.id.clone(),
            text: render(&button.text, vars),
            action: match &button.action {
                ButtonAction::WebLink { url } => ButtonAction::WebLink {
                    url: render(url, vars),
                },
                ButtonAction::Phone { phone_number } => ButtonAction::Phone {
                    phone_number: render(phone_number, vars),
                },
                ButtonAction::Message { message_text } => ButtonAction::Message {
                    message_text: render(message_text, vars),
                },
            },
        })
        .collect()
}

/// Placeholder keys in order of first appearance, without duplicates.
pub fn placeholders(template: &str) -> Vec<String> {
    let mut keys: Vec<String> = Vec::new();
    for caps in PLACEHOLDER.captures_iter(template) {
        let key = &caps[1];
        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
        }
    }
    keys
}
