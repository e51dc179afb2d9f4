// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths, positive batch sizes, and a
//! well-formed mock latency range.

use crate::diagnostic::ConfigError;
use crate::model::ShepherdConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ShepherdConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::invalid("storage.database_path", "must not be empty"));
    }

    if config.church.name.trim().is_empty() {
        errors.push(ConfigError::invalid("church.name", "must not be empty"));
    }

    if !(-14..=14).contains(&config.church.utc_offset_hours) {
        errors.push(ConfigError::invalid(
            "church.utc_offset_hours",
            format!(
                "must be within -14..=14, got {}",
                config.church.utc_offset_hours
            ),
        ));
    }

    if config.sender.batch_size < 1 {
        errors.push(ConfigError::invalid("sender.batch_size", "must be at least 1"));
    }

    if config.sender.cost_per_message < 0 {
        errors.push(ConfigError::invalid(
            "sender.cost_per_message",
            format!(
                "must be non-negative, got {}",
                config.sender.cost_per_message
            ),
        ));
    }

    if config.sender.default_max_retries < 1 {
        errors.push(ConfigError::invalid("sender.default_max_retries", "must be at least 1"));
    }

    if !(1..=86_400).contains(&config.sender.claim_lease_secs) {
        errors.push(ConfigError::invalid("sender.claim_lease_secs", "must be between 1 and 86400"));
    }

    if config.scheduler.interval_secs < 1 {
        errors.push(ConfigError::invalid("scheduler.interval_secs", "must be at least 1"));
    }

    let rate = config.kakao.mock_success_rate;
    if !(0.0..=1.0).contains(&rate) {
        errors.push(ConfigError::invalid(
            "kakao.mock_success_rate",
            format!("must be within 0.0..=1.0, got {rate}"),
        ));
    }

    if config.kakao.mock_min_latency_ms > config.kakao.mock_max_latency_ms {
        errors.push(ConfigError::invalid(
            "kakao.mock_min_latency_ms",
            format!(
                "{} exceeds kakao.mock_max_latency_ms ({})",
                config.kakao.mock_min_latency_ms, config.kakao.mock_max_latency_ms
            ),
        ));
    }

    if config.kakao.timeout_secs < 1 {
        errors.push(ConfigError::invalid("kakao.timeout_secs", "must be at least 1"));
    }

    let has_key = config
        .kakao
        .api_key
        .as_deref()
        .is_some_and(|k| !k.trim().is_empty());
    let has_secret = config
        .kakao
        .api_secret
        .as_deref()
        .is_some_and(|s| !s.trim().is_empty());
    if has_key && !has_secret {
        errors.push(ConfigError::invalid(
            "kakao.api_secret",
            "is required when kakao.api_key is set",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
