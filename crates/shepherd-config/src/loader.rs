// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./shepherd.toml` > `~/.config/shepherd/shepherd.toml` >
//! `/etc/shepherd/shepherd.toml` with environment variable overrides via `SHEPHERD_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::ShepherdConfig;

/// Top-level sections that environment variables can target.
const SECTIONS: &[&str] = &[
    "app",
    "church",
    "storage",
    "kakao",
    "sender",
    "scheduler",
    "retention",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/shepherd/shepherd.toml` (system-wide)
/// 3. `~/.config/shepherd/shepherd.toml` (user XDG config)
/// 4. `./shepherd.toml` (local directory)
/// 5. `SHEPHERD_*` environment variables
pub fn load_config() -> Result<ShepherdConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<ShepherdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ShepherdConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ShepherdConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ShepherdConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(ShepherdConfig::default()))
        .merge(Toml::file("/etc/shepherd/shepherd.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("shepherd/shepherd.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("shepherd.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider with explicit section mapping.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `SHEPHERD_KAKAO_API_KEY` maps to `kakao.api_key`, not `kakao.api.key`.
fn env_provider() -> Env {
    Env::prefixed("SHEPHERD_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
