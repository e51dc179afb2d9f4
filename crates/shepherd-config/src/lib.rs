// SPDX-FileCopyrightText: 2026 Shepherd Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Shepherd messaging service.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use shepherd_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("Church: {}", config.church.name);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

use std::path::Path;

pub use diagnostic::{ConfigError, render_errors};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::{
    AppConfig, ChurchConfig, KakaoConfig, RetentionConfig, SchedulerConfig, SenderConfig,
    ShepherdConfig, StorageConfig,
};

/// Load configuration from the XDG hierarchy and validate it.
///
/// On any error the TOML sources are re-read so diagnostics can point at the
/// offending line.
pub fn load_and_validate() -> Result<ShepherdConfig, Vec<ConfigError>> {
    let config = loader::load_config()
        .map_err(|err| diagnostic::figment_to_config_errors(err, &collect_toml_sources()))?;
    validation::validate_config(&config)
        .map_err(|errors| locate_all(errors, &collect_toml_sources()))?;
    Ok(config)
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<ShepherdConfig, Vec<ConfigError>> {
    let sources = || {
        std::fs::read_to_string(path)
            .map(|content| vec![(path.display().to_string(), content)])
            .unwrap_or_default()
    };
    let config = loader::load_config_from_path(path)
        .map_err(|err| diagnostic::figment_to_config_errors(err, &sources()))?;
    validation::validate_config(&config).map_err(|errors| locate_all(errors, &sources()))?;
    Ok(config)
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<ShepherdConfig, Vec<ConfigError>> {
    let sources = vec![("<inline>".to_string(), toml_content.to_string())];
    let config = loader::load_config_from_str(toml_content)
        .map_err(|err| diagnostic::figment_to_config_errors(err, &sources))?;
    validation::validate_config(&config).map_err(|errors| locate_all(errors, &sources))?;
    Ok(config)
}

fn locate_all(errors: Vec<ConfigError>, toml_sources: &[(String, String)]) -> Vec<ConfigError> {
    errors
        .into_iter()
        .map(|error| error.locate(toml_sources))
        .collect()
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut sources = Vec::new();

    if let Ok(content) = std::fs::read_to_string("shepherd.toml") {
        let path = std::env::current_dir()
            .map(|d| d.join("shepherd.toml").display().to_string())
            .unwrap_or_else(|_| "shepherd.toml".to_string());
        sources.push((path, content));
    }

    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("shepherd/shepherd.toml");
        if let Ok(content) = std::fs::read_to_string(&path) {
            sources.push((path.display().to_string(), content));
        }
    }

    let system_path = Path::new("/etc/shepherd/shepherd.toml");
    if let Ok(content) = std::fs::read_to_string(system_path) {
        sources.push((system_path.display().to_string(), content));
    }

    sources
}
