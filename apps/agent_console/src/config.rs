use std::{fs, path::Path};

use anyhow::Context;
use capture_core::{CaptureConfig, CaptureOrderTemplate};
use serde::Deserialize;
use shared::domain::CaptureField;

pub const DEFAULT_CONFIG_FILE: &str = "agent_console.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub gateway_url: Option<String>,
    pub push_url: Option<String>,
    pub log_filter: String,
    pub capture: CaptureConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            gateway_url: None,
            push_url: None,
            log_filter: "info".into(),
            capture: CaptureConfig::default(),
        }
    }
}

/// Defaults, then the config file, then `APP__*` environment overrides.
///
/// An explicitly named file must exist; the default `agent_console.toml` is optional.
pub fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    let raw = match path {
        Some(path) => Some(
            fs::read_to_string(path)
                .with_context(|| format!("failed to read config file {}", path.display()))?,
        ),
        None => fs::read_to_string(DEFAULT_CONFIG_FILE).ok(),
    };

    let mut settings = match raw {
        Some(raw) => parse_settings(&raw)?,
        None => Settings::default(),
    };
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    settings
        .capture
        .validate()
        .context("invalid capture configuration")?;
    Ok(settings)
}

pub fn parse_settings(raw: &str) -> anyhow::Result<Settings> {
    toml::from_str(raw).context("failed to parse console settings")
}

pub fn apply_env_overrides(
    settings: &mut Settings,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(v) = lookup("APP__GATEWAY_URL") {
        settings.gateway_url = Some(v);
    }
    if let Some(v) = lookup("APP__PUSH_URL") {
        settings.push_url = Some(v);
    }
    if let Some(v) = lookup("APP__LOG") {
        settings.log_filter = v;
    }
    if let Some(v) = lookup("APP__CURRENCY") {
        settings.capture.currency = v;
    }
    if let Some(v) = lookup("APP__CHARGE_AMOUNT") {
        settings.capture.charge_amount = v
            .trim()
            .parse()
            .with_context(|| format!("APP__CHARGE_AMOUNT is not a number: {v}"))?;
    }
    if let Some(v) = lookup("APP__POLL_INTERVAL_SECS") {
        settings.capture.poll_interval_secs = v
            .trim()
            .parse()
            .with_context(|| format!("APP__POLL_INTERVAL_SECS is not a number: {v}"))?;
    }
    if let Some(v) = lookup("APP__STALE_THRESHOLD_SECS") {
        settings.capture.stale_threshold_secs = v
            .trim()
            .parse()
            .with_context(|| format!("APP__STALE_THRESHOLD_SECS is not a number: {v}"))?;
    }
    if let Some(v) = lookup("APP__CAPTURE_ORDER") {
        let fields = v
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::parse::<CaptureField>)
            .collect::<Result<Vec<_>, _>>()
            .context("APP__CAPTURE_ORDER names an unknown field")?;
        settings.capture.capture_order =
            CaptureOrderTemplate::new(fields).context("APP__CAPTURE_ORDER is invalid")?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
