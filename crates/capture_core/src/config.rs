use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{monitor::MonitorTiming, order::CaptureOrderTemplate, CaptureCharge};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("charge_amount must be a finite, non-negative number (got {0})")]
    ChargeAmount(f64),
    #[error("currency must be a three-letter code (got {0:?})")]
    Currency(String),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("stale_threshold_secs ({threshold}) must not be shorter than poll_interval_secs ({poll})")]
    ThresholdBelowPoll { threshold: u64, poll: u64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub capture_order: CaptureOrderTemplate,
    pub charge_amount: f64,
    pub currency: String,
    /// Sent only for zero-amount sessions, which tokenize the card instead of charging it.
    pub token_type: Option<String>,
    pub poll_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub event_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_order: CaptureOrderTemplate::default(),
            charge_amount: 0.0,
            currency: "AUD".into(),
            token_type: Some("one-time".into()),
            poll_interval_secs: 5,
            stale_threshold_secs: 15,
            event_capacity: 256,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.charge_amount.is_finite() || self.charge_amount < 0.0 {
            return Err(ConfigError::ChargeAmount(self.charge_amount));
        }
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Currency(self.currency.clone()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("poll_interval_secs"));
        }
        if self.stale_threshold_secs == 0 {
            return Err(ConfigError::ZeroDuration("stale_threshold_secs"));
        }
        if self.stale_threshold_secs < self.poll_interval_secs {
            return Err(ConfigError::ThresholdBelowPoll {
                threshold: self.stale_threshold_secs,
                poll: self.poll_interval_secs,
            });
        }
        Ok(())
    }

    pub fn monitor_timing(&self) -> MonitorTiming {
        MonitorTiming {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            stale_threshold: Duration::from_secs(self.stale_threshold_secs),
        }
    }

    pub fn charge(&self) -> CaptureCharge {
        CaptureCharge {
            amount: self.charge_amount,
            currency: self.currency.trim().to_ascii_uppercase(),
            token_type: if self.charge_amount == 0.0 {
                self.token_type.clone()
            } else {
                None
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::CaptureField;

    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = CaptureConfig::default();
        config.validate().expect("valid");
        assert_eq!(config.monitor_timing(), MonitorTiming::default());
        assert_eq!(config.capture_order.fields(), &CaptureField::ALL);
    }

    #[test]
    fn token_type_is_only_sent_for_zero_amount() {
        let mut config = CaptureConfig::default();
        assert_eq!(config.charge().token_type.as_deref(), Some("one-time"));

        config.charge_amount = 9.99;
        config.currency = "usd".into();
        let charge = config.charge();
        assert_eq!(charge.token_type, None);
        assert_eq!(charge.currency, "USD");
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = CaptureConfig {
            charge_amount: -1.0,
            ..CaptureConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ChargeAmount(-1.0)));

        config.charge_amount = 1.0;
        config.currency = "dollars".into();
        assert!(matches!(config.validate(), Err(ConfigError::Currency(_))));

        config.currency = "AUD".into();
        config.stale_threshold_secs = 2;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ThresholdBelowPoll {
                threshold: 2,
                poll: 5
            })
        );
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: CaptureConfig = serde_json::from_str(
            r#"{"capture_order":["expiration-date","payment-card-number"],"charge_amount":12.5}"#,
        )
        .expect("decode");
        assert_eq!(
            config.capture_order.fields(),
            &[CaptureField::ExpirationDate, CaptureField::CardNumber]
        );
        assert_eq!(config.currency, "AUD");
        assert_eq!(config.stale_threshold_secs, 15);
    }
}
