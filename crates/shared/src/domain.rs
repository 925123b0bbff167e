use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

id_newtype!(CallId);
id_newtype!(PaymentId);

/// One discrete payment datum collected over the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CaptureField {
    #[serde(rename = "payment-card-number")]
    CardNumber,
    #[serde(rename = "security-code")]
    SecurityCode,
    #[serde(rename = "expiration-date")]
    ExpirationDate,
}

impl CaptureField {
    pub const ALL: [CaptureField; 3] = [
        CaptureField::CardNumber,
        CaptureField::SecurityCode,
        CaptureField::ExpirationDate,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            CaptureField::CardNumber => "payment-card-number",
            CaptureField::SecurityCode => "security-code",
            CaptureField::ExpirationDate => "expiration-date",
        }
    }
}

impl fmt::Display for CaptureField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown capture field: {0:?}")]
pub struct UnknownCaptureField(pub String);

impl FromStr for CaptureField {
    type Err = UnknownCaptureField;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        CaptureField::ALL
            .into_iter()
            .find(|field| field.wire_name() == value)
            .ok_or_else(|| UnknownCaptureField(value.to_string()))
    }
}

/// Terminal status requested for a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Complete,
    Cancel,
}
