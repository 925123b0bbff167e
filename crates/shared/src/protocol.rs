use serde::{Deserialize, Serialize};

use crate::domain::{CallId, CaptureField, PaymentId, SessionStatus};

/// `Required` arrives either as a comma-delimited string or as a JSON list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequiredFields {
    Delimited(String),
    List(Vec<String>),
}

impl RequiredFields {
    /// Trimmed, non-empty entries in delivery order.
    pub fn names(&self) -> Vec<&str> {
        match self {
            RequiredFields::Delimited(raw) => raw
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .collect(),
            RequiredFields::List(items) => items
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PartialResultFlag {
    Flag(bool),
    Text(String),
}

impl PartialResultFlag {
    pub fn is_partial(&self) -> bool {
        match self {
            PartialResultFlag::Flag(value) => *value,
            PartialResultFlag::Text(value) => value.trim().eq_ignore_ascii_case("true"),
        }
    }
}

/// Full-replace snapshot delivered by the push channel on every gateway change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushDocument {
    #[serde(rename = "Sid", default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<PaymentId>,
    #[serde(
        rename = "PaymentCardNumber",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub payment_card_number: Option<String>,
    #[serde(rename = "SecurityCode", default, skip_serializing_if = "Option::is_none")]
    pub security_code: Option<String>,
    #[serde(
        rename = "ExpirationDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub expiration_date: Option<String>,
    #[serde(rename = "Capture", default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,
    #[serde(rename = "Required", default, skip_serializing_if = "Option::is_none")]
    pub required: Option<RequiredFields>,
    #[serde(
        rename = "PartialResult",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub partial_result: Option<PartialResultFlag>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCaptureRequest {
    pub call_sid: CallId,
    pub charge_amount: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartCaptureResponse {
    pub sid: PaymentId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCaptureRequest {
    pub call_sid: CallId,
    pub payment_sid: PaymentId,
    pub capture_type: CaptureField,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeCaptureResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<PaymentId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeStatusRequest {
    pub call_sid: CallId,
    pub payment_sid: PaymentId,
    pub status: SessionStatus,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelTokenRequest {
    pub identity: String,
}
