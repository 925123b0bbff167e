use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    CallNotActive,
    InvalidReference,
    RateLimited,
    Validation,
    Internal,
    Unknown,
}

impl ErrorCode {
    pub fn remediation_hint(self) -> Option<&'static str> {
        match self {
            ErrorCode::CallNotActive => {
                Some("Verify the call is still in progress and the call id is correct.")
            }
            ErrorCode::InvalidReference => {
                Some("The payment session reference is unknown; start a new capture.")
            }
            ErrorCode::RateLimited => Some("The gateway is throttling requests; wait and retry."),
            ErrorCode::Validation | ErrorCode::Internal | ErrorCode::Unknown => None,
        }
    }
}

/// Business-level rejection body returned by the payment gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRejection {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl GatewayRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
            code: None,
        }
    }

    /// Explicit code when the gateway sent one, otherwise inferred from the message text.
    pub fn classify(&self) -> ErrorCode {
        if let Some(code) = self.code {
            return code;
        }
        let lower = self.error.to_ascii_lowercase();
        if lower.contains("not in progress")
            || lower.contains("not active")
            || lower.contains("call is currently active")
            || lower.contains("already completed")
        {
            ErrorCode::CallNotActive
        } else if lower.contains("not found")
            || lower.contains("invalid reference")
            || lower.contains("unknown payment")
        {
            ErrorCode::InvalidReference
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            ErrorCode::RateLimited
        } else if lower.contains("invalid") || lower.contains("missing") {
            ErrorCode::Validation
        } else {
            ErrorCode::Unknown
        }
    }

    pub fn remediation_hint(&self) -> Option<&'static str> {
        self.classify().remediation_hint()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_inactive_call_rejection_from_message() {
        let rejection =
            GatewayRejection::new("startCapture error: Call not in progress for CA123");
        assert_eq!(rejection.classify(), ErrorCode::CallNotActive);
        assert!(rejection.remediation_hint().is_some());
    }

    #[test]
    fn explicit_code_wins_over_message() {
        let rejection: GatewayRejection =
            serde_json::from_str(r#"{"error":"call not active","code":"rate_limited"}"#)
                .expect("decode");
        assert_eq!(rejection.classify(), ErrorCode::RateLimited);
    }

    #[test]
    fn unknown_rejection_has_no_hint() {
        assert_eq!(GatewayRejection::new("boom").remediation_hint(), None);
    }
}
