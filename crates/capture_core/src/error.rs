use std::{fmt, time::Duration};

use shared::error::{ErrorCode, GatewayRejection};
use thiserror::Error;
use tracing::warn;

/// A push document that could not be turned into a capture snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("push document is not valid JSON: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("network error occurred: {0}")]
    Network(String),
    #[error("payment gateway rejected request: {message}")]
    Gateway {
        message: String,
        code: ErrorCode,
        hint: Option<&'static str>,
    },
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("no capture update received for {}s", elapsed.as_secs())]
    StaleSession { elapsed: Duration },
    #[error("no capture session is active")]
    NotStarted,
    #[error("capture is not complete; submit is not allowed yet")]
    SubmitNotReady,
    #[error("{0}")]
    Unavailable(String),
}

impl CaptureError {
    /// Transport failure. The detail is logged; the error itself carries only `context`.
    pub(crate) fn network(context: &'static str, detail: impl fmt::Display) -> Self {
        warn!(%detail, context, "capture: network failure");
        CaptureError::Network(context.to_string())
    }

    pub fn remediation_hint(&self) -> Option<&'static str> {
        match self {
            CaptureError::Gateway { hint, .. } => *hint,
            CaptureError::StaleSession { .. } => {
                Some("Updates have stopped arriving; reset the current field or cancel.")
            }
            _ => None,
        }
    }
}

impl From<GatewayRejection> for CaptureError {
    fn from(rejection: GatewayRejection) -> Self {
        let code = rejection.classify();
        CaptureError::Gateway {
            hint: code.remediation_hint(),
            message: rejection.error,
            code,
        }
    }
}

impl From<reqwest::Error> for CaptureError {
    fn from(err: reqwest::Error) -> Self {
        CaptureError::network("payment gateway unreachable", err)
    }
}

pub type CaptureResult<T> = std::result::Result<T, CaptureError>;
