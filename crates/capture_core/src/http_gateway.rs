use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{CallId, CaptureField, PaymentId, SessionStatus},
    error::GatewayRejection,
    protocol::{
        ChangeCaptureRequest, ChangeCaptureResponse, ChangeStatusRequest, ChannelTokenRequest,
        StartCaptureRequest, StartCaptureResponse,
    },
};
use tracing::debug;

use crate::{
    error::{CaptureError, CaptureResult},
    CaptureCharge, ChannelToken, PaymentGateway,
};

const START_CAPTURE_PATH: &str = "/aap/startCapture";
const CHANGE_CAPTURE_PATH: &str = "/aap/changeCapture";
const CHANGE_STATUS_PATH: &str = "/aap/changeStatus";
const CHANNEL_TOKEN_PATH: &str = "/sync/getSyncToken";

/// Key sent with every mutating call so transport retries never apply twice.
pub fn idempotency_key(call_id: &CallId) -> String {
    format!("{}{}", call_id, Utc::now().timestamp_millis())
}

/// Talks to the capture backend over JSON POSTs.
pub struct HttpPaymentGateway {
    http: Client,
    base_url: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> CaptureResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base_url);
        let response = self.http.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(%url, status = status.as_u16(), "gateway: response received");

        let value = serde_json::from_str::<serde_json::Value>(&text).ok();

        if let Some(rejection) = value
            .as_ref()
            .filter(|value| value.get("error").is_some())
            .and_then(|value| serde_json::from_value::<GatewayRejection>(value.clone()).ok())
        {
            return Err(rejection.into());
        }

        if !status.is_success() {
            let message = match value {
                Some(serde_json::Value::String(message)) => message,
                _ if text.trim().is_empty() => format!("{path} failed with status {status}"),
                _ => text,
            };
            return Err(GatewayRejection::new(message).into());
        }

        // Bare tokens and acks may arrive unquoted.
        let value = value.unwrap_or(serde_json::Value::String(text));
        serde_json::from_value(value).map_err(|err| {
            CaptureError::network("unexpected payment gateway response", format!("{path}: {err}"))
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn start_capture_session(
        &self,
        call_id: &CallId,
        charge: &CaptureCharge,
    ) -> CaptureResult<PaymentId> {
        let response: StartCaptureResponse = self
            .post(
                START_CAPTURE_PATH,
                &StartCaptureRequest {
                    call_sid: call_id.clone(),
                    charge_amount: charge.amount,
                    currency: charge.currency.clone(),
                    token_type: charge.token_type.clone(),
                },
            )
            .await?;
        Ok(response.sid)
    }

    async fn change_capture_target(
        &self,
        call_id: &CallId,
        payment_id: &PaymentId,
        field: CaptureField,
    ) -> CaptureResult<Option<String>> {
        let response: ChangeCaptureResponse = self
            .post(
                CHANGE_CAPTURE_PATH,
                &ChangeCaptureRequest {
                    call_sid: call_id.clone(),
                    payment_sid: payment_id.clone(),
                    capture_type: field,
                    idempotency_key: idempotency_key(call_id),
                },
            )
            .await?;
        Ok(response.status)
    }

    async fn change_session_status(
        &self,
        call_id: &CallId,
        payment_id: &PaymentId,
        status: SessionStatus,
    ) -> CaptureResult<()> {
        let _: serde_json::Value = self
            .post(
                CHANGE_STATUS_PATH,
                &ChangeStatusRequest {
                    call_sid: call_id.clone(),
                    payment_sid: payment_id.clone(),
                    status,
                    idempotency_key: idempotency_key(call_id),
                },
            )
            .await?;
        Ok(())
    }

    async fn channel_token(&self, identity: &str) -> CaptureResult<ChannelToken> {
        let token: String = self
            .post(
                CHANNEL_TOKEN_PATH,
                &ChannelTokenRequest {
                    identity: identity.to_string(),
                },
            )
            .await?;
        Ok(ChannelToken::new(token))
    }
}

#[cfg(test)]
#[path = "tests/http_gateway_tests.rs"]
mod tests;
