use async_trait::async_trait;
use futures::StreamExt;
use shared::domain::PaymentId;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info};
use url::Url;

use crate::{
    error::{CaptureError, CaptureResult},
    ChannelToken, PushChannel, PushFrames,
};

/// Push channel backed by a websocket that streams full capture snapshots as text frames.
pub struct WsPushChannel {
    push_url: Url,
}

impl WsPushChannel {
    pub fn new(push_url: &str) -> CaptureResult<Self> {
        let ws_url = if push_url.starts_with("https://") {
            push_url.replacen("https://", "wss://", 1)
        } else if push_url.starts_with("http://") {
            push_url.replacen("http://", "ws://", 1)
        } else if push_url.starts_with("ws://") || push_url.starts_with("wss://") {
            push_url.to_string()
        } else {
            return Err(CaptureError::Unavailable(format!(
                "push_url must start with http(s):// or ws(s)://, got {push_url}"
            )));
        };
        let push_url = Url::parse(&ws_url)
            .map_err(|err| CaptureError::Unavailable(format!("invalid push_url {ws_url}: {err}")))?;
        Ok(Self { push_url })
    }

    pub fn subscription_url(&self, token: &ChannelToken, payment_id: &PaymentId) -> Url {
        let mut url = self.push_url.clone();
        let path = format!("{}/ws", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.query_pairs_mut()
            .append_pair("payment_id", payment_id.as_str())
            .append_pair("token", token.expose());
        url
    }
}

#[async_trait]
impl PushChannel for WsPushChannel {
    async fn subscribe(
        &self,
        token: &ChannelToken,
        payment_id: &PaymentId,
    ) -> CaptureResult<PushFrames> {
        let url = self.subscription_url(token, payment_id);
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|err| CaptureError::network("push channel connection failed", err))?;
        info!(payment_id = %payment_id, "push: subscribed");
        let (_, ws_reader) = ws_stream.split();

        let frames = futures::stream::unfold(Some(ws_reader), |reader| async move {
            let mut reader = reader?;
            loop {
                match reader.next().await {
                    Some(Ok(Message::Text(text))) => return Some((Ok(text.to_string()), Some(reader))),
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("push: channel closed");
                        return None;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        let err = CaptureError::network("push channel receive failed", err);
                        return Some((Err(err), None));
                    }
                }
            }
        });

        Ok(frames.boxed())
    }
}

#[cfg(test)]
#[path = "tests/ws_push_tests.rs"]
mod tests;
