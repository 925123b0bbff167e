use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use futures::{stream::BoxStream, StreamExt};
use shared::domain::{CallId, CaptureField, PaymentId, SessionStatus};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};
use zeroize::Zeroize;

pub mod config;
pub mod error;
pub mod events;
pub mod http_gateway;
pub mod monitor;
pub mod order;
pub mod progress;
pub mod remote;
pub mod ws_push;

pub use config::CaptureConfig;
pub use error::{CaptureError, CaptureResult, ProtocolError};
pub use events::{CaptureEvent, EventBus};
pub use http_gateway::HttpPaymentGateway;
pub use monitor::{MonitorTiming, TimeoutMonitor};
pub use order::{CaptureOrder, CaptureOrderTemplate};
pub use progress::{progress, NoopReason, Progress, Session};
pub use remote::RemoteCaptureState;
pub use ws_push::WsPushChannel;

/// Amount and currency for a new capture session.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureCharge {
    pub amount: f64,
    pub currency: String,
    pub token_type: Option<String>,
}

/// Push-channel credential. Cleared from memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelToken(String);

impl ChannelToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ChannelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ChannelToken(<redacted>)")
    }
}

impl Drop for ChannelToken {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn start_capture_session(
        &self,
        call_id: &CallId,
        charge: &CaptureCharge,
    ) -> CaptureResult<PaymentId>;
    async fn change_capture_target(
        &self,
        call_id: &CallId,
        payment_id: &PaymentId,
        field: CaptureField,
    ) -> CaptureResult<Option<String>>;
    async fn change_session_status(
        &self,
        call_id: &CallId,
        payment_id: &PaymentId,
        status: SessionStatus,
    ) -> CaptureResult<()>;
    async fn channel_token(&self, identity: &str) -> CaptureResult<ChannelToken>;
}

pub struct MissingPaymentGateway;

#[async_trait]
impl PaymentGateway for MissingPaymentGateway {
    async fn start_capture_session(
        &self,
        call_id: &CallId,
        _charge: &CaptureCharge,
    ) -> CaptureResult<PaymentId> {
        Err(CaptureError::Unavailable(format!(
            "payment gateway unavailable for call {call_id}"
        )))
    }

    async fn change_capture_target(
        &self,
        call_id: &CallId,
        _payment_id: &PaymentId,
        _field: CaptureField,
    ) -> CaptureResult<Option<String>> {
        Err(CaptureError::Unavailable(format!(
            "payment gateway unavailable for call {call_id}"
        )))
    }

    async fn change_session_status(
        &self,
        call_id: &CallId,
        _payment_id: &PaymentId,
        _status: SessionStatus,
    ) -> CaptureResult<()> {
        Err(CaptureError::Unavailable(format!(
            "payment gateway unavailable for call {call_id}"
        )))
    }

    async fn channel_token(&self, _identity: &str) -> CaptureResult<ChannelToken> {
        Err(CaptureError::Unavailable(
            "payment gateway unavailable: cannot issue channel token".into(),
        ))
    }
}

/// Raw push frames, one full snapshot document per item.
pub type PushFrames = BoxStream<'static, CaptureResult<String>>;

#[async_trait]
pub trait PushChannel: Send + Sync {
    async fn subscribe(
        &self,
        token: &ChannelToken,
        payment_id: &PaymentId,
    ) -> CaptureResult<PushFrames>;
}

pub struct MissingPushChannel;

#[async_trait]
impl PushChannel for MissingPushChannel {
    async fn subscribe(
        &self,
        _token: &ChannelToken,
        payment_id: &PaymentId,
    ) -> CaptureResult<PushFrames> {
        Err(CaptureError::Unavailable(format!(
            "push channel unavailable for payment {payment_id}"
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapturePhase {
    Idle,
    Starting,
    Capturing,
    Complete,
    Submitted,
    Cancelled,
    /// A remote call failed; recoverable by reset, retry or a new start.
    Errored,
}

impl CapturePhase {
    fn is_terminal(self) -> bool {
        matches!(self, CapturePhase::Submitted | CapturePhase::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSnapshot {
    pub phase: CapturePhase,
    pub session: Session,
    pub order: Vec<CaptureField>,
    pub remote: RemoteCaptureState,
    pub confirmed_target: Option<CaptureField>,
}

#[async_trait]
pub trait CaptureHandle: Send + Sync {
    async fn start(&self, call_id: CallId) -> CaptureResult<PaymentId>;
    async fn reset_field(&self, field: CaptureField) -> CaptureResult<()>;
    async fn submit(&self) -> CaptureResult<()>;
    async fn cancel(&self) -> CaptureResult<()>;
    async fn snapshot(&self) -> CaptureSnapshot;
    fn subscribe_events(&self) -> broadcast::Receiver<CaptureEvent>;
}

pub struct CaptureClient {
    config: CaptureConfig,
    gateway: Arc<dyn PaymentGateway>,
    push_channel: Arc<dyn PushChannel>,
    inner: Mutex<CaptureClientState>,
    events: EventBus,
}

struct CaptureClientState {
    phase: CapturePhase,
    session: Session,
    order: CaptureOrder,
    remote: RemoteCaptureState,
    /// Bumped on every start; work tagged with an older generation is ignored.
    generation: u64,
    next_request_token: u64,
    latest_request_token: u64,
    confirmed_target: Option<CaptureField>,
    push_task: Option<JoinHandle<()>>,
    monitor: Option<TimeoutMonitor>,
}

impl CaptureClientState {
    fn end_session(&mut self) {
        self.session.started = false;
        self.session.can_submit = false;
        if let Some(task) = self.push_task.take() {
            task.abort();
        }
        if let Some(monitor) = self.monitor.take() {
            monitor.stop();
        }
    }

    fn mark_errored(&mut self) {
        if !self.phase.is_terminal() && self.phase != CapturePhase::Idle {
            self.phase = CapturePhase::Errored;
        }
    }

    fn session_ids(&self) -> CaptureResult<(CallId, PaymentId)> {
        match (&self.session.call_id, &self.session.payment_id) {
            (Some(call_id), Some(payment_id)) => Ok((call_id.clone(), payment_id.clone())),
            _ => Err(CaptureError::NotStarted),
        }
    }
}

impl CaptureClient {
    pub fn new(config: CaptureConfig) -> Arc<Self> {
        Self::new_with_dependencies(
            config,
            Arc::new(MissingPaymentGateway),
            Arc::new(MissingPushChannel),
        )
    }

    pub fn new_with_dependencies(
        config: CaptureConfig,
        gateway: Arc<dyn PaymentGateway>,
        push_channel: Arc<dyn PushChannel>,
    ) -> Arc<Self> {
        let events = EventBus::new(config.event_capacity);
        let order = config.capture_order.instantiate();
        Arc::new(Self {
            config,
            gateway,
            push_channel,
            inner: Mutex::new(CaptureClientState {
                phase: CapturePhase::Idle,
                session: Session::default(),
                order,
                remote: RemoteCaptureState::default(),
                generation: 0,
                next_request_token: 0,
                latest_request_token: 0,
                confirmed_target: None,
                push_task: None,
                monitor: None,
            }),
            events,
        })
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Stops the push subscription and the staleness monitor without touching the gateway.
    pub async fn shutdown(&self) {
        self.inner.lock().await.end_session();
    }

    fn report(&self, err: &CaptureError) {
        match err.remediation_hint() {
            Some(hint) => error!(%err, hint, "capture: operation failed"),
            None => error!(%err, "capture: operation failed"),
        }
        self.events.publish(CaptureEvent::Error(err.clone()));
    }

    async fn fail(&self, generation: u64, err: CaptureError) -> CaptureError {
        {
            let mut guard = self.inner.lock().await;
            if guard.generation == generation {
                guard.mark_errored();
            }
        }
        self.report(&err);
        err
    }

    async fn open_push_channel(
        &self,
        call_id: &CallId,
        payment_id: &PaymentId,
    ) -> CaptureResult<PushFrames> {
        let token = self.gateway.channel_token(call_id.as_str()).await?;
        self.push_channel.subscribe(&token, payment_id).await
    }

    fn spawn_push_task(self: &Arc<Self>, generation: u64, mut frames: PushFrames) -> JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(frame) = frames.next().await {
                match frame {
                    Ok(frame) => {
                        // Malformed frames are logged and skipped.
                        let _ = client.apply_push(generation, &frame).await;
                    }
                    Err(err) => {
                        client.report(&err);
                        break;
                    }
                }
            }
            debug!(generation, "capture: push stream ended");
        })
    }

    /// Feeds one push document into the current session as if it arrived on the channel.
    pub async fn handle_push_frame(&self, frame: &str) -> CaptureResult<()> {
        let generation = self.inner.lock().await.generation;
        self.apply_push(generation, frame).await
    }

    async fn apply_push(&self, generation: u64, frame: &str) -> CaptureResult<()> {
        let parsed = RemoteCaptureState::parse(frame);

        let (remote, decision) = {
            let mut guard = self.inner.lock().await;
            if guard.generation != generation {
                return Ok(());
            }
            let remote = match parsed {
                Ok(remote) => remote,
                Err(err) => {
                    if let Some(monitor) = &guard.monitor {
                        monitor.touch().await;
                    }
                    warn!(%err, "capture: ignoring malformed push document");
                    return Err(err.into());
                }
            };
            if let (Some(expected), Some(actual)) = (&guard.session.payment_id, &remote.payment_id)
            {
                if expected != actual {
                    debug!(%expected, %actual, "capture: ignoring push for another payment");
                    return Ok(());
                }
            }
            if let Some(monitor) = &guard.monitor {
                monitor.touch().await;
            }

            let state = &mut *guard;
            state.remote = remote.clone();
            state.session.last_update_at = Some(Utc::now());
            let decision = progress(&mut state.session, &mut state.order, &state.remote);
            if decision == Progress::Complete {
                state.phase = CapturePhase::Complete;
            }
            (remote, decision)
        };

        self.events.publish(CaptureEvent::PaymentDataUpdated(remote));

        match decision {
            Progress::Complete => {
                info!("capture: all payment fields captured");
                self.events.publish(CaptureEvent::CaptureComplete);
            }
            Progress::Advance(next) => {
                // Failure is already reported as an event.
                let _ = self.request_capture_target(generation, next).await;
            }
            Progress::Noop(NoopReason::Stalled {
                unaddressed,
                unrecognized,
            }) => {
                warn!(
                    ?unaddressed,
                    ?unrecognized,
                    "capture: gateway requires fields missing from the capture order"
                );
                self.events.publish(CaptureEvent::CaptureStalled {
                    unaddressed,
                    unrecognized,
                });
            }
            Progress::Noop(reason) => debug!(?reason, "capture: no progress"),
        }
        Ok(())
    }

    async fn request_capture_target(
        &self,
        generation: u64,
        field: CaptureField,
    ) -> CaptureResult<()> {
        let (call_id, payment_id, request_token) = {
            let mut guard = self.inner.lock().await;
            if guard.generation != generation {
                return Ok(());
            }
            let (call_id, payment_id) = guard.session_ids()?;
            guard.next_request_token += 1;
            guard.latest_request_token = guard.next_request_token;
            (call_id, payment_id, guard.next_request_token)
        };

        debug!(%call_id, %field, request_token, "capture: requesting capture target");
        match self
            .gateway
            .change_capture_target(&call_id, &payment_id, field)
            .await
        {
            Ok(status) => {
                {
                    let mut guard = self.inner.lock().await;
                    if guard.generation != generation || request_token < guard.latest_request_token
                    {
                        debug!(
                            %field,
                            request_token,
                            latest = guard.latest_request_token,
                            "capture: discarding stale capture target response"
                        );
                        return Ok(());
                    }
                    guard.confirmed_target = Some(field);
                    if guard.phase == CapturePhase::Errored {
                        guard.phase = CapturePhase::Capturing;
                    }
                }
                info!(%call_id, %field, ?status, "capture: capture target changed");
                self.events
                    .publish(CaptureEvent::CaptureTypeChanged { field });
                Ok(())
            }
            Err(err) => Err(self.fail(generation, err).await),
        }
    }

    async fn start_impl(self: &Arc<Self>, call_id: CallId) -> CaptureResult<PaymentId> {
        info!(%call_id, "capture: starting session");
        let generation = {
            let mut guard = self.inner.lock().await;
            guard.end_session();
            guard.generation += 1;
            guard.phase = CapturePhase::Starting;
            guard.session = Session::for_call(call_id.clone());
            guard.order = self.config.capture_order.instantiate();
            guard.remote = RemoteCaptureState::default();
            guard.confirmed_target = None;
            guard.generation
        };

        let payment_id = match self
            .gateway
            .start_capture_session(&call_id, &self.config.charge())
            .await
        {
            Ok(payment_id) => payment_id,
            Err(err) => return Err(self.fail(generation, err).await),
        };
        info!(%call_id, %payment_id, "capture: gateway session opened");

        {
            let mut guard = self.inner.lock().await;
            if guard.generation != generation {
                return Ok(payment_id);
            }
            guard.session.payment_id = Some(payment_id.clone());
        }
        self.events.publish(CaptureEvent::CaptureStarted {
            call_id: call_id.clone(),
            payment_id: payment_id.clone(),
        });

        let frames = match self.open_push_channel(&call_id, &payment_id).await {
            Ok(frames) => frames,
            Err(err) => return Err(self.fail(generation, err).await),
        };

        let head = {
            let mut guard = self.inner.lock().await;
            if guard.generation != generation {
                return Ok(payment_id);
            }
            guard.session.started = true;
            guard.session.last_update_at = Some(Utc::now());
            guard.phase = CapturePhase::Capturing;
            guard.push_task = Some(self.spawn_push_task(generation, frames));
            guard.monitor = Some(TimeoutMonitor::start(
                self.config.monitor_timing(),
                self.events.clone(),
            ));
            guard.order.peek()
        };

        if let Some(head) = head {
            // Failure is already reported; the session stays open for reset or cancel.
            let _ = self.request_capture_target(generation, head).await;
        }
        Ok(payment_id)
    }

    async fn reset_field_impl(&self, field: CaptureField) -> CaptureResult<()> {
        let generation = {
            let mut guard = self.inner.lock().await;
            if !guard.session.started || guard.phase.is_terminal() {
                drop(guard);
                let err = CaptureError::NotStarted;
                self.report(&err);
                return Err(err);
            }
            guard.order.reset_field(field);
            guard.session.can_submit = false;
            guard.phase = CapturePhase::Capturing;
            info!(%field, order = ?guard.order.to_vec(), "capture: field reset");
            guard.generation
        };
        self.request_capture_target(generation, field).await
    }

    async fn finish_impl(&self, status: SessionStatus) -> CaptureResult<()> {
        let (generation, call_id, payment_id) = {
            let guard = self.inner.lock().await;
            let ids = guard.session_ids().and_then(|ids| {
                if status == SessionStatus::Complete && !guard.session.can_submit {
                    Err(CaptureError::SubmitNotReady)
                } else {
                    Ok(ids)
                }
            });
            match ids {
                Ok((call_id, payment_id)) => (guard.generation, call_id, payment_id),
                Err(err) => {
                    drop(guard);
                    self.report(&err);
                    return Err(err);
                }
            }
        };

        info!(%call_id, %payment_id, ?status, "capture: requesting session status");
        if let Err(err) = self
            .gateway
            .change_session_status(&call_id, &payment_id, status)
            .await
        {
            return Err(self.fail(generation, err).await);
        }

        {
            let mut guard = self.inner.lock().await;
            if guard.generation == generation {
                guard.phase = match status {
                    SessionStatus::Complete => CapturePhase::Submitted,
                    SessionStatus::Cancel => CapturePhase::Cancelled,
                };
                guard.end_session();
            }
        }
        self.events.publish(match status {
            SessionStatus::Complete => CaptureEvent::PaymentSubmitted { payment_id },
            SessionStatus::Cancel => CaptureEvent::PaymentCancelled { payment_id },
        });
        Ok(())
    }

    async fn snapshot_impl(&self) -> CaptureSnapshot {
        let guard = self.inner.lock().await;
        CaptureSnapshot {
            phase: guard.phase,
            session: guard.session.clone(),
            order: guard.order.to_vec(),
            remote: guard.remote.clone(),
            confirmed_target: guard.confirmed_target,
        }
    }
}

#[async_trait]
impl CaptureHandle for Arc<CaptureClient> {
    async fn start(&self, call_id: CallId) -> CaptureResult<PaymentId> {
        self.start_impl(call_id).await
    }

    async fn reset_field(&self, field: CaptureField) -> CaptureResult<()> {
        self.reset_field_impl(field).await
    }

    async fn submit(&self) -> CaptureResult<()> {
        self.finish_impl(SessionStatus::Complete).await
    }

    async fn cancel(&self) -> CaptureResult<()> {
        self.finish_impl(SessionStatus::Cancel).await
    }

    async fn snapshot(&self) -> CaptureSnapshot {
        self.snapshot_impl().await
    }

    fn subscribe_events(&self) -> broadcast::Receiver<CaptureEvent> {
        self.events.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
