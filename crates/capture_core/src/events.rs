use std::{collections::BTreeSet, time::Duration};

use shared::domain::{CallId, CaptureField, PaymentId};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{error::CaptureError, remote::RemoteCaptureState};

#[derive(Debug, Clone)]
pub enum CaptureEvent {
    CaptureStarted {
        call_id: CallId,
        payment_id: PaymentId,
    },
    PaymentDataUpdated(RemoteCaptureState),
    CaptureTypeChanged {
        field: CaptureField,
    },
    CaptureComplete,
    /// The gateway still requires fields the capture order no longer holds.
    CaptureStalled {
        unaddressed: BTreeSet<CaptureField>,
        unrecognized: BTreeSet<String>,
    },
    SyncTimeout {
        elapsed: Duration,
    },
    PaymentSubmitted {
        payment_id: PaymentId,
    },
    PaymentCancelled {
        payment_id: PaymentId,
    },
    Error(CaptureError),
}

impl CaptureEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CaptureEvent::CaptureStarted { .. } => "capture_started",
            CaptureEvent::PaymentDataUpdated(_) => "payment_data_updated",
            CaptureEvent::CaptureTypeChanged { .. } => "capture_type_changed",
            CaptureEvent::CaptureComplete => "capture_complete",
            CaptureEvent::CaptureStalled { .. } => "capture_stalled",
            CaptureEvent::SyncTimeout { .. } => "sync_timeout",
            CaptureEvent::PaymentSubmitted { .. } => "payment_submitted",
            CaptureEvent::PaymentCancelled { .. } => "payment_cancelled",
            CaptureEvent::Error(_) => "error",
        }
    }
}

/// Fan-out of capture events to the presentation layer.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CaptureEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, event: CaptureEvent) {
        let name = event.name();
        if self.sender.send(event).is_err() {
            debug!(event = name, "no subscribers for capture event");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CaptureEvent> {
        self.sender.subscribe()
    }
}
