//! Capture progression: decides, after every push, whether to keep waiting, move to the
//! next field or declare capture complete. No I/O happens here; the caller issues the
//! remote request for an [`Progress::Advance`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use shared::domain::{CallId, CaptureField, PaymentId};

use crate::{order::CaptureOrder, remote::RemoteCaptureState};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub call_id: Option<CallId>,
    pub payment_id: Option<PaymentId>,
    pub started: bool,
    pub can_submit: bool,
    pub last_update_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn for_call(call_id: CallId) -> Self {
        Self {
            call_id: Some(call_id),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoopReason {
    NotStarted,
    AwaitingCapture,
    FieldOutstanding(CaptureField),
    AlreadyComplete,
    /// The order ran out while the gateway still requires fields it cannot address.
    Stalled {
        unaddressed: BTreeSet<CaptureField>,
        unrecognized: BTreeSet<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Noop(NoopReason),
    Advance(CaptureField),
    Complete,
}

pub fn progress(
    session: &mut Session,
    order: &mut CaptureOrder,
    remote: &RemoteCaptureState,
) -> Progress {
    if !session.started {
        return Progress::Noop(NoopReason::NotStarted);
    }
    if !remote.is_capturing() {
        return Progress::Noop(NoopReason::AwaitingCapture);
    }

    // Only the head is ever compared against the required set.
    let head = order.peek();
    if let Some(head) = head {
        if remote.is_required(head) {
            return Progress::Noop(NoopReason::FieldOutstanding(head));
        }
    }

    if !remote.has_outstanding() {
        if session.can_submit {
            return Progress::Noop(NoopReason::AlreadyComplete);
        }
        session.can_submit = true;
        return Progress::Complete;
    }

    order.dequeue();
    match order.peek() {
        Some(next) => Progress::Advance(next),
        None => Progress::Noop(NoopReason::Stalled {
            unaddressed: remote.required_fields.clone(),
            unrecognized: remote.unrecognized_required.clone(),
        }),
    }
}
