use std::collections::{BTreeMap, BTreeSet};

use shared::{
    domain::{CaptureField, PaymentId},
    protocol::PushDocument,
};
use tracing::warn;

use crate::error::ProtocolError;

/// Last snapshot received from the push channel. Replaced wholesale on every delivery.
///
/// Field names outside [`CaptureField`] (a postal code, say) are kept by name so they still
/// count as outstanding work without ever reaching the capture order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteCaptureState {
    pub payment_id: Option<PaymentId>,
    pub active_field: Option<CaptureField>,
    pub required_fields: BTreeSet<CaptureField>,
    pub unrecognized_active: Option<String>,
    pub unrecognized_required: BTreeSet<String>,
    pub partial_result: bool,
    pub masked_values: BTreeMap<CaptureField, String>,
}

impl RemoteCaptureState {
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let document: PushDocument = serde_json::from_str(frame)
            .map_err(|err| ProtocolError::Malformed(err.to_string()))?;
        Ok(Self::from_document(&document))
    }

    pub fn from_document(document: &PushDocument) -> Self {
        let mut state = Self {
            payment_id: document.sid.clone(),
            partial_result: document
                .partial_result
                .as_ref()
                .is_some_and(|flag| flag.is_partial()),
            ..Self::default()
        };

        match document.capture.as_deref().map(str::trim) {
            None | Some("") => {}
            Some(name) => match name.parse::<CaptureField>() {
                Ok(field) => state.active_field = Some(field),
                Err(err) => {
                    warn!(name = %err.0, "push: gateway is capturing an unrecognized field");
                    state.unrecognized_active = Some(err.0);
                }
            },
        }

        if let Some(required) = &document.required {
            for name in required.names() {
                match name.parse::<CaptureField>() {
                    Ok(field) => {
                        state.required_fields.insert(field);
                    }
                    Err(err) => {
                        warn!(name = %err.0, "push: gateway requires an unrecognized field");
                        state.unrecognized_required.insert(err.0);
                    }
                }
            }
        }

        for (field, value) in [
            (CaptureField::CardNumber, &document.payment_card_number),
            (CaptureField::SecurityCode, &document.security_code),
            (CaptureField::ExpirationDate, &document.expiration_date),
        ] {
            if let Some(value) = value {
                state.masked_values.insert(field, value.clone());
            }
        }

        state
    }

    /// True once the gateway reports any active field, recognized or not.
    pub fn is_capturing(&self) -> bool {
        self.active_field.is_some() || self.unrecognized_active.is_some()
    }

    pub fn has_outstanding(&self) -> bool {
        !self.required_fields.is_empty() || !self.unrecognized_required.is_empty()
    }

    pub fn is_required(&self, field: CaptureField) -> bool {
        self.required_fields.contains(&field)
    }

    pub fn masked_value(&self, field: CaptureField) -> Option<&str> {
        self.masked_values.get(&field).map(String::as_str)
    }
}
