use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use shared::domain::CaptureField;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidCaptureOrder {
    #[error("capture order must name at least one field")]
    Empty,
    #[error("capture order lists {0} more than once")]
    Duplicate(CaptureField),
}

/// Operator-configured collection order. Immutable; every session starts from a fresh copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CaptureField>", into = "Vec<CaptureField>")]
pub struct CaptureOrderTemplate {
    fields: Vec<CaptureField>,
}

impl CaptureOrderTemplate {
    pub fn new(
        fields: impl IntoIterator<Item = CaptureField>,
    ) -> Result<Self, InvalidCaptureOrder> {
        let fields: Vec<CaptureField> = fields.into_iter().collect();
        if fields.is_empty() {
            return Err(InvalidCaptureOrder::Empty);
        }
        for (index, field) in fields.iter().enumerate() {
            if fields[..index].contains(field) {
                return Err(InvalidCaptureOrder::Duplicate(*field));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[CaptureField] {
        &self.fields
    }

    pub fn instantiate(&self) -> CaptureOrder {
        CaptureOrder {
            fields: self.fields.iter().copied().collect(),
        }
    }
}

impl Default for CaptureOrderTemplate {
    fn default() -> Self {
        Self {
            fields: CaptureField::ALL.to_vec(),
        }
    }
}

impl TryFrom<Vec<CaptureField>> for CaptureOrderTemplate {
    type Error = InvalidCaptureOrder;

    fn try_from(fields: Vec<CaptureField>) -> Result<Self, Self::Error> {
        Self::new(fields)
    }
}

impl From<CaptureOrderTemplate> for Vec<CaptureField> {
    fn from(template: CaptureOrderTemplate) -> Self {
        template.fields
    }
}

/// The "what's next" queue. The head is the field the client expects the gateway to be
/// collecting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOrder {
    fields: VecDeque<CaptureField>,
}

impl CaptureOrder {
    pub fn peek(&self) -> Option<CaptureField> {
        self.fields.front().copied()
    }

    pub fn dequeue(&mut self) -> Option<CaptureField> {
        self.fields.pop_front()
    }

    /// Moves `field` to the front, removing any existing occurrence first.
    pub fn reset_field(&mut self, field: CaptureField) {
        if let Some(index) = self.fields.iter().position(|existing| *existing == field) {
            self.fields.remove(index);
        }
        self.fields.push_front(field);
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_vec(&self) -> Vec<CaptureField> {
        self.fields.iter().copied().collect()
    }
}
