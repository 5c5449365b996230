use super::entity::{Comparator, Entity, EntityKind, Record};
use super::{CourseId, Id, UserId};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

pub const META_COURSE_ID: &str = "courseId";
pub const META_STUDENT_ID: &str = "studentId";
pub const META_AMOUNT: &str = "amount";

/// Lifecycle notification delivered by the payment gateway webhook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    /// Gateway-assigned event identifier, stable across redeliveries.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: EventData,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventData {
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    CheckoutCompleted,
    PaymentFailed,
    ChargeFailed,
    Other,
}

impl EventKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "checkout-completed" => EventKind::CheckoutCompleted,
            "payment-failed" => EventKind::PaymentFailed,
            "charge-failed" => EventKind::ChargeFailed,
            _ => EventKind::Other,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, EventKind::PaymentFailed | EventKind::ChargeFailed)
    }
}

/// What a payment event is about, once its metadata has been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentIntent {
    pub course_id: CourseId,
    pub student_id: UserId,
    pub amount: Decimal,
}

impl GatewayEvent {
    pub fn event_kind(&self) -> EventKind {
        EventKind::parse(&self.kind)
    }

    /// Extracts course, student and amount from the event metadata.
    pub fn intent(&self) -> Result<PaymentIntent> {
        if self.id.trim().is_empty() {
            return Err(CoreError::MalformedEvent("event id is empty".to_string()));
        }
        let metadata = &self.data.metadata;
        let course_id = parse_id(metadata, META_COURSE_ID)?;
        let student_id = parse_id(metadata, META_STUDENT_ID)?;
        let amount = parse_amount(metadata)?;
        Ok(PaymentIntent {
            course_id,
            student_id,
            amount,
        })
    }
}

fn metadata_text(metadata: &HashMap<String, Value>, key: &str) -> Result<String> {
    match metadata.get(key) {
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(CoreError::MalformedEvent(format!(
            "metadata '{key}' has unexpected value {other}"
        ))),
        None => Err(CoreError::MalformedEvent(format!(
            "metadata '{key}' is missing"
        ))),
    }
}

fn parse_id(metadata: &HashMap<String, Value>, key: &str) -> Result<Id> {
    let text = metadata_text(metadata, key)?;
    text.parse::<Id>()
        .map_err(|e| CoreError::MalformedEvent(format!("metadata '{key}' = '{text}': {e}")))
}

fn parse_amount(metadata: &HashMap<String, Value>) -> Result<Decimal> {
    let text = metadata_text(metadata, META_AMOUNT)?;
    let amount = Decimal::from_str(&text).map_err(|e| {
        CoreError::MalformedEvent(format!("metadata '{META_AMOUNT}' = '{text}': {e}"))
    })?;
    if amount.is_sign_negative() {
        return Err(CoreError::MalformedEvent(format!(
            "metadata '{META_AMOUNT}' is negative: {amount}"
        )));
    }
    Ok(amount)
}

/// Everything the gateway needs to open a checkout session. The metadata is
/// echoed back on the webhook events of that session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub course_id: CourseId,
    pub student_id: UserId,
    pub amount: Decimal,
    pub metadata: BTreeMap<String, String>,
}

impl CheckoutRequest {
    pub fn new(course_id: CourseId, student_id: UserId, amount: Decimal) -> Self {
        let metadata = BTreeMap::from([
            (META_COURSE_ID.to_string(), course_id.to_string()),
            (META_STUDENT_ID.to_string(), student_id.to_string()),
            (META_AMOUNT.to_string(), amount.to_string()),
        ]);
        Self {
            course_id,
            student_id,
            amount,
            metadata,
        }
    }
}

/// Marker that a gateway event has already been applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedEvent {
    #[serde(default)]
    pub id: Id,
    pub event_id: String,
    pub kind: String,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedEvent {
    pub fn new(event: &GatewayEvent) -> Self {
        Self {
            id: 0,
            event_id: event.id.clone(),
            kind: event.kind.clone(),
            processed_at: Utc::now(),
        }
    }
}

impl Entity for ProcessedEvent {
    const KIND: EntityKind = EntityKind::ProcessedEvent;

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "event_id" | "eventId" => Some(|a, b| a.event_id.cmp(&b.event_id)),
            "processed_at" | "processedAt" => Some(|a, b| a.processed_at.cmp(&b.processed_at)),
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::ProcessedEvent(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::ProcessedEvent(e) => Some(e),
            _ => None,
        }
    }
}
