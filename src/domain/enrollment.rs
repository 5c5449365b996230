use super::catalog::Course;
use super::entity::{Comparator, Entity, EntityKind, Record, Related, unknown_relation};
use super::ports::{Source, SourceExt};
use super::user::User;
use super::{CourseId, EnrollmentId, Id, UserId};
use crate::config::EngineConfig;
use crate::error::Result;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PaymentStatus {
    Success,
    Failed,
}

/// How a payment is divided between the platform and the instructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevenueSplit {
    pub platform: Decimal,
    pub instructor: Decimal,
}

impl RevenueSplit {
    pub const NONE: Self = Self {
        platform: Decimal::ZERO,
        instructor: Decimal::ZERO,
    };

    pub fn of(amount: Decimal, config: &EngineConfig) -> Self {
        Self {
            platform: amount * config.platform_share,
            instructor: amount * config.instructor_share(),
        }
    }
}

/// A payment attempt for a course and, when it succeeded, the access it grants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(default)]
    pub id: EnrollmentId,
    pub course_id: CourseId,
    pub student_id: UserId,
    pub is_active: bool,
    pub amount_paid: Decimal,
    pub platform_profit: Decimal,
    pub instructor_profit: Decimal,
    pub payment_status: PaymentStatus,
    pub subscription_date: DateTime<Utc>,
    /// Gateway event that created the row.
    #[serde(default)]
    pub gateway_event_id: Option<String>,
}

impl Enrollment {
    pub fn succeeded(
        course_id: CourseId,
        student_id: UserId,
        amount: Decimal,
        split: RevenueSplit,
    ) -> Self {
        Self {
            id: 0,
            course_id,
            student_id,
            is_active: true,
            amount_paid: amount,
            platform_profit: split.platform,
            instructor_profit: split.instructor,
            payment_status: PaymentStatus::Success,
            subscription_date: Utc::now(),
            gateway_event_id: None,
        }
    }

    pub fn failed(course_id: CourseId, student_id: UserId, amount: Decimal) -> Self {
        Self {
            id: 0,
            course_id,
            student_id,
            is_active: false,
            amount_paid: amount,
            platform_profit: RevenueSplit::NONE.platform,
            instructor_profit: RevenueSplit::NONE.instructor,
            payment_status: PaymentStatus::Failed,
            subscription_date: Utc::now(),
            gateway_event_id: None,
        }
    }

    pub fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.gateway_event_id = Some(event_id.into());
        self
    }
}

/// Active enrollment of a student in a course, if any.
pub fn active_enrollment(
    source: &dyn Source,
    student_id: UserId,
    course_id: CourseId,
) -> Option<Enrollment> {
    source
        .scan::<Enrollment>()
        .into_iter()
        .find(|e| e.student_id == student_id && e.course_id == course_id && e.is_active)
}

impl Entity for Enrollment {
    const KIND: EntityKind = EntityKind::Enrollment;
    const RELATIONS: &'static [&'static str] = &["course", "student"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "amount_paid" | "amountPaid" => Some(|a, b| a.amount_paid.cmp(&b.amount_paid)),
            "payment_status" | "paymentStatus" => {
                Some(|a, b| a.payment_status.cmp(&b.payment_status))
            }
            "subscription_date" | "subscriptionDate" => {
                Some(|a, b| a.subscription_date.cmp(&b.subscription_date))
            }
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::Enrollment(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Enrollment(e) => Some(e),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "course" => Ok(Related::one(source.fetch::<Course>(self.course_id))),
            "student" => Ok(Related::one(source.fetch::<User>(self.student_id))),
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
