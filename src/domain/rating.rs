use super::catalog::Course;
use super::entity::{Comparator, Entity, EntityKind, Record, Related, cmp_f64, unknown_relation};
use super::ports::{Source, SourceExt};
use super::user::User;
use super::{CourseId, Id, RatingId, UserId};
use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A star count in `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Stars(u8);

impl Stars {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 5;

    pub fn new(value: u8) -> Result<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::validation(format!(
                "stars must be between {} and {}, got {value}",
                Self::MIN,
                Self::MAX
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Stars {
    type Error = CoreError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Stars> for u8 {
    fn from(stars: Stars) -> Self {
        stars.0
    }
}

/// One student's review of one course.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    #[serde(default)]
    pub id: RatingId,
    pub course_id: CourseId,
    pub student_id: UserId,
    pub stars: Stars,
    #[serde(default)]
    pub review: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Rating {
    pub fn new(
        student_id: UserId,
        course_id: CourseId,
        stars: Stars,
        review: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            course_id,
            student_id,
            stars,
            review,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompletionStatus {
    Yes,
    No,
}

/// How far a user is through a course, kept apart from their rating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseProgress {
    #[serde(default)]
    pub id: Id,
    pub user_id: UserId,
    pub course_id: CourseId,
    pub completion_fraction: f64,
    pub status: CompletionStatus,
}

impl CourseProgress {
    pub fn new(user_id: UserId, course_id: CourseId) -> Self {
        Self {
            id: 0,
            user_id,
            course_id,
            completion_fraction: 0.0,
            status: CompletionStatus::No,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == CompletionStatus::Yes
    }
}

impl Entity for Rating {
    const KIND: EntityKind = EntityKind::Rating;
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
            "stars" => Some(|a, b| a.stars.cmp(&b.stars)),
            "created_at" | "createdAt" => Some(|a, b| a.created_at.cmp(&b.created_at)),
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::Rating(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Rating(r) => Some(r),
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

impl Entity for CourseProgress {
    const KIND: EntityKind = EntityKind::CourseProgress;
    const RELATIONS: &'static [&'static str] = &["course"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "completion_fraction" | "completionFraction" => {
                Some(|a, b| cmp_f64(a.completion_fraction, b.completion_fraction))
            }
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::CourseProgress(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::CourseProgress(p) => Some(p),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "course" => Ok(Related::one(source.fetch::<Course>(self.course_id))),
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
