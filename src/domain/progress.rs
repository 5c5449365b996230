use super::catalog::Lesson;
use super::entity::{Comparator, Entity, EntityKind, Record, Related, unknown_relation};
use super::ports::{Source, SourceExt};
use super::{Id, LessonId, UserId};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Watched time of one user on one lesson.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LessonProgress {
    #[serde(default)]
    pub id: Id,
    pub user_id: UserId,
    pub lesson_id: LessonId,
    pub watched_seconds: u64,
}

impl LessonProgress {
    pub fn new(user_id: UserId, lesson_id: LessonId) -> Self {
        Self {
            id: 0,
            user_id,
            lesson_id,
            watched_seconds: 0,
        }
    }

    /// Moves the watched counter forward. Reports that go backwards are
    /// ignored; returns whether the counter changed.
    pub fn advance(&mut self, watched_seconds: u64) -> bool {
        if watched_seconds > self.watched_seconds {
            self.watched_seconds = watched_seconds;
            true
        } else {
            false
        }
    }
}

impl Entity for LessonProgress {
    const KIND: EntityKind = EntityKind::LessonProgress;
    const RELATIONS: &'static [&'static str] = &["lesson"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "watched_seconds" | "watchedSeconds" => {
                Some(|a, b| a.watched_seconds.cmp(&b.watched_seconds))
            }
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::LessonProgress(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::LessonProgress(p) => Some(p),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "lesson" => Ok(Related::one(source.fetch::<Lesson>(self.lesson_id))),
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_is_monotonic() {
        let mut progress = LessonProgress::new(1, 1);
        assert!(progress.advance(120));
        assert!(!progress.advance(60));
        assert_eq!(progress.watched_seconds, 120);
        assert!(!progress.advance(120));
        assert!(progress.advance(300));
        assert_eq!(progress.watched_seconds, 300);
    }
}
