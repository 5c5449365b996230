use super::Id;
use super::catalog::{Category, Course, Lesson, Section};
use super::enrollment::Enrollment;
use super::payment::ProcessedEvent;
use super::ports::Source;
use super::progress::LessonProgress;
use super::rating::{CourseProgress, Rating};
use super::user::User;
use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

/// Discriminates the tables of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    User,
    Category,
    Course,
    Section,
    Lesson,
    Rating,
    CourseProgress,
    LessonProgress,
    Enrollment,
    ProcessedEvent,
}

impl EntityKind {
    pub const ALL: [EntityKind; 10] = [
        EntityKind::User,
        EntityKind::Category,
        EntityKind::Course,
        EntityKind::Section,
        EntityKind::Lesson,
        EntityKind::Rating,
        EntityKind::CourseProgress,
        EntityKind::LessonProgress,
        EntityKind::Enrollment,
        EntityKind::ProcessedEvent,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::User => "user",
            EntityKind::Category => "category",
            EntityKind::Course => "course",
            EntityKind::Section => "section",
            EntityKind::Lesson => "lesson",
            EntityKind::Rating => "rating",
            EntityKind::CourseProgress => "course_progress",
            EntityKind::LessonProgress => "lesson_progress",
            EntityKind::Enrollment => "enrollment",
            EntityKind::ProcessedEvent => "processed_event",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A row of any table, as held by the store and written by persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "row", rename_all = "snake_case")]
pub enum Record {
    User(User),
    Category(Category),
    Course(Course),
    Section(Section),
    Lesson(Lesson),
    Rating(Rating),
    CourseProgress(CourseProgress),
    LessonProgress(LessonProgress),
    Enrollment(Enrollment),
    ProcessedEvent(ProcessedEvent),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Record::User(_) => EntityKind::User,
            Record::Category(_) => EntityKind::Category,
            Record::Course(_) => EntityKind::Course,
            Record::Section(_) => EntityKind::Section,
            Record::Lesson(_) => EntityKind::Lesson,
            Record::Rating(_) => EntityKind::Rating,
            Record::CourseProgress(_) => EntityKind::CourseProgress,
            Record::LessonProgress(_) => EntityKind::LessonProgress,
            Record::Enrollment(_) => EntityKind::Enrollment,
            Record::ProcessedEvent(_) => EntityKind::ProcessedEvent,
        }
    }

    pub fn id(&self) -> Id {
        match self {
            Record::User(r) => r.id,
            Record::Category(r) => r.id,
            Record::Course(r) => r.id,
            Record::Section(r) => r.id,
            Record::Lesson(r) => r.id,
            Record::Rating(r) => r.id,
            Record::CourseProgress(r) => r.id,
            Record::LessonProgress(r) => r.id,
            Record::Enrollment(r) => r.id,
            Record::ProcessedEvent(r) => r.id,
        }
    }

    /// Rows this record points at through foreign keys.
    pub fn references(&self) -> Vec<(EntityKind, Id)> {
        match self {
            Record::User(_) | Record::Category(_) | Record::ProcessedEvent(_) => Vec::new(),
            Record::Course(c) => vec![(EntityKind::Category, c.category_id)],
            Record::Section(s) => vec![(EntityKind::Course, s.course_id)],
            Record::Lesson(l) => vec![(EntityKind::Section, l.section_id)],
            Record::Rating(r) => vec![
                (EntityKind::Course, r.course_id),
                (EntityKind::User, r.student_id),
            ],
            Record::CourseProgress(p) => vec![
                (EntityKind::Course, p.course_id),
                (EntityKind::User, p.user_id),
            ],
            Record::LessonProgress(p) => vec![
                (EntityKind::Lesson, p.lesson_id),
                (EntityKind::User, p.user_id),
            ],
            Record::Enrollment(e) => vec![
                (EntityKind::Course, e.course_id),
                (EntityKind::User, e.student_id),
            ],
        }
    }

    /// Secondary key that must be unique within the record's table.
    pub fn unique_key(&self) -> Option<String> {
        match self {
            Record::Rating(r) => Some(format!("{}:{}", r.student_id, r.course_id)),
            Record::CourseProgress(p) => Some(format!("{}:{}", p.user_id, p.course_id)),
            Record::LessonProgress(p) => Some(format!("{}:{}", p.user_id, p.lesson_id)),
            Record::ProcessedEvent(e) => Some(e.event_id.clone()),
            _ => None,
        }
    }
}

/// Orders two entities by one whitelisted field.
pub type Comparator<T> = fn(&T, &T) -> Ordering;

/// A table row type the store and the query engine can work with.
pub trait Entity: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;
    /// Relation names accepted by [`Entity::resolve`].
    const RELATIONS: &'static [&'static str] = &[];

    fn id(&self) -> Id;
    fn set_id(&mut self, id: Id);

    /// Looks up the comparator for a sortable field, `None` when the field
    /// is not on the whitelist.
    fn comparator(field: &str) -> Option<Comparator<Self>>;

    fn into_record(self) -> Record;
    fn from_record(record: Record) -> Option<Self>;

    /// Loads the named relation of this row from `source`.
    fn resolve(&self, _source: &dyn Source, relation: &str) -> Result<Related> {
        Err(unknown_relation::<Self>(relation))
    }
}

pub(crate) fn unknown_relation<T: Entity>(relation: &str) -> CoreError {
    CoreError::validation(format!(
        "unknown relation '{relation}' for {}",
        T::KIND
    ))
}

/// Records attached to an entity by eager loading.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Option<Record>),
    Many(Vec<Record>),
}

impl Related {
    pub fn many<T: Entity>(rows: Vec<T>) -> Self {
        Related::Many(rows.into_iter().map(Entity::into_record).collect())
    }

    pub fn one<T: Entity>(row: Option<T>) -> Self {
        Related::One(row.map(Entity::into_record))
    }
}

/// An entity together with the relations requested by the query.
#[derive(Debug, Clone, PartialEq)]
pub struct Loaded<T> {
    pub entity: T,
    pub related: BTreeMap<&'static str, Related>,
}

impl<T> Loaded<T> {
    pub fn new(entity: T) -> Self {
        Self {
            entity,
            related: BTreeMap::new(),
        }
    }

    /// Whether the relation was eagerly loaded.
    pub fn has(&self, relation: &str) -> bool {
        self.related.contains_key(relation)
    }

    pub fn one<R: Entity>(&self, relation: &str) -> Option<R> {
        match self.related.get(relation) {
            Some(Related::One(Some(record))) => R::from_record(record.clone()),
            _ => None,
        }
    }

    pub fn many<R: Entity>(&self, relation: &str) -> Vec<R> {
        match self.related.get(relation) {
            Some(Related::Many(records)) => records
                .iter()
                .cloned()
                .filter_map(R::from_record)
                .collect(),
            _ => Vec::new(),
        }
    }
}

pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.total_cmp(&b)
}
