use super::entity::{Comparator, Entity, EntityKind, Record, Related, cmp_f64, unknown_relation};
use super::enrollment::Enrollment;
use super::ports::{Source, SourceExt};
use super::rating::Rating;
use super::{CategoryId, CourseId, Id, LessonId, SectionId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: CategoryId,
    pub name: String,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: 0,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CourseLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// A course with its cached aggregates.
///
/// `total_duration_hours`, `average_rating` and `enrolled_student_count` are
/// derived values maintained by the aggregate service; they are never edited
/// directly by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    #[serde(default)]
    pub id: CourseId,
    pub title: String,
    pub category_id: CategoryId,
    pub level: CourseLevel,
    pub price: Decimal,
    /// Percentage taken off `price` at checkout.
    #[serde(default)]
    pub discount: Decimal,
    #[serde(default)]
    pub total_duration_hours: f64,
    #[serde(default)]
    pub average_rating: f64,
    #[serde(default)]
    pub enrolled_student_count: u32,
}

impl Course {
    pub fn new(
        title: impl Into<String>,
        category_id: CategoryId,
        level: CourseLevel,
        price: Decimal,
    ) -> Self {
        Self {
            id: 0,
            title: title.into(),
            category_id,
            level,
            price,
            discount: Decimal::ZERO,
            total_duration_hours: 0.0,
            average_rating: 0.0,
            enrolled_student_count: 0,
        }
    }

    /// Amount charged at checkout: `price` less `discount` percent, never negative.
    pub fn checkout_price(&self) -> Decimal {
        // Fraction is within [0, 1] so the product never exceeds the price
        let fraction = self.discount.clamp(Decimal::ZERO, Decimal::ONE_HUNDRED) / Decimal::ONE_HUNDRED;
        let charged = self.price - self.price * fraction;
        charged.max(Decimal::ZERO).round_dp(2)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    #[serde(default)]
    pub id: SectionId,
    pub course_id: CourseId,
    pub title: String,
    #[serde(default)]
    pub position: u32,
}

impl Section {
    pub fn new(course_id: CourseId, title: impl Into<String>, position: u32) -> Self {
        Self {
            id: 0,
            course_id,
            title: title.into(),
            position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    #[serde(default)]
    pub id: LessonId,
    pub section_id: SectionId,
    pub title: String,
    #[serde(default)]
    pub position: u32,
    /// Storage reference of the lesson video.
    #[serde(default)]
    pub media_ref: Option<String>,
    /// Cached at upload time from the media collaborator.
    #[serde(default)]
    pub duration_hours: f64,
}

impl Lesson {
    pub fn new(
        section_id: SectionId,
        title: impl Into<String>,
        position: u32,
        duration_hours: f64,
    ) -> Self {
        Self {
            id: 0,
            section_id,
            title: title.into(),
            position,
            media_ref: None,
            duration_hours,
        }
    }

    /// The cached duration when it is usable as a summand.
    pub fn valid_duration(&self) -> Option<f64> {
        (self.duration_hours.is_finite() && self.duration_hours >= 0.0)
            .then_some(self.duration_hours)
    }
}

/// Sections of a course ordered by position.
pub fn course_sections(source: &dyn Source, course_id: CourseId) -> Vec<Section> {
    let mut sections: Vec<Section> = source
        .scan::<Section>()
        .into_iter()
        .filter(|s| s.course_id == course_id)
        .collect();
    sections.sort_by_key(|s| (s.position, s.id));
    sections
}

/// Every lesson of every section of a course, in curriculum order.
pub fn course_lessons(source: &dyn Source, course_id: CourseId) -> Vec<Lesson> {
    let sections = course_sections(source, course_id);
    let all_lessons = source.scan::<Lesson>();
    sections
        .iter()
        .flat_map(|section| {
            let mut lessons: Vec<Lesson> = all_lessons
                .iter()
                .filter(|l| l.section_id == section.id)
                .cloned()
                .collect();
            lessons.sort_by_key(|l| (l.position, l.id));
            lessons
        })
        .collect()
}

/// Course that owns a lesson, through its section.
pub fn lesson_course(source: &dyn Source, lesson: &Lesson) -> Option<CourseId> {
    source
        .fetch::<Section>(lesson.section_id)
        .map(|section| section.course_id)
}

impl Entity for Category {
    const KIND: EntityKind = EntityKind::Category;
    const RELATIONS: &'static [&'static str] = &["courses"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "name" => Some(|a, b| a.name.cmp(&b.name)),
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::Category(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Category(c) => Some(c),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "courses" => Ok(Related::many(
                source
                    .scan::<Course>()
                    .into_iter()
                    .filter(|c| c.category_id == self.id)
                    .collect(),
            )),
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}

impl Entity for Course {
    const KIND: EntityKind = EntityKind::Course;
    const RELATIONS: &'static [&'static str] =
        &["category", "sections", "lessons", "ratings", "enrollments"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "title" => Some(|a, b| a.title.cmp(&b.title)),
            "category" | "category_id" | "categoryId" => {
                Some(|a, b| a.category_id.cmp(&b.category_id))
            }
            "level" => Some(|a, b| a.level.cmp(&b.level)),
            "price" => Some(|a, b| a.price.cmp(&b.price)),
            "discount" => Some(|a, b| a.discount.cmp(&b.discount)),
            "total_duration_hours" | "totalDurationHours" => {
                Some(|a, b| cmp_f64(a.total_duration_hours, b.total_duration_hours))
            }
            "average_rating" | "averageRating" => {
                Some(|a, b| cmp_f64(a.average_rating, b.average_rating))
            }
            "enrolled_student_count" | "enrolledStudentCount" => {
                Some(|a, b| a.enrolled_student_count.cmp(&b.enrolled_student_count))
            }
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::Course(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Course(c) => Some(c),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "category" => Ok(Related::one(source.fetch::<Category>(self.category_id))),
            "sections" => Ok(Related::many(course_sections(source, self.id))),
            "lessons" => Ok(Related::many(course_lessons(source, self.id))),
            "ratings" => Ok(Related::many(
                source
                    .scan::<Rating>()
                    .into_iter()
                    .filter(|r| r.course_id == self.id)
                    .collect(),
            )),
            "enrollments" => Ok(Related::many(
                source
                    .scan::<Enrollment>()
                    .into_iter()
                    .filter(|e| e.course_id == self.id)
                    .collect(),
            )),
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}

impl Entity for Section {
    const KIND: EntityKind = EntityKind::Section;
    const RELATIONS: &'static [&'static str] = &["course", "lessons"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "title" => Some(|a, b| a.title.cmp(&b.title)),
            "position" => Some(|a, b| a.position.cmp(&b.position)),
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::Section(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Section(s) => Some(s),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "course" => Ok(Related::one(source.fetch::<Course>(self.course_id))),
            "lessons" => {
                let mut lessons: Vec<Lesson> = source
                    .scan::<Lesson>()
                    .into_iter()
                    .filter(|l| l.section_id == self.id)
                    .collect();
                lessons.sort_by_key(|l| (l.position, l.id));
                Ok(Related::many(lessons))
            }
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}

impl Entity for Lesson {
    const KIND: EntityKind = EntityKind::Lesson;
    const RELATIONS: &'static [&'static str] = &["section"];

    fn id(&self) -> Id {
        self.id
    }

    fn set_id(&mut self, id: Id) {
        self.id = id;
    }

    fn comparator(field: &str) -> Option<Comparator<Self>> {
        match field {
            "id" => Some(|a, b| a.id.cmp(&b.id)),
            "title" => Some(|a, b| a.title.cmp(&b.title)),
            "position" => Some(|a, b| a.position.cmp(&b.position)),
            "duration_hours" | "durationHours" => {
                Some(|a, b| cmp_f64(a.duration_hours, b.duration_hours))
            }
            _ => None,
        }
    }

    fn into_record(self) -> Record {
        Record::Lesson(self)
    }

    fn from_record(record: Record) -> Option<Self> {
        match record {
            Record::Lesson(l) => Some(l),
            _ => None,
        }
    }

    fn resolve(&self, source: &dyn Source, relation: &str) -> Result<Related> {
        match relation {
            "section" => Ok(Related::one(source.fetch::<Section>(self.section_id))),
            other => Err(unknown_relation::<Self>(other)),
        }
    }
}
