use crate::application::aggregates::AggregateService;
use crate::application::unit_of_work::{Database, UnitOfWork};
use crate::domain::catalog::{Category, Course, Lesson, Section};
use crate::domain::entity::Entity;
use crate::domain::rating::{Rating, Stars};
use crate::domain::user::User;
use crate::domain::{CourseId, UserId};
use crate::error::{CoreError, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::io::Read;

/// Rating as written in a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct RatingSeed {
    pub student_id: UserId,
    pub course_id: CourseId,
    pub stars: u8,
    #[serde(default)]
    pub review: Option<String>,
}

/// Catalog file contents. Every row carries its id so the file can be loaded
/// again without duplicating anything; a row without one is rejected.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<Category>,
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub courses: Vec<Course>,
    #[serde(default)]
    pub sections: Vec<Section>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    #[serde(default)]
    pub ratings: Vec<RatingSeed>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub inserted: usize,
    pub skipped: usize,
}

impl CatalogSeed {
    pub fn from_reader<R: Read>(source: R) -> Result<Self> {
        Ok(serde_json::from_reader(source)?)
    }

    /// Inserts every row whose id is not stored yet, then recomputes the
    /// aggregates of the courses it touched. Runs as one unit of work.
    pub async fn apply(self, db: &Database, aggregates: &AggregateService) -> Result<SeedReport> {
        let mut uow = db.begin().await;
        let mut report = SeedReport::default();
        let mut touched: BTreeSet<CourseId> = BTreeSet::new();

        for category in self.categories {
            insert_new(&mut uow, category, &mut report)?;
        }
        for user in self.users {
            insert_new(&mut uow, user, &mut report)?;
        }
        for mut course in self.courses {
            // Derived numbers come from the rows; enrollments are never seeded
            course.total_duration_hours = 0.0;
            course.average_rating = 0.0;
            course.enrolled_student_count = 0;
            if insert_new(&mut uow, course.clone(), &mut report)? {
                touched.insert(course.id);
            }
        }
        for section in self.sections {
            insert_new(&mut uow, section, &mut report)?;
        }
        for lesson in self.lessons {
            let section_id = lesson.section_id;
            if insert_new(&mut uow, lesson, &mut report)?
                && let Ok(section) = uow.sections().get(section_id)
            {
                touched.insert(section.course_id);
            }
        }
        for seed in self.ratings {
            let exists = uow
                .ratings()
                .find_one(|r| r.student_id == seed.student_id && r.course_id == seed.course_id)
                .is_some();
            if exists {
                report.skipped += 1;
                continue;
            }
            let stars = Stars::new(seed.stars)?;
            uow.ratings()
                .add(Rating::new(seed.student_id, seed.course_id, stars, seed.review))?;
            touched.insert(seed.course_id);
            report.inserted += 1;
        }

        for course_id in touched {
            aggregates.recompute_course_duration(&mut uow, course_id)?;
            aggregates.recompute_average_rating(&mut uow, course_id)?;
        }
        uow.complete().await?;
        tracing::info!(inserted = report.inserted, skipped = report.skipped, "catalog seeded");
        Ok(report)
    }
}

fn insert_new<T: Entity>(uow: &mut UnitOfWork, row: T, report: &mut SeedReport) -> Result<bool> {
    if row.id() == 0 {
        return Err(CoreError::validation(format!("catalog {} row has no id", T::KIND)));
    }
    if uow.repository::<T>().get(row.id()).is_ok() {
        report.skipped += 1;
        return Ok(false);
    }
    uow.repository::<T>().add(row)?;
    report.inserted += 1;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::SourceExt;
    use serde_json::json;

    fn catalog() -> CatalogSeed {
        serde_json::from_value(json!({
            "categories": [{"id": 1, "name": "Programming"}],
            "users": [
                {"id": 1, "name": "Ana", "email": "ana@example.com", "role": "student"},
                {"id": 2, "name": "Bo", "email": "bo@example.com", "role": "student"}
            ],
            "courses": [{"id": 10, "title": "Rust", "category_id": 1, "level": "beginner", "price": "100.00"}],
            "sections": [{"id": 1, "course_id": 10, "title": "Intro", "position": 1}],
            "lessons": [
                {"id": 1, "section_id": 1, "title": "Setup", "position": 1, "duration_hours": 1.5},
                {"id": 2, "section_id": 1, "title": "Ownership", "position": 2, "duration_hours": 2.0}
            ],
            "ratings": [
                {"student_id": 1, "course_id": 10, "stars": 4},
                {"student_id": 2, "course_id": 10, "stars": 5}
            ]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_seed_computes_aggregates() {
        let db = Database::in_memory();
        let report = catalog().apply(&db, &AggregateService::default()).await.unwrap();
        assert_eq!(report, SeedReport { inserted: 9, skipped: 0 });

        let view = db.read().await;
        let course: Course = view.fetch(10).unwrap();
        assert_eq!(course.total_duration_hours, 3.5);
        assert_eq!(course.average_rating, 4.5);
    }

    #[tokio::test]
    async fn test_seed_is_idempotent() {
        let db = Database::in_memory();
        let aggregates = AggregateService::default();
        catalog().apply(&db, &aggregates).await.unwrap();
        let report = catalog().apply(&db, &aggregates).await.unwrap();
        assert_eq!(report, SeedReport { inserted: 0, skipped: 9 });
    }

    #[tokio::test]
    async fn test_row_without_id_is_rejected() {
        let db = Database::in_memory();
        let seed: CatalogSeed = serde_json::from_value(json!({
            "categories": [{"id": 1, "name": "Programming"}],
            "courses": [{"title": "NoId", "category_id": 1, "level": "beginner", "price": "10"}]
        }))
        .unwrap();

        let result = seed.apply(&db, &AggregateService::default()).await;
        assert!(matches!(result, Err(CoreError::ValidationError(_))));

        let view = db.read().await;
        assert!(view.fetch::<Category>(1).is_none());
    }

    #[tokio::test]
    async fn test_seeded_counts_start_from_rows() {
        let db = Database::in_memory();
        let seed: CatalogSeed = serde_json::from_value(json!({
            "categories": [{"id": 1, "name": "Programming"}],
            "courses": [{
                "id": 10, "title": "Rust", "category_id": 1, "level": "beginner", "price": "10",
                "total_duration_hours": 99.0, "average_rating": 5.0, "enrolled_student_count": 40
            }]
        }))
        .unwrap();
        seed.apply(&db, &AggregateService::default()).await.unwrap();

        let view = db.read().await;
        let course: Course = view.fetch(10).unwrap();
        assert_eq!(course.total_duration_hours, 0.0);
        assert_eq!(course.average_rating, 0.0);
        assert_eq!(course.enrolled_student_count, 0);
    }
}
