use super::aggregates::AggregateService;
use super::unit_of_work::{Database, UnitOfWork};
use crate::domain::catalog::{Category, Course, Lesson, Section, lesson_course};
use crate::domain::ports::MediaProbeRef;
use crate::domain::progress::LessonProgress;
use crate::domain::rating::{CourseProgress, Rating, Stars};
use crate::domain::user::User;
use crate::domain::{CourseId, LessonId, RatingId, SectionId, UserId};
use crate::error::{CoreError, Result};
use rust_decimal::Decimal;

/// Result of a progress report.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressOutcome {
    pub lesson: LessonProgress,
    pub course: CourseProgress,
    /// False when the report did not move the watched counter forward.
    pub advanced: bool,
}

/// Catalog, rating and progress writes.
///
/// Each operation runs in its own unit of work and recomputes the aggregates
/// it invalidates before committing.
#[derive(Clone)]
pub struct CatalogService {
    db: Database,
    aggregates: AggregateService,
    media: MediaProbeRef,
}

impl CatalogService {
    pub fn new(db: Database, aggregates: AggregateService, media: MediaProbeRef) -> Self {
        Self {
            db,
            aggregates,
            media,
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    #[tracing::instrument(skip(self, user), fields(email = %user.email))]
    pub async fn register_user(&self, user: User) -> Result<User> {
        let mut uow = self.db.begin().await;
        let user = uow.users().add(user)?;
        uow.complete().await?;
        Ok(user)
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_category(&self, name: &str) -> Result<Category> {
        if name.trim().is_empty() {
            return Err(CoreError::validation("category name is empty"));
        }
        let mut uow = self.db.begin().await;
        let category = uow.categories().add(Category::new(name.trim()))?;
        uow.complete().await?;
        Ok(category)
    }

    /// Stores a new course. Cached aggregates start from zero whatever the
    /// caller put in them.
    #[tracing::instrument(skip(self, course), fields(title = %course.title))]
    pub async fn create_course(&self, mut course: Course) -> Result<Course> {
        if course.price.is_sign_negative() {
            return Err(CoreError::validation(format!(
                "price must not be negative, got {}",
                course.price
            )));
        }
        if course.discount < Decimal::ZERO || course.discount > Decimal::ONE_HUNDRED {
            return Err(CoreError::validation(format!(
                "discount must be a percentage within [0, 100], got {}",
                course.discount
            )));
        }
        course.total_duration_hours = 0.0;
        course.average_rating = 0.0;
        course.enrolled_student_count = 0;

        let mut uow = self.db.begin().await;
        uow.categories().get(course.category_id)?;
        let course = uow.courses().add(course)?;
        uow.complete().await?;
        Ok(course)
    }

    #[tracing::instrument(skip(self))]
    pub async fn add_section(&self, course_id: CourseId, title: &str, position: u32) -> Result<Section> {
        let mut uow = self.db.begin().await;
        uow.courses().get(course_id)?;
        let section = uow.sections().add(Section::new(course_id, title, position))?;
        uow.complete().await?;
        Ok(section)
    }

    /// Adds a lesson whose duration comes from the media collaborator.
    #[tracing::instrument(skip(self))]
    pub async fn add_lesson(
        &self,
        section_id: SectionId,
        title: &str,
        position: u32,
        media_ref: &str,
    ) -> Result<Lesson> {
        let duration = self.probe(media_ref).await;

        let mut uow = self.db.begin().await;
        let section = uow.sections().get(section_id)?;
        let mut lesson = Lesson::new(section_id, title, position, duration);
        lesson.media_ref = Some(media_ref.to_string());
        let lesson = uow.lessons().add(lesson)?;
        self.refresh_duration(&mut uow, section.course_id)?;
        uow.complete().await?;
        tracing::info!(lesson_id = lesson.id, course_id = section.course_id, duration, "lesson added");
        Ok(lesson)
    }

    /// Swaps the lesson video and re-reads its duration.
    #[tracing::instrument(skip(self))]
    pub async fn replace_lesson_media(&self, lesson_id: LessonId, media_ref: &str) -> Result<Lesson> {
        let duration = self.probe(media_ref).await;

        let mut uow = self.db.begin().await;
        let lesson = uow.lessons().update(lesson_id, |lesson| {
            lesson.media_ref = Some(media_ref.to_string());
            lesson.duration_hours = duration;
            Ok(())
        })?;
        let course_id = owning_course(&uow, &lesson)?;
        self.refresh_duration(&mut uow, course_id)?;
        uow.complete().await?;
        Ok(lesson)
    }

    /// Removes a lesson together with the progress recorded against it.
    #[tracing::instrument(skip(self))]
    pub async fn delete_lesson(&self, lesson_id: LessonId) -> Result<Lesson> {
        let mut uow = self.db.begin().await;
        let lesson = uow.lessons().get(lesson_id)?;
        let course_id = owning_course(&uow, &lesson)?;

        let progress: Vec<LessonProgress> = uow
            .lesson_progress()
            .all()
            .into_iter()
            .filter(|p| p.lesson_id == lesson_id)
            .collect();
        for row in &progress {
            uow.lesson_progress().delete(row.id)?;
        }
        let lesson = uow.lessons().delete(lesson_id)?;
        self.refresh_duration(&mut uow, course_id)?;
        uow.complete().await?;
        tracing::info!(lesson_id, course_id, progress_rows = progress.len(), "lesson deleted");
        Ok(lesson)
    }

    /// Records a student's rating. A student rates a course once; later
    /// changes go through [`CatalogService::update_rating_stars`].
    #[tracing::instrument(skip(self, review))]
    pub async fn submit_rating(
        &self,
        student_id: UserId,
        course_id: CourseId,
        stars: u8,
        review: Option<String>,
    ) -> Result<Rating> {
        let stars = Stars::new(stars)?;

        let mut uow = self.db.begin().await;
        uow.users().get(student_id)?;
        uow.courses().get(course_id)?;
        if uow
            .ratings()
            .find_one(|r| r.student_id == student_id && r.course_id == course_id)
            .is_some()
        {
            return Err(CoreError::validation(format!(
                "student {student_id} already rated course {course_id}"
            )));
        }
        let rating = uow.ratings().add(Rating::new(student_id, course_id, stars, review))?;
        self.aggregates.recompute_average_rating(&mut uow, course_id)?;
        uow.complete().await?;
        Ok(rating)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_rating_stars(&self, rating_id: RatingId, stars: u8) -> Result<Rating> {
        let stars = Stars::new(stars)?;

        let mut uow = self.db.begin().await;
        let rating = uow.ratings().update(rating_id, |r| {
            r.stars = stars;
            Ok(())
        })?;
        self.aggregates.recompute_average_rating(&mut uow, rating.course_id)?;
        uow.complete().await?;
        Ok(rating)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_rating(&self, rating_id: RatingId) -> Result<Rating> {
        let mut uow = self.db.begin().await;
        let rating = uow.ratings().delete(rating_id)?;
        self.aggregates.recompute_average_rating(&mut uow, rating.course_id)?;
        uow.complete().await?;
        Ok(rating)
    }

    /// Stores how far a user got into a lesson and refreshes their course
    /// completion. Reports behind the stored position change nothing.
    #[tracing::instrument(skip(self))]
    pub async fn record_progress(
        &self,
        user_id: UserId,
        lesson_id: LessonId,
        watched_seconds: u64,
    ) -> Result<ProgressOutcome> {
        let mut uow = self.db.begin().await;
        uow.users().get(user_id)?;
        uow.lessons().get(lesson_id)?;

        let existing = uow
            .lesson_progress()
            .find_one(|p| p.user_id == user_id && p.lesson_id == lesson_id);
        let (lesson, advanced) = match existing {
            Some(mut row) => {
                let advanced = row.advance(watched_seconds);
                if advanced {
                    let seconds = row.watched_seconds;
                    uow.lesson_progress().update(row.id, |p| {
                        p.watched_seconds = seconds;
                        Ok(())
                    })?;
                } else {
                    tracing::debug!(
                        stored = row.watched_seconds,
                        reported = watched_seconds,
                        "progress report behind stored position, ignored"
                    );
                }
                (row, advanced)
            }
            None => {
                let mut row = LessonProgress::new(user_id, lesson_id);
                row.advance(watched_seconds);
                (uow.lesson_progress().add(row)?, true)
            }
        };

        let course = self
            .aggregates
            .recompute_completion(&mut uow, user_id, lesson_id)?;
        uow.complete().await?;
        Ok(ProgressOutcome {
            lesson,
            course,
            advanced,
        })
    }

    async fn probe(&self, media_ref: &str) -> f64 {
        match self.media.duration_hours(media_ref).await {
            Ok(hours) if hours.is_finite() && hours >= 0.0 => hours,
            Ok(hours) => {
                tracing::warn!(media_ref, hours, "media reported an unusable duration, using zero");
                0.0
            }
            Err(e) => {
                tracing::warn!(media_ref, error = %e, "media probe failed, using zero duration");
                0.0
            }
        }
    }

    fn refresh_duration(&self, uow: &mut UnitOfWork, course_id: CourseId) -> Result<()> {
        self.aggregates.recompute_course_duration(uow, course_id)?;
        self.aggregates.refresh_course_completions(uow, course_id)?;
        Ok(())
    }
}

fn owning_course(uow: &UnitOfWork, lesson: &Lesson) -> Result<CourseId> {
    lesson_course(uow, lesson).ok_or_else(|| CoreError::not_found("section", lesson.section_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::domain::catalog::CourseLevel;
    use crate::domain::user::Role;
    use crate::infrastructure::in_memory::InMemoryMediaProbe;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    struct Fixture {
        service: CatalogService,
        course_id: CourseId,
        section_id: SectionId,
        students: Vec<UserId>,
    }

    async fn fixture(media: InMemoryMediaProbe) -> Fixture {
        let service = CatalogService::new(
            Database::in_memory(),
            AggregateService::new(EngineConfig::default()),
            Arc::new(media),
        );
        let category = service.create_category("Data").await.unwrap();
        let course = service
            .create_course(Course::new("SQL", category.id, CourseLevel::Intermediate, dec!(30)))
            .await
            .unwrap();
        let section = service.add_section(course.id, "Basics", 1).await.unwrap();
        let mut students = Vec::new();
        for name in ["ana", "bo"] {
            let user = service
                .register_user(User::new(name, format!("{name}@example.com"), Role::Student))
                .await
                .unwrap();
            students.push(user.id);
        }
        Fixture {
            service,
            course_id: course.id,
            section_id: section.id,
            students,
        }
    }

    async fn course(f: &Fixture) -> Course {
        f.service.database().read().await.get(f.course_id).unwrap()
    }

    #[tokio::test]
    async fn test_lesson_mutations_keep_duration_in_sync() {
        let media = InMemoryMediaProbe::new()
            .with("a.mp4", 1.5)
            .with("b.mp4", 2.0)
            .with("c.mp4", 0.75)
            .with("d.mp4", 1.25)
            .with("e.mp4", 3.0);
        let f = fixture(media).await;

        let mut lessons = Vec::new();
        for (i, media_ref) in ["a.mp4", "b.mp4", "c.mp4"].iter().enumerate() {
            lessons.push(
                f.service
                    .add_lesson(f.section_id, "lesson", i as u32 + 1, media_ref)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(course(&f).await.total_duration_hours, 4.25);

        f.service.add_lesson(f.section_id, "extra", 4, "d.mp4").await.unwrap();
        assert_eq!(course(&f).await.total_duration_hours, 5.5);

        f.service.replace_lesson_media(lessons[0].id, "e.mp4").await.unwrap();
        assert_eq!(course(&f).await.total_duration_hours, 7.0);

        f.service.delete_lesson(lessons[1].id).await.unwrap();
        assert_eq!(course(&f).await.total_duration_hours, 5.0);
    }

    #[tokio::test]
    async fn test_probe_failure_counts_as_zero() {
        let media = InMemoryMediaProbe::new().with("ok.mp4", 2.0).with("broken.mp4", f64::NAN);
        let f = fixture(media).await;

        f.service.add_lesson(f.section_id, "ok", 1, "ok.mp4").await.unwrap();
        let missing = f.service.add_lesson(f.section_id, "missing", 2, "gone.mp4").await.unwrap();
        let broken = f.service.add_lesson(f.section_id, "broken", 3, "broken.mp4").await.unwrap();

        assert_eq!(missing.duration_hours, 0.0);
        assert_eq!(broken.duration_hours, 0.0);
        assert_eq!(course(&f).await.total_duration_hours, 2.0);
    }

    #[tokio::test]
    async fn test_lesson_in_unknown_section_is_not_found() {
        let f = fixture(InMemoryMediaProbe::new()).await;
        let result = f.service.add_lesson(404, "x", 1, "x.mp4").await;
        assert!(matches!(result, Err(CoreError::NotFound { entity: "section", id: 404 })));
    }

    #[tokio::test]
    async fn test_rating_lifecycle_updates_average() {
        let f = fixture(InMemoryMediaProbe::new()).await;
        let (ana, bo) = (f.students[0], f.students[1]);

        let first = f.service.submit_rating(ana, f.course_id, 4, None).await.unwrap();
        f.service
            .submit_rating(bo, f.course_id, 2, Some("too fast".into()))
            .await
            .unwrap();
        assert_eq!(course(&f).await.average_rating, 3.0);

        f.service.update_rating_stars(first.id, 5).await.unwrap();
        assert_eq!(course(&f).await.average_rating, 3.5);

        f.service.delete_rating(first.id).await.unwrap();
        assert_eq!(course(&f).await.average_rating, 2.0);
    }

    #[tokio::test]
    async fn test_rating_validation() {
        let f = fixture(InMemoryMediaProbe::new()).await;
        let ana = f.students[0];

        let out_of_range = f.service.submit_rating(ana, f.course_id, 6, None).await;
        assert!(matches!(out_of_range, Err(CoreError::ValidationError(_))));

        f.service.submit_rating(ana, f.course_id, 3, None).await.unwrap();
        let duplicate = f.service.submit_rating(ana, f.course_id, 5, None).await;
        assert!(matches!(duplicate, Err(CoreError::ValidationError(_))));

        let unknown_course = f.service.submit_rating(ana, 404, 5, None).await;
        assert!(matches!(unknown_course, Err(CoreError::NotFound { .. })));

        assert_eq!(course(&f).await.average_rating, 3.0);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_drives_completion() {
        let media = InMemoryMediaProbe::new().with("long.mp4", 10.0);
        let f = fixture(media).await;
        let ana = f.students[0];
        let lesson = f.service.add_lesson(f.section_id, "all", 1, "long.mp4").await.unwrap();

        let outcome = f.service.record_progress(ana, lesson.id, 0).await.unwrap();
        assert_eq!(outcome.course.completion_fraction, 0.0);
        assert!(!outcome.course.is_complete());

        let nine_point_three_hours = 9 * 3600 + 18 * 60;
        let outcome = f
            .service
            .record_progress(ana, lesson.id, nine_point_three_hours)
            .await
            .unwrap();
        assert!(outcome.advanced);
        assert!(outcome.course.is_complete());

        let outcome = f.service.record_progress(ana, lesson.id, 60).await.unwrap();
        assert!(!outcome.advanced);
        assert_eq!(outcome.lesson.watched_seconds, nine_point_three_hours);
        assert!(outcome.course.is_complete());
    }

    #[tokio::test]
    async fn test_huge_progress_reports_are_accepted() {
        let media = InMemoryMediaProbe::new().with("one.mp4", 1.0).with("two.mp4", 1.0);
        let f = fixture(media).await;
        let ana = f.students[0];
        let one = f.service.add_lesson(f.section_id, "one", 1, "one.mp4").await.unwrap();
        let two = f.service.add_lesson(f.section_id, "two", 2, "two.mp4").await.unwrap();

        f.service.record_progress(ana, one.id, u64::MAX).await.unwrap();
        let outcome = f.service.record_progress(ana, two.id, 10).await.unwrap();
        assert!(outcome.course.is_complete());
    }

    #[tokio::test]
    async fn test_new_lesson_lowers_existing_completion() {
        let media = InMemoryMediaProbe::new().with("one.mp4", 1.0).with("two.mp4", 1.0);
        let f = fixture(media).await;
        let ana = f.students[0];
        let lesson = f.service.add_lesson(f.section_id, "one", 1, "one.mp4").await.unwrap();
        let outcome = f.service.record_progress(ana, lesson.id, 3600).await.unwrap();
        assert!(outcome.course.is_complete());

        f.service.add_lesson(f.section_id, "two", 2, "two.mp4").await.unwrap();
        let view = f.service.database().read().await;
        let progress = view
            .find(&crate::domain::query::Query::<CourseProgress>::all())
            .unwrap();
        assert_eq!(progress.len(), 1);
        assert_eq!(progress[0].entity.completion_fraction, 0.5);
        assert!(!progress[0].entity.is_complete());
    }
}
