use super::unit_of_work::UnitOfWork;
use crate::config::EngineConfig;
use crate::domain::catalog::{Course, Lesson, course_lessons, lesson_course};
use crate::domain::progress::LessonProgress;
use crate::domain::rating::{CompletionStatus, CourseProgress, Rating};
use crate::domain::{CourseId, LessonId, UserId};
use crate::domain::ports::SourceExt;
use crate::error::{CoreError, Result};
use std::collections::HashSet;

const SECONDS_PER_HOUR: f64 = 3600.0;

/// Keeps the derived course numbers in step with the rows they come from.
///
/// Every method works inside the caller's unit of work, so the recomputed
/// value commits together with the write that made it stale.
#[derive(Debug, Clone, Copy, Default)]
pub struct AggregateService {
    config: EngineConfig,
}

impl AggregateService {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Sets `total_duration_hours` to the sum of the course's lesson durations.
    ///
    /// A lesson whose cached duration is unusable counts as zero hours so one
    /// bad upload cannot block the rest of the course.
    pub fn recompute_course_duration(&self, uow: &mut UnitOfWork, course_id: CourseId) -> Result<f64> {
        uow.courses().get(course_id)?;
        let total: f64 = course_lessons(&*uow, course_id)
            .iter()
            .map(lesson_hours)
            .sum();
        uow.courses().update(course_id, |course| {
            course.total_duration_hours = total;
            Ok(())
        })?;
        tracing::debug!(course_id, total_duration_hours = total, "course duration recomputed");
        Ok(total)
    }

    /// Sets `average_rating` to the mean star count, or zero without ratings.
    pub fn recompute_average_rating(&self, uow: &mut UnitOfWork, course_id: CourseId) -> Result<f64> {
        uow.courses().get(course_id)?;
        let stars: Vec<f64> = uow
            .ratings()
            .all()
            .into_iter()
            .filter(|r: &Rating| r.course_id == course_id)
            .map(|r| f64::from(r.stars.value()))
            .collect();
        let average = if stars.is_empty() {
            0.0
        } else {
            stars.iter().sum::<f64>() / stars.len() as f64
        };
        uow.courses().update(course_id, |course| {
            course.average_rating = average;
            Ok(())
        })?;
        tracing::debug!(course_id, average_rating = average, ratings = stars.len(), "average rating recomputed");
        Ok(average)
    }

    /// Recomputes the completion of the course that owns `lesson_id`.
    pub fn recompute_completion(
        &self,
        uow: &mut UnitOfWork,
        user_id: UserId,
        lesson_id: LessonId,
    ) -> Result<CourseProgress> {
        let lesson = uow.lessons().get(lesson_id)?;
        let course_id = lesson_course(&*uow, &lesson)
            .ok_or_else(|| CoreError::not_found("section", lesson.section_id))?;
        self.recompute_course_completion(uow, user_id, course_id)
    }

    /// Watched hours over course hours, upserted as the user's
    /// [`CourseProgress`] for the course.
    pub fn recompute_course_completion(
        &self,
        uow: &mut UnitOfWork,
        user_id: UserId,
        course_id: CourseId,
    ) -> Result<CourseProgress> {
        let course: Course = uow.courses().get(course_id)?;
        let lesson_ids: HashSet<LessonId> = course_lessons(&*uow, course_id)
            .iter()
            .map(|l| l.id)
            .collect();
        let watched_seconds: u64 = uow
            .scan::<LessonProgress>()
            .iter()
            .filter(|p| p.user_id == user_id && lesson_ids.contains(&p.lesson_id))
            .fold(0u64, |acc, p| acc.saturating_add(p.watched_seconds));
        let fraction = completion_fraction(watched_seconds, course.total_duration_hours);
        let status = if fraction >= self.config.completion_threshold {
            CompletionStatus::Yes
        } else {
            CompletionStatus::No
        };

        let existing = uow
            .course_progress()
            .find_one(|p| p.user_id == user_id && p.course_id == course_id);
        let progress = match existing {
            Some(existing) => uow.course_progress().update(existing.id, |p| {
                p.completion_fraction = fraction;
                p.status = status;
                Ok(())
            })?,
            None => {
                let mut progress = CourseProgress::new(user_id, course_id);
                progress.completion_fraction = fraction;
                progress.status = status;
                uow.course_progress().add(progress)?
            }
        };
        tracing::debug!(user_id, course_id, completion = fraction, ?status, "course completion recomputed");
        Ok(progress)
    }

    /// Refreshes every tracked completion of a course, e.g. after its
    /// duration changed.
    pub fn refresh_course_completions(&self, uow: &mut UnitOfWork, course_id: CourseId) -> Result<usize> {
        let users: Vec<UserId> = uow
            .course_progress()
            .all()
            .into_iter()
            .filter(|p| p.course_id == course_id)
            .map(|p| p.user_id)
            .collect();
        for user_id in &users {
            self.recompute_course_completion(uow, *user_id, course_id)?;
        }
        Ok(users.len())
    }

    /// Applies a delta to `enrolled_student_count` instead of recounting.
    pub fn add_enrolled_students(&self, uow: &mut UnitOfWork, course_id: CourseId, delta: i64) -> Result<u32> {
        let course = uow.courses().update(course_id, |course| {
            let updated = i64::from(course.enrolled_student_count) + delta;
            course.enrolled_student_count = u32::try_from(updated.max(0)).map_err(|_| {
                CoreError::validation(format!("enrolled student count overflow for course {course_id}"))
            })?;
            Ok(())
        })?;
        Ok(course.enrolled_student_count)
    }
}

fn lesson_hours(lesson: &Lesson) -> f64 {
    match lesson.valid_duration() {
        Some(hours) => hours,
        None => {
            tracing::warn!(
                lesson_id = lesson.id,
                duration_hours = lesson.duration_hours,
                "lesson has unusable duration, counting it as zero"
            );
            0.0
        }
    }
}

/// Watched fraction of a course; a course without duration is 0% complete.
pub fn completion_fraction(watched_seconds: u64, total_duration_hours: f64) -> f64 {
    if !(total_duration_hours.is_finite() && total_duration_hours > 0.0) {
        return 0.0;
    }
    (watched_seconds as f64 / SECONDS_PER_HOUR) / total_duration_hours
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::unit_of_work::Database;
    use crate::domain::catalog::{Category, CourseLevel, Section};
    use crate::domain::rating::Stars;
    use crate::domain::user::{Role, User};
    use rust_decimal_macros::dec;

    struct Fixture {
        db: Database,
        course_id: CourseId,
        section_id: u64,
        students: Vec<UserId>,
    }

    async fn fixture(durations: &[f64]) -> Fixture {
        let db = Database::in_memory();
        let mut uow = db.begin().await;
        let category = uow.categories().add(Category::new("Music")).unwrap();
        let course = uow
            .courses()
            .add(Course::new("Guitar", category.id, CourseLevel::Beginner, dec!(20)))
            .unwrap();
        let section = uow
            .sections()
            .add(Section::new(course.id, "Chords", 1))
            .unwrap();
        for (i, d) in durations.iter().enumerate() {
            uow.lessons()
                .add(Lesson::new(section.id, format!("Lesson {i}"), i as u32 + 1, *d))
                .unwrap();
        }
        let students = (0..2)
            .map(|i| {
                uow.users()
                    .add(User::new(format!("s{i}"), format!("s{i}@example.com"), Role::Student))
                    .unwrap()
                    .id
            })
            .collect();
        uow.complete().await.unwrap();
        Fixture {
            db,
            course_id: course.id,
            section_id: section.id,
            students,
        }
    }

    #[tokio::test]
    async fn test_duration_sums_all_lessons() {
        let f = fixture(&[1.5, 2.0, 0.75]).await;
        let service = AggregateService::default();

        let mut uow = f.db.begin().await;
        assert_eq!(service.recompute_course_duration(&mut uow, f.course_id).unwrap(), 4.25);
        uow.lessons()
            .add(Lesson::new(f.section_id, "Solo", 4, 1.25))
            .unwrap();
        assert_eq!(service.recompute_course_duration(&mut uow, f.course_id).unwrap(), 5.5);
        // Recompute is idempotent
        assert_eq!(service.recompute_course_duration(&mut uow, f.course_id).unwrap(), 5.5);
        uow.complete().await.unwrap();

        let view = f.db.read().await;
        assert_eq!(view.get::<Course>(f.course_id).unwrap().total_duration_hours, 5.5);
    }

    #[tokio::test]
    async fn test_duration_of_empty_course_is_zero() {
        let f = fixture(&[]).await;
        let mut uow = f.db.begin().await;
        let total = AggregateService::default()
            .recompute_course_duration(&mut uow, f.course_id)
            .unwrap();
        assert_eq!(total, 0.0);
    }

    #[tokio::test]
    async fn test_unusable_lesson_duration_counts_as_zero() {
        let f = fixture(&[1.0, f64::NAN, -3.0, 2.0]).await;
        let mut uow = f.db.begin().await;
        let total = AggregateService::default()
            .recompute_course_duration(&mut uow, f.course_id)
            .unwrap();
        assert_eq!(total, 3.0);
    }

    #[tokio::test]
    async fn test_average_rating_and_empty_course() {
        let f = fixture(&[1.0]).await;
        let service = AggregateService::default();
        let mut uow = f.db.begin().await;
        assert_eq!(service.recompute_average_rating(&mut uow, f.course_id).unwrap(), 0.0);

        for (student, stars) in f.students.iter().zip([4, 2]) {
            uow.ratings()
                .add(Rating::new(*student, f.course_id, Stars::new(stars).unwrap(), None))
                .unwrap();
        }
        assert_eq!(service.recompute_average_rating(&mut uow, f.course_id).unwrap(), 3.0);
    }

    #[tokio::test]
    async fn test_completion_threshold() {
        let f = fixture(&[4.0, 6.0]).await;
        let service = AggregateService::default();
        let student = f.students[0];

        let mut uow = f.db.begin().await;
        service.recompute_course_duration(&mut uow, f.course_id).unwrap();
        let lessons = uow.lessons().all();

        let progress = service
            .recompute_completion(&mut uow, student, lessons[0].id)
            .unwrap();
        assert_eq!(progress.completion_fraction, 0.0);
        assert_eq!(progress.status, CompletionStatus::No);

        // 4h + 5.3h = 9.3h of 10h
        let mut first = LessonProgress::new(student, lessons[0].id);
        first.watched_seconds = 4 * 3600;
        uow.lesson_progress().add(first).unwrap();
        let mut second = LessonProgress::new(student, lessons[1].id);
        second.watched_seconds = 5 * 3600 + 18 * 60;
        uow.lesson_progress().add(second).unwrap();

        let progress = service
            .recompute_completion(&mut uow, student, lessons[1].id)
            .unwrap();
        assert!((progress.completion_fraction - 0.93).abs() < 1e-9);
        assert!(progress.is_complete());
        // Still a single progress row for the pair
        assert_eq!(uow.course_progress().all().len(), 1);
        uow.complete().await.unwrap();
    }

    #[tokio::test]
    async fn test_huge_watch_reports_saturate() {
        let f = fixture(&[1.0, 1.0]).await;
        let service = AggregateService::default();
        let student = f.students[0];

        let mut uow = f.db.begin().await;
        service.recompute_course_duration(&mut uow, f.course_id).unwrap();
        let lessons = uow.lessons().all();
        for (lesson, seconds) in lessons.iter().zip([u64::MAX, 10]) {
            let mut row = LessonProgress::new(student, lesson.id);
            row.watched_seconds = seconds;
            uow.lesson_progress().add(row).unwrap();
        }

        let progress = service
            .recompute_course_completion(&mut uow, student, f.course_id)
            .unwrap();
        assert!(progress.is_complete());
        assert!(progress.completion_fraction.is_finite());
    }

    #[test]
    fn test_completion_fraction_guards_zero_duration() {
        assert_eq!(completion_fraction(3600, 0.0), 0.0);
        assert_eq!(completion_fraction(3600, f64::NAN), 0.0);
        assert_eq!(completion_fraction(1800, 1.0), 0.5);
    }

    #[tokio::test]
    async fn test_enrolled_student_delta() {
        let f = fixture(&[]).await;
        let service = AggregateService::default();
        let mut uow = f.db.begin().await;
        assert_eq!(service.add_enrolled_students(&mut uow, f.course_id, 1).unwrap(), 1);
        assert_eq!(service.add_enrolled_students(&mut uow, f.course_id, 1).unwrap(), 2);
        assert_eq!(service.add_enrolled_students(&mut uow, f.course_id, -5).unwrap(), 0);
    }
}
