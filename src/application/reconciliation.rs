use super::aggregates::AggregateService;
use super::unit_of_work::Database;
use crate::config::EngineConfig;
use crate::domain::catalog::Course;
use crate::domain::enrollment::{Enrollment, RevenueSplit, active_enrollment};
use crate::domain::payment::{CheckoutRequest, EventKind, GatewayEvent, ProcessedEvent};
use crate::domain::user::User;
use crate::domain::{CourseId, UserId};
use crate::error::{CoreError, Result};

/// What happened to one gateway event.
///
/// Every variant is acknowledged to the gateway; only an `Err` from
/// [`PaymentReconciler::handle`] asks for redelivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconciliation {
    /// Payment succeeded and granted access.
    Enrolled(Enrollment),
    /// Payment succeeded while an active enrollment already existed. The
    /// payment is recorded without granting access twice.
    Superseded(Enrollment),
    PaymentFailed(Enrollment),
    /// The event id was applied before.
    Duplicate,
    /// Event type the engine does not act on.
    Ignored,
    /// Metadata missing or pointing at unknown rows.
    Dropped(String),
}

/// Turns payment gateway notifications into enrollment rows.
///
/// Each event is applied in a single unit of work that also records the event
/// id, so a redelivered notification is recognised and skipped.
#[derive(Clone)]
pub struct PaymentReconciler {
    db: Database,
    aggregates: AggregateService,
    config: EngineConfig,
}

impl PaymentReconciler {
    pub fn new(db: Database, config: EngineConfig) -> Self {
        Self {
            db,
            aggregates: AggregateService::new(config),
            config,
        }
    }

    /// Prepares a gateway checkout session for a student.
    ///
    /// Fails with `Conflict` while the student holds an active enrollment in
    /// the course.
    #[tracing::instrument(skip(self))]
    pub async fn begin_checkout(&self, student_id: UserId, course_id: CourseId) -> Result<CheckoutRequest> {
        let view = self.db.read().await;
        view.get::<User>(student_id)?;
        let course: Course = view.get(course_id)?;
        if active_enrollment(&view, student_id, course_id).is_some() {
            return Err(CoreError::Conflict(format!(
                "student {student_id} is already subscribed to course {course_id}"
            )));
        }
        Ok(CheckoutRequest::new(course_id, student_id, course.checkout_price()))
    }

    /// Applies one gateway event.
    ///
    /// Malformed events are dropped and acknowledged; store failures are
    /// returned so the gateway retries the delivery.
    #[tracing::instrument(skip(self, event), fields(event_id = %event.id, kind = %event.kind))]
    pub async fn handle(&self, event: &GatewayEvent) -> Result<Reconciliation> {
        let kind = event.event_kind();
        if kind == EventKind::Other {
            tracing::debug!("event type not handled");
            return Ok(Reconciliation::Ignored);
        }

        let intent = match event.intent() {
            Ok(intent) => intent,
            Err(CoreError::MalformedEvent(reason)) => {
                tracing::warn!(%reason, "dropping malformed payment event");
                return Ok(Reconciliation::Dropped(reason));
            }
            Err(e) => return Err(e),
        };

        let mut uow = self.db.begin().await;
        if uow
            .processed_events()
            .find_one(|p| p.event_id == event.id)
            .is_some()
        {
            tracing::info!("payment event already applied, skipping");
            return Ok(Reconciliation::Duplicate);
        }
        if uow.courses().get(intent.course_id).is_err() || uow.users().get(intent.student_id).is_err() {
            let reason = format!(
                "course {} or student {} does not exist",
                intent.course_id, intent.student_id
            );
            tracing::warn!(%reason, "dropping payment event");
            return Ok(Reconciliation::Dropped(reason));
        }

        let outcome = if kind.is_failure() {
            let enrollment = Enrollment::failed(intent.course_id, intent.student_id, intent.amount)
                .with_event(event.id.as_str());
            Reconciliation::PaymentFailed(uow.enrollments().add(enrollment)?)
        } else {
            let split = RevenueSplit::of(intent.amount, &self.config);
            let already_active = active_enrollment(&uow, intent.student_id, intent.course_id).is_some();
            let mut enrollment =
                Enrollment::succeeded(intent.course_id, intent.student_id, intent.amount, split)
                    .with_event(event.id.as_str());
            if already_active {
                enrollment.is_active = false;
                let enrollment = uow.enrollments().add(enrollment)?;
                tracing::warn!(
                    course_id = intent.course_id,
                    student_id = intent.student_id,
                    "payment for a course the student is already subscribed to"
                );
                Reconciliation::Superseded(enrollment)
            } else {
                let enrollment = uow.enrollments().add(enrollment)?;
                self.aggregates
                    .add_enrolled_students(&mut uow, intent.course_id, 1)?;
                Reconciliation::Enrolled(enrollment)
            }
        };

        uow.processed_events().add(ProcessedEvent::new(event))?;
        uow.complete().await?;
        tracing::info!(
            course_id = intent.course_id,
            student_id = intent.student_id,
            amount = %intent.amount,
            outcome = outcome.label(),
            "payment event applied"
        );
        Ok(outcome)
    }
}

impl Reconciliation {
    pub fn label(&self) -> &'static str {
        match self {
            Reconciliation::Enrolled(_) => "enrolled",
            Reconciliation::Superseded(_) => "superseded",
            Reconciliation::PaymentFailed(_) => "payment-failed",
            Reconciliation::Duplicate => "duplicate",
            Reconciliation::Ignored => "ignored",
            Reconciliation::Dropped(_) => "dropped",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{Category, CourseLevel};
    use crate::domain::enrollment::PaymentStatus;
    use crate::domain::ports::Persistence;
    use crate::domain::query::{Filter, Query};
    use crate::domain::store::{ChangeSet, Tables};
    use crate::domain::user::Role;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Clone, Default)]
    struct SwitchablePersistence {
        down: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Persistence for SwitchablePersistence {
        async fn load(&self) -> Result<Tables> {
            Ok(Tables::new())
        }

        async fn persist(&self, _changes: &ChangeSet) -> Result<()> {
            if self.down.load(Ordering::SeqCst) {
                return Err(CoreError::IoError(std::io::Error::other("down")));
            }
            Ok(())
        }
    }

    async fn seeded() -> PaymentReconciler {
        seeded_on(Database::in_memory()).await
    }

    async fn seeded_on(db: Database) -> PaymentReconciler {
        let mut uow = db.begin().await;
        let mut category = Category::new("Languages");
        category.id = 1;
        uow.categories().add(category).unwrap();
        let mut course = Course::new("Spanish", 1, CourseLevel::Beginner, dec!(100.00));
        course.id = 10;
        uow.courses().add(course).unwrap();
        let mut student = User::new("Ana", "ana@example.com", Role::Student);
        student.id = 7;
        uow.users().add(student).unwrap();
        uow.complete().await.unwrap();
        PaymentReconciler::new(db, EngineConfig::default())
    }

    fn event(id: &str, kind: &str) -> GatewayEvent {
        serde_json::from_value(json!({
            "id": id,
            "type": kind,
            "data": {"metadata": {"courseId": "10", "studentId": "7", "amount": "100.00"}}
        }))
        .unwrap()
    }

    async fn enrolled_count(engine: &PaymentReconciler) -> u32 {
        let view = engine.db.read().await;
        view.get::<Course>(10).unwrap().enrolled_student_count
    }

    #[tokio::test]
    async fn test_checkout_completed_enrolls_with_split() {
        let engine = seeded().await;

        let outcome = engine.handle(&event("evt_1", "checkout-completed")).await.unwrap();
        let Reconciliation::Enrolled(enrollment) = outcome else {
            panic!("expected enrollment, got {outcome:?}");
        };
        assert_eq!(enrollment.platform_profit, dec!(20.00));
        assert_eq!(enrollment.instructor_profit, dec!(80.00));
        assert_eq!(enrollment.payment_status, PaymentStatus::Success);
        assert!(enrollment.is_active);
        assert_eq!(enrollment.gateway_event_id.as_deref(), Some("evt_1"));
        assert_eq!(enrolled_count(&engine).await, 1);
    }

    #[tokio::test]
    async fn test_redelivered_event_is_applied_once() {
        let engine = seeded().await;
        let evt = event("evt_1", "checkout-completed");

        engine.handle(&evt).await.unwrap();
        let again = engine.handle(&evt).await.unwrap();
        assert_eq!(again, Reconciliation::Duplicate);

        let view = engine.db.read().await;
        assert_eq!(view.count(&Filter::<Enrollment>::all()), 1);
        assert_eq!(view.get::<Course>(10).unwrap().enrolled_student_count, 1);
    }

    #[tokio::test]
    async fn test_store_failure_is_returned_and_retry_applies() {
        let persistence = SwitchablePersistence::default();
        let db = Database::open(Box::new(persistence.clone())).await.unwrap();
        let engine = seeded_on(db).await;
        let evt = event("evt_1", "checkout-completed");

        persistence.down.store(true, Ordering::SeqCst);
        let first = engine.handle(&evt).await;
        assert!(matches!(first, Err(CoreError::StoreCommitError(_))));
        {
            let view = engine.db.read().await;
            assert_eq!(view.count(&Filter::<ProcessedEvent>::all()), 0);
            assert_eq!(view.count(&Filter::<Enrollment>::all()), 0);
        }
        assert_eq!(enrolled_count(&engine).await, 0);

        persistence.down.store(false, Ordering::SeqCst);
        let retry = engine.handle(&evt).await.unwrap();
        assert!(matches!(retry, Reconciliation::Enrolled(_)));
        assert_eq!(enrolled_count(&engine).await, 1);

        let view = engine.db.read().await;
        assert_eq!(view.count(&Filter::<ProcessedEvent>::all()), 1);
    }

    #[tokio::test]
    async fn test_failed_payment_records_inactive_row() {
        let engine = seeded().await;
        for (id, kind) in [("evt_f1", "payment-failed"), ("evt_f2", "charge-failed")] {
            let outcome = engine.handle(&event(id, kind)).await.unwrap();
            let Reconciliation::PaymentFailed(enrollment) = outcome else {
                panic!("expected failed payment, got {outcome:?}");
            };
            assert!(!enrollment.is_active);
            assert_eq!(enrollment.platform_profit, dec!(0));
            assert_eq!(enrollment.instructor_profit, dec!(0));
        }
        assert_eq!(enrolled_count(&engine).await, 0);
    }

    #[tokio::test]
    async fn test_malformed_and_unknown_events_are_acknowledged() {
        let engine = seeded().await;

        let missing: GatewayEvent = serde_json::from_value(json!({
            "id": "evt_bad",
            "type": "checkout-completed",
            "data": {"metadata": {"courseId": "10"}}
        }))
        .unwrap();
        assert!(matches!(engine.handle(&missing).await.unwrap(), Reconciliation::Dropped(_)));

        let unknown_course: GatewayEvent = serde_json::from_value(json!({
            "id": "evt_404",
            "type": "checkout-completed",
            "data": {"metadata": {"courseId": "404", "studentId": "7", "amount": "5"}}
        }))
        .unwrap();
        assert!(matches!(
            engine.handle(&unknown_course).await.unwrap(),
            Reconciliation::Dropped(_)
        ));

        let other = event("evt_other", "customer-created");
        assert_eq!(engine.handle(&other).await.unwrap(), Reconciliation::Ignored);

        let view = engine.db.read().await;
        assert_eq!(view.count(&Filter::<Enrollment>::all()), 0);
        assert_eq!(view.count(&Filter::<ProcessedEvent>::all()), 0);
    }

    #[tokio::test]
    async fn test_second_payment_while_active_does_not_double_count() {
        let engine = seeded().await;
        engine.handle(&event("evt_1", "checkout-completed")).await.unwrap();
        let outcome = engine.handle(&event("evt_2", "checkout-completed")).await.unwrap();

        let Reconciliation::Superseded(enrollment) = outcome else {
            panic!("expected superseded payment, got {outcome:?}");
        };
        assert!(!enrollment.is_active);
        assert_eq!(enrollment.payment_status, PaymentStatus::Success);
        assert_eq!(enrolled_count(&engine).await, 1);

        let view = engine.db.read().await;
        let active = view
            .find(&Query::<Enrollment>::all().filter(|e| e.is_active))
            .unwrap();
        assert_eq!(active.len(), 1);
    }

    #[tokio::test]
    async fn test_begin_checkout() {
        let engine = seeded().await;

        let request = engine.begin_checkout(7, 10).await.unwrap();
        assert_eq!(request.amount, dec!(100.00));
        assert_eq!(request.metadata["courseId"], "10");
        assert_eq!(request.metadata["studentId"], "7");

        assert!(matches!(
            engine.begin_checkout(7, 404).await,
            Err(CoreError::NotFound { entity: "course", .. })
        ));

        engine.handle(&event("evt_1", "checkout-completed")).await.unwrap();
        assert!(matches!(
            engine.begin_checkout(7, 10).await,
            Err(CoreError::Conflict(_))
        ));
    }
}
