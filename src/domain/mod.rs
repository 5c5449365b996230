//! Domain layer: entities, the query engine and the ports the application
//! layer talks through.

pub mod catalog;
pub mod enrollment;
pub mod entity;
pub mod payment;
pub mod ports;
pub mod progress;
pub mod query;
pub mod rating;
pub mod store;
pub mod user;

pub type Id = u64;
pub type UserId = Id;
pub type CategoryId = Id;
pub type CourseId = Id;
pub type SectionId = Id;
pub type LessonId = Id;
pub type RatingId = Id;
pub type EnrollmentId = Id;
