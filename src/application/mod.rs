//! Application layer: the unit of work and the services that orchestrate
//! domain writes.
//!
//! Services open one [`unit_of_work::UnitOfWork`] per operation and recompute
//! the derived course aggregates inside it, so a write and the aggregates it
//! invalidates commit together.

pub mod aggregates;
pub mod catalog;
pub mod reconciliation;
pub mod unit_of_work;
