use super::Id;
use super::entity::{Entity, EntityKind, Record};
use super::store::{ChangeSet, Tables};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Read access to the rows of the store.
///
/// Implemented by committed state and by a unit of work's pending view, so the
/// query engine and the recomputation code read both the same way.
pub trait Source {
    /// All rows of a table, ordered by id.
    fn scan_kind(&self, kind: EntityKind) -> Vec<Record>;
    fn fetch_kind(&self, kind: EntityKind, id: Id) -> Option<Record>;
}

/// Typed helpers over [`Source`].
pub trait SourceExt: Source {
    fn scan<T: Entity>(&self) -> Vec<T> {
        self.scan_kind(T::KIND)
            .into_iter()
            .filter_map(T::from_record)
            .collect()
    }

    fn fetch<T: Entity>(&self, id: Id) -> Option<T> {
        self.fetch_kind(T::KIND, id).and_then(T::from_record)
    }
}

impl<S: Source + ?Sized> SourceExt for S {}

/// Durable backing for the store.
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Reads back every committed row.
    async fn load(&self) -> Result<Tables>;
    /// Writes one commit. Either every change lands or none does.
    async fn persist(&self, changes: &ChangeSet) -> Result<()>;
}

pub type PersistenceBox = Box<dyn Persistence>;

/// Media-storage collaborator: knows how long an uploaded video is.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn duration_hours(&self, media_ref: &str) -> Result<f64>;
}

pub type MediaProbeRef = Arc<dyn MediaProbe>;
