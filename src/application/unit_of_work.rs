use crate::domain::Id;
use crate::domain::catalog::{Category, Course, Lesson, Section};
use crate::domain::enrollment::Enrollment;
use crate::domain::entity::{Entity, EntityKind, Loaded, Record};
use crate::domain::payment::ProcessedEvent;
use crate::domain::ports::{PersistenceBox, Source, SourceExt};
use crate::domain::progress::LessonProgress;
use crate::domain::query::{self, Filter, Page, PagedResult, Query};
use crate::domain::rating::{CourseProgress, Rating};
use crate::domain::store::{ChangeSet, Overlay, Tables};
use crate::domain::user::User;
use crate::error::{CoreError, Result};
use crate::infrastructure::in_memory::VolatilePersistence;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Handle to the store. Cheap to clone; clones share the same tables.
///
/// Reads go through [`Database::read`]; writes are grouped in a
/// [`UnitOfWork`] obtained from [`Database::begin`]. A unit of work holds the
/// write lock for its whole lifetime, so recomputed aggregates are derived
/// from the same state the commit lands on.
#[derive(Clone)]
pub struct Database {
    tables: Arc<RwLock<Tables>>,
    persistence: Arc<PersistenceBox>,
}

impl Database {
    /// Opens the store, loading every committed row from `persistence`.
    pub async fn open(persistence: PersistenceBox) -> Result<Self> {
        let tables = persistence.load().await?;
        Ok(Self {
            tables: Arc::new(RwLock::new(tables)),
            persistence: Arc::new(persistence),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::new())),
            persistence: Arc::new(Box::new(VolatilePersistence::new())),
        }
    }

    pub async fn read(&self) -> ReadView {
        ReadView {
            guard: self.tables.clone().read_owned().await,
        }
    }

    pub async fn begin(&self) -> UnitOfWork {
        UnitOfWork {
            guard: self.tables.clone().write_owned().await,
            changes: ChangeSet::new(),
            persistence: Arc::clone(&self.persistence),
        }
    }
}

/// Snapshot of committed state, held for the duration of a read.
pub struct ReadView {
    guard: OwnedRwLockReadGuard<Tables>,
}

impl ReadView {
    pub fn get<T: Entity>(&self, id: Id) -> Result<T> {
        self.fetch::<T>(id)
            .ok_or_else(|| CoreError::not_found(T::KIND.name(), id))
    }

    pub fn find<T: Entity>(&self, query: &Query<T>) -> Result<Vec<Loaded<T>>> {
        query::find(self, query)
    }

    pub fn count<T: Entity>(&self, filter: &Filter<T>) -> usize {
        query::count(self, filter)
    }

    pub fn find_page<T: Entity>(
        &self,
        query: Query<T>,
        page: Page,
    ) -> Result<PagedResult<Loaded<T>>> {
        query::find_page(self, query, page)
    }
}

impl Source for ReadView {
    fn scan_kind(&self, kind: EntityKind) -> Vec<Record> {
        self.guard.scan_kind(kind)
    }

    fn fetch_kind(&self, kind: EntityKind, id: Id) -> Option<Record> {
        self.guard.fetch_kind(kind, id)
    }
}

/// A set of writes that commit together.
///
/// Writes are staged in memory and become visible to other readers only when
/// [`UnitOfWork::complete`] succeeds. Dropping the unit of work without
/// completing it discards the staged writes and releases the lock.
pub struct UnitOfWork {
    guard: OwnedRwLockWriteGuard<Tables>,
    changes: ChangeSet,
    persistence: Arc<PersistenceBox>,
}

impl UnitOfWork {
    pub fn repository<T: Entity>(&mut self) -> Repository<'_, T> {
        Repository {
            uow: self,
            _entity: PhantomData,
        }
    }

    pub fn users(&mut self) -> Repository<'_, User> {
        self.repository()
    }

    pub fn categories(&mut self) -> Repository<'_, Category> {
        self.repository()
    }

    pub fn courses(&mut self) -> Repository<'_, Course> {
        self.repository()
    }

    pub fn sections(&mut self) -> Repository<'_, Section> {
        self.repository()
    }

    pub fn lessons(&mut self) -> Repository<'_, Lesson> {
        self.repository()
    }

    pub fn ratings(&mut self) -> Repository<'_, Rating> {
        self.repository()
    }

    pub fn course_progress(&mut self) -> Repository<'_, CourseProgress> {
        self.repository()
    }

    pub fn lesson_progress(&mut self) -> Repository<'_, LessonProgress> {
        self.repository()
    }

    pub fn enrollments(&mut self) -> Repository<'_, Enrollment> {
        self.repository()
    }

    pub fn processed_events(&mut self) -> Repository<'_, ProcessedEvent> {
        self.repository()
    }

    fn overlay(&self) -> Overlay<'_> {
        Overlay::new(&self.guard, &self.changes)
    }

    /// Commits every staged write atomically and returns how many rows changed.
    ///
    /// Constraints are checked against the combined state first; then the
    /// change set goes to persistence, and only once that succeeds is it
    /// applied to the shared tables. Any failure leaves the tables as they
    /// were and is returned as `StoreCommitError`.
    pub async fn complete(mut self) -> Result<usize> {
        let changes = std::mem::take(&mut self.changes);
        if changes.is_empty() {
            return Ok(0);
        }
        Overlay::new(&self.guard, &changes).check_constraints()?;
        self.persistence
            .persist(&changes)
            .await
            .map_err(|e| match e {
                CoreError::StoreCommitError(_) => e,
                other => CoreError::StoreCommitError(other.to_string()),
            })?;
        self.guard.apply(&changes);
        tracing::debug!(rows = changes.len(), "unit of work committed");
        Ok(changes.len())
    }
}

impl Source for UnitOfWork {
    fn scan_kind(&self, kind: EntityKind) -> Vec<Record> {
        self.overlay().scan_kind(kind)
    }

    fn fetch_kind(&self, kind: EntityKind, id: Id) -> Option<Record> {
        self.overlay().fetch_kind(kind, id)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.changes.is_empty() {
            tracing::debug!(
                rows = self.changes.len(),
                "unit of work dropped without commit, discarding changes"
            );
        }
    }
}

/// Typed access to one table inside a unit of work.
pub struct Repository<'a, T> {
    uow: &'a mut UnitOfWork,
    _entity: PhantomData<T>,
}

impl<T: Entity> Repository<'_, T> {
    /// Stages an insert. Rows with id `0` get the next free id; rows that
    /// carry an id keep it, provided it is not taken.
    pub fn add(&mut self, mut entity: T) -> Result<T> {
        if entity.id() == 0 {
            entity.set_id(self.uow.overlay().next_id(T::KIND));
        } else if self.uow.fetch_kind(T::KIND, entity.id()).is_some() {
            return Err(CoreError::Conflict(format!(
                "{} {} already exists",
                T::KIND,
                entity.id()
            )));
        }
        self.uow.changes.upsert(entity.clone().into_record());
        Ok(entity)
    }

    /// Stages an update of the row with `id`.
    pub fn update<F>(&mut self, id: Id, f: F) -> Result<T>
    where
        F: FnOnce(&mut T) -> Result<()>,
    {
        let mut entity = self.get(id)?;
        f(&mut entity)?;
        entity.set_id(id);
        self.uow.changes.upsert(entity.clone().into_record());
        Ok(entity)
    }

    /// Stages a delete and returns the removed row.
    pub fn delete(&mut self, id: Id) -> Result<T> {
        let entity = self.get(id)?;
        self.uow.changes.delete(T::KIND, id);
        Ok(entity)
    }

    pub fn get(&self, id: Id) -> Result<T> {
        self.uow
            .fetch::<T>(id)
            .ok_or_else(|| CoreError::not_found(T::KIND.name(), id))
    }

    pub fn find(&self, query: &Query<T>) -> Result<Vec<Loaded<T>>> {
        query::find(&*self.uow, query)
    }

    /// First row matching `predicate`, in id order.
    pub fn find_one(&self, predicate: impl Fn(&T) -> bool) -> Option<T> {
        self.uow.scan::<T>().into_iter().find(|row| predicate(row))
    }

    pub fn all(&self) -> Vec<T> {
        self.uow.scan::<T>()
    }

    pub fn count(&self, filter: &Filter<T>) -> usize {
        query::count(&*self.uow, filter)
    }
}
