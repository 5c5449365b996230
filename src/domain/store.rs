//! Row storage shared by the unit of work and the persistence adapters.
//!
//! `Tables` is the committed state, `ChangeSet` the writes a unit of work has
//! staged, and `Overlay` the view of one through the other. Constraint checks
//! run against the overlay so that a commit is validated as a whole before any
//! row is touched.

use super::Id;
use super::entity::{EntityKind, Record};
use super::ports::Source;
use crate::error::{CoreError, Result};
use std::collections::{BTreeMap, HashMap};

/// Committed rows, one ordered map per table.
#[derive(Debug, Default, Clone)]
pub struct Tables {
    rows: HashMap<EntityKind, BTreeMap<Id, Record>>,
    sequences: HashMap<EntityKind, Id>,
}

impl Tables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: Record) {
        let kind = record.kind();
        let id = record.id();
        self.reserve(kind, id);
        self.rows.entry(kind).or_default().insert(id, record);
    }

    pub fn remove(&mut self, kind: EntityKind, id: Id) -> Option<Record> {
        self.rows.get_mut(&kind).and_then(|rows| rows.remove(&id))
    }

    pub fn get(&self, kind: EntityKind, id: Id) -> Option<&Record> {
        self.rows.get(&kind).and_then(|rows| rows.get(&id))
    }

    pub fn rows(&self, kind: EntityKind) -> impl Iterator<Item = &Record> {
        self.rows.get(&kind).into_iter().flat_map(|rows| rows.values())
    }

    pub fn len(&self, kind: EntityKind) -> usize {
        self.rows.get(&kind).map_or(0, BTreeMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.values().all(BTreeMap::is_empty)
    }

    /// Highest id ever handed out for `kind`, deleted rows included.
    pub fn sequence(&self, kind: EntityKind) -> Id {
        self.sequences.get(&kind).copied().unwrap_or(0)
    }

    /// Raises the id sequence of `kind` to at least `id`.
    pub fn reserve(&mut self, kind: EntityKind, id: Id) {
        let seq = self.sequences.entry(kind).or_default();
        *seq = (*seq).max(id);
    }

    pub fn apply(&mut self, changes: &ChangeSet) {
        for ((kind, id), change) in changes.iter() {
            match change {
                Some(record) => self.insert(record.clone()),
                None => {
                    self.remove(*kind, *id);
                }
            }
        }
    }
}

impl Source for Tables {
    fn scan_kind(&self, kind: EntityKind) -> Vec<Record> {
        self.rows(kind).cloned().collect()
    }

    fn fetch_kind(&self, kind: EntityKind, id: Id) -> Option<Record> {
        self.get(kind, id).cloned()
    }
}

/// Pending writes of one unit of work. `None` marks a delete.
#[derive(Debug, Default, Clone)]
pub struct ChangeSet {
    entries: BTreeMap<(EntityKind, Id), Option<Record>>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, record: Record) {
        self.entries.insert((record.kind(), record.id()), Some(record));
    }

    pub fn delete(&mut self, kind: EntityKind, id: Id) {
        self.entries.insert((kind, id), None);
    }

    pub fn get(&self, kind: EntityKind, id: Id) -> Option<&Option<Record>> {
        self.entries.get(&(kind, id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(EntityKind, Id), &Option<Record>)> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: EntityKind) -> impl Iterator<Item = (Id, &Option<Record>)> {
        self.entries
            .range((kind, Id::MIN)..=(kind, Id::MAX))
            .map(|((_, id), change)| (*id, change))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Committed rows seen through staged changes.
pub struct Overlay<'a> {
    pub base: &'a Tables,
    pub changes: &'a ChangeSet,
}

impl<'a> Overlay<'a> {
    pub fn new(base: &'a Tables, changes: &'a ChangeSet) -> Self {
        Self { base, changes }
    }

    /// Next free id for `kind`.
    pub fn next_id(&self, kind: EntityKind) -> Id {
        let staged = self
            .changes
            .of_kind(kind)
            .map(|(id, _)| id)
            .max()
            .unwrap_or(0);
        self.base.sequence(kind).max(staged) + 1
    }

    /// Validates the staged changes as a single commit.
    ///
    /// Unique keys and incoming references are indexed once per commit, not
    /// once per staged row.
    pub fn check_constraints(&self) -> Result<()> {
        let mut unique: HashMap<EntityKind, HashMap<String, Vec<Id>>> = HashMap::new();
        let mut referenced: Option<HashMap<(EntityKind, Id), EntityKind>> = None;

        for ((kind, id), change) in self.changes.iter() {
            match change {
                Some(record) => {
                    self.check_references(record)?;
                    let Some(key) = record.unique_key() else {
                        continue;
                    };
                    let index = unique
                        .entry(*kind)
                        .or_insert_with(|| self.unique_index(*kind));
                    let clash = index
                        .get(&key)
                        .is_some_and(|ids| ids.iter().any(|other| other != id));
                    if clash {
                        return Err(CoreError::StoreCommitError(format!(
                            "{kind} key '{key}' already exists"
                        )));
                    }
                }
                None => {
                    let index = referenced.get_or_insert_with(|| self.reference_index());
                    if let Some(child_kind) = index.get(&(*kind, *id)) {
                        return Err(CoreError::StoreCommitError(format!(
                            "{kind} {id} is still referenced by {child_kind} rows"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn check_references(&self, record: &Record) -> Result<()> {
        for (kind, id) in record.references() {
            if self.fetch_kind(kind, id).is_none() {
                return Err(CoreError::StoreCommitError(format!(
                    "{} {} references missing {} {}",
                    record.kind(),
                    record.id(),
                    kind,
                    id
                )));
            }
        }
        Ok(())
    }

    /// Ids holding each unique key of `kind`.
    fn unique_index(&self, kind: EntityKind) -> HashMap<String, Vec<Id>> {
        let mut index: HashMap<String, Vec<Id>> = HashMap::new();
        for row in self.scan_kind(kind) {
            if let Some(key) = row.unique_key() {
                index.entry(key).or_default().push(row.id());
            }
        }
        index
    }

    /// Every referenced row, mapped to a table that points at it.
    fn reference_index(&self) -> HashMap<(EntityKind, Id), EntityKind> {
        let mut index = HashMap::new();
        for child_kind in EntityKind::ALL {
            for row in self.scan_kind(child_kind) {
                for target in row.references() {
                    index.entry(target).or_insert(child_kind);
                }
            }
        }
        index
    }
}

impl Source for Overlay<'_> {
    fn scan_kind(&self, kind: EntityKind) -> Vec<Record> {
        let mut merged: BTreeMap<Id, Record> = self
            .base
            .rows(kind)
            .map(|record| (record.id(), record.clone()))
            .collect();
        for (id, change) in self.changes.of_kind(kind) {
            match change {
                Some(record) => {
                    merged.insert(id, record.clone());
                }
                None => {
                    merged.remove(&id);
                }
            }
        }
        merged.into_values().collect()
    }

    fn fetch_kind(&self, kind: EntityKind, id: Id) -> Option<Record> {
        match self.changes.get(kind, id) {
            Some(change) => change.clone(),
            None => self.base.get(kind, id).cloned(),
        }
    }
}
