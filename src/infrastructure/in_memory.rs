use crate::domain::ports::{MediaProbe, Persistence};
use crate::domain::store::{ChangeSet, Tables};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::io;

/// Persistence that keeps nothing beyond the process.
///
/// The shared tables held by the database handle are the only copy of the
/// data, so `persist` has nothing to do and `load` starts empty.
#[derive(Debug, Default, Clone)]
pub struct VolatilePersistence;

impl VolatilePersistence {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Persistence for VolatilePersistence {
    async fn load(&self) -> Result<Tables> {
        Ok(Tables::new())
    }

    async fn persist(&self, changes: &ChangeSet) -> Result<()> {
        tracing::trace!(rows = changes.len(), "volatile commit");
        Ok(())
    }
}

/// Media collaborator backed by a fixed table of known durations.
///
/// Unknown references fail like a missing upload would.
#[derive(Debug, Default, Clone)]
pub struct InMemoryMediaProbe {
    durations: HashMap<String, f64>,
}

impl InMemoryMediaProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, media_ref: impl Into<String>, hours: f64) -> Self {
        self.durations.insert(media_ref.into(), hours);
        self
    }

    pub fn insert(&mut self, media_ref: impl Into<String>, hours: f64) {
        self.durations.insert(media_ref.into(), hours);
    }
}

#[async_trait]
impl MediaProbe for InMemoryMediaProbe {
    async fn duration_hours(&self, media_ref: &str) -> Result<f64> {
        self.durations.get(media_ref).copied().ok_or_else(|| {
            CoreError::IoError(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no media stored under '{media_ref}'"),
            ))
        })
    }
}
