use crate::domain::Id;
use crate::domain::entity::{EntityKind, Record};
use crate::domain::ports::Persistence;
use crate::domain::store::{ChangeSet, Tables};
use crate::error::{CoreError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Column family holding the highest id handed out per table.
pub const CF_SEQUENCES: &str = "sequences";

/// Durable store on RocksDB.
///
/// Every entity kind gets its own column family, keyed by the big-endian id
/// so iteration comes back in id order. Values are the JSON encoded rows.
/// A commit is written as a single `WriteBatch`.
#[derive(Clone)]
pub struct RocksDbPersistence {
    db: Arc<DB>,
}

impl RocksDbPersistence {
    /// Opens or creates the database at `path` with every column family.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = EntityKind::ALL
            .iter()
            .map(|kind| kind.name())
            .chain(std::iter::once(CF_SEQUENCES))
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;
        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            CoreError::InternalError(Box::new(std::io::Error::other(format!(
                "column family '{name}' not found"
            ))))
        })
    }

    fn stored_sequence(&self, kind: EntityKind) -> Result<Id> {
        let cf = self.cf(CF_SEQUENCES)?;
        match self.db.get_pinned_cf(cf, kind.name())? {
            Some(bytes) => decode_id(&bytes),
            None => Ok(0),
        }
    }
}

#[async_trait]
impl Persistence for RocksDbPersistence {
    async fn load(&self) -> Result<Tables> {
        let mut tables = Tables::new();
        for kind in EntityKind::ALL {
            let cf = self.cf(kind.name())?;
            for item in self.db.iterator_cf(cf, IteratorMode::Start) {
                let (_key, value) = item?;
                let record: Record = serde_json::from_slice(&value)?;
                tables.insert(record);
            }
            tables.reserve(kind, self.stored_sequence(kind)?);
        }
        tracing::debug!("rows loaded from rocksdb");
        Ok(tables)
    }

    async fn persist(&self, changes: &ChangeSet) -> Result<()> {
        let mut batch = WriteBatch::default();
        let mut sequences: HashMap<EntityKind, Id> = HashMap::new();

        for ((kind, id), change) in changes.iter() {
            let cf = self.cf(kind.name())?;
            let key = id.to_be_bytes();
            match change {
                Some(record) => {
                    batch.put_cf(cf, key, serde_json::to_vec(record)?);
                    let seq = sequences.entry(*kind).or_default();
                    *seq = (*seq).max(*id);
                }
                None => batch.delete_cf(cf, key),
            }
        }

        let seq_cf = self.cf(CF_SEQUENCES)?;
        for (kind, id) in sequences {
            if id > self.stored_sequence(kind)? {
                batch.put_cf(seq_cf, kind.name(), id.to_be_bytes());
            }
        }

        self.db.write(batch)?;
        Ok(())
    }
}

fn decode_id(bytes: &[u8]) -> Result<Id> {
    let array: [u8; 8] = bytes.try_into().map_err(|_| {
        CoreError::InternalError(Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("sequence value has {} bytes, expected 8", bytes.len()),
        )))
    })?;
    Ok(Id::from_be_bytes(array))
}
