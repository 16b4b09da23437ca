use crate::{
    Error, Result,
    store::{ObjectId, Record, RecordFields, RecordStore, RecordStream, stream_records},
};
use core::{fmt, future::Future, time::Duration};

/// Default bound on a single store round trip.
pub const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(5);

/// Result of an update by id. Only storage failures are errors; a missing or
/// unchanged record is reported as a status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Modified, with the record as re-read afterwards.
    Modified(Record),
    /// Modified, but the re-read failed.
    ModifiedUnread,
    /// Matched, but the stored fields already had these values.
    Unchanged(ObjectId),
    NotFound(ObjectId),
}

impl fmt::Display for UpdateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Modified(record) => write!(f, "Modified blog details: {record}"),
            Self::ModifiedUnread => f.write_str("Blog was modified."),
            Self::Unchanged(id) => write!(f, "no blog was modified for given id : {id}"),
            Self::NotFound(id) => write!(f, "no blog was found for given id : {id}"),
        }
    }
}

/// Result of a delete by id.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound(ObjectId),
}

impl fmt::Display for DeleteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deleted => f.write_str("Blog was deleted."),
            Self::NotFound(id) => write!(f, "no blog was found for given id : {id}"),
        }
    }
}

/// Record-management handlers over an injected store.
///
/// Identifiers are parsed before the store is touched, so a malformed id is
/// always [`Error::InvalidArgument`] with no side effect. Every store round
/// trip is bounded by `op_timeout`; expiry is an infrastructure failure
/// ([`Error::Internal`]), distinct from the session deadline.
#[derive(Clone, Debug)]
pub struct RecordService<S> {
    store: S,
    op_timeout: Duration,
}

impl<S: RecordStore> RecordService<S> {
    pub const fn new(store: S, op_timeout: Duration) -> Self {
        Self { store, op_timeout }
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    pub const fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    pub async fn create(&self, fields: RecordFields) -> Result<Record> {
        let doc = fields.to_document()?;
        let id = self.bounded("insert", self.store.insert_one(doc)).await?;
        Ok(Record::new(id, fields))
    }

    pub async fn read(&self, id: &str) -> Result<Record> {
        let id = ObjectId::parse(id)?;
        self.find(id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Cannot find blog with given id: {id}")))
    }

    pub async fn update(&self, id: &str, fields: RecordFields) -> Result<UpdateOutcome> {
        let id = ObjectId::parse(id)?;
        let doc = fields.to_document()?;
        let replaced = self.bounded("replace", self.store.replace_one(id, doc)).await?;

        if replaced.matched == 0 {
            return Ok(UpdateOutcome::NotFound(id));
        }
        if replaced.modified == 0 {
            return Ok(UpdateOutcome::Unchanged(id));
        }
        match self.find(id).await {
            Ok(Some(record)) => Ok(UpdateOutcome::Modified(record)),
            Ok(None) | Err(_) => Ok(UpdateOutcome::ModifiedUnread),
        }
    }

    pub async fn delete(&self, id: &str) -> Result<DeleteOutcome> {
        let id = ObjectId::parse(id)?;
        let deleted = self.bounded("delete", self.store.delete_one(id)).await?;
        Ok(if deleted == 0 {
            DeleteOutcome::NotFound(id)
        } else {
            DeleteOutcome::Deleted
        })
    }

    /// Opens a cursor over every record. Only opening is bounded by the
    /// operation timeout; pulling is bounded by the session that drives the
    /// stream.
    pub async fn list(&self) -> Result<RecordStream> {
        let cursor = self.bounded("find", self.store.find_all()).await?;
        Ok(stream_records(cursor))
    }

    async fn find(&self, id: ObjectId) -> Result<Option<Record>> {
        self.bounded("find", self.store.find_one(id))
            .await?
            .map(Record::from_document)
            .transpose()
    }

    async fn bounded<T>(&self, op: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(out) => out,
            Err(_elapsed) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("store {op} timed out after {:?}", self.op_timeout);
                Err(Error::internal(format!(
                    "store {op} timed out after {:?}",
                    self.op_timeout
                )))
            }
        }
    }
}
