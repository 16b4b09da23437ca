//! Record storage.
//!
//! The engine only needs five operations from a backing store: insert, get by
//! id, replace by id, delete by id, and iterate all. [`RecordStore`] names
//! them; documents cross the boundary as schemaless JSON ([`Document`]) and
//! are translated to [`Record`]s by the caller.
//!
//! ## Submodules
//!
//! - [`adapter`] - Turns a [`RecordCursor`] into a server-stream source,
//!   releasing the cursor on every exit path.
//! - [`memory`] - In-process [`MemoryStore`].
//! - [`object_id`] - 12-byte record identifiers.
//! - [`record`] - Typed records and their storage translation.

pub mod adapter;
pub mod memory;
mod object_id;
mod record;

pub use adapter::{CursorGuard, RecordStream, cursor_stream, stream_records};
pub use memory::{MemoryCursor, MemoryStore};
pub use object_id::{ObjectId, ObjectIdError};
pub use record::{Record, RecordFields};

use crate::Result;
use core::future::Future;

/// Storage form of a record.
pub type Document = serde_json::Value;

/// Counts reported by [`RecordStore::replace_one`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplaceOutcome {
    pub matched: u64,
    pub modified: u64,
}

/// A pull-based iterator over stored documents.
///
/// A cursor holds a store-side resource until [`RecordCursor::release`] is
/// called. Use it through a [`CursorGuard`] so that release happens on every
/// exit path.
pub trait RecordCursor: Send {
    /// The next document, or `None` once the cursor is exhausted.
    ///
    /// # Errors
    ///
    /// Store-specific failure while fetching.
    fn next(&mut self) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Releases the store-side resource. Must be idempotent.
    fn release(&mut self);
}

/// The backing store behind the record-management handlers.
///
/// Every method is a single store round trip; callers bound each one with
/// their own timeout.
pub trait RecordStore: Send + Sync {
    type Cursor: RecordCursor + 'static;

    /// Inserts a document, assigning it a fresh `_id` unless it already has
    /// one, and returns that id.
    fn insert_one(&self, doc: Document) -> impl Future<Output = Result<ObjectId>> + Send;

    fn find_one(&self, id: ObjectId) -> impl Future<Output = Result<Option<Document>>> + Send;

    /// Replaces the document with `id` by `doc`, keeping the id.
    fn replace_one(
        &self,
        id: ObjectId,
        doc: Document,
    ) -> impl Future<Output = Result<ReplaceOutcome>> + Send;

    /// Deletes the document with `id`, returning how many were deleted.
    fn delete_one(&self, id: ObjectId) -> impl Future<Output = Result<u64>> + Send;

    /// Opens a cursor over every document, in insertion order.
    fn find_all(&self) -> impl Future<Output = Result<Self::Cursor>> + Send;
}
