//! Store-streaming adapter.
//!
//! Bridges a [`RecordCursor`] to the server-stream driver. The cursor is
//! owned by a [`CursorGuard`] inside the stream, so it is released when the
//! stream is exhausted, when it fails, and when the driver drops it early
//! (deadline, cancellation, or a caller that went away).

use super::{Document, Record, RecordCursor};
use crate::{Error, Result};
use futures::{Stream, StreamExt, stream::BoxStream};

/// Stream of records read from a cursor.
pub type RecordStream = BoxStream<'static, Result<Record>>;

/// Scoped ownership of a cursor: releases it on drop.
#[derive(Debug)]
pub struct CursorGuard<C: RecordCursor> {
    cursor: C,
}

impl<C: RecordCursor> CursorGuard<C> {
    pub const fn new(cursor: C) -> Self {
        Self { cursor }
    }

    pub const fn cursor(&mut self) -> &mut C {
        &mut self.cursor
    }
}

impl<C: RecordCursor> Drop for CursorGuard<C> {
    fn drop(&mut self) {
        self.cursor.release();
        #[cfg(feature = "tracing")]
        tracing::trace!("cursor released");
    }
}

/// Yields every document of `cursor`, then ends.
///
/// A cursor error is yielded once as [`Error::Internal`] and ends the stream;
/// the cursor is released before the error is observed.
pub fn cursor_stream<C>(cursor: C) -> impl Stream<Item = Result<Document>> + Send + 'static
where
    C: RecordCursor + 'static,
{
    futures::stream::unfold(Some(CursorGuard::new(cursor)), |guard| async move {
        let mut guard = guard?;
        match guard.cursor().next().await {
            Ok(Some(doc)) => Some((Ok(doc), Some(guard))),
            Ok(None) => None,
            Err(err) => {
                drop(guard);
                Some((Err(cursor_failure(err)), None))
            }
        }
    })
}

/// Translates every document of `cursor` into a [`Record`].
///
/// A document that does not translate yields [`Error::Internal`]; the driver
/// stops pulling at the first error, which drops the stream and releases the
/// cursor.
pub fn stream_records<C>(cursor: C) -> RecordStream
where
    C: RecordCursor + 'static,
{
    cursor_stream(cursor)
        .map(|doc| doc.and_then(Record::from_document))
        .boxed()
}

fn cursor_failure(err: Error) -> Error {
    match err {
        Error::Internal { .. } => err,
        other => Error::internal(format!("Error while reading from cursor: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CallShape, Deadline,
        driver::server_stream,
        loopback,
        store::{ObjectId, RecordFields},
    };
    use core::time::Duration;
    use portable_atomic::{AtomicUsize, Ordering};
    use serde_json::json;
    use std::{collections::VecDeque, sync::Arc};

    /// A cursor replaying a fixed script, optionally pausing before each pull.
    struct ScriptedCursor {
        script: VecDeque<Result<Option<Document>>>,
        delay: Option<Duration>,
        releases: Arc<AtomicUsize>,
    }

    impl ScriptedCursor {
        fn new(script: Vec<Result<Option<Document>>>) -> (Self, Arc<AtomicUsize>) {
            let releases = Arc::new(AtomicUsize::new(0));
            let cursor = Self {
                script: script.into(),
                delay: None,
                releases: Arc::clone(&releases),
            };
            (cursor, releases)
        }
    }

    impl RecordCursor for ScriptedCursor {
        async fn next(&mut self) -> Result<Option<Document>> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.script.pop_front().unwrap_or(Ok(None))
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn record(title: &str) -> Record {
        Record::new(
            ObjectId::generate(),
            RecordFields {
                author_id: "ada".into(),
                title: title.into(),
                content: String::new(),
            },
        )
    }

    fn doc(record: &Record) -> Result<Option<Document>> {
        Ok(Some(record.to_document().unwrap()))
    }

    #[tokio::test]
    async fn exhaustion_yields_all_and_releases_once() {
        let (a, b) = (record("a"), record("b"));
        let (cursor, releases) = ScriptedCursor::new(vec![doc(&a), doc(&b)]);
        let out: Vec<_> = stream_records(cursor).collect().await;
        assert_eq!(out, vec![Ok(a), Ok(b)]);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cursor_error_is_internal_and_ends_stream() {
        let a = record("a");
        let (cursor, releases) = ScriptedCursor::new(vec![
            doc(&a),
            Err(Error::Transport {
                context: "connection reset".into(),
            }),
            doc(&record("never")),
        ]);
        let out: Vec<_> = cursor_stream(cursor).collect().await;
        assert_eq!(out.len(), 2);
        assert!(matches!(&out[1], Err(Error::Internal { context }) if context.contains("connection reset")));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn translation_failure_aborts_the_server_stream() {
        let a = record("a");
        let (cursor, releases) = ScriptedCursor::new(vec![
            doc(&a),
            Ok(Some(json!({ "_id": "bogus" }))),
            doc(&record("never")),
        ]);
        let (caller, server) = loopback::<(), Record>(CallShape::ServerStream, 4, None);
        let producer = tokio::spawn(server_stream::drive(server.outbound, stream_records(cursor)));

        let mut seen = Vec::new();
        let out = server_stream::collect(caller.inbound, |r: &Record| seen.push(r.clone())).await;
        assert!(matches!(out, Err(Error::Internal { .. })));
        assert_eq!(seen, vec![a]);
        assert!(producer.await.unwrap().is_err());
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_mid_stream_releases_cursor() {
        let (mut cursor, releases) =
            ScriptedCursor::new((0..10).map(|i| doc(&record(&i.to_string()))).collect());
        cursor.delay = Some(Duration::from_secs(1));

        let deadline = Deadline::after(Duration::from_millis(3500));
        let (caller, server) = loopback::<(), Record>(CallShape::ServerStream, 4, Some(deadline));
        let producer = tokio::spawn(server_stream::drive(server.outbound, stream_records(cursor)));

        let out = server_stream::collect(caller.inbound, |_| {}).await;
        assert_eq!(out, Err(Error::DeadlineExceeded));
        assert_eq!(producer.await.unwrap(), Err(Error::DeadlineExceeded));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn caller_going_away_releases_cursor() {
        let (cursor, releases) =
            ScriptedCursor::new((0..10).map(|i| doc(&record(&i.to_string()))).collect());
        let (caller, server) = loopback::<(), Record>(CallShape::ServerStream, 1, None);
        drop(caller);
        let out = server_stream::drive(server.outbound, stream_records(cursor)).await;
        assert_eq!(out, Err(Error::Cancelled));
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dropping_an_unfinished_stream_releases_cursor() {
        let (cursor, releases) = ScriptedCursor::new(vec![doc(&record("a")), doc(&record("b"))]);
        let mut stream = stream_records(cursor);
        assert!(stream.next().await.is_some());
        assert_eq!(releases.load(Ordering::SeqCst), 0);
        drop(stream);
        assert_eq!(releases.load(Ordering::SeqCst), 1);
    }
}
