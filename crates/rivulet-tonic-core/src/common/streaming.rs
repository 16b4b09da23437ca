//! Adapters between tonic streams and call session paths.
//!
//! Sessions speak `rivulet::Result<T>` on both paths; tonic speaks
//! `Result<T, Status>` inbound and plain messages outbound. These functions
//! translate at the boundary so the drivers never see a transport type.
//!
//! Server side:
//! - [`inbound_units`] feeds a request [`Streaming`] into a session inbound
//!   path.
//! - [`response_units`] turns the receiving half of a session outbound path
//!   into a tonic response stream.
//!
//! Caller side:
//! - [`request_units`] turns the receiving half of a session outbound path
//!   into a tonic request stream.
//! - [`single_response`] and [`streamed_response`] feed a pending tonic call
//!   into a session inbound path.

use crate::error::{Error, engine_error};
use core::future::Future;
use futures::{Stream, StreamExt, TryStreamExt, future};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::task::AbortOnDropHandle;
use tonic::{Response, Status, Streaming};

/// Inbound units of a received stream. A status the counterpart sent in place
/// of a unit, or a broken connection, becomes the matching engine error.
pub fn inbound_units<T>(
    streaming: Streaming<T>,
) -> impl Stream<Item = rivulet::Result<T>> + Send + 'static
where
    T: Send + 'static,
{
    streaming.map_err(|status| engine_error(&status))
}

/// Response stream of a served call.
///
/// Every unit the session sends is converted with `map`; the terminal error,
/// if any, becomes the trailing status.
pub fn response_units<U, T, F>(
    rx: mpsc::Receiver<rivulet::Result<U>>,
    mut map: F,
) -> impl Stream<Item = Result<T, Status>> + Send + 'static
where
    U: Send + 'static,
    F: FnMut(U) -> T + Send + 'static,
{
    ReceiverStream::new(rx).map(move |unit| match unit {
        Ok(unit) => Ok(map(unit)),
        Err(err) => Err(Status::from(Error::from(err))),
    })
}

/// Request stream of an issued call.
///
/// The stream ends when the session closes its send path. A caller cannot
/// send a status, so after a terminal error the stream stays pending instead:
/// the counterpart never sees end-of-stream, and the call is reset once the
/// caller drops it.
pub fn request_units<T>(rx: mpsc::Receiver<rivulet::Result<T>>) -> impl Stream<Item = T> + Send + 'static
where
    T: Send + 'static,
{
    futures::stream::unfold(rx, |mut rx| async move {
        match rx.recv().await {
            Some(Ok(unit)) => Some((unit, rx)),
            Some(Err(_)) => future::pending().await,
            None => None,
        }
    })
}

/// Inbound path source for a call answered by a single response.
///
/// The call runs on its own task so that it keeps pulling the request stream
/// while the session is still sending, even though the response is only read
/// afterwards. Dropping the source aborts that task, which resets the call.
pub fn single_response<R, F>(call: F) -> impl Stream<Item = rivulet::Result<R>> + Send + 'static
where
    R: Send + 'static,
    F: Future<Output = Result<Response<R>, Status>> + Send + 'static,
{
    let handle = AbortOnDropHandle::new(tokio::spawn(call));
    futures::stream::once(async move {
        match handle.await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(engine_error(&status)),
            Err(join) => Err(rivulet::Error::internal(format!("call task failed: {join}"))),
        }
    })
}

/// Inbound path source for a call answered by a stream: waits for the
/// response headers, then yields every unit.
pub fn streamed_response<R, F>(call: F) -> impl Stream<Item = rivulet::Result<R>> + Send + 'static
where
    R: Send + 'static,
    F: Future<Output = Result<Response<Streaming<R>>, Status>> + Send + 'static,
{
    futures::stream::once(call)
        .map(|response| match response {
            Ok(response) => Ok(inbound_units(response.into_inner())),
            Err(status) => Err(engine_error(&status)),
        })
        .try_flatten()
}
