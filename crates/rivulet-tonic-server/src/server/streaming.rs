//! Glue between admitted sessions and tonic responses.
//!
//! Single-response calls (unary, client stream) run their driver inline and
//! finish with [`reply`]. Streaming-response calls (server stream, bidi) run
//! their driver on a dedicated task with [`spawn_streaming`]; the driver
//! writes into the session's outbound path and tonic reads the other end of
//! that channel as the response stream. Dropping the response stream (the
//! caller went away) closes the channel, which the driver observes as
//! `Cancelled` on its next send.

use crate::server::{host::CallTicket, telemetry::increment_units_sent};
use core::{future::Future, pin::Pin};
use futures::{Stream, TryStreamExt};
use rivulet_tonic_core::{Error, streaming::response_units};
use tokio::sync::mpsc;
use tonic::{Response, Status};

/// Response stream type shared by every streaming RPC.
pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

/// Finishes a single-response call.
pub fn reply<T>(ticket: CallTicket, outcome: rivulet::Result<T>) -> Result<Response<T>, Status> {
    ticket.finish(&outcome);
    outcome
        .map(Response::new)
        .map_err(|err| Status::from(Error::from(err)))
}

/// Runs `driver` on its own task and returns the response stream it feeds.
///
/// `rx` is the receiving half of the channel behind the session's outbound
/// path; every unit is converted to its wire message with `map`. The ticket
/// is held by the task, so the call stays in flight until the driver is done.
pub fn spawn_streaming<U, T, O, M, F>(
    ticket: CallTicket,
    rx: mpsc::Receiver<rivulet::Result<U>>,
    map: M,
    driver: F,
) -> Response<ResponseStream<T>>
where
    U: Send + 'static,
    T: Send + 'static,
    M: FnMut(U) -> T + Send + 'static,
    F: Future<Output = rivulet::Result<O>> + Send + 'static,
{
    let method = ticket.method();
    let fut = async move {
        let outcome = driver.await;
        ticket.finish(&outcome);
    };
    #[cfg(feature = "tracing")]
    let fut = {
        use tracing::Instrument;
        let span = tracing::info_span!("streaming", method);
        fut.instrument(span)
    };

    tokio::spawn(fut);

    let stream = response_units(rx, map).inspect_ok(move |_| increment_units_sent(method));
    Response::new(Box::pin(stream))
}
