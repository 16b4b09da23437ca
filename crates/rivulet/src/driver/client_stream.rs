use super::pacing;
use crate::{Endpoint, Error, Inbound, Outbound, Result};
use core::time::Duration;
use futures::StreamExt;

/// A running aggregate folded over every inbound unit of one client-streaming
/// session.
///
/// An aggregate is created at session start, owned exclusively by the receive
/// loop, and consumed by [`Aggregate::finish`] exactly once, after the caller
/// closed its send path. It is dropped without finishing if the session ends
/// any other way.
pub trait Aggregate {
    type Unit;
    type Output;

    /// Folds one inbound unit into the aggregate.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the session with that status.
    fn update(&mut self, unit: Self::Unit) -> Result<()>;

    /// Produces the single final result.
    ///
    /// # Errors
    ///
    /// Implementations reject aggregates with no meaningful result, such as an
    /// average over zero units.
    fn finish(self) -> Result<Self::Output>;
}

/// Folds every inbound unit into `aggregate` until the caller closes its send
/// path, then returns the final result.
///
/// If the session expires, is cancelled, or receives a terminal error before
/// the caller closes, the aggregate is discarded and that error is returned:
/// no result is ever computed from a stream the caller did not finish.
pub async fn drive<A>(mut inbound: Inbound<A::Unit>, mut aggregate: A) -> Result<A::Output>
where
    A: Aggregate,
{
    let mut _received = 0_usize;
    while let Some(unit) = inbound.recv().await? {
        aggregate.update(unit)?;
        _received += 1;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("client stream closed by caller after {_received} units");

    aggregate.finish()
}

/// Serves one client-streaming call over a connected endpoint, sending exactly
/// one final response or one error.
pub async fn serve<A>(endpoint: Endpoint<A::Output, A::Unit>, aggregate: A) -> Result<()>
where
    A: Aggregate,
    A::Output: Send + 'static,
{
    let Endpoint {
        mut outbound,
        inbound,
        ..
    } = endpoint;

    match drive(inbound, aggregate).await {
        Ok(output) => outbound.send(output).await,
        Err(err) => {
            outbound.fail(err.clone());
            Err(err)
        }
    }
}

/// Caller end of a client-streaming call: sends `units` (optionally paced),
/// closes the send path, and awaits the single response.
///
/// The send path is only closed once every unit went out. If the caller
/// expires or fails first, that error is emitted as the terminal status of
/// the send path instead, so the server never finishes its aggregate over a
/// partial stream. If the server failed early its terminal status is
/// returned in preference to the resulting send error.
pub async fn call<T, R, I>(
    mut outbound: Outbound<T>,
    mut inbound: Inbound<R>,
    units: I,
    pace: Option<Duration>,
) -> Result<R>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
{
    let mut units = core::pin::pin!(pacing::paced(units, pace));
    let sent = loop {
        match outbound.supervisor().guard(units.next()).await {
            Ok(Some(unit)) => {
                if let Err(err) = outbound.send(unit).await {
                    break Err(err);
                }
            }
            Ok(None) => break Ok(()),
            Err(err) => break Err(err),
        }
    };

    if let Err(err) = sent {
        let status = inbound.take_terminal();
        outbound.fail(err.clone());
        return Err(status.unwrap_or(err));
    }
    outbound.close();

    match inbound.recv().await {
        Ok(Some(resp)) => Ok(resp),
        Ok(None) => Err(Error::internal("client stream ended without a response")),
        Err(err) => Err(err),
    }
}
