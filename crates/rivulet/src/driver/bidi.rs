use super::pacing;
use crate::{Endpoint, Error, Inbound, Outbound, Result};
use core::time::Duration;
use futures::StreamExt;
use tokio::sync::mpsc;

/// A running aggregate that answers every inbound unit with exactly one
/// outbound unit.
///
/// Only the receive loop of a session calls [`PairedAggregate::step`], so the
/// aggregate needs no synchronization.
pub trait PairedAggregate {
    type Unit;
    type Output;

    /// Folds `unit` into the aggregate and returns the paired outbound unit.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the session with that status.
    fn step(&mut self, unit: Self::Unit) -> Result<Self::Output>;
}

/// Tuning of the server end of a bidi session.
#[derive(Clone, Copy, Debug)]
pub struct BidiOptions {
    /// Simulated work before each reply, raced against the session deadline.
    pub reply_delay: Option<Duration>,
    /// Replies queued between the receive loop and the send loop.
    pub buffer: usize,
}

impl Default for BidiOptions {
    fn default() -> Self {
        Self {
            reply_delay: None,
            buffer: 16,
        }
    }
}

/// Serves one bidi session with a receive loop and a send loop running
/// concurrently.
///
/// The receive loop reads until end-of-stream, steps the aggregate, and hands
/// every paired reply to the send loop. The send loop delivers replies (after
/// the optional delay) as they become available. The session completes only
/// when both loops are done, so no reply triggered by an inbound unit is lost.
///
/// A failure in either loop cancels the session so the other loop wakes up;
/// the root cause is emitted as the single terminal status.
pub async fn serve<A>(
    endpoint: Endpoint<A::Output, A::Unit>,
    mut aggregate: A,
    options: BidiOptions,
) -> Result<()>
where
    A: PairedAggregate,
    A::Output: Send + 'static,
{
    let Endpoint {
        mut outbound,
        mut inbound,
        ..
    } = endpoint;
    let supervisor = outbound.supervisor().clone();
    let (tx, mut rx) = mpsc::channel::<A::Output>(options.buffer.max(1));

    let receive = async {
        let tx = tx;
        let mut _received = 0_usize;
        let res = loop {
            let unit = match inbound.recv().await {
                Ok(Some(unit)) => unit,
                Ok(None) => break Ok(()),
                Err(err) => break Err(err),
            };
            _received += 1;
            let reply = match aggregate.step(unit) {
                Ok(reply) => reply,
                Err(err) => break Err(err),
            };
            match supervisor.guard(tx.send(reply)).await {
                Ok(Ok(())) => {}
                // The send loop already stopped and reported why.
                Ok(Err(_)) => break Err(Error::Cancelled),
                Err(err) => break Err(err),
            }
        };
        if res.is_err() {
            supervisor.cancel();
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("bidi receive loop ended after {_received} units");
        res
    };

    let send = async {
        let mut _sent = 0_usize;
        let res = loop {
            let Some(reply) = rx.recv().await else {
                break Ok(());
            };
            if let Some(delay) = options.reply_delay {
                if let Err(err) = supervisor.sleep(delay).await {
                    break Err(err);
                }
            }
            if let Err(err) = outbound.send(reply).await {
                break Err(err);
            }
            _sent += 1;
        };
        if res.is_err() {
            rx.close();
            supervisor.cancel();
        }
        #[cfg(feature = "tracing")]
        tracing::debug!("bidi send loop ended after {_sent} replies");
        res
    };

    let (received, sent) = tokio::join!(receive, send);
    match combine(received, sent) {
        Ok(()) => {
            outbound.close();
            Ok(())
        }
        Err(err) => {
            outbound.fail(err.clone());
            Err(err)
        }
    }
}

/// Caller end of a bidi session.
///
/// One task sends `units` (optionally paced) and closes the send path when
/// done; the other drains every response until the server closes, passing
/// each to `on_response`. The call completes only when both are finished, so
/// responses still in flight after the last send are never dropped.
///
/// A send side that expires or fails emits its error as the terminal status
/// of the send path; only a send side that ran out of units closes it.
pub async fn call<T, R, I, F>(
    mut outbound: Outbound<T>,
    mut inbound: Inbound<R>,
    units: I,
    pace: Option<Duration>,
    mut on_response: F,
) -> Result<Vec<R>>
where
    T: Send + 'static,
    I: IntoIterator<Item = T>,
    F: FnMut(&R),
{
    let send = async {
        let mut units = core::pin::pin!(pacing::paced(units, pace));
        let res = loop {
            let next = match outbound.supervisor().guard(units.next()).await {
                Ok(next) => next,
                Err(err) => break Err(err),
            };
            let Some(unit) = next else {
                break Ok(());
            };
            if let Err(err) = outbound.send(unit).await {
                break Err(err);
            }
        };
        match &res {
            Ok(()) => outbound.close(),
            Err(err) => outbound.fail(err.clone()),
        }
        res
    };

    let drain = async {
        let mut responses = Vec::new();
        while let Some(resp) = inbound.recv().await? {
            on_response(&resp);
            responses.push(resp);
        }
        Ok::<_, Error>(responses)
    };

    let (sent, drained) = tokio::join!(send, drain);
    match (sent, drained) {
        (Ok(()), Ok(responses)) => Ok(responses),
        (_, Err(err)) | (Err(err), Ok(_)) => Err(err),
    }
}

/// Picks the root cause when both loops of a session stopped.
///
/// The receive error wins, unless it is only the echo of the send loop having
/// cancelled the session.
fn combine(received: Result<()>, sent: Result<()>) -> Result<()> {
    match (received, sent) {
        (Ok(()), Ok(())) => Ok(()),
        (Err(Error::Cancelled), Err(err)) => Err(err),
        (Err(err), _) | (Ok(()), Err(err)) => Err(err),
    }
}
