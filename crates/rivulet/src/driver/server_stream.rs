use crate::{Error, Inbound, Outbound, Result};
use futures::{Stream, StreamExt};

/// Streams a lazy, finite source to the caller one unit at a time.
///
/// The next unit is only pulled from `source` after the previous one was
/// accepted by the transport, so a pull-based source (such as a store cursor)
/// is never buffered in full. Both the pull and the send are raced against the
/// session supervisor.
///
/// # Termination
///
/// - Source exhausted: the send path is closed cleanly and the number of units
///   sent is returned.
/// - Source error, expiry, cancellation or send failure: remaining units are
///   not pulled, the error is emitted as the terminal status, and returned.
///   Units already sent stay valid.
///
/// `source` is dropped before this returns on every path, which releases any
/// resource it holds.
pub async fn drive<T, S>(mut outbound: Outbound<T>, source: S) -> Result<usize>
where
    T: Send + 'static,
    S: Stream<Item = Result<T>>,
{
    let supervisor = outbound.supervisor().clone();
    let mut source = Box::pin(source);
    let mut sent = 0;

    let outcome = loop {
        let next = match supervisor.guard(source.next()).await {
            Ok(next) => next,
            Err(err) => break Err(err),
        };

        match next {
            Some(Ok(unit)) => {
                if let Err(err) = outbound.send(unit).await {
                    break Err(err);
                }
                sent += 1;
            }
            Some(Err(err)) => break Err(err),
            None => break Ok(sent),
        }
    };

    drop(source);

    match outcome {
        Ok(sent) => {
            outbound.close();
            #[cfg(feature = "tracing")]
            tracing::debug!("server stream completed after {sent} units");
            Ok(sent)
        }
        Err(err) => {
            #[cfg(feature = "tracing")]
            tracing::debug!("server stream aborted after {sent} units: {err}");
            outbound.fail(err.clone());
            Err(err)
        }
    }
}

/// Drains a server stream from the caller end until end-of-stream, invoking
/// `on_unit` for every unit as it arrives.
///
/// Returns every unit received. A terminal error from the server is returned
/// as-is; units received before it were already passed to `on_unit`.
pub async fn collect<T, F>(mut inbound: Inbound<T>, mut on_unit: F) -> Result<Vec<T>>
where
    F: FnMut(&T),
{
    let mut units = Vec::new();
    while let Some(unit) = inbound.recv().await? {
        on_unit(&unit);
        units.push(unit);
    }
    Ok(units)
}

/// Turns a fallible iterator of units into a source for [`drive`].
pub fn from_iter<I, T>(units: I) -> impl Stream<Item = Result<T>>
where
    I: IntoIterator<Item = T>,
{
    futures::stream::iter(units.into_iter().map(Ok::<T, Error>))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CallShape, Deadline, handler::arithmetic, loopback};
    use core::time::Duration;
    use futures::stream;

    #[tokio::test]
    async fn streams_prime_factors_in_order() {
        let (caller, server) = loopback::<i64, i64>(CallShape::ServerStream, 2, None);
        let producer = tokio::spawn(drive(
            server.outbound,
            from_iter(arithmetic::prime_factors(12)),
        ));
        let factors = collect(caller.inbound, |_| {}).await.unwrap();
        assert_eq!(factors, vec![2, 2, 3]);
        assert_eq!(producer.await.unwrap(), Ok(3));
    }

    #[tokio::test]
    async fn empty_source_closes_cleanly() {
        let (caller, server) = loopback::<i64, i64>(CallShape::ServerStream, 1, None);
        let producer = tokio::spawn(drive(server.outbound, from_iter(arithmetic::prime_factors(1))));
        assert_eq!(collect(caller.inbound, |_| {}).await, Ok(vec![]));
        assert_eq!(producer.await.unwrap(), Ok(0));
    }

    #[tokio::test]
    async fn mid_stream_error_keeps_sent_units() {
        let (caller, server) = loopback::<u32, u32>(CallShape::ServerStream, 4, None);
        let source = stream::iter(vec![
            Ok(1),
            Ok(2),
            Err(Error::internal("cursor failed")),
            Ok(3),
        ]);
        let producer = tokio::spawn(drive(server.outbound, source));

        let mut seen = Vec::new();
        let out = collect(caller.inbound, |unit| seen.push(*unit)).await;
        assert_eq!(out, Err(Error::internal("cursor failed")));
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(
            producer.await.unwrap(),
            Err(Error::internal("cursor failed"))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_source_stops_at_deadline() {
        let deadline = Deadline::after(Duration::from_millis(2500));
        let (caller, server) = loopback::<u32, u32>(CallShape::ServerStream, 4, Some(deadline));
        let source = stream::iter(0..10).then(|i| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok(i)
        });
        let producer = tokio::spawn(drive(server.outbound, source));

        let mut seen = Vec::new();
        let out = collect(caller.inbound, |unit| seen.push(*unit)).await;
        assert_eq!(out, Err(Error::DeadlineExceeded));
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(producer.await.unwrap(), Err(Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn caller_going_away_stops_production() {
        let (caller, server) = loopback::<u32, u32>(CallShape::ServerStream, 1, None);
        drop(caller);
        let out = drive(server.outbound, from_iter(0..u32::MAX)).await;
        assert_eq!(out, Err(Error::Cancelled));
    }
}
