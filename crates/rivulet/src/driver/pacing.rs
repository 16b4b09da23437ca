use core::time::Duration;
use futures::{Stream, StreamExt, stream};

/// Yields `units` in order, waiting `pace` between consecutive units.
///
/// The first unit is yielded immediately and nothing is awaited after the
/// last one, so `n` units take `(n - 1) * pace`. `None` or a zero pace yields
/// everything without waiting.
///
/// The waits are plain timer sleeps; callers race the returned stream against
/// their session supervisor.
pub fn paced<I>(units: I, pace: Option<Duration>) -> impl Stream<Item = I::Item>
where
    I: IntoIterator,
{
    let pace = pace.filter(|pace| !pace.is_zero());
    stream::iter(units)
        .enumerate()
        .then(move |(idx, unit)| async move {
            if let Some(pace) = pace.filter(|_| idx > 0) {
                tokio::time::sleep(pace).await;
            }
            unit
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn waits_only_between_units() {
        let start = Instant::now();
        let mut arrivals = Vec::new();
        let mut units = core::pin::pin!(paced(["a", "b", "c"], Some(Duration::from_millis(300))));
        while let Some(unit) = units.next().await {
            arrivals.push((unit, start.elapsed()));
        }
        assert_eq!(
            arrivals,
            vec![
                ("a", Duration::ZERO),
                ("b", Duration::from_millis(300)),
                ("c", Duration::from_millis(600)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn unpaced_yields_immediately() {
        let start = Instant::now();
        let units: Vec<_> = paced(1..=5, None).collect().await;
        assert_eq!(units, vec![1, 2, 3, 4, 5]);
        let zero: Vec<_> = paced(1..=5, Some(Duration::ZERO)).collect().await;
        assert_eq!(zero.len(), 5);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
