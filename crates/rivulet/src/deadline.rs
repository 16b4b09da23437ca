//! Deadline supervision for call sessions.
//!
//! A [`Supervisor`] pairs an optional absolute [`Deadline`] with a
//! [`CancellationToken`]. Every suspension point in the engine (awaiting an
//! inbound unit, awaiting send capacity, simulated work) is raced against the
//! supervisor, so a session whose deadline passes or that gets cancelled wakes
//! up and reports a terminal status instead of hanging.
//!
//! Deadlines are measured on [`tokio::time::Instant`], which is monotonic and
//! can be paused in tests.

use crate::{Error, Result};
use core::{future::Future, pin::Pin, time::Duration};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// An absolute point on the monotonic clock after which a session is expired.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Deadline(Instant);

impl Deadline {
    /// A deadline `timeout` from now.
    pub fn after(timeout: Duration) -> Self {
        Self(Instant::now() + timeout)
    }

    pub const fn at(instant: Instant) -> Self {
        Self(instant)
    }

    pub const fn instant(&self) -> Instant {
        self.0
    }

    /// Time left before expiry, saturating at zero.
    pub fn remaining(&self) -> Duration {
        self.0.saturating_duration_since(Instant::now())
    }

    pub fn has_elapsed(&self) -> bool {
        Instant::now() >= self.0
    }

    /// The earlier of two optional deadlines. Used to combine a caller-chosen
    /// timeout with a server default.
    pub fn earliest(a: Option<Self>, b: Option<Self>) -> Option<Self> {
        match (a, b) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, None) => a,
            (None, b) => b,
        }
    }
}

/// A source of delays used for incremental work.
///
/// Work that runs in bounded increments sleeps through this trait between
/// checks, which keeps the polling logic independent of a specific timer.
pub trait SleepProvider {
    type Sleep: Future<Output = ()> + Send;

    fn sleep_for(dur: Duration) -> Self::Sleep;
}

/// An implementation of [`SleepProvider`] using Tokio's timer.
pub struct TokioSleep;
impl SleepProvider for TokioSleep {
    type Sleep = tokio::time::Sleep;

    fn sleep_for(dur: Duration) -> Self::Sleep {
        tokio::time::sleep(dur)
    }
}

/// An implementation of [`SleepProvider`] that yields to the scheduler instead
/// of waiting on a timer.
///
/// Useful for workloads measured in steps rather than wall time, where each
/// increment only needs to give the deadline check a chance to run.
pub struct TokioYield;
impl SleepProvider for TokioYield {
    /// Tokio's `yield_now()` returns a private future type, so we must use a
    /// boxed `dyn Future` to abstract over it.
    type Sleep = Pin<Box<dyn Future<Output = ()> + Send>>;

    fn sleep_for(_dur: Duration) -> Self::Sleep {
        Box::pin(tokio::task::yield_now())
    }
}

/// Deadline and cancellation state shared by every loop of one session.
///
/// Cloning a supervisor is cheap and every clone observes the same token, so
/// cancelling from any loop wakes all of them.
#[derive(Clone, Debug)]
pub struct Supervisor {
    deadline: Option<Deadline>,
    token: CancellationToken,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Supervisor {
    pub fn new(deadline: Option<Deadline>) -> Self {
        Self {
            deadline,
            token: CancellationToken::new(),
        }
    }

    /// Builds a supervisor whose token is a child of `parent`, so cancelling
    /// the parent (for example on host shutdown) cancels this session too.
    pub fn with_parent(deadline: Option<Deadline>, parent: &CancellationToken) -> Self {
        Self {
            deadline,
            token: parent.child_token(),
        }
    }

    pub const fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Explicitly cancels the session.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Returns the terminal error if the session is already expired or
    /// cancelled.
    ///
    /// An elapsed deadline also cancels the token so that every other loop of
    /// the session wakes up.
    pub fn check(&self) -> Result<()> {
        if self.deadline.is_some_and(|deadline| deadline.has_elapsed()) {
            self.token.cancel();
            return Err(Error::DeadlineExceeded);
        }
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Resolves once the session expires or gets cancelled, yielding the
    /// corresponding terminal error.
    pub async fn expired(&self) -> Error {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline.instant()) => {
                        self.token.cancel();
                    }
                }
            }
            None => self.token.cancelled().await,
        }
        self.cause()
    }

    /// Runs `fut` to completion unless the session expires or is cancelled
    /// first.
    ///
    /// Expiry wins ties: a future that becomes ready at the same poll as the
    /// deadline is discarded, so no successful result is reported after the
    /// deadline has passed.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output> {
        self.check()?;
        tokio::select! {
            biased;
            err = self.expired() => Err(err),
            out = fut => Ok(out),
        }
    }

    /// Sleeps for `dur`, waking early with the terminal error on expiry or
    /// cancellation.
    pub async fn sleep(&self, dur: Duration) -> Result<()> {
        self.guard(tokio::time::sleep(dur)).await
    }

    /// Performs `increments` units of simulated work, each lasting `step`,
    /// checking for expiry and cancellation at every increment boundary.
    ///
    /// Stops at the first boundary where the session is no longer live; the
    /// remaining increments are never started.
    pub async fn work_in_increments<S: SleepProvider>(
        &self,
        increments: u32,
        step: Duration,
    ) -> Result<()> {
        for _i in 0..increments {
            self.check()?;
            #[cfg(feature = "tracing")]
            tracing::trace!("work increment {_i}/{increments}");
            self.guard(S::sleep_for(step)).await?;
        }
        self.check()
    }

    fn cause(&self) -> Error {
        if self.deadline.is_some_and(|deadline| deadline.has_elapsed()) {
            Error::DeadlineExceeded
        } else {
            Error::Cancelled
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn earliest_prefers_the_tighter_deadline() {
        let short = Deadline::after(Duration::from_secs(1));
        let long = Deadline::after(Duration::from_secs(5));
        assert_eq!(Deadline::earliest(Some(long), Some(short)), Some(short));
        assert_eq!(Deadline::earliest(None, Some(long)), Some(long));
        assert_eq!(Deadline::earliest(Some(short), None), Some(short));
        assert_eq!(Deadline::earliest(None, None), None);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_returns_output_before_deadline() {
        let supervisor = Supervisor::new(Some(Deadline::after(Duration::from_secs(2))));
        let out = supervisor
            .guard(async {
                tokio::time::sleep(Duration::from_secs(1)).await;
                7
            })
            .await;
        assert_eq!(out, Ok(7));
    }

    #[tokio::test(start_paused = true)]
    async fn guard_reports_deadline_and_cancels_token() {
        let supervisor = Supervisor::new(Some(Deadline::after(Duration::from_millis(500))));
        let start = Instant::now();
        let out = supervisor.guard(std::future::pending::<()>()).await;
        assert_eq!(out, Err(Error::DeadlineExceeded));
        assert_eq!(start.elapsed(), Duration::from_millis(500));
        assert!(supervisor.is_cancelled());
        assert_eq!(supervisor.check(), Err(Error::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn explicit_cancel_wakes_guard() {
        let supervisor = Supervisor::new(None);
        let canceller = supervisor.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });
        let out = supervisor.guard(std::future::pending::<()>()).await;
        assert_eq!(out, Err(Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn parent_cancellation_reaches_session() {
        let host = CancellationToken::new();
        let supervisor = Supervisor::with_parent(None, &host);
        host.cancel();
        assert_eq!(supervisor.check(), Err(Error::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn increments_stop_at_first_boundary_past_deadline() {
        let supervisor = Supervisor::new(Some(Deadline::after(Duration::from_millis(1500))));
        let start = Instant::now();
        let out = supervisor
            .work_in_increments::<TokioSleep>(3, Duration::from_secs(1))
            .await;
        assert_eq!(out, Err(Error::DeadlineExceeded));
        // The second increment is interrupted mid-way, the third never starts.
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn increments_complete_within_deadline() {
        let supervisor = Supervisor::new(Some(Deadline::after(Duration::from_secs(5))));
        let start = Instant::now();
        supervisor
            .work_in_increments::<TokioSleep>(3, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(3));
    }

    #[tokio::test]
    async fn yield_provider_checks_every_step() {
        let supervisor = Supervisor::new(None);
        supervisor.cancel();
        let out = supervisor
            .work_in_increments::<TokioYield>(1_000, Duration::ZERO)
            .await;
        assert_eq!(out, Err(Error::Cancelled));
    }
}
