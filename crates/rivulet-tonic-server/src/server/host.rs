//! Admission, accounting and graceful drain of calls.
//!
//! Every handler asks the [`CallHost`] to admit its call before doing any
//! work. Admission opens the server end of a [`CallSession`] whose supervisor
//! carries the effective deadline and a child of the host's shutdown token,
//! and hands out a [`CallTicket`] that keeps the call counted as in flight
//! until it is dropped.
//!
//! Shutdown runs in phases:
//!
//! 0. Refuse new calls with `UNAVAILABLE`.
//! 1. Wait (bounded) for in-flight calls to finish on their own.
//! 2. Cancel the shutdown token; every remaining session observes
//!    `Cancelled` and emits it as its terminal status.
//! 3. Wait briefly for those cancelled calls to deliver it.

use crate::server::telemetry::{
    decrement_calls_inflight, increment_call_errors, increment_calls, increment_calls_inflight,
    record_call_duration,
};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use rivulet::{CallSession, CallShape, Supervisor};
use rivulet_tonic_core::{Error, timeout::call_deadline};
use std::{sync::Arc, time::Instant};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tonic::Request;

const DRAIN_POLL: Duration = Duration::from_millis(100);
const CANCEL_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct HostState {
    accepting: AtomicBool,
    inflight: AtomicUsize,
    shutdown_token: CancellationToken,
}

/// Shared by every service of one server.
#[derive(Clone, Debug)]
pub struct CallHost {
    state: Arc<HostState>,
    default_deadline: Option<Duration>,
    shutdown_timeout: Duration,
}

/// A call that was let in: its session plus the ticket accounting for it.
pub struct Admission {
    pub session: CallSession,
    pub ticket: CallTicket,
}

impl CallHost {
    pub fn new(default_deadline: Option<Duration>, shutdown_timeout: Duration) -> Self {
        Self {
            state: Arc::new(HostState {
                accepting: AtomicBool::new(true),
                inflight: AtomicUsize::new(0),
                shutdown_token: CancellationToken::new(),
            }),
            default_deadline,
            shutdown_timeout,
        }
    }

    /// Admits one call of `shape`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServiceShutdown`] once shutdown has begun.
    pub fn admit<T>(
        &self,
        method: &'static str,
        shape: CallShape,
        request: &Request<T>,
    ) -> Result<Admission, Error> {
        // Counted before the check so a drain never misses a call that
        // slipped in.
        let ticket = CallTicket::new(Arc::clone(&self.state), method);
        if !self.state.accepting.load(Ordering::Acquire) {
            return Err(Error::ServiceShutdown);
        }

        let deadline = call_deadline(request, self.default_deadline);
        let supervisor = Supervisor::with_parent(deadline, &self.state.shutdown_token);
        increment_calls(method);

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "{method} admitted as {shape} with deadline in {:?}",
            deadline.map(|d| d.remaining())
        );

        Ok(Admission {
            session: CallSession::accept(shape, supervisor),
            ticket,
        })
    }

    /// Number of admitted calls that have not finished yet.
    pub fn inflight(&self) -> usize {
        self.state.inflight.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.state.accepting.load(Ordering::Acquire)
    }

    /// Gracefully stops every call. Idempotent.
    pub async fn shutdown(&self) {
        // === Phase 0: Stop accepting new calls ===
        #[cfg(feature = "tracing")]
        tracing::info!("Refusing new calls");
        self.state.accepting.store(false, Ordering::Release);

        // === Phase 1: Wait for in-flight calls to drain ===
        #[cfg(feature = "tracing")]
        tracing::info!("Draining in-flight calls ({} active)", self.inflight());
        match timeout(self.shutdown_timeout, self.drained()).await {
            Ok(()) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("All in-flight calls drained");
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Graceful drain timed out ({} calls still active)",
                    self.inflight()
                );
            }
        }

        // === Phase 2: Cancel whatever is left ===
        #[cfg(feature = "tracing")]
        tracing::debug!("Cancelling remaining calls via shutdown token");
        self.state.shutdown_token.cancel();

        // === Phase 3: Let cancelled calls deliver their status ===
        if timeout(CANCEL_GRACE, self.drained()).await.is_err() {
            #[cfg(feature = "tracing")]
            tracing::warn!("{} calls did not stop after cancellation", self.inflight());
        }

        #[cfg(feature = "tracing")]
        tracing::info!("Call host shutdown complete");
    }

    async fn drained(&self) {
        while self.inflight() > 0 {
            sleep(DRAIN_POLL).await;
        }
    }
}

/// Keeps one call counted as in flight until dropped.
#[derive(Debug)]
pub struct CallTicket {
    state: Arc<HostState>,
    method: &'static str,
    started: Instant,
}

impl CallTicket {
    fn new(state: Arc<HostState>, method: &'static str) -> Self {
        state.inflight.fetch_add(1, Ordering::AcqRel);
        increment_calls_inflight();
        Self {
            state,
            method,
            started: Instant::now(),
        }
    }

    pub const fn method(&self) -> &'static str {
        self.method
    }

    /// Records how the call ended and releases it.
    pub fn finish<T>(self, outcome: &rivulet::Result<T>) {
        if let Err(err) = outcome {
            increment_call_errors(self.method, err.code());
            #[cfg(feature = "tracing")]
            tracing::debug!("{} ended with {}: {err}", self.method, err.code());
        }
    }
}

impl Drop for CallTicket {
    fn drop(&mut self) {
        self.state.inflight.fetch_sub(1, Ordering::AcqRel);
        decrement_calls_inflight();
        record_call_duration(self.method, self.started.elapsed().as_secs_f64() * 1000.0);
    }
}
