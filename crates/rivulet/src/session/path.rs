//! The two directional paths of a call session.
//!
//! An [`Inbound`] reads units sent by the counterpart; an [`Outbound`] writes
//! units to it. Each path enforces the session contract on its own:
//!
//! - Using a closed path fails with [`Error::SessionClosed`] instead of
//!   blocking.
//! - Every wait is raced against the session [`Supervisor`], so expiry or
//!   cancellation wakes a blocked loop with the terminal error.
//! - A path carrying a single unit for its shape closes itself after that
//!   unit, so a second "final" response cannot be sent.
//! - A counterpart that went away surfaces as [`Error::Cancelled`] and cancels
//!   the session, waking the other loop.

use super::state::SessionState;
use crate::{Error, Result, Supervisor};
use core::pin::Pin;
use futures::{FutureExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};

/// Boxed stream of inbound units, as produced by a transport.
pub type UnitStream<T> = Pin<Box<dyn Stream<Item = Result<T>> + Send>>;

/// Receive path of one session end.
pub struct Inbound<T> {
    units: UnitStream<T>,
    streaming: bool,
    state: Arc<SessionState>,
    supervisor: Supervisor,
}

impl<T> Inbound<T> {
    pub(crate) fn new(
        units: UnitStream<T>,
        streaming: bool,
        state: Arc<SessionState>,
        supervisor: Supervisor,
    ) -> Self {
        Self {
            units,
            streaming,
            state,
            supervisor,
        }
    }

    /// Awaits the next inbound unit.
    ///
    /// Returns `Ok(None)` once the counterpart closes its send path; the
    /// receive path is then half-closed and further calls fail with
    /// [`Error::SessionClosed`].
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the receive path is already closed.
    /// - [`Error::DeadlineExceeded`] or [`Error::Cancelled`] if the session
    ///   expires or is cancelled while waiting.
    /// - Any terminal error the counterpart sent in place of a unit.
    pub async fn recv(&mut self) -> Result<Option<T>> {
        if !self.state.get().can_recv() {
            return Err(Error::SessionClosed {
                context: "receive path is closed",
            });
        }

        let next = self.supervisor.guard(self.units.next()).await;
        match next {
            Ok(Some(Ok(unit))) => {
                if !self.streaming {
                    self.state.close_recv();
                }
                Ok(Some(unit))
            }
            Ok(Some(Err(err))) => {
                // The counterpart ended the session with a terminal status.
                self.state.close();
                self.supervisor.cancel();
                Err(err)
            }
            Ok(None) => {
                self.state.close_recv();
                Ok(None)
            }
            Err(err) => {
                self.state.close();
                Err(err)
            }
        }
    }

    /// Takes the terminal status the counterpart already delivered, if it is
    /// the next item on the path. Never waits; a unit found instead is
    /// discarded.
    pub fn take_terminal(&mut self) -> Option<Error> {
        match self.units.next().now_or_never() {
            Some(Some(Err(err))) => {
                self.state.close();
                Some(err)
            }
            _ => None,
        }
    }

    /// Stops reading. Units the counterpart sends afterwards are discarded.
    pub fn close(&mut self) {
        self.state.close_recv();
    }

    pub fn is_open(&self) -> bool {
        self.state.get().can_recv()
    }

    pub const fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }
}

/// Send path of one session end.
pub struct Outbound<T> {
    tx: Option<mpsc::Sender<Result<T>>>,
    streaming: bool,
    state: Arc<SessionState>,
    supervisor: Supervisor,
}

impl<T> Outbound<T> {
    pub(crate) fn new(
        tx: mpsc::Sender<Result<T>>,
        streaming: bool,
        state: Arc<SessionState>,
        supervisor: Supervisor,
    ) -> Self {
        Self {
            tx: Some(tx),
            streaming,
            state,
            supervisor,
        }
    }

    /// Sends one unit, waiting for transport capacity.
    ///
    /// On a single-unit path the send path closes right after the unit is
    /// accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::SessionClosed`] if the send path is already closed.
    /// - [`Error::Cancelled`] if the counterpart is gone.
    /// - [`Error::DeadlineExceeded`] or [`Error::Cancelled`] if the session
    ///   expires or is cancelled while waiting for capacity.
    pub async fn send(&mut self, unit: T) -> Result<()> {
        let tx = self.open_sender()?;
        let sent = self.supervisor.guard(tx.send(Ok(unit))).await;
        match sent {
            Ok(Ok(())) => {
                if !self.streaming {
                    self.close();
                }
                Ok(())
            }
            Ok(Err(_)) => {
                self.tx = None;
                self.state.close();
                self.supervisor.cancel();
                Err(Error::Cancelled)
            }
            Err(err) => {
                // Keep the sender so the terminal status can still be
                // delivered through `fail`.
                self.state.close();
                Err(err)
            }
        }
    }

    /// Half-closes the send path; the counterpart observes end-of-stream.
    pub fn close(&mut self) {
        self.tx = None;
        self.state.close_send();
    }

    pub fn is_open(&self) -> bool {
        self.tx.is_some() && self.state.get().can_send()
    }

    pub const fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    fn open_sender(&self) -> Result<&mpsc::Sender<Result<T>>> {
        match &self.tx {
            Some(tx) if self.state.get().can_send() => Ok(tx),
            _ => Err(Error::SessionClosed {
                context: "send path is closed",
            }),
        }
    }
}

impl<T: Send + 'static> Outbound<T> {
    /// Emits `err` as the terminal status of this path and closes the whole
    /// session end.
    ///
    /// Delivery is best effort: if the counterpart is gone there is nobody to
    /// tell. When the transport buffer is full the error is handed to a
    /// detached task so that the failing loop is never blocked by a slow
    /// reader.
    pub fn fail(&mut self, err: Error) {
        self.state.close();
        let Some(tx) = self.tx.take() else {
            return;
        };

        match tx.try_send(Err(err)) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(item)) => {
                tokio::spawn(async move {
                    if let Err(_e) = tx.send(item).await {
                        #[cfg(feature = "tracing")]
                        tracing::debug!("terminal status not delivered: counterpart gone");
                    }
                });
            }
        }
    }
}

impl<T> Drop for Outbound<T> {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            self.state.close_send();
        }
    }
}
