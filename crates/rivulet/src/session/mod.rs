//! Call sessions.
//!
//! A [`CallSession`] represents one active invocation as seen from one end
//! (caller or server). It owns:
//!
//! - the [`CallShape`] fixing how many units flow in each direction,
//! - the direction flags ([`DirectionState`]), which only move toward closed,
//! - a [`Supervisor`] carrying the deadline and cancellation token.
//!
//! The session hands out one [`Inbound`] and one [`Outbound`] path bound to its
//! state. The paths are independently closable: half-closing the send path
//! never closes the receive path and vice versa. The session is fully closed
//! once both directions are closed or a terminal status was emitted.
//!
//! ## Submodules
//!
//! - [`path`] - The inbound and outbound paths.
//! - [`shape`] - Call shapes and roles.
//! - [`state`] - Direction state machine.

mod path;
mod shape;
mod state;


pub use path::{Inbound, Outbound, UnitStream};
pub use shape::{CallShape, Role};
pub use state::DirectionState;

use crate::{Deadline, Result, Supervisor};
use futures::Stream;
use state::SessionState;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One end of an active call.
#[derive(Debug)]
pub struct CallSession {
    shape: CallShape,
    role: Role,
    state: Arc<SessionState>,
    supervisor: Supervisor,
}

impl CallSession {
    /// Opens the server end of a call that was just accepted.
    pub fn accept(shape: CallShape, supervisor: Supervisor) -> Self {
        Self::open(shape, Role::Server, supervisor)
    }

    /// Opens the caller end of a call.
    pub fn initiate(shape: CallShape, supervisor: Supervisor) -> Self {
        Self::open(shape, Role::Caller, supervisor)
    }

    fn open(shape: CallShape, role: Role, supervisor: Supervisor) -> Self {
        Self {
            shape,
            role,
            state: Arc::new(SessionState::default()),
            supervisor,
        }
    }

    pub const fn shape(&self) -> CallShape {
        self.shape
    }

    pub const fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> DirectionState {
        self.state.get()
    }

    pub fn is_closed(&self) -> bool {
        self.state.get() == DirectionState::Closed
    }

    pub const fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Binds a transport's inbound units to this session's receive path.
    pub fn inbound<T, S>(&self, units: S) -> Inbound<T>
    where
        S: Stream<Item = Result<T>> + Send + 'static,
    {
        Inbound::new(
            Box::pin(units),
            self.role.receives_stream(self.shape),
            Arc::clone(&self.state),
            self.supervisor.clone(),
        )
    }

    /// Binds a transport's outbound channel to this session's send path.
    pub fn outbound<T>(&self, tx: mpsc::Sender<Result<T>>) -> Outbound<T> {
        Outbound::new(
            tx,
            self.role.sends_stream(self.shape),
            Arc::clone(&self.state),
            self.supervisor.clone(),
        )
    }

    /// Records that the single request of a unary or server-streaming call was
    /// delivered out of band, half-closing the receive path.
    pub fn request_received(&self) -> DirectionState {
        self.state.close_recv()
    }

    /// Records that the terminal status was emitted. Every later send or
    /// receive on this session fails with `SessionClosed`.
    pub fn finish(&self) -> DirectionState {
        self.state.close()
    }

    /// Cancels the session, waking every loop blocked on it.
    pub fn cancel(&self) {
        self.supervisor.cancel();
    }
}

/// One end of a connected in-process session: the session itself plus its
/// send and receive paths.
pub struct Endpoint<Tx, Rx> {
    pub session: CallSession,
    pub outbound: Outbound<Tx>,
    pub inbound: Inbound<Rx>,
}

/// Builds a connected caller/server pair over bounded in-process channels.
///
/// Both ends share the same absolute deadline but own separate cancellation
/// tokens: closing or dropping one end is observed by the other through its
/// channels, exactly as a disconnect would be over a real transport.
pub fn loopback<Req, Resp>(
    shape: CallShape,
    capacity: usize,
    deadline: Option<Deadline>,
) -> (Endpoint<Req, Resp>, Endpoint<Resp, Req>)
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let capacity = capacity.max(1);
    let (req_tx, req_rx) = mpsc::channel(capacity);
    let (resp_tx, resp_rx) = mpsc::channel(capacity);

    let caller = CallSession::initiate(shape, Supervisor::new(deadline));
    let server = CallSession::accept(shape, Supervisor::new(deadline));

    let caller = Endpoint {
        outbound: caller.outbound(req_tx),
        inbound: caller.inbound(ReceiverStream::new(resp_rx)),
        session: caller,
    };
    let server = Endpoint {
        outbound: server.outbound(resp_tx),
        inbound: server.inbound(ReceiverStream::new(req_rx)),
        session: server,
    };
    (caller, server)
}
