use core::fmt;
use portable_atomic::{AtomicU8, Ordering};

const SEND_CLOSED: u8 = 0b01;
const RECV_CLOSED: u8 = 0b10;
const CLOSED: u8 = SEND_CLOSED | RECV_CLOSED;

/// Open/closed status of the two directions of a session, as seen from one
/// end.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DirectionState {
    Open,
    HalfClosedSend,
    HalfClosedRecv,
    Closed,
}

impl DirectionState {
    const fn from_bits(bits: u8) -> Self {
        match bits & CLOSED {
            0 => Self::Open,
            SEND_CLOSED => Self::HalfClosedSend,
            RECV_CLOSED => Self::HalfClosedRecv,
            _ => Self::Closed,
        }
    }

    pub const fn can_send(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedRecv)
    }

    pub const fn can_recv(self) -> bool {
        matches!(self, Self::Open | Self::HalfClosedSend)
    }
}

impl fmt::Display for DirectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Open => "open",
            Self::HalfClosedSend => "half-closed (send)",
            Self::HalfClosedRecv => "half-closed (recv)",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Shared direction flags of one session end.
///
/// Flags are only ever set, never cleared, so every transition moves toward
/// [`DirectionState::Closed`].
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    bits: AtomicU8,
}

impl SessionState {
    pub(crate) fn get(&self) -> DirectionState {
        DirectionState::from_bits(self.bits.load(Ordering::Acquire))
    }

    pub(crate) fn close_send(&self) -> DirectionState {
        self.set(SEND_CLOSED)
    }

    pub(crate) fn close_recv(&self) -> DirectionState {
        self.set(RECV_CLOSED)
    }

    /// Closes both directions; used when a terminal status is emitted or
    /// observed.
    pub(crate) fn close(&self) -> DirectionState {
        self.set(CLOSED)
    }

    fn set(&self, flag: u8) -> DirectionState {
        let prev = self.bits.fetch_or(flag, Ordering::AcqRel);
        DirectionState::from_bits(prev | flag)
    }
}
