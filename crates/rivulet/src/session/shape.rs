use core::fmt;

/// The cardinality and direction of units exchanged by one call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// One request, one response or one error.
    Unary,
    /// One request, zero or more responses then end-of-stream or an error.
    ServerStream,
    /// Zero or more requests closed by the caller, then one response or one
    /// error.
    ClientStream,
    /// Requests and responses interleave; each side closes its own direction.
    BidiStream,
}

impl CallShape {
    /// Whether the caller may send more than one request unit.
    pub const fn requests_are_stream(self) -> bool {
        matches!(self, Self::ClientStream | Self::BidiStream)
    }

    /// Whether the server may send more than one response unit.
    pub const fn responses_are_stream(self) -> bool {
        matches!(self, Self::ServerStream | Self::BidiStream)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ServerStream => "server_stream",
            Self::ClientStream => "client_stream",
            Self::BidiStream => "bidi_stream",
        }
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which end of the call a session represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// Initiated the call; sends requests and receives responses.
    Caller,
    /// Accepted the call; receives requests and sends responses.
    Server,
}

impl Role {
    /// Whether this end's send path carries more than one unit.
    pub const fn sends_stream(self, shape: CallShape) -> bool {
        match self {
            Self::Caller => shape.requests_are_stream(),
            Self::Server => shape.responses_are_stream(),
        }
    }

    /// Whether this end's receive path carries more than one unit.
    pub const fn receives_stream(self, shape: CallShape) -> bool {
        match self {
            Self::Caller => shape.responses_are_stream(),
            Self::Server => shape.requests_are_stream(),
        }
    }
}
