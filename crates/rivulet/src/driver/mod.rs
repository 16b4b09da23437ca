//! Shape-specific stream drivers.
//!
//! Each driver pumps units between a session's paths and a computation
//! handler, and guarantees that the session ends with exactly one terminal
//! status.
//!
//! ## Structure
//!
//! - [`unary`] - One request, one handler invocation, one response or error.
//! - [`server_stream`] - Pulls a lazy source one unit at a time and sends it.
//! - [`client_stream`] - Folds inbound units into an [`Aggregate`] until the
//!   caller closes, then produces a single result.
//! - [`bidi`] - Concurrent receive and send loops joined on completion, for
//!   both the server and caller ends.
//! - [`pacing`] - Fixed-interval pacing of outbound sequences.

pub mod bidi;
pub mod client_stream;
pub mod pacing;
pub mod server_stream;
pub mod unary;

pub use bidi::PairedAggregate;
pub use client_stream::Aggregate;
