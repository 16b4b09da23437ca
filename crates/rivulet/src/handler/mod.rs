//! Computation handlers invoked by the stream drivers.
//!
//! Stateless computations are plain functions. Per-session state lives in an
//! explicit aggregate struct that the driver owns for the lifetime of one
//! session, so concurrent sessions never share it.
//!
//! - [`arithmetic`] - Sum, square root, prime factors, running maximum and
//!   incremental average.
//! - [`greeting`] - Greeting composition and its streaming variants.
//! - [`records`] - Record management over an injected [`RecordStore`].
//!
//! [`RecordStore`]: crate::store::RecordStore

pub mod arithmetic;
pub mod greeting;
pub mod records;
