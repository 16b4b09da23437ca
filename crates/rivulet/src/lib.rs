#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

pub mod deadline;
pub mod driver;
mod error;
pub mod handler;
pub mod session;
pub mod store;

pub use crate::deadline::{Deadline, SleepProvider, Supervisor, TokioSleep, TokioYield};
pub use crate::error::{Code, Error, Result};
pub use crate::session::{
    CallSession, CallShape, DirectionState, Endpoint, Inbound, Outbound, Role, loopback,
};
