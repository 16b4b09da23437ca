//! Types shared by the server and client binaries.
//!
//! ## Submodules
//!
//! - [`convert`] - Wire message to engine type conversions.
//! - [`error`] - Transport error type and status mapping.
//! - [`streaming`] - Adapters between tonic streams and session paths.
//! - [`timeout`] - `grpc-timeout` header parsing.
//! - [`proto`] - Generated bindings.

pub mod convert;
pub mod error;
pub mod streaming;
pub mod timeout;

pub use error::{Error, Result};

/// Generated messages and services.
pub mod proto {
    /// `calculator.CalculatorService`: every call shape over integers.
    pub mod calculator {
        tonic::include_proto!("calculator");
    }

    /// `greet.GreetService`: greetings, including the deadline-aware call.
    pub mod greet {
        tonic::include_proto!("greet");
    }

    /// `blog.BlogService`: record management and listing.
    pub mod blog {
        tonic::include_proto!("blog");
    }

    /// Encoded descriptors of all three packages, for the reflection service.
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("rivulet_descriptor");
}
