//! Generates the tonic client and server bindings for every schema under
//! `proto/`, plus one file descriptor set covering all of them for the
//! reflection service.
//!
//! Generated code is reachable as:
//!
//! ```rust,ignore
//! pub mod calculator {
//!     tonic::include_proto!("calculator");
//! }
//! ```
//!
//! `protoc` must be on the `PATH`.

use std::env;
use std::path::PathBuf;

const PROTOS: &[&str] = &[
    "proto/calculator.proto",
    "proto/greet.proto",
    "proto/blog.proto",
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let out_dir = PathBuf::from(env::var("OUT_DIR")?);
    let descriptor_path = out_dir.join("rivulet_descriptor.bin");

    for proto in PROTOS {
        println!("cargo:rerun-if-changed={proto}");
    }

    let mut config = tonic_prost_build::Config::new();
    config.file_descriptor_set_path(&descriptor_path);

    tonic_prost_build::configure().compile_with_config(config, PROTOS, &["proto"])?;
    Ok(())
}
