//! gRPC service implementations.
//!
//! Each handler translates between wire messages and engine units and picks
//! the driver matching its RPC's call shape; the engine does the rest. All
//! handlers of one server share a single [`CallHost`] for admission,
//! accounting and shutdown.
//!
//! ## Structure
//!
//! - [`calculator`] - `calculator.CalculatorService`.
//! - [`greet`] - `greet.GreetService`.
//! - [`blog`] - `blog.BlogService`.

pub mod blog;
pub mod calculator;
pub mod greet;

use crate::server::{config::ServerConfig, host::CallHost};
use blog::BlogHandler;
use calculator::CalculatorHandler;
use greet::{GreetHandler, GreetSettings};
use rivulet::{handler::records::RecordService, store::MemoryStore};
use rivulet_tonic_core::proto::{
    blog::blog_service_server::BlogServiceServer,
    calculator::calculator_service_server::CalculatorServiceServer,
    greet::greet_service_server::GreetServiceServer,
};
use tonic::codec::CompressionEncoding;

/// Offers and accepts every compression the transport supports.
macro_rules! compressed {
    ($server:expr) => {
        $server
            .send_compressed(CompressionEncoding::Zstd)
            .send_compressed(CompressionEncoding::Gzip)
            .send_compressed(CompressionEncoding::Deflate)
            .accept_compressed(CompressionEncoding::Zstd)
            .accept_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Deflate)
    };
}

/// Every service of one server.
#[derive(Clone, Debug)]
pub struct Services {
    pub host: CallHost,
    pub calculator: CalculatorHandler,
    pub greet: GreetHandler,
    pub blog: BlogHandler,
}

impl Services {
    pub fn new(config: &ServerConfig, store: MemoryStore) -> Self {
        let host = CallHost::new(config.default_deadline, config.shutdown_timeout);
        let buffer = config.stream_buffer_size;
        let settings = GreetSettings {
            repeat: config.greet_repeat,
            pace: config.greet_pace,
            everyone_delay: config.greet_everyone_delay,
            workload: config.deadline_greet,
        };

        Self {
            calculator: CalculatorHandler::new(host.clone(), buffer),
            greet: GreetHandler::new(host.clone(), buffer, settings),
            blog: BlogHandler::new(
                host.clone(),
                buffer,
                RecordService::new(store, config.store_timeout),
            ),
            host,
        }
    }

    pub fn calculator_server(&self) -> CalculatorServiceServer<CalculatorHandler> {
        compressed!(CalculatorServiceServer::new(self.calculator.clone()))
    }

    pub fn greet_server(&self) -> GreetServiceServer<GreetHandler> {
        compressed!(GreetServiceServer::new(self.greet.clone()))
    }

    pub fn blog_server(&self) -> BlogServiceServer<BlogHandler> {
        compressed!(BlogServiceServer::new(self.blog.clone()))
    }
}
