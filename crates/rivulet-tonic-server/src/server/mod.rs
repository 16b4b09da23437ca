//! The gRPC host: configuration, call admission, services and telemetry.
//!
//! ## Structure
//!
//! - [`config`] - CLI and environment configuration.
//! - [`host`] - Admission, in-flight accounting and graceful drain.
//! - [`service`] - The calculator, greet and blog services.
//! - [`streaming`] - Glue between driven sessions and tonic responses.
//! - [`telemetry`] - Tracing and metrics exporters.

pub mod config;
pub mod host;
pub mod service;
pub mod streaming;
pub mod telemetry;

#[cfg(test)]
mod tests;

use crate::server::{
    host::CallHost,
    service::{
        Services, blog::BlogHandler, calculator::CalculatorHandler, greet::GreetHandler,
    },
};
use core::future::Future;
use futures::Stream;
use rivulet_tonic_core::proto::{
    FILE_DESCRIPTOR_SET, blog::blog_service_server::BlogServiceServer,
    calculator::calculator_service_server::CalculatorServiceServer,
    greet::greet_service_server::GreetServiceServer,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tonic::transport::{Server, ServerTlsConfig, server::Connected};
use tonic_health::server::HealthReporter;
use tonic_reflection::server::Builder;
use tonic_web::GrpcWebLayer;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};

/// Serves every service on `incoming` until `signal` resolves, then drains.
///
/// After the signal the health service reports `NOT_SERVING`, new calls are
/// refused with `UNAVAILABLE`, and in-flight calls get the configured grace
/// period before they are cancelled.
pub async fn serve_with_incoming<I, IO, IE, F>(
    services: Services,
    tls: Option<ServerTlsConfig>,
    incoming: I,
    signal: F,
) -> anyhow::Result<()>
where
    I: Stream<Item = Result<IO, IE>>,
    IO: AsyncRead + AsyncWrite + Connected + Unpin + Send + 'static,
    IO::ConnectInfo: Clone + Send + Sync + 'static,
    IE: Into<tower::BoxError>,
    F: Future<Output = ()>,
{
    let (health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<CalculatorServiceServer<CalculatorHandler>>()
        .await;
    health_reporter
        .set_serving::<GreetServiceServer<GreetHandler>>()
        .await;
    health_reporter
        .set_serving::<BlogServiceServer<BlogHandler>>()
        .await;

    let reflection = Builder::configure()
        .register_encoded_file_descriptor_set(FILE_DESCRIPTOR_SET)
        .build_v1()?;

    let mut builder = Server::builder();
    if let Some(tls) = tls {
        builder = builder.tls_config(tls)?;
    }

    builder
        .accept_http1(true)
        .http2_adaptive_window(Some(true))
        .layer(
            ServiceBuilder::new()
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                )
                .layer(GrpcWebLayer::new()),
        )
        .add_service(health_service)
        .add_service(reflection)
        .add_service(services.calculator_server())
        .add_service(services.greet_server())
        .add_service(services.blog_server())
        .serve_with_incoming_shutdown(
            incoming,
            drain_on(signal, services.host.clone(), health_reporter),
        )
        .await?;

    #[cfg(feature = "tracing")]
    tracing::info!("Service shut down successfully");
    Ok(())
}

async fn drain_on<F: Future<Output = ()>>(signal: F, host: CallHost, health_reporter: HealthReporter) {
    signal.await;

    #[cfg(feature = "tracing")]
    tracing::info!("Shutdown signal received, terminating gracefully...");

    // 1. Publish the status
    health_reporter
        .set_not_serving::<CalculatorServiceServer<CalculatorHandler>>()
        .await;
    health_reporter
        .set_not_serving::<GreetServiceServer<GreetHandler>>()
        .await;
    health_reporter
        .set_not_serving::<BlogServiceServer<BlogHandler>>()
        .await;

    // 2. Drain, then cancel what is left
    host.shutdown().await;
}
