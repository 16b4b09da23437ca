//! `calculator.CalculatorService`: one RPC per call shape.

use crate::server::{
    host::{Admission, CallHost},
    streaming::{ResponseStream, reply, spawn_streaming},
};
use futures::TryStreamExt;
use rivulet::{
    CallShape, Endpoint,
    driver::{bidi, client_stream, server_stream, unary},
    handler::arithmetic::{self, Average, RunningMaximum},
};
use rivulet_tonic_core::{
    proto::calculator::{
        ComputeAverageRequest, ComputeAverageResponse, FindMaximumRequest, FindMaximumResponse,
        PrimeNumberDecompositionRequest, PrimeNumberDecompositionResponse, SquareRootRequest,
        SquareRootResponse, SumRequest, SumResponse, calculator_service_server::CalculatorService,
    },
    streaming::inbound_units,
};
use tokio::sync::mpsc;
use tonic::{Request, Response, Status, Streaming};

#[derive(Clone, Debug)]
pub struct CalculatorHandler {
    host: CallHost,
    buffer: usize,
}

impl CalculatorHandler {
    pub fn new(host: CallHost, buffer: usize) -> Self {
        Self {
            host,
            buffer: buffer.max(1),
        }
    }
}

#[tonic::async_trait]
impl CalculatorService for CalculatorHandler {
    type PrimeNumberDecompositionStream = ResponseStream<PrimeNumberDecompositionResponse>;
    type FindMaximumStream = ResponseStream<FindMaximumResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(first = req.get_ref().first_number, second = req.get_ref().second_number)))]
    async fn sum(&self, req: Request<SumRequest>) -> Result<Response<SumResponse>, Status> {
        let Admission { session, ticket } =
            self.host.admit("calculator.Sum", CallShape::Unary, &req)?;

        let outcome = unary::drive(&session, req.into_inner(), |req, _| async move {
            Ok(SumResponse {
                result: arithmetic::sum(req.first_number, req.second_number),
            })
        })
        .await;
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(number = req.get_ref().number)))]
    async fn square_root(
        &self,
        req: Request<SquareRootRequest>,
    ) -> Result<Response<SquareRootResponse>, Status> {
        let Admission { session, ticket } =
            self.host
                .admit("calculator.SquareRoot", CallShape::Unary, &req)?;

        let outcome = unary::drive(&session, req.into_inner(), |req, _| async move {
            arithmetic::square_root(req.number).map(|square_root| SquareRootResponse { square_root })
        })
        .await;
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(number = req.get_ref().number)))]
    async fn prime_number_decomposition(
        &self,
        req: Request<PrimeNumberDecompositionRequest>,
    ) -> Result<Response<Self::PrimeNumberDecompositionStream>, Status> {
        let Admission { session, ticket } = self.host.admit(
            "calculator.PrimeNumberDecomposition",
            CallShape::ServerStream,
            &req,
        )?;
        let number = req.into_inner().number;
        session.request_received();

        let (tx, rx) = mpsc::channel(self.buffer);
        let source = server_stream::from_iter(arithmetic::prime_factors(number));
        Ok(spawn_streaming(
            ticket,
            rx,
            |prime_factor| PrimeNumberDecompositionResponse { prime_factor },
            server_stream::drive(session.outbound(tx), source),
        ))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn compute_average(
        &self,
        req: Request<Streaming<ComputeAverageRequest>>,
    ) -> Result<Response<ComputeAverageResponse>, Status> {
        let Admission { session, ticket } =
            self.host
                .admit("calculator.ComputeAverage", CallShape::ClientStream, &req)?;

        let inbound = session
            .inbound(inbound_units(req.into_inner()).map_ok(|req: ComputeAverageRequest| req.number));
        let outcome = client_stream::drive(inbound, Average::default())
            .await
            .map(|average| ComputeAverageResponse { average });
        session.finish();
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn find_maximum(
        &self,
        req: Request<Streaming<FindMaximumRequest>>,
    ) -> Result<Response<Self::FindMaximumStream>, Status> {
        let Admission { session, ticket } =
            self.host
                .admit("calculator.FindMaximum", CallShape::BidiStream, &req)?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let endpoint = Endpoint {
            outbound: session.outbound(tx),
            inbound: session
                .inbound(inbound_units(req.into_inner()).map_ok(|req: FindMaximumRequest| req.number)),
            session,
        };
        let options = bidi::BidiOptions {
            reply_delay: None,
            buffer: self.buffer,
        };
        Ok(spawn_streaming(
            ticket,
            rx,
            |maximum| FindMaximumResponse { maximum },
            bidi::serve(endpoint, RunningMaximum::default(), options),
        ))
    }
}
