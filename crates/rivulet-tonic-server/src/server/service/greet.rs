//! `greet.GreetService`: greetings over every call shape, plus the
//! deadline-aware unary call.

use crate::server::{
    host::{Admission, CallHost},
    streaming::{ResponseStream, reply, spawn_streaming},
};
use core::time::Duration;
use futures::TryStreamExt;
use rivulet::{
    CallShape, Endpoint, TokioSleep,
    driver::{bidi, client_stream, server_stream, unary},
    handler::greeting::{self, GreetEveryone, LongGreet, Workload},
};
use rivulet_tonic_core::{
    convert,
    proto::greet::{
        GreetEveryoneRequest, GreetEveryoneResponse, GreetManyTimesRequest, GreetManyTimesResponse,
        GreetingRequest, GreetingResponse, GreetingWithDeadlineRequest,
        GreetingWithDeadlineResponse, LongGreetRequest, LongGreetResponse,
        greet_service_server::GreetService,
    },
    streaming::inbound_units,
};
use tokio::sync::mpsc;
use tonic::{Request, Response, Status, Streaming};

/// Tunables of the greet handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GreetSettings {
    /// Greetings streamed by `GreetManyTimes`.
    pub repeat: usize,
    /// Interval between two `GreetManyTimes` greetings.
    pub pace: Option<Duration>,
    /// Simulated work before each `GreetEveryone` reply.
    pub everyone_delay: Option<Duration>,
    /// Workload of `GreetWithDeadline`.
    pub workload: Workload,
}

impl Default for GreetSettings {
    fn default() -> Self {
        Self {
            repeat: 10,
            pace: Some(Duration::from_secs(1)),
            everyone_delay: Some(Duration::from_secs(2)),
            workload: Workload::default(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct GreetHandler {
    host: CallHost,
    buffer: usize,
    settings: GreetSettings,
}

impl GreetHandler {
    pub fn new(host: CallHost, buffer: usize, settings: GreetSettings) -> Self {
        Self {
            host,
            buffer: buffer.max(1),
            settings,
        }
    }
}

#[tonic::async_trait]
impl GreetService for GreetHandler {
    type GreetManyTimesStream = ResponseStream<GreetManyTimesResponse>;
    type GreetEveryoneStream = ResponseStream<GreetEveryoneResponse>;

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet(
        &self,
        req: Request<GreetingRequest>,
    ) -> Result<Response<GreetingResponse>, Status> {
        let Admission { session, ticket } = self.host.admit("greet.Greet", CallShape::Unary, &req)?;
        let greeting = convert::greeting(req.into_inner().greeting);

        let outcome = unary::drive(&session, greeting, |greeting, _| async move {
            Ok(GreetingResponse {
                result: greeting::compose(&greeting),
            })
        })
        .await;
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, fields(repeat = self.settings.repeat)))]
    async fn greet_many_times(
        &self,
        req: Request<GreetManyTimesRequest>,
    ) -> Result<Response<Self::GreetManyTimesStream>, Status> {
        let Admission { session, ticket } =
            self.host
                .admit("greet.GreetManyTimes", CallShape::ServerStream, &req)?;
        let greeting = convert::greeting(req.into_inner().greeting);
        session.request_received();

        let (tx, rx) = mpsc::channel(self.buffer);
        let source = greeting::many_times_paced(&greeting, self.settings.repeat, self.settings.pace);
        Ok(spawn_streaming(
            ticket,
            rx,
            |result| GreetManyTimesResponse { result },
            server_stream::drive(session.outbound(tx), source),
        ))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn long_greet(
        &self,
        req: Request<Streaming<LongGreetRequest>>,
    ) -> Result<Response<LongGreetResponse>, Status> {
        let Admission { session, ticket } =
            self.host
                .admit("greet.LongGreet", CallShape::ClientStream, &req)?;

        let inbound = session.inbound(
            inbound_units(req.into_inner())
                .map_ok(|req: LongGreetRequest| convert::greeting(req.greeting)),
        );
        let outcome = client_stream::drive(inbound, LongGreet::default())
            .await
            .map(|result| LongGreetResponse { result });
        session.finish();
        reply(ticket, outcome)
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet_everyone(
        &self,
        req: Request<Streaming<GreetEveryoneRequest>>,
    ) -> Result<Response<Self::GreetEveryoneStream>, Status> {
        let Admission { session, ticket } =
            self.host
                .admit("greet.GreetEveryone", CallShape::BidiStream, &req)?;

        let (tx, rx) = mpsc::channel(self.buffer);
        let endpoint = Endpoint {
            outbound: session.outbound(tx),
            inbound: session.inbound(
                inbound_units(req.into_inner())
                    .map_ok(|req: GreetEveryoneRequest| convert::greeting(req.greeting)),
            ),
            session,
        };
        let options = bidi::BidiOptions {
            reply_delay: self.settings.everyone_delay,
            buffer: self.buffer,
        };
        Ok(spawn_streaming(
            ticket,
            rx,
            |result| GreetEveryoneResponse { result },
            bidi::serve(endpoint, GreetEveryone, options),
        ))
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all))]
    async fn greet_with_deadline(
        &self,
        req: Request<GreetingWithDeadlineRequest>,
    ) -> Result<Response<GreetingWithDeadlineResponse>, Status> {
        let Admission { session, ticket } =
            self.host
                .admit("greet.GreetWithDeadline", CallShape::Unary, &req)?;
        let greeting = convert::greeting(req.into_inner().greeting);
        let workload = self.settings.workload;

        let outcome = unary::drive(&session, greeting, |greeting, supervisor| async move {
            greeting::greet_with_deadline::<TokioSleep>(greeting, &supervisor, workload).await
        })
        .await
        .map(|result| GreetingWithDeadlineResponse { result });
        reply(ticket, outcome)
    }
}
