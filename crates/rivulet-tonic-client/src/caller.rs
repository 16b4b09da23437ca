//! Caller ends of every RPC.
//!
//! Each call opens the caller end of a [`CallSession`] under the configured
//! deadline and runs the caller driver for its shape. The same deadline is
//! sent as `grpc-timeout`, so both ends expire together.

use core::{future::Future, time::Duration};
use rivulet::{
    CallSession, CallShape, Deadline, Supervisor,
    driver::{bidi, client_stream, server_stream},
    handler::greeting::Greeting,
    store::{ObjectId, Record, RecordFields},
};
use rivulet_tonic_core::{
    error::engine_error,
    proto::{
        blog::{
            Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ListBlogResponse,
            ReadBlogRequest, UpdateBlogRequest, blog_service_client::BlogServiceClient,
        },
        calculator::{
            ComputeAverageRequest, FindMaximumRequest, PrimeNumberDecompositionRequest,
            PrimeNumberDecompositionResponse, SquareRootRequest, SumRequest,
            calculator_service_client::CalculatorServiceClient,
        },
        greet::{
            GreetEveryoneRequest, GreetManyTimesRequest, GreetManyTimesResponse, GreetingRequest,
            GreetingWithDeadlineRequest, LongGreetRequest, greet_service_client::GreetServiceClient,
        },
    },
    streaming::{request_units, single_response, streamed_response},
};
use tokio::sync::mpsc;
use tonic::{Request, Response, Status, transport::Channel};

/// Units queued between the send driver and the request stream.
const SEND_BUFFER: usize = 8;

#[derive(Clone, Debug)]
pub struct Caller {
    channel: Channel,
    timeout: Option<Duration>,
    pace: Option<Duration>,
}

impl Caller {
    pub const fn new(channel: Channel, timeout: Option<Duration>, pace: Option<Duration>) -> Self {
        Self {
            channel,
            timeout,
            pace,
        }
    }

    fn session(&self, shape: CallShape) -> CallSession {
        let deadline = self.timeout.map(Deadline::after);
        CallSession::initiate(shape, Supervisor::new(deadline))
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        if let Some(timeout) = self.timeout {
            request.set_timeout(timeout);
        }
        request
    }

    fn calculator(&self) -> CalculatorServiceClient<Channel> {
        CalculatorServiceClient::new(self.channel.clone())
    }

    fn greet(&self) -> GreetServiceClient<Channel> {
        GreetServiceClient::new(self.channel.clone())
    }

    fn blog(&self) -> BlogServiceClient<Channel> {
        BlogServiceClient::new(self.channel.clone())
    }

    /// A single-response call raced against the session deadline.
    async fn unary<R, F>(&self, call: F) -> rivulet::Result<R>
    where
        F: Future<Output = Result<Response<R>, Status>>,
    {
        let session = self.session(CallShape::Unary);
        let outcome = session
            .supervisor()
            .guard(call)
            .await?
            .map(Response::into_inner)
            .map_err(|status| engine_error(&status));
        session.finish();
        outcome
    }

    /// A server stream, printing every unit as it arrives.
    async fn server_stream<R, F>(&self, call: F, mut show: impl FnMut(&R)) -> rivulet::Result<usize>
    where
        R: Send + 'static,
        F: Future<Output = Result<Response<tonic::Streaming<R>>, Status>> + Send + 'static,
    {
        let session = self.session(CallShape::ServerStream);
        let inbound = session.inbound(streamed_response(call));
        let units = server_stream::collect(inbound, |unit| show(unit)).await?;
        Ok(units.len())
    }

    pub async fn sum(&self, first_number: i32, second_number: i32) -> rivulet::Result<i32> {
        let mut client = self.calculator();
        let request = self.request(SumRequest {
            first_number,
            second_number,
        });
        Ok(self.unary(client.sum(request)).await?.result)
    }

    pub async fn square_root(&self, number: i32) -> rivulet::Result<f64> {
        let mut client = self.calculator();
        let request = self.request(SquareRootRequest { number });
        Ok(self.unary(client.square_root(request)).await?.square_root)
    }

    pub async fn prime_factors(&self, number: i64) -> rivulet::Result<Vec<i64>> {
        let mut client = self.calculator();
        let request = self.request(PrimeNumberDecompositionRequest { number });
        let mut factors = Vec::new();
        self.server_stream(
            async move { client.prime_number_decomposition(request).await },
            |res: &PrimeNumberDecompositionResponse| factors.push(res.prime_factor),
        )
        .await?;
        Ok(factors)
    }

    pub async fn average(&self, numbers: Vec<i32>) -> rivulet::Result<f64> {
        let session = self.session(CallShape::ClientStream);
        let (tx, rx) = mpsc::channel(SEND_BUFFER);
        let mut client = self.calculator();
        let request = self.request(request_units(rx));

        let outbound = session.outbound(tx);
        let inbound =
            session.inbound(single_response(async move { client.compute_average(request).await }));
        let units = numbers
            .into_iter()
            .map(|number| ComputeAverageRequest { number });
        let res = client_stream::call(outbound, inbound, units, self.pace).await?;
        Ok(res.average)
    }

    pub async fn maximum(
        &self,
        numbers: Vec<i32>,
        mut show: impl FnMut(i32),
    ) -> rivulet::Result<Vec<i32>> {
        let session = self.session(CallShape::BidiStream);
        let (tx, rx) = mpsc::channel(SEND_BUFFER);
        let mut client = self.calculator();
        let request = self.request(request_units(rx));

        let outbound = session.outbound(tx);
        let inbound =
            session.inbound(streamed_response(async move { client.find_maximum(request).await }));
        let units = numbers.into_iter().map(|number| FindMaximumRequest { number });
        let replies = bidi::call(outbound, inbound, units, self.pace, |res| show(res.maximum)).await?;
        Ok(replies.into_iter().map(|res| res.maximum).collect())
    }

    pub async fn greet_once(&self, greeting: Greeting) -> rivulet::Result<String> {
        let mut client = self.greet();
        let request = self.request(GreetingRequest {
            greeting: Some(greeting.into()),
        });
        Ok(self.unary(client.greet(request)).await?.result)
    }

    pub async fn greet_many_times(
        &self,
        greeting: Greeting,
        mut show: impl FnMut(&str),
    ) -> rivulet::Result<usize> {
        let mut client = self.greet();
        let request = self.request(GreetManyTimesRequest {
            greeting: Some(greeting.into()),
        });
        self.server_stream(
            async move { client.greet_many_times(request).await },
            |res: &GreetManyTimesResponse| show(&res.result),
        )
        .await
    }

    pub async fn long_greet(&self, names: Vec<Greeting>) -> rivulet::Result<String> {
        let session = self.session(CallShape::ClientStream);
        let (tx, rx) = mpsc::channel(SEND_BUFFER);
        let mut client = self.greet();
        let request = self.request(request_units(rx));

        let outbound = session.outbound(tx);
        let inbound =
            session.inbound(single_response(async move { client.long_greet(request).await }));
        let units = names.into_iter().map(|greeting| LongGreetRequest {
            greeting: Some(greeting.into()),
        });
        let res = client_stream::call(outbound, inbound, units, self.pace).await?;
        Ok(res.result)
    }

    pub async fn greet_everyone(
        &self,
        names: Vec<Greeting>,
        mut show: impl FnMut(&str),
    ) -> rivulet::Result<usize> {
        let session = self.session(CallShape::BidiStream);
        let (tx, rx) = mpsc::channel(SEND_BUFFER);
        let mut client = self.greet();
        let request = self.request(request_units(rx));

        let outbound = session.outbound(tx);
        let inbound =
            session.inbound(streamed_response(async move { client.greet_everyone(request).await }));
        let units = names.into_iter().map(|greeting| GreetEveryoneRequest {
            greeting: Some(greeting.into()),
        });
        let replies = bidi::call(outbound, inbound, units, self.pace, |res| show(&res.result)).await?;
        Ok(replies.len())
    }

    pub async fn greet_with_deadline(&self, greeting: Greeting) -> rivulet::Result<String> {
        let mut client = self.greet();
        let request = self.request(GreetingWithDeadlineRequest {
            greeting: Some(greeting.into()),
        });
        Ok(self.unary(client.greet_with_deadline(request)).await?.result)
    }

    pub async fn create_blog(&self, fields: RecordFields) -> rivulet::Result<Blog> {
        let mut client = self.blog();
        let request = self.request(CreateBlogRequest {
            blog: Some(blog(String::new(), fields)),
        });
        self.unary(client.create_blog(request))
            .await?
            .blog
            .ok_or_else(|| rivulet::Error::internal("CreateBlog returned no blog"))
    }

    pub async fn read_blog(&self, blog_id: String) -> rivulet::Result<Blog> {
        let mut client = self.blog();
        let request = self.request(ReadBlogRequest { blog_id });
        self.unary(client.read_blog(request))
            .await?
            .blog
            .ok_or_else(|| rivulet::Error::internal("ReadBlog returned no blog"))
    }

    pub async fn update_blog(&self, id: String, fields: RecordFields) -> rivulet::Result<String> {
        let mut client = self.blog();
        let request = self.request(UpdateBlogRequest {
            blog: Some(blog(id, fields)),
        });
        Ok(self.unary(client.update_blog(request)).await?.status)
    }

    pub async fn delete_blog(&self, blog_id: String) -> rivulet::Result<String> {
        let mut client = self.blog();
        let request = self.request(DeleteBlogRequest { blog_id });
        Ok(self.unary(client.delete_blog(request)).await?.status)
    }

    pub async fn list_blogs(&self, mut show: impl FnMut(&Blog)) -> rivulet::Result<usize> {
        let mut client = self.blog();
        let request = self.request(ListBlogRequest {});
        self.server_stream(
            async move { client.list_blog(request).await },
            |res: &ListBlogResponse| {
                if let Some(blog) = &res.blog {
                    show(blog);
                }
            },
        )
        .await
    }
}

fn blog(id: String, fields: RecordFields) -> Blog {
    Blog {
        id,
        author_id: fields.author_id,
        title: fields.title,
        content: fields.content,
    }
}

/// Renders a listed blog the way the server renders records in statuses.
pub fn describe(blog: &Blog) -> String {
    match ObjectId::parse(&blog.id) {
        Ok(id) => Record::new(id, RecordFields::from(blog.clone())).to_string(),
        Err(_) => format!("{blog:?}"),
    }
}
