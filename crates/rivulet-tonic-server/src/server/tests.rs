//! End-to-end calls against a server on an ephemeral loopback port.

use super::*;
use crate::server::config::ServerConfig;
use core::time::Duration;
use rivulet::{handler::greeting::Workload, store::MemoryStore};
use rivulet_tonic_core::proto::{
    blog::{
        Blog, CreateBlogRequest, DeleteBlogRequest, ListBlogRequest, ReadBlogRequest,
        UpdateBlogRequest, blog_service_client::BlogServiceClient,
    },
    calculator::{
        ComputeAverageRequest, FindMaximumRequest, PrimeNumberDecompositionRequest,
        SquareRootRequest, SumRequest, calculator_service_client::CalculatorServiceClient,
    },
    greet::{
        GreetEveryoneRequest, GreetManyTimesRequest, Greeting, GreetingRequest,
        GreetingWithDeadlineRequest, LongGreetRequest, greet_service_client::GreetServiceClient,
    },
};
use std::net::SocketAddr;
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use tokio_stream::{StreamExt, wrappers::TcpListenerStream};
use tonic::{Code, Request, transport::Channel};
use tonic_health::pb::{
    HealthCheckRequest, health_check_response::ServingStatus, health_client::HealthClient,
};

struct TestServer {
    addr: SocketAddr,
    host: CallHost,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<anyhow::Result<()>>,
}

impl TestServer {
    async fn start(config: ServerConfig) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let services = Services::new(&config, MemoryStore::new());
        let host = services.host.clone();
        let (stop, stopped) = oneshot::channel::<()>();

        let handle = tokio::spawn(serve_with_incoming(
            services,
            None,
            TcpListenerStream::new(listener),
            async move {
                let _ = stopped.await;
            },
        ));

        Self {
            addr,
            host,
            stop: Some(stop),
            handle,
        }
    }

    async fn channel(&self) -> Channel {
        Channel::from_shared(format!("http://{}", self.addr))
            .unwrap()
            .connect()
            .await
            .unwrap()
    }

    async fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        self.handle.await.unwrap().unwrap();
    }
}

fn fast_config() -> ServerConfig {
    ServerConfig {
        greet_repeat: 3,
        greet_pace: Some(Duration::from_millis(10)),
        greet_everyone_delay: Some(Duration::from_millis(10)),
        deadline_greet: Workload {
            increments: 3,
            step: Duration::from_millis(100),
        },
        shutdown_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    }
}

fn jane() -> Option<Greeting> {
    Some(Greeting {
        first_name: "Jane".into(),
        last_name: "Doe".into(),
    })
}

fn named(first: &str, last: &str) -> Option<Greeting> {
    Some(Greeting {
        first_name: first.into(),
        last_name: last.into(),
    })
}

#[tokio::test]
async fn calculator_serves_every_call_shape() {
    let server = TestServer::start(fast_config()).await;
    let mut client = CalculatorServiceClient::new(server.channel().await);

    let sum = client
        .sum(SumRequest {
            first_number: 3,
            second_number: 10,
        })
        .await
        .unwrap();
    assert_eq!(sum.into_inner().result, 13);

    let root = client
        .square_root(SquareRootRequest { number: 16 })
        .await
        .unwrap();
    assert_eq!(root.into_inner().square_root, 4.0);

    let primes: Vec<i64> = client
        .prime_number_decomposition(PrimeNumberDecompositionRequest { number: 120 })
        .await
        .unwrap()
        .into_inner()
        .map(|res| res.unwrap().prime_factor)
        .collect()
        .await;
    assert_eq!(primes, [2, 2, 2, 3, 5]);

    let numbers = [1, 2, 3, 4].map(|number| ComputeAverageRequest { number });
    let average = client
        .compute_average(tokio_stream::iter(numbers))
        .await
        .unwrap();
    assert_eq!(average.into_inner().average, 2.5);

    let numbers = [1, 5, 3, 6, 2, 20].map(|number| FindMaximumRequest { number });
    let maxima: Vec<i32> = client
        .find_maximum(tokio_stream::iter(numbers))
        .await
        .unwrap()
        .into_inner()
        .map(|res| res.unwrap().maximum)
        .collect()
        .await;
    assert_eq!(maxima, [1, 5, 5, 6, 6, 20]);

    server.stop().await;
}

#[tokio::test]
async fn handler_errors_become_statuses() {
    let server = TestServer::start(fast_config()).await;
    let mut client = CalculatorServiceClient::new(server.channel().await);

    let status = client
        .square_root(SquareRootRequest { number: -4 })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);
    assert_eq!(status.message(), "Received a negative number: -4");

    let status = client
        .compute_average(tokio_stream::iter(Vec::<ComputeAverageRequest>::new()))
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn greet_serves_every_call_shape() {
    let server = TestServer::start(fast_config()).await;
    let mut client = GreetServiceClient::new(server.channel().await);

    let greeting = client
        .greet(GreetingRequest { greeting: jane() })
        .await
        .unwrap();
    assert_eq!(greeting.into_inner().result, "Hello, Jane Doe");

    let many: Vec<String> = client
        .greet_many_times(GreetManyTimesRequest { greeting: jane() })
        .await
        .unwrap()
        .into_inner()
        .map(|res| res.unwrap().result)
        .collect()
        .await;
    assert_eq!(
        many,
        ["Hello, Jane Doe 0", "Hello, Jane Doe 1", "Hello, Jane Doe 2"]
    );

    let names = [named("Ada", "L"), named("Alan", "T")].map(|greeting| LongGreetRequest { greeting });
    let long = client.long_greet(tokio_stream::iter(names)).await.unwrap();
    assert_eq!(long.into_inner().result, "Hello, Ada L Hello, Alan T ");

    let names = [named("Ada", "L"), named("Alan", "T"), named("Grace", "H")]
        .map(|greeting| GreetEveryoneRequest { greeting });
    let replies: Vec<String> = client
        .greet_everyone(tokio_stream::iter(names))
        .await
        .unwrap()
        .into_inner()
        .map(|res| res.unwrap().result)
        .collect()
        .await;
    assert_eq!(
        replies,
        ["Hello, Ada L ", "Hello, Alan T ", "Hello, Grace H "]
    );

    server.stop().await;
}

#[tokio::test]
async fn deadline_greet_finishes_within_its_deadline() {
    let server = TestServer::start(fast_config()).await;
    let mut client = GreetServiceClient::new(server.channel().await);

    let mut request = Request::new(GreetingWithDeadlineRequest { greeting: jane() });
    request.set_timeout(Duration::from_secs(5));
    let reply = client.greet_with_deadline(request).await.unwrap();
    assert_eq!(reply.into_inner().result, "Hello, Jane Doe");

    server.stop().await;
}

#[tokio::test]
async fn server_default_deadline_bounds_slow_calls() {
    let server = TestServer::start(ServerConfig {
        default_deadline: Some(Duration::from_millis(150)),
        ..fast_config()
    })
    .await;
    let mut client = GreetServiceClient::new(server.channel().await);

    let status = client
        .greet_with_deadline(GreetingWithDeadlineRequest { greeting: jane() })
        .await
        .unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);

    server.stop().await;
}

#[tokio::test]
async fn caller_expiry_mid_client_stream_is_never_answered_with_success() {
    let server = TestServer::start(ServerConfig {
        default_deadline: Some(Duration::from_secs(1)),
        ..fast_config()
    })
    .await;
    let mut client = CalculatorServiceClient::new(server.channel().await);

    // The caller's own deadline is kept local; only the server default bounds
    // the server end.
    let (tx, rx) = tokio::sync::mpsc::channel(8);
    let pending = tokio::spawn(async move {
        client
            .compute_average(rivulet_tonic_core::streaming::request_units(rx))
            .await
    });

    let session = rivulet::CallSession::initiate(
        rivulet::CallShape::ClientStream,
        rivulet::Supervisor::new(Some(rivulet::Deadline::after(Duration::from_millis(250)))),
    );
    let numbers = [10, 20, 30, 40, 50].map(|number| ComputeAverageRequest { number });
    let out = rivulet::driver::client_stream::call(
        session.outbound(tx),
        session.inbound(futures::stream::pending::<rivulet::Result<f64>>()),
        numbers,
        Some(Duration::from_millis(100)),
    )
    .await;
    assert_eq!(out, Err(rivulet::Error::DeadlineExceeded));

    // The server never saw end-of-stream, so it cannot report an average of
    // the units that made it through.
    let status = pending.await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::DeadlineExceeded);

    server.stop().await;
}

#[tokio::test]
async fn caller_timeout_ends_a_server_stream() {
    let server = TestServer::start(ServerConfig {
        greet_repeat: 10,
        greet_pace: Some(Duration::from_millis(100)),
        ..fast_config()
    })
    .await;
    let mut client = GreetServiceClient::new(server.channel().await);

    let mut request = Request::new(GreetManyTimesRequest { greeting: jane() });
    request.set_timeout(Duration::from_millis(250));
    let mut stream = client.greet_many_times(request).await.unwrap().into_inner();

    let mut received = 0;
    let status = loop {
        match stream.next().await {
            Some(Ok(_)) => received += 1,
            Some(Err(status)) => break status,
            None => panic!("stream ended without a status"),
        }
    };
    assert!((1..10).contains(&received));
    assert_eq!(status.code(), Code::DeadlineExceeded);

    server.stop().await;
}

#[tokio::test]
async fn blog_records_round_trip() {
    let server = TestServer::start(fast_config()).await;
    let mut client = BlogServiceClient::new(server.channel().await);

    let draft = Blog {
        id: String::new(),
        author_id: "ada".into(),
        title: "Engines".into(),
        content: "Notes on the analytical engine".into(),
    };
    let created = client
        .create_blog(CreateBlogRequest {
            blog: Some(draft.clone()),
        })
        .await
        .unwrap()
        .into_inner()
        .blog
        .unwrap();
    assert_eq!(created.id.len(), 24);
    assert_eq!(created.title, draft.title);

    let read = client
        .read_blog(ReadBlogRequest {
            blog_id: created.id.clone(),
        })
        .await
        .unwrap()
        .into_inner()
        .blog
        .unwrap();
    assert_eq!(read, created);

    let edited = Blog {
        title: "Engines, revised".into(),
        ..created.clone()
    };
    let status = client
        .update_blog(UpdateBlogRequest {
            blog: Some(edited.clone()),
        })
        .await
        .unwrap()
        .into_inner()
        .status;
    assert!(status.starts_with("Modified blog details: "), "{status}");

    let status = client
        .update_blog(UpdateBlogRequest { blog: Some(edited) })
        .await
        .unwrap()
        .into_inner()
        .status;
    assert_eq!(
        status,
        format!("no blog was modified for given id : {}", created.id)
    );

    client
        .create_blog(CreateBlogRequest { blog: Some(draft) })
        .await
        .unwrap();
    let listed: Vec<Blog> = client
        .list_blog(ListBlogRequest {})
        .await
        .unwrap()
        .into_inner()
        .map(|res| res.unwrap().blog.unwrap())
        .collect()
        .await;
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].id, created.id);

    let status = client
        .delete_blog(DeleteBlogRequest {
            blog_id: created.id.clone(),
        })
        .await
        .unwrap()
        .into_inner()
        .status;
    assert_eq!(status, "Blog was deleted.");

    let missing = client
        .read_blog(ReadBlogRequest {
            blog_id: created.id.clone(),
        })
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::NotFound);

    let malformed = client
        .read_blog(ReadBlogRequest {
            blog_id: "not-an-id".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(malformed.code(), Code::InvalidArgument);

    server.stop().await;
}

#[tokio::test]
async fn health_reports_every_service() {
    let server = TestServer::start(fast_config()).await;
    let mut health = HealthClient::new(server.channel().await);

    for service in [
        "calculator.CalculatorService",
        "greet.GreetService",
        "blog.BlogService",
    ] {
        let status = health
            .check(HealthCheckRequest {
                service: service.into(),
            })
            .await
            .unwrap()
            .into_inner()
            .status;
        assert_eq!(status, ServingStatus::Serving as i32, "{service}");
    }

    server.stop().await;
}

#[tokio::test]
async fn shutdown_refuses_new_calls_and_cancels_stragglers() {
    let server = TestServer::start(ServerConfig {
        deadline_greet: Workload {
            increments: 100,
            step: Duration::from_millis(100),
        },
        shutdown_timeout: Duration::from_millis(300),
        ..fast_config()
    })
    .await;
    let channel = server.channel().await;

    let mut greet = GreetServiceClient::new(channel.clone());
    let straggler = tokio::spawn(async move {
        greet
            .greet_with_deadline(GreetingWithDeadlineRequest { greeting: jane() })
            .await
    });
    while server.host.inflight() == 0 {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut server = server;
    let _ = server.stop.take().unwrap().send(());
    while server.host.is_accepting() {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut calculator = CalculatorServiceClient::new(channel);
    let refused = calculator
        .sum(SumRequest {
            first_number: 1,
            second_number: 2,
        })
        .await
        .unwrap_err();
    assert_eq!(refused.code(), Code::Unavailable);

    let status = straggler.await.unwrap().unwrap_err();
    assert_eq!(status.code(), Code::Cancelled);

    server.handle.await.unwrap().unwrap();
    assert_eq!(server.host.inflight(), 0);
}
