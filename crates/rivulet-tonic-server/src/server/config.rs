use anyhow::bail;
use clap::Parser;
use core::time::Duration;
use rivulet::handler::greeting::Workload;
use std::path::PathBuf;

/// Runtime configuration for the `rivulet-tonic-server` binary.
///
/// Every value is parsed from CLI arguments or environment variables (a `.env`
/// file is loaded first). Durations are given in milliseconds; a zero pacing
/// or delay disables it.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "rivulet-tonic-server",
    version,
    about = "gRPC host for the calculator, greet and blog services"
)]
pub struct CliArgs {
    /// Address to listen on (TCP or Unix socket path; use --uds for Unix socket).
    ///
    /// Example: "0.0.0.0:50051" or "/tmp/rivulet.sock"
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("0.0.0.0:50051"))]
    pub server_addr: String,

    /// Listen on a Unix socket instead of TCP. If set, `SERVER_ADDR` must be a file path.
    #[arg(short, long, default_value_t = false)]
    pub uds: bool,

    /// Serve over TLS using `SSL_CERT_PATH` and `SSL_KEY_PATH`.
    ///
    /// Environment variable: `TLS`
    #[arg(long, env = "TLS", default_value_t = false)]
    pub tls: bool,

    /// PEM certificate chain presented to callers when `TLS` is set.
    ///
    /// Environment variable: `SSL_CERT_PATH`
    #[arg(long, env = "SSL_CERT_PATH", default_value = "ssl/server.crt")]
    pub ssl_cert_path: PathBuf,

    /// PEM private key matching `SSL_CERT_PATH`.
    ///
    /// Environment variable: `SSL_KEY_PATH`
    #[arg(long, env = "SSL_KEY_PATH", default_value = "ssl/server.pem")]
    pub ssl_key_path: PathBuf,

    /// Upper bound on every call, applied even when the caller sends no
    /// timeout. The tighter of this and the caller's `grpc-timeout` wins.
    /// Zero disables the server-side bound.
    ///
    /// Environment variable: `DEFAULT_DEADLINE_MS`
    #[arg(long, env = "DEFAULT_DEADLINE_MS", default_value_t = 0)]
    pub default_deadline_ms: u64,

    /// Bound on a single record store round trip.
    ///
    /// Environment variable: `STORE_TIMEOUT_MS`
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value_t = 5_000)]
    pub store_timeout_ms: u64,

    /// Capacity of the buffer between a session's send path and the
    /// response stream, and between the bidi receive and send loops.
    ///
    /// Environment variable: `STREAM_BUFFER_SIZE`
    #[arg(long, env = "STREAM_BUFFER_SIZE", default_value_t = 8)]
    pub stream_buffer_size: usize,

    /// Number of greetings streamed by `GreetManyTimes`.
    ///
    /// Environment variable: `GREET_REPEAT`
    #[arg(long, env = "GREET_REPEAT", default_value_t = 10)]
    pub greet_repeat: usize,

    /// Interval between two `GreetManyTimes` greetings.
    ///
    /// Environment variable: `GREET_PACE_MS`
    #[arg(long, env = "GREET_PACE_MS", default_value_t = 1_000)]
    pub greet_pace_ms: u64,

    /// Simulated work before each `GreetEveryone` reply.
    ///
    /// Environment variable: `GREET_EVERYONE_DELAY_MS`
    #[arg(long, env = "GREET_EVERYONE_DELAY_MS", default_value_t = 2_000)]
    pub greet_everyone_delay_ms: u64,

    /// Number of work increments performed by `GreetWithDeadline`.
    ///
    /// Environment variable: `DEADLINE_GREET_STEPS`
    #[arg(long, env = "DEADLINE_GREET_STEPS", default_value_t = 3)]
    pub deadline_greet_steps: u32,

    /// Length of one `GreetWithDeadline` work increment.
    ///
    /// Environment variable: `DEADLINE_GREET_STEP_MS`
    #[arg(long, env = "DEADLINE_GREET_STEP_MS", default_value_t = 1_000)]
    pub deadline_greet_step_ms: u64,

    /// Seconds to wait for in-flight calls to finish on shutdown before they
    /// are cancelled.
    ///
    /// Environment variable: `SHUTDOWN_TIMEOUT`
    #[arg(long, env = "SHUTDOWN_TIMEOUT", default_value_t = 5)]
    pub shutdown_timeout: u64,
}

/// Certificate and key files of the TLS identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsFiles {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server_addr: String,
    pub uds: bool,
    pub tls: Option<TlsFiles>,
    pub default_deadline: Option<Duration>,
    pub store_timeout: Duration,
    pub stream_buffer_size: usize,
    pub greet_repeat: usize,
    pub greet_pace: Option<Duration>,
    pub greet_everyone_delay: Option<Duration>,
    pub deadline_greet: Workload,
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_addr: String::from("0.0.0.0:50051"),
            uds: false,
            tls: None,
            default_deadline: None,
            store_timeout: rivulet::handler::records::DEFAULT_OP_TIMEOUT,
            stream_buffer_size: 8,
            greet_repeat: 10,
            greet_pace: Some(Duration::from_secs(1)),
            greet_everyone_delay: Some(Duration::from_secs(2)),
            deadline_greet: Workload::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl TryFrom<CliArgs> for ServerConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.stream_buffer_size == 0 {
            bail!("STREAM_BUFFER_SIZE must be greater than 0");
        }

        if args.store_timeout_ms == 0 {
            bail!("STORE_TIMEOUT_MS must be greater than 0");
        }

        if args.uds && args.tls {
            bail!("TLS is only supported over TCP");
        }

        let tls = args.tls.then(|| TlsFiles {
            cert_path: args.ssl_cert_path,
            key_path: args.ssl_key_path,
        });

        Ok(Self {
            server_addr: args.server_addr,
            uds: args.uds,
            tls,
            default_deadline: millis(args.default_deadline_ms),
            store_timeout: Duration::from_millis(args.store_timeout_ms),
            stream_buffer_size: args.stream_buffer_size,
            greet_repeat: args.greet_repeat,
            greet_pace: millis(args.greet_pace_ms),
            greet_everyone_delay: millis(args.greet_everyone_delay_ms),
            deadline_greet: Workload {
                increments: args.deadline_greet_steps,
                step: Duration::from_millis(args.deadline_greet_step_ms),
            },
            shutdown_timeout: Duration::from_secs(args.shutdown_timeout),
        })
    }
}
