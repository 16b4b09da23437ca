use anyhow::bail;
use clap::{Parser, Subcommand};
use core::time::Duration;
use rivulet::handler::greeting::Greeting;
use std::path::PathBuf;

/// Calls the rivulet calculator, greet and blog services.
///
/// Connection options are read from CLI arguments or environment variables
/// (a `.env` file is loaded first).
#[derive(Parser, Debug, Clone)]
#[command(name = "rivulet-tonic-client", version, about)]
pub struct CliArgs {
    /// Server address, without scheme.
    ///
    /// Environment variable: `SERVER_ADDR`
    #[arg(long, env = "SERVER_ADDR", default_value_t = String::from("127.0.0.1:50051"))]
    pub server_addr: String,

    /// Connect over TLS, trusting `SSL_CA_CERT_PATH`.
    ///
    /// Environment variable: `TLS`
    #[arg(long, env = "TLS", default_value_t = false)]
    pub tls: bool,

    /// PEM certificate of the authority that signed the server certificate.
    ///
    /// Environment variable: `SSL_CA_CERT_PATH`
    #[arg(long, env = "SSL_CA_CERT_PATH", default_value = "ssl/ca.crt")]
    pub ssl_ca_cert_path: PathBuf,

    /// Name the server certificate is checked against.
    ///
    /// Environment variable: `TLS_DOMAIN`
    #[arg(long, env = "TLS_DOMAIN", default_value_t = String::from("localhost"))]
    pub tls_domain: String,

    /// Deadline of the call in milliseconds. Zero sends no deadline.
    #[arg(long, default_value_t = 0)]
    pub timeout_ms: u64,

    /// Interval between two units of a client or bidi stream, in
    /// milliseconds. Zero sends without pausing.
    #[arg(long, default_value_t = 1_000)]
    pub pace_ms: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// calculator.Sum
    Sum { first: i32, second: i32 },
    /// calculator.SquareRoot
    SquareRoot {
        #[arg(allow_negative_numbers = true)]
        number: i32,
    },
    /// calculator.PrimeNumberDecomposition
    Primes { number: i64 },
    /// calculator.ComputeAverage
    Average {
        #[arg(allow_negative_numbers = true)]
        numbers: Vec<i32>,
    },
    /// calculator.FindMaximum
    Maximum {
        #[arg(allow_negative_numbers = true)]
        numbers: Vec<i32>,
    },
    /// greet.Greet
    Greet {
        #[arg(value_parser = parse_name)]
        name: Greeting,
    },
    /// greet.GreetManyTimes
    GreetMany {
        #[arg(value_parser = parse_name)]
        name: Greeting,
    },
    /// greet.LongGreet
    LongGreet {
        #[arg(value_parser = parse_name)]
        names: Vec<Greeting>,
    },
    /// greet.GreetEveryone
    GreetEveryone {
        #[arg(value_parser = parse_name)]
        names: Vec<Greeting>,
    },
    /// greet.GreetWithDeadline
    GreetDeadline {
        #[arg(value_parser = parse_name)]
        name: Greeting,
    },
    /// blog.CreateBlog
    BlogCreate {
        author_id: String,
        title: String,
        content: String,
    },
    /// blog.ReadBlog
    BlogRead { id: String },
    /// blog.UpdateBlog
    BlogUpdate {
        id: String,
        author_id: String,
        title: String,
        content: String,
    },
    /// blog.DeleteBlog
    BlogDelete { id: String },
    /// blog.ListBlog
    BlogList,
}

/// `First:Last`, or just `First`.
fn parse_name(raw: &str) -> Result<Greeting, String> {
    let (first, last) = raw.split_once(':').unwrap_or((raw, ""));
    if first.is_empty() {
        return Err(format!("missing first name in {raw:?}"));
    }
    Ok(Greeting::new(first, last))
}

/// Trust anchor of a TLS connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsTrust {
    pub ca_cert_path: PathBuf,
    pub domain: String,
}

/// Validated configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: String,
    pub tls: Option<TlsTrust>,
    pub timeout: Option<Duration>,
    pub pace: Option<Duration>,
    pub command: Command,
}

fn millis(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl TryFrom<CliArgs> for ClientConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        if args.server_addr.contains("://") {
            bail!("SERVER_ADDR must not include a scheme; use --tls for https");
        }

        let scheme = if args.tls { "https" } else { "http" };
        let tls = args.tls.then(|| TlsTrust {
            ca_cert_path: args.ssl_ca_cert_path,
            domain: args.tls_domain,
        });

        // An empty average reaches the server and fails there; an empty
        // maximum would just print nothing.
        if matches!(&args.command, Command::Maximum { numbers } if numbers.is_empty()) {
            bail!("maximum needs at least one number");
        }

        Ok(Self {
            endpoint: format!("{scheme}://{}", args.server_addr),
            tls,
            timeout: millis(args.timeout_ms),
            pace: millis(args.pace_ms),
            command: args.command,
        })
    }
}
