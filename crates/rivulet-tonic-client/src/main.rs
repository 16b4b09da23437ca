#![doc = include_str!("../README.md")]

mod caller;
mod config;

use anyhow::Context;
use caller::{Caller, describe};
use clap::Parser;
use config::{ClientConfig, CliArgs, Command, TlsTrust};
use rivulet::store::RecordFields;
use tonic::transport::{Certificate, Channel, ClientTlsConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ClientConfig::try_from(args)?;

    #[cfg(feature = "tracing")]
    {
        use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }

    let channel = connect(&config).await?;
    let caller = Caller::new(channel, config.timeout, config.pace);

    if let Err(err) = run(&caller, config.command).await {
        anyhow::bail!("call failed with {}: {err}", err.code());
    }
    Ok(())
}

async fn connect(config: &ClientConfig) -> anyhow::Result<Channel> {
    let mut endpoint = Channel::from_shared(config.endpoint.clone())?;
    if let Some(TlsTrust {
        ca_cert_path,
        domain,
    }) = &config.tls
    {
        let ca = tokio::fs::read(ca_cert_path)
            .await
            .with_context(|| format!("reading CA certificate {}", ca_cert_path.display()))?;
        endpoint = endpoint.tls_config(
            ClientTlsConfig::new()
                .ca_certificate(Certificate::from_pem(ca))
                .domain_name(domain.clone()),
        )?;
    }

    #[cfg(feature = "tracing")]
    tracing::debug!("Connecting to {}", config.endpoint);
    endpoint
        .connect()
        .await
        .with_context(|| format!("connecting to {}", config.endpoint))
}

async fn run(caller: &Caller, command: Command) -> rivulet::Result<()> {
    match command {
        Command::Sum { first, second } => {
            println!("{first} + {second} = {}", caller.sum(first, second).await?);
        }
        Command::SquareRoot { number } => {
            println!("sqrt({number}) = {}", caller.square_root(number).await?);
        }
        Command::Primes { number } => {
            let factors = caller.prime_factors(number).await?;
            let factors: Vec<String> = factors.iter().map(ToString::to_string).collect();
            println!("{number} = {}", factors.join(" x "));
        }
        Command::Average { numbers } => {
            println!("average: {}", caller.average(numbers).await?);
        }
        Command::Maximum { numbers } => {
            caller
                .maximum(numbers, |maximum| println!("maximum so far: {maximum}"))
                .await?;
        }
        Command::Greet { name } => println!("{}", caller.greet_once(name).await?),
        Command::GreetMany { name } => {
            let count = caller
                .greet_many_times(name, |greeting| println!("{greeting}"))
                .await?;
            println!("({count} greetings)");
        }
        Command::LongGreet { names } => println!("{}", caller.long_greet(names).await?),
        Command::GreetEveryone { names } => {
            caller
                .greet_everyone(names, |greeting| println!("{greeting}"))
                .await?;
        }
        Command::GreetDeadline { name } => {
            println!("{}", caller.greet_with_deadline(name).await?);
        }
        Command::BlogCreate {
            author_id,
            title,
            content,
        } => {
            let blog = caller
                .create_blog(RecordFields {
                    author_id,
                    title,
                    content,
                })
                .await?;
            println!("created {}", describe(&blog));
        }
        Command::BlogRead { id } => println!("{}", describe(&caller.read_blog(id).await?)),
        Command::BlogUpdate {
            id,
            author_id,
            title,
            content,
        } => {
            let fields = RecordFields {
                author_id,
                title,
                content,
            };
            println!("{}", caller.update_blog(id, fields).await?);
        }
        Command::BlogDelete { id } => println!("{}", caller.delete_blog(id).await?),
        Command::BlogList => {
            let count = caller.list_blogs(|blog| println!("{}", describe(blog))).await?;
            println!("({count} blogs)");
        }
    }
    Ok(())
}
