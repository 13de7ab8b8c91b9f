//! DMARCPipe - DMARC Aggregate Report Ingestion Pipeline
//!
//! This service dequeues DMARC report mail from a durable queue, verifies each
//! message's DKIM signature, extracts the compressed XML report from its body,
//! converts it into a normalized JSON document, and posts the document to a
//! collector endpoint. It runs until terminated externally.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;

use dmarcpipe::collector::HttpPublisher;
use dmarcpipe::crypto::RsaSha256Validator;
use dmarcpipe::dkim::SignatureVerifier;
use dmarcpipe::dns::SystemResolver;
use dmarcpipe::queue::AmqpQueue;
use dmarcpipe::{Config, Pipeline};

/// CLI arguments for DMARCPipe.
#[derive(Parser, Debug)]
#[command(
    version,
    about = "DMARC aggregate report ingestion pipeline in Rust",
    long_about = "DMARCPipe consumes DMARC report mail from a queue, authenticates each \
                  sender via DKIM, extracts and transforms the XML report, and forwards \
                  it to a collector endpoint.\n\n\
                  USAGE:\n  dmarcpipe <QUEUE> <CAPACITY> <COLLECTOR_URL> [--verbose]"
)]
struct Cli {
    /// Name of the report queue to consume
    queue: String,

    /// Maximum message count the queue should hold
    capacity: u32,

    /// Collector endpoint URL for the transformed reports
    collector_url: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default())
        .filter_level(if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        })
        .init();

    println!(
        "{}\n{}\n",
        "DMARCPipe - DMARC Report Ingestion Pipeline".bold().green(),
        "Dequeuing, authenticating & forwarding DMARC data".dimmed()
    );

    let config = Config::new().context("Failed to load configuration")?;
    log::info!(
        "starting dequeuing service (queue='{}', capacity={}, collector='{}')",
        cli.queue,
        cli.capacity,
        cli.collector_url
    );

    let queue = AmqpQueue::open(
        &config.amqp_addr,
        &cli.queue,
        cli.capacity,
        config.poll_interval,
    )
    .await
    .context("Could not open the report queue")?;

    let resolver = SystemResolver::new(config.dns_timeout);
    let verifier = SignatureVerifier::new(resolver, RsaSha256Validator);
    let sink = HttpPublisher::new(&cli.collector_url, config.http_timeout)
        .context("Could not initiate the HTTP client")?;

    let mut pipeline = Pipeline::new(queue, verifier, sink, config.max_decompressed_size);

    log::info!("the service is up and running");
    pipeline.run().await?;
    Ok(())
}
