//! Configuration Module
//!
//! This module reads configuration values from environment variables, provides
//! sensible defaults, and validates the decompression limit. Everything here is
//! process-wide ambient configuration; the per-invocation parameters (queue name,
//! capacity, collector URL) come from the command line instead.

use anyhow::Result;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub amqp_addr: String,
    pub max_decompressed_size: usize,
    pub http_timeout: Duration,
    pub dns_timeout: Duration,
    pub poll_interval: Duration,
}

impl Config {
    /// Creates a new configuration by reading environment variables.
    /// If a variable is missing or unparseable, a default value is used.
    pub fn new() -> Result<Self> {
        let amqp_addr =
            env::var("AMQP_ADDR").unwrap_or_else(|_| "amqp://127.0.0.1:5672/%2f".into());

        let max_decompressed_size = env::var("DMARC_MAX_DECOMPRESSED_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(100 * 1024 * 1024);

        if max_decompressed_size > 500_000_000 {
            return Err(anyhow::anyhow!("Max decompressed size too large (500MB limit)"));
        }

        let http_timeout = env::var("DMARC_HTTP_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let dns_timeout = env::var("DMARC_DNS_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let poll_interval = env::var("DMARC_POLL_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        Ok(Config {
            amqp_addr,
            max_decompressed_size,
            http_timeout: Duration::from_secs(http_timeout),
            dns_timeout: Duration::from_secs(dns_timeout),
            poll_interval: Duration::from_millis(poll_interval),
        })
    }
}
