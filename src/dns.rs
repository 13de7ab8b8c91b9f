//! DNS Lookup Module
//!
//! TXT resolution seam for DKIM key discovery. The pipeline only ever needs
//! "the TXT value published at a name, if any"; transport mechanics live behind
//! the `TxtLookup` trait so the verifier can be exercised without a network.
//! The production implementation uses the system resolver configuration with a
//! bounded query timeout.

use crate::error::{PipelineError, Result};
use async_trait::async_trait;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::ResolveErrorKind;
use hickory_resolver::TokioAsyncResolver;
use std::time::Duration;

/// A TXT record value with its time-to-live.
#[derive(Debug, Clone)]
pub struct TxtRecord {
    pub text: String,
    pub ttl: u32,
}

#[async_trait]
pub trait TxtLookup: Send + Sync {
    /// Resolves `name` to its first TXT record, or `None` when the name has
    /// no TXT records. Transport failures map to `KeyLookupFailed`.
    async fn lookup_txt(&self, name: &str) -> Result<Option<TxtRecord>>;
}

pub struct SystemResolver {
    inner: TokioAsyncResolver,
}

impl SystemResolver {
    pub fn new(timeout: Duration) -> Self {
        let mut opts = ResolverOpts::default();
        opts.timeout = timeout;
        Self {
            inner: TokioAsyncResolver::tokio(ResolverConfig::default(), opts),
        }
    }
}

#[async_trait]
impl TxtLookup for SystemResolver {
    async fn lookup_txt(&self, name: &str) -> Result<Option<TxtRecord>> {
        match self.inner.txt_lookup(name).await {
            Ok(lookup) => {
                let ttl = lookup
                    .as_lookup()
                    .records()
                    .first()
                    .map(|record| record.ttl())
                    .unwrap_or(0);
                // a TXT value may be split into segments; rejoin them
                let text = match lookup.iter().next() {
                    Some(txt) => txt
                        .txt_data()
                        .iter()
                        .map(|segment| String::from_utf8_lossy(segment).into_owned())
                        .collect::<String>(),
                    None => return Ok(None),
                };
                Ok(Some(TxtRecord { text, ttl }))
            }
            Err(e) => match e.kind() {
                ResolveErrorKind::NoRecordsFound { .. } => Ok(None),
                _ => Err(PipelineError::KeyLookupFailed(format!("{}: {}", name, e))),
            },
        }
    }
}
