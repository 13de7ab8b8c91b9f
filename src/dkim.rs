//! DKIM Verification Module
//!
//! Orchestrates sender authentication for one mail message: locate the
//! signature header, fetch the signer's public key from DNS, reframe it as a
//! PEM document, and hand everything to the signature validator. The
//! cryptography itself lives behind the `SignatureValidator` trait in the
//! crypto module; DNS transport lives behind `TxtLookup`.

use crate::crypto::SignatureValidator;
use crate::dns::TxtLookup;
use crate::error::{PipelineError, Result};
use crate::models::{Canonicalization, Mail};
use log::debug;

pub const SIGNATURE_HEADER: &str = "DKIM-Signature";

/// Parsed fields of a DKIM-Signature header value.
#[derive(Debug, Clone)]
pub struct DkimMetadata {
    pub algorithm: String,
    pub signature: String,
    pub body_hash: String,
    pub domain: String,
    pub selector: String,
    pub signed_headers: Vec<String>,
    pub header_canon: Canonicalization,
    pub body_canon: Canonicalization,
    /// The header value as it appeared on the message; the validator needs it
    /// to reconstruct the signed header with the signature value removed.
    pub raw_value: String,
}

impl DkimMetadata {
    /// Parses a DKIM-Signature header value. `None` when a required tag is
    /// missing or unparseable — an unusable signature is treated the same as
    /// an absent one.
    pub fn parse(value: &str) -> Option<Self> {
        let mut algorithm = None;
        let mut signature = None;
        let mut body_hash = None;
        let mut domain = None;
        let mut selector = None;
        let mut signed_headers = None;
        let mut header_canon = Canonicalization::Simple;
        let mut body_canon = Canonicalization::Simple;

        for (tag, tag_value) in tag_list(value) {
            match tag {
                "a" => algorithm = Some(tag_value.to_string()),
                "b" => signature = Some(tag_value.to_string()),
                "bh" => body_hash = Some(tag_value.to_string()),
                "d" => domain = Some(tag_value.to_string()),
                "s" => selector = Some(tag_value.to_string()),
                "h" => {
                    signed_headers = Some(
                        tag_value
                            .split(':')
                            .map(|name| name.trim().to_string())
                            .collect::<Vec<_>>(),
                    )
                }
                "c" => {
                    let (header, body) = match tag_value.split_once('/') {
                        Some((header, body)) => (header, Some(body)),
                        None => (tag_value, None),
                    };
                    header_canon = header.parse().ok()?;
                    body_canon = match body {
                        Some(body) => body.parse().ok()?,
                        None => Canonicalization::Simple,
                    };
                }
                _ => {}
            }
        }

        Some(DkimMetadata {
            algorithm: algorithm?,
            signature: signature?,
            body_hash: body_hash?,
            domain: domain?,
            selector: selector?,
            signed_headers: signed_headers?,
            header_canon,
            body_canon,
            raw_value: value.to_string(),
        })
    }
}

/// Key record published at `<selector>._domainkey.<domain>`.
#[derive(Debug, Clone)]
pub struct DnsKeyRecord {
    pub key_type: String,
    pub public_key: String,
}

impl DnsKeyRecord {
    pub fn parse(txt: &str) -> Self {
        // k defaults to rsa when the record omits it
        let mut key_type = "rsa".to_string();
        let mut public_key = String::new();
        for (tag, tag_value) in tag_list(txt) {
            match tag {
                "k" => key_type = tag_value.to_string(),
                "p" => public_key = tag_value.to_string(),
                _ => {}
            }
        }
        DnsKeyRecord {
            key_type,
            public_key,
        }
    }
}

/// Splits a `tag=value; tag=value` list. Values keep any embedded `=`,
/// which base64 padding relies on.
fn tag_list(value: &str) -> impl Iterator<Item = (&str, &str)> {
    value.split(';').filter_map(|part| {
        let (tag, tag_value) = part.split_once('=')?;
        Some((tag.trim(), tag_value.trim()))
    })
}

/// Rewraps bare base64 key material into 64-character lines framed by the
/// standard PEM markers.
pub fn pem_wrap(key_material: &str) -> String {
    let clean: Vec<char> = key_material
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let mut pem = String::from("-----BEGIN PUBLIC KEY-----\n");
    for line in clean.chunks(64) {
        pem.extend(line);
        pem.push('\n');
    }
    pem.push_str("-----END PUBLIC KEY-----\n");
    pem
}

pub struct SignatureVerifier<R, V> {
    resolver: R,
    validator: V,
}

impl<R: TxtLookup, V: SignatureValidator> SignatureVerifier<R, V> {
    pub fn new(resolver: R, validator: V) -> Self {
        Self {
            resolver,
            validator,
        }
    }

    /// Verifies the DKIM signature on `mail`, returning the validator's
    /// boolean verdict unmodified.
    pub async fn verify(&self, mail: &Mail) -> Result<bool> {
        let value = mail
            .header_ignore_case(SIGNATURE_HEADER)
            .ok_or(PipelineError::MissingSignature)?;
        let meta = DkimMetadata::parse(value).ok_or(PipelineError::MissingSignature)?;

        let query = format!("{}._domainkey.{}", meta.selector, meta.domain);
        let record = self
            .resolver
            .lookup_txt(&query)
            .await?
            .ok_or_else(|| PipelineError::KeyLookupFailed(query.clone()))?;
        // TTL is observed but not used for caching
        debug!("DKIM key record for '{}' has TTL {}s", query, record.ttl);

        let key = DnsKeyRecord::parse(&record.text);
        // historical behavior: a 3-character prefix match on the key type
        if !key.key_type.starts_with("rsa") {
            return Err(PipelineError::UnsupportedAlgorithm(key.key_type));
        }

        let pem = pem_wrap(&key.public_key);
        self.validator.validate(mail, &meta, &pem)
    }
}
