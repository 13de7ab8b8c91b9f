//! Signature Crypto Module
//!
//! The cryptographic collaborator behind DKIM verification: RFC 6376
//! canonicalization, body-hash comparison, and RSA/SHA-256 signature checking.
//! The verifier treats this as a black box returning a boolean verdict;
//! malformed key or signature material yields `false` rather than an error,
//! since there is no partial-success state in the contract.

use crate::dkim::{DkimMetadata, SIGNATURE_HEADER};
use crate::error::{PipelineError, Result};
use crate::models::{Canonicalization, Mail};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use log::debug;
use rsa::pkcs8::DecodePublicKey;
use rsa::{Pkcs1v15Sign, RsaPublicKey};
use sha2::{Digest, Sha256};

pub trait SignatureValidator: Send + Sync {
    /// Checks the signature described by `meta` over the message, using the
    /// PEM-framed public key. Returns the boolean verdict.
    fn validate(&self, mail: &Mail, meta: &DkimMetadata, public_key_pem: &str) -> Result<bool>;
}

pub struct RsaSha256Validator;

impl SignatureValidator for RsaSha256Validator {
    fn validate(&self, mail: &Mail, meta: &DkimMetadata, public_key_pem: &str) -> Result<bool> {
        if meta.algorithm != "rsa-sha256" {
            return Err(PipelineError::UnsupportedAlgorithm(meta.algorithm.clone()));
        }

        let body = canonicalize_body(&mail.body, meta.body_canon);
        let body_hash = STANDARD.encode(Sha256::digest(body.as_bytes()));
        if body_hash != strip_folding(&meta.body_hash) {
            debug!("body hash does not match the bh= tag");
            return Ok(false);
        }

        let key = match RsaPublicKey::from_public_key_pem(public_key_pem) {
            Ok(key) => key,
            Err(e) => {
                debug!("unusable public key: {}", e);
                return Ok(false);
            }
        };
        let signature = match STANDARD.decode(strip_folding(&meta.signature)) {
            Ok(signature) => signature,
            Err(e) => {
                debug!("unusable b= tag: {}", e);
                return Ok(false);
            }
        };

        let digest = Sha256::digest(signed_header_data(mail, meta).as_bytes());
        Ok(key
            .verify(Pkcs1v15Sign::new::<Sha256>(), &digest, &signature)
            .is_ok())
    }
}

/// Drops the folding whitespace that base64 tag values may carry.
fn strip_folding(s: &str) -> String {
    s.chars().filter(|c| !c.is_ascii_whitespace()).collect()
}

fn normalize_crlf(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\n', "\r\n")
}

/// Reduces every WSP run to a single SP; trailing WSP disappears.
fn reduce_wsp(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut pending_space = false;
    for c in line.chars() {
        if c == ' ' || c == '\t' {
            pending_space = true;
        } else {
            if pending_space {
                out.push(' ');
                pending_space = false;
            }
            out.push(c);
        }
    }
    out
}

pub(crate) fn canonicalize_body(body: &str, canon: Canonicalization) -> String {
    let normalized = normalize_crlf(body);
    match canon {
        Canonicalization::Simple => {
            let mut out = normalized;
            if !out.ends_with("\r\n") {
                out.push_str("\r\n");
            }
            while out.ends_with("\r\n\r\n") {
                out.truncate(out.len() - 2);
            }
            out
        }
        Canonicalization::Relaxed => {
            let mut lines: Vec<String> = normalized.split("\r\n").map(reduce_wsp).collect();
            while lines.last().is_some_and(|line| line.is_empty()) {
                lines.pop();
            }
            if lines.is_empty() {
                return String::new();
            }
            let mut out = lines.join("\r\n");
            out.push_str("\r\n");
            out
        }
    }
}

pub(crate) fn canonicalize_header(name: &str, value: &str, canon: Canonicalization) -> String {
    match canon {
        Canonicalization::Simple => format!("{}: {}\r\n", name, value),
        Canonicalization::Relaxed => {
            let unfolded = value.replace("\r\n", "").replace('\n', "");
            format!(
                "{}:{}\r\n",
                name.to_ascii_lowercase(),
                reduce_wsp(&unfolded).trim()
            )
        }
    }
}

/// Empties the b= tag value while leaving every other byte of the header
/// value untouched, as the signer did before signing.
fn strip_signature_value(raw: &str) -> String {
    raw.split(';')
        .map(|part| {
            let trimmed = part.trim_start();
            if trimmed.starts_with("b=") {
                let ws = &part[..part.len() - trimmed.len()];
                format!("{}b=", ws)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(";")
}

/// Builds the exact byte sequence the signature covers: each signed header
/// (bottom-up, each occurrence consumed once), then the DKIM-Signature header
/// itself with an empty b= value and no trailing CRLF.
fn signed_header_data(mail: &Mail, meta: &DkimMetadata) -> String {
    let mut used = vec![false; mail.headers.len()];
    let mut data = String::new();
    for name in &meta.signed_headers {
        let found = mail
            .headers
            .iter()
            .enumerate()
            .rev()
            .find(|(i, (key, _))| !used[*i] && key.eq_ignore_ascii_case(name));
        if let Some((i, (key, value))) = found {
            used[i] = true;
            data.push_str(&canonicalize_header(key, value, meta.header_canon));
        }
    }
    let stripped = strip_signature_value(&meta.raw_value);
    let canon = canonicalize_header(SIGNATURE_HEADER, &stripped, meta.header_canon);
    data.push_str(canon.strip_suffix("\r\n").unwrap_or(&canon));
    data
}
