//! Content Decoder Module
//!
//! Report mail carries its archive attachment base64-encoded in the message
//! body. This module checks the declared transfer encoding and decodes the body
//! into raw bytes. Anything other than base64 is rejected, and malformed base64
//! fails outright rather than yielding truncated bytes.

use crate::error::{PipelineError, Result};
use crate::models::Mail;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

const TRANSFER_ENCODING_HEADER: &str = "Content-Transfer-Encoding";

/// Decodes the mail body according to its declared transfer encoding.
pub fn decode_content(mail: &Mail) -> Result<Vec<u8>> {
    let encoding = mail
        .header(TRANSFER_ENCODING_HEADER)
        .map(str::trim)
        .ok_or(PipelineError::UnsupportedEncoding)?;

    if encoding != "base64" {
        return Err(PipelineError::UnsupportedEncoding);
    }

    // Mail bodies fold base64 across lines; the alphabet itself has no
    // whitespace, so stripping it first is lossless.
    let folded: String = mail
        .body
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();

    STANDARD
        .decode(folded)
        .map_err(|e| PipelineError::DecodeError(e.to_string()))
}
