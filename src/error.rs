//! Error Handling Module
//!
//! This module defines custom error types for DMARCPipe using the `thiserror` crate.
//! Every variant except `Queue` is a per-message failure: the pipeline logs it,
//! drops the message, and keeps running. `Queue` signals a transport failure of
//! the queue collaborator itself and aborts the loop.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("mail is missing a DKIM signature header")]
    MissingSignature,

    #[error("could not get DKIM record from DNS ('{0}')")]
    KeyLookupFailed(String),

    #[error("key type is not supported (must be rsa): {0}")]
    UnsupportedAlgorithm(String),

    #[error("DKIM signature is incorrect")]
    SignatureInvalid,

    #[error("content encoding is not supported (must be base64)")]
    UnsupportedEncoding,

    #[error("decode error: {0}")]
    DecodeError(String),

    #[error("unsupported zip format (must be 0x504b0304)")]
    UnsupportedFormat,

    #[error("unsupported compression method (must be 0x08)")]
    UnsupportedCompression,

    #[error("zipfile is truncated: {0}")]
    TruncatedArchive(String),

    #[error("decompression failed: {0}")]
    DecompressionError(String),

    #[error("CRC32 mismatch (header {expected:#010x}, payload {actual:#010x})")]
    IntegrityError { expected: u32, actual: u32 },

    #[error("XML transform failed: {0}")]
    TransformError(String),

    #[error("could not post the report to the collector: {0}")]
    PublishFailed(String),

    #[error("queue error: {0}")]
    Queue(String),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
