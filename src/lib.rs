//! DMARCPipe Library
//!
//! This library provides the core functionality for DMARCPipe, including
//! configuration, error handling, data models, DKIM verification, archive
//! extraction, the XML-to-JSON report transform, and the dequeuing pipeline
//! that ties them together.

pub mod collector;
pub mod config;
pub mod content;
pub mod crypto;
pub mod cursor;
pub mod dkim;
pub mod dns;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod queue;
pub mod transform;
pub mod xml_parser;
pub mod zip_handler;

pub use config::Config;
pub use error::{PipelineError, Result};
pub use pipeline::Pipeline;
pub use transform::report_to_json;
pub use xml_parser::parse_report_xml;
pub use zip_handler::extract_report;
