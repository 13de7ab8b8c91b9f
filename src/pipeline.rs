//! Pipeline Module
//!
//! The dequeuing loop. Two states: waiting on an empty queue, or processing
//! one message through every stage in sequence — DKIM verification, content
//! decoding, archive extraction, XML parsing, JSON transform, publish. A stage
//! failure is a per-message result: it is logged with its stage context and
//! the message is dropped, then the loop moves on. Only queue transport
//! failures abort the loop; everything else keeps the service running.

use crate::collector::ReportSink;
use crate::content::decode_content;
use crate::crypto::SignatureValidator;
use crate::dkim::SignatureVerifier;
use crate::dns::TxtLookup;
use crate::error::{PipelineError, Result};
use crate::models::Mail;
use crate::queue::MailQueue;
use crate::transform::report_to_json;
use crate::xml_parser::parse_report_xml;
use crate::zip_handler::extract_report;
use log::{info, warn};

pub struct Pipeline<Q, R, V, S> {
    queue: Q,
    verifier: SignatureVerifier<R, V>,
    sink: S,
    max_decompressed_size: usize,
}

impl<Q, R, V, S> Pipeline<Q, R, V, S>
where
    Q: MailQueue,
    R: TxtLookup,
    V: SignatureValidator,
    S: ReportSink,
{
    pub fn new(
        queue: Q,
        verifier: SignatureVerifier<R, V>,
        sink: S,
        max_decompressed_size: usize,
    ) -> Self {
        Self {
            queue,
            verifier,
            sink,
            max_decompressed_size,
        }
    }

    /// Runs the loop until the queue itself fails. Under normal operation this
    /// never returns; the process is terminated externally.
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.queue.dequeue().await {
                Ok(None) => self.queue.wait().await,
                Ok(Some(mail)) => {
                    info!("dequeued new message");
                    match self.process_message(&mail).await {
                        Ok(()) => info!("report published"),
                        Err(err) => warn!("message dropped: {}", err),
                    }
                }
                Err(err @ PipelineError::Queue(_)) => return Err(err),
                // a malformed payload is a message-level failure: it was
                // consumed from the queue, log it and keep going
                Err(err) => warn!("message dropped: {}", err),
            }
        }
    }

    /// Drives one message through every stage. Every early return leaves the
    /// message's allocations to drop with this call.
    pub async fn process_message(&self, mail: &Mail) -> Result<()> {
        if !self.verifier.verify(mail).await? {
            return Err(PipelineError::SignatureInvalid);
        }
        info!("DKIM signature is correct");

        let zipdata = decode_content(mail)?;
        info!("unzipping content ({} bytes)", zipdata.len());
        let xml = extract_report(&zipdata, self.max_decompressed_size)?;

        info!("converting the XML document into JSON");
        let tree = parse_report_xml(&xml)?;
        let document = report_to_json(&tree);

        info!("posting the report to the collector");
        self.sink.publish(document.into_string()).await?;
        Ok(())
    }
}
