//! End-to-end tests for the dequeuing pipeline.
//!
//! These drive the loop with an in-memory queue and stub collaborators:
//! a resolver that serves a fixed key record, a validator whose verdict is
//! controlled per message, and a sink that records every published document.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::write::DeflateEncoder;
use flate2::{Compression, Crc};
use serde_json::json;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};

use dmarcpipe::collector::ReportSink;
use dmarcpipe::crypto::SignatureValidator;
use dmarcpipe::dkim::{DkimMetadata, SignatureVerifier};
use dmarcpipe::dns::{TxtLookup, TxtRecord};
use dmarcpipe::models::Mail;
use dmarcpipe::queue::MailQueue;
use dmarcpipe::{Pipeline, PipelineError, Result};

/// Serves queued mail; once drained it fails the loop so `run` returns.
struct VecQueue {
    mails: VecDeque<Mail>,
}

#[async_trait]
impl MailQueue for VecQueue {
    async fn dequeue(&mut self) -> Result<Option<Mail>> {
        match self.mails.pop_front() {
            Some(mail) => Ok(Some(mail)),
            None => Err(PipelineError::Queue("test queue drained".into())),
        }
    }

    async fn wait(&mut self) {}

    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

struct StubResolver;

#[async_trait]
impl TxtLookup for StubResolver {
    async fn lookup_txt(&self, _name: &str) -> Result<Option<TxtRecord>> {
        Ok(Some(TxtRecord {
            text: "v=DKIM1; k=rsa; p=Zm9v".to_string(),
            ttl: 300,
        }))
    }
}

/// Verdict is carried by the message itself, so one run can mix outcomes.
struct HeaderVerdict;

impl SignatureValidator for HeaderVerdict {
    fn validate(&self, mail: &Mail, _meta: &DkimMetadata, _pem: &str) -> Result<bool> {
        Ok(mail.header("X-Test-Verdict") != Some("fail"))
    }
}

#[derive(Clone, Default)]
struct RecordingSink {
    published: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ReportSink for RecordingSink {
    async fn publish(&self, document: String) -> Result<()> {
        self.published.lock().unwrap().push(document);
        Ok(())
    }
}

fn build_archive(payload: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(payload).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut crc = Crc::new();
    crc.update(payload);

    let filename = b"report.xml";
    let mut archive = Vec::new();
    archive.extend_from_slice(&[0x50, 0x4b, 0x03, 0x04]);
    archive.extend_from_slice(&20u16.to_le_bytes());
    archive.extend_from_slice(&0u16.to_le_bytes());
    archive.extend_from_slice(&8u16.to_le_bytes());
    archive.extend_from_slice(&0u16.to_le_bytes());
    archive.extend_from_slice(&0u16.to_le_bytes());
    archive.extend_from_slice(&crc.sum().to_le_bytes());
    archive.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
    archive.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    archive.extend_from_slice(&(filename.len() as u16).to_le_bytes());
    archive.extend_from_slice(&0u16.to_le_bytes());
    archive.extend_from_slice(filename);
    archive.extend_from_slice(&compressed);
    archive
}

const REPORT_XML: &str = "<feedback>\
    <report_metadata><org_name>acme</org_name></report_metadata>\
    <policy_published><domain>example.org</domain></policy_published>\
    <record><row><source_ip>192.0.2.1</source_ip><count>2</count></row></record>\
</feedback>";

fn report_mail(verdict_header: Option<&str>) -> Mail {
    let body = STANDARD.encode(build_archive(REPORT_XML.as_bytes()));
    let mut headers = vec![
        ("From".to_string(), "reports@example.org".to_string()),
        (
            "DKIM-Signature".to_string(),
            "v=1; a=rsa-sha256; c=relaxed/relaxed; d=example.org; s=sel; \
             h=from; bh=abc=; b=def="
                .to_string(),
        ),
        (
            "Content-Transfer-Encoding".to_string(),
            "base64".to_string(),
        ),
    ];
    if let Some(verdict) = verdict_header {
        headers.push(("X-Test-Verdict".to_string(), verdict.to_string()));
    }
    Mail { headers, body }
}

fn pipeline_with(
    mails: Vec<Mail>,
) -> (
    Pipeline<VecQueue, StubResolver, HeaderVerdict, RecordingSink>,
    Arc<Mutex<Vec<String>>>,
) {
    let sink = RecordingSink::default();
    let published = sink.published.clone();
    let pipeline = Pipeline::new(
        VecQueue {
            mails: mails.into(),
        },
        SignatureVerifier::new(StubResolver, HeaderVerdict),
        sink,
        1024 * 1024,
    );
    (pipeline, published)
}

#[tokio::test]
async fn test_valid_message_is_published() {
    let (mut pipeline, published) = pipeline_with(vec![report_mail(None)]);
    pipeline.run().await.unwrap_err(); // test queue drained

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    let value: serde_json::Value = serde_json::from_str(&published[0]).unwrap();
    assert_eq!(
        value,
        json!({
            "metadata": {"org_name": "acme"},
            "policy": {"domain": "example.org"},
            "records": [{"row": {"source_ip": "192.0.2.1", "count": "2"}}]
        })
    );
}

#[tokio::test]
async fn test_failed_verification_short_circuits_and_loop_continues() {
    let (mut pipeline, published) =
        pipeline_with(vec![report_mail(Some("fail")), report_mail(None)]);
    pipeline.run().await.unwrap_err();

    // the rejected message never reached the sink; the one behind it did
    assert_eq!(published.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_stage_failures_drop_the_message_and_continue() {
    let mut unsigned = report_mail(None);
    unsigned.headers.retain(|(k, _)| k.as_str() != "DKIM-Signature");

    let mut wrong_encoding = report_mail(None);
    for (k, v) in &mut wrong_encoding.headers {
        if k.as_str() == "Content-Transfer-Encoding" {
            *v = "7bit".to_string();
        }
    }

    let mut garbage_archive = report_mail(None);
    garbage_archive.body = STANDARD.encode(b"not an archive, far too short");

    let (mut pipeline, published) = pipeline_with(vec![
        unsigned,
        wrong_encoding,
        garbage_archive,
        report_mail(None),
    ]);
    pipeline.run().await.unwrap_err();

    assert_eq!(published.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_publish_failure_is_a_message_failure() {
    struct FailingSink;

    #[async_trait]
    impl ReportSink for FailingSink {
        async fn publish(&self, _document: String) -> Result<()> {
            Err(PipelineError::PublishFailed("HTTP 500".into()))
        }
    }

    let pipeline = Pipeline::new(
        VecQueue {
            mails: VecDeque::new(),
        },
        SignatureVerifier::new(StubResolver, HeaderVerdict),
        FailingSink,
        1024 * 1024,
    );
    let err = pipeline.process_message(&report_mail(None)).await.unwrap_err();
    assert!(matches!(err, PipelineError::PublishFailed(_)));
}
