//! Amazon Kinesis Data Streams sink.
//!
//! Authentication uses the standard AWS credential chain (env vars, IAM
//! role, `~/.aws/credentials`); the region comes from `AWS_REGION` or the
//! shared config.

use async_trait::async_trait;
use aws_sdk_kinesis::primitives::Blob;
use aws_sdk_kinesis::types::PutRecordsRequestEntry;

use crate::publish::{OutboundRecord, PublishError, RecordFailure, RecordSink, SinkReport};

/// Maximum entries accepted by a single `PutRecords` call.
const MAX_RECORDS_PER_REQUEST: usize = 500;

/// Publishes records with the Kinesis `PutRecords` API.
#[derive(Debug, Clone)]
pub struct KinesisSink {
    client: aws_sdk_kinesis::Client,
}

impl KinesisSink {
    /// Wraps an existing client.
    #[must_use]
    pub const fn new(client: aws_sdk_kinesis::Client) -> Self {
        Self { client }
    }

    /// Creates a sink from the ambient AWS configuration.
    pub async fn from_env() -> Self {
        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .load()
            .await;
        Self::new(aws_sdk_kinesis::Client::new(&config))
    }
}

#[async_trait]
impl RecordSink for KinesisSink {
    async fn put_records(
        &self,
        stream_name: &str,
        records: Vec<OutboundRecord>,
    ) -> Result<SinkReport, PublishError> {
        put_in_chunks(stream_name, &records, |chunk| self.put_chunk(stream_name, chunk)).await
    }
}

impl KinesisSink {
    /// Sends one `PutRecords` request and collects per-record rejections.
    async fn put_chunk(
        &self,
        stream_name: &str,
        chunk: Vec<OutboundRecord>,
    ) -> Result<SinkReport, PublishError> {
        let entries = chunk
            .iter()
            .map(|record| {
                PutRecordsRequestEntry::builder()
                    .partition_key(&record.partition_key)
                    .data(Blob::new(record.data.clone()))
                    .build()
                    .map_err(|e| PublishError::Request {
                        stream: stream_name.to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .put_records()
            .stream_name(stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|e| PublishError::Sdk {
                stream: stream_name.to_string(),
                source: Box::new(e),
            })?;

        // Result entries line up with request entries by index.
        let failed = chunk
            .iter()
            .zip(output.records())
            .filter_map(|(record, result)| {
                result.error_code().map(|code| RecordFailure {
                    partition_key: record.partition_key.clone(),
                    error_code: code.to_string(),
                    error_message: result.error_message().unwrap_or_default().to_string(),
                })
            })
            .collect();

        Ok(SinkReport { failed })
    }
}

/// Error code recorded for records whose whole request failed.
const REQUEST_FAILED: &str = "RequestFailed";

/// Sends `records` through `send` in chunks of at most
/// [`MAX_RECORDS_PER_REQUEST`].
///
/// A failed chunk does not stop later chunks; its records are reported as
/// failures instead. Only when every chunk fails is the last error
/// returned.
async fn put_in_chunks<F, Fut>(
    stream_name: &str,
    records: &[OutboundRecord],
    mut send: F,
) -> Result<SinkReport, PublishError>
where
    F: FnMut(Vec<OutboundRecord>) -> Fut,
    Fut: Future<Output = Result<SinkReport, PublishError>>,
{
    let mut report = SinkReport::default();
    let mut delivered_chunks = 0_usize;
    let mut last_error = None;

    for chunk in records.chunks(MAX_RECORDS_PER_REQUEST) {
        match send(chunk.to_vec()).await {
            Ok(chunk_report) => {
                delivered_chunks += 1;
                report.failed.extend(chunk_report.failed);
            }
            Err(e) => {
                log::error!(
                    "PutRecords to {stream_name} failed for {} record(s): {e}",
                    chunk.len()
                );
                let message = e.to_string();
                report
                    .failed
                    .extend(chunk.iter().map(|record| RecordFailure {
                        partition_key: record.partition_key.clone(),
                        error_code: REQUEST_FAILED.to_string(),
                        error_message: message.clone(),
                    }));
                last_error = Some(e);
            }
        }
    }

    match last_error {
        Some(e) if delivered_chunks == 0 => Err(e),
        _ => Ok(report),
    }
}
