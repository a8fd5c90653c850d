//! Batch re-publication of processed messages.
//!
//! Publishing is fire-and-log: [`publish_batch`] never fails. Whatever
//! went wrong is logged and summarized in the returned
//! [`PublishOutcome`] so callers and operators can still observe it.

use async_trait::async_trait;
use geoconfirm_message_models::Message;
use thiserror::Error;

/// An encoded record ready for the outbound transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundRecord {
    /// Routing key, copied from the inbound record.
    pub partition_key: String,
    /// JSON-serialized message.
    pub data: Vec<u8>,
}

/// A record the transport accepted the batch for but then rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Partition key of the rejected record.
    pub partition_key: String,
    /// Transport error code (e.g. `ProvisionedThroughputExceededException`).
    pub error_code: String,
    /// Transport error description.
    pub error_message: String,
}

/// Per-record results of a sink call that reached the transport.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Records the transport rejected.
    pub failed: Vec<RecordFailure>,
}

/// The whole batch could not be handed to the transport.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The transport call failed.
    #[error("Failed to put records to stream {stream}: {source}")]
    Sdk {
        /// Destination stream.
        stream: String,
        /// Underlying SDK error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A request entry could not be built.
    #[error("Invalid record for stream {stream}: {message}")]
    Request {
        /// Destination stream.
        stream: String,
        /// Description of the problem.
        message: String,
    },
}

/// Outbound transport.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Submits `records` to `stream_name` as one batch.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the batch as a whole is rejected.
    /// Individual rejections are reported in the [`SinkReport`].
    async fn put_records(
        &self,
        stream_name: &str,
        records: Vec<OutboundRecord>,
    ) -> Result<SinkReport, PublishError>;
}

/// What happened to a published batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    /// Records handed to the transport.
    pub submitted: usize,
    /// Records that did not make it (encoding failures, per-record
    /// rejections, or the whole batch on a transport error).
    pub failed: usize,
    /// Transport error for the batch as a whole, if any.
    pub error: Option<String>,
}

impl PublishOutcome {
    /// Whether every message was published.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.failed == 0 && self.error.is_none()
    }
}

impl std::fmt::Display for PublishOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} submitted, {} failed", self.submitted, self.failed)?;
        if let Some(error) = &self.error {
            write!(f, " ({error})")?;
        }
        Ok(())
    }
}

/// Serializes `messages` and submits them to `stream_name` in one batch.
///
/// Never returns an error: encoding failures, per-record rejections, and
/// transport failures are logged and counted in the outcome.
pub async fn publish_batch<'a, I>(
    sink: &dyn RecordSink,
    stream_name: &str,
    messages: I,
) -> PublishOutcome
where
    I: IntoIterator<Item = (&'a str, &'a Message)>,
{
    let mut outcome = PublishOutcome::default();

    let records: Vec<OutboundRecord> = messages
        .into_iter()
        .filter_map(|(partition_key, message)| match serde_json::to_vec(message) {
            Ok(data) => Some(OutboundRecord {
                partition_key: partition_key.to_string(),
                data,
            }),
            Err(e) => {
                log::error!("Failed to encode message (partition key {partition_key:?}): {e}");
                outcome.failed += 1;
                None
            }
        })
        .collect();

    if records.is_empty() {
        log::debug!("Nothing to publish to {stream_name}");
        return outcome;
    }

    let count = records.len();
    log::debug!("Publishing {count} record(s) to {stream_name}");

    match sink.put_records(stream_name, records).await {
        Ok(report) => {
            outcome.submitted = count;
            outcome.failed += report.failed.len();
            for failure in &report.failed {
                log::warn!(
                    "Record rejected by {stream_name} (partition key {:?}): {} {}",
                    failure.partition_key,
                    failure.error_code,
                    failure.error_message
                );
            }
        }
        Err(e) => {
            log::error!("Failed to publish {count} record(s): {e}");
            outcome.failed += count;
            outcome.error = Some(e.to_string());
        }
    }

    if outcome.is_complete() {
        log::info!("Published {count} record(s) to {stream_name}");
    } else {
        log::warn!("Publish to {stream_name} incomplete: {outcome}");
    }

    outcome
}

/// A sink that only logs what it would publish (for dry runs).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

#[async_trait]
impl RecordSink for LogSink {
    async fn put_records(
        &self,
        stream_name: &str,
        records: Vec<OutboundRecord>,
    ) -> Result<SinkReport, PublishError> {
        for record in &records {
            log::info!(
                "[dry run] {stream_name} <- {} ({} bytes)",
                record.partition_key,
                record.data.len()
            );
        }
        Ok(SinkReport::default())
    }
}
