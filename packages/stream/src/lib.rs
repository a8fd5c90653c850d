#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Stream plumbing for geoconfirm.
//!
//! Inbound, a [`StreamEvent`] carries a batch of Kinesis-style records,
//! each a partition key plus a base64 JSON payload. [`extract_messages`]
//! lazily decodes them, logging and skipping any record that fails.
//!
//! Outbound, [`publish::publish_batch`] re-encodes processed messages and
//! hands them to a [`publish::RecordSink`] in one batch. Sink failures are
//! reported in a [`publish::PublishOutcome`], never as an error.

pub mod kinesis;
pub mod publish;

use base64::{Engine as _, engine::general_purpose};
use geoconfirm_message_models::Message;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One invocation's worth of inbound records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Records in arrival order.
    #[serde(rename = "Records", default)]
    pub records: Vec<InboundRecord>,
    /// Turns on debug logging for this invocation.
    #[serde(default)]
    pub debug: bool,
}

/// A single transport record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundRecord {
    /// Stream-specific payload.
    #[serde(default)]
    pub kinesis: KinesisData,
}

/// Partition key and encoded payload of a record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KinesisData {
    /// Routing key; records sharing a key stay ordered downstream.
    #[serde(default)]
    pub partition_key: String,
    /// Base64-encoded UTF-8 JSON message.
    #[serde(default)]
    pub data: String,
}

/// A record could not be turned into a [`Message`].
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload was not valid base64.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Payload was not a JSON message.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),
}

impl InboundRecord {
    /// Wraps an already-encoded payload.
    #[must_use]
    pub fn new(partition_key: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            kinesis: KinesisData {
                partition_key: partition_key.into(),
                data: data.into(),
            },
        }
    }

    /// Encodes a message the way producers do (JSON, then base64).
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::Json`] if the message cannot be serialized.
    pub fn from_message(
        partition_key: impl Into<String>,
        message: &Message,
    ) -> Result<Self, DecodeError> {
        let json = serde_json::to_vec(message)?;
        Ok(Self::new(partition_key, general_purpose::STANDARD.encode(json)))
    }

    /// The record's partition key.
    #[must_use]
    pub fn partition_key(&self) -> &str {
        &self.kinesis.partition_key
    }

    /// Decodes the payload into a [`Message`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] if the payload is not base64 or does not
    /// contain a JSON object.
    pub fn decode(&self) -> Result<Message, DecodeError> {
        let bytes = general_purpose::STANDARD.decode(self.kinesis.data.trim())?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Lazily decodes records into `(partition_key, message)` pairs.
///
/// Records that fail to decode are logged and skipped; the remaining
/// records still come through in their original order.
pub fn extract_messages<'a, I>(records: I) -> impl Iterator<Item = (String, Message)> + 'a
where
    I: IntoIterator<Item = &'a InboundRecord>,
    I::IntoIter: 'a,
{
    records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| match record.decode() {
            Ok(message) => Some((record.partition_key().to_string(), message)),
            Err(e) => {
                log::error!(
                    "Skipping record {index} (partition key {:?}): {e}",
                    record.partition_key()
                );
                None
            }
        })
}
