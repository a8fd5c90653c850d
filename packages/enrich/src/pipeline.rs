//! Stream-mode entry point: one inbound batch in, one outbound batch out.

use std::time::Duration;

use futures::stream::{self, StreamExt as _};
use geoconfirm_geocoder::GeocodingLookup;
use geoconfirm_message_models::Message;
use geoconfirm_stream::publish::{PublishOutcome, RecordSink, publish_batch};
use geoconfirm_stream::{StreamEvent, extract_messages};
use tokio::time::Instant;

use crate::enable_verbose_logging;
use crate::enricher::{Outcome, RecordEnricher};
use crate::provenance::Agent;

/// Settings for [`process_batch`].
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Destination stream for processed records.
    pub stream_name: String,
    /// Radius for messages that carry none, in meters.
    pub default_search_radius: Option<f64>,
    /// Upper bound on a single lookup.
    pub lookup_timeout: Duration,
    /// Upper bound on all lookups in one batch, measured from the start
    /// of the batch.
    pub batch_deadline: Duration,
    /// Maximum concurrent lookups.
    pub concurrency: usize,
}

/// A stamped message ready for (or already sent to) the output stream.
#[derive(Debug, Clone)]
pub struct ProcessedRecord {
    /// Partition key of the inbound record.
    pub partition_key: String,
    /// The message after enrichment and stamping.
    pub message: Message,
    /// What enrichment did.
    pub outcome: Outcome,
}

/// Everything that happened to one batch.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// Processed records in inbound order.
    pub records: Vec<ProcessedRecord>,
    /// Inbound records dropped because they could not be decoded.
    pub skipped: usize,
    /// Result of the outbound publish.
    pub publish: PublishOutcome,
}

impl BatchReport {
    /// Number of records whose coordinates were replaced.
    #[must_use]
    pub fn enriched(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_enriched()).count()
    }

    /// Number of records left unchanged, for any reason.
    #[must_use]
    pub fn unchanged(&self) -> usize {
        self.records.len() - self.enriched()
    }

    /// Number of records whose lookup failed.
    #[must_use]
    pub fn lookup_failures(&self) -> usize {
        self.records
            .iter()
            .filter(|r| r.outcome.is_lookup_failure())
            .count()
    }

    /// The processed messages, in order.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        self.records.iter().map(|r| &r.message)
    }
}

/// Enriches every decodable record in `event` and publishes the results.
///
/// Undecodable records are skipped. A failed lookup leaves its record
/// unchanged but still stamped and published. Publish failures are
/// recorded in [`BatchReport::publish`]; the returned records always
/// reflect local processing.
pub async fn process_batch(
    lookup: &dyn GeocodingLookup,
    sink: &dyn RecordSink,
    agent: &Agent,
    event: &StreamEvent,
    options: &PipelineOptions,
) -> BatchReport {
    enable_verbose_logging(event.debug);

    let deadline = Instant::now() + options.batch_deadline;
    let enricher = RecordEnricher::new(
        lookup,
        agent,
        options.default_search_radius,
        options.lookup_timeout,
    );
    let enricher = &enricher;

    log::debug!(
        "Processing {} inbound record(s) (concurrency={})",
        event.records.len(),
        options.concurrency
    );

    let records: Vec<ProcessedRecord> = stream::iter(extract_messages(&event.records))
        .map(|(partition_key, mut message)| async move {
            let outcome = enricher.process(&mut message, Some(deadline)).await;
            ProcessedRecord {
                partition_key,
                message,
                outcome,
            }
        })
        .buffered(options.concurrency.max(1))
        .collect()
        .await;

    let skipped = event.records.len() - records.len();

    let publish = publish_batch(
        sink,
        &options.stream_name,
        records
            .iter()
            .map(|r| (r.partition_key.as_str(), &r.message)),
    )
    .await;

    let report = BatchReport {
        records,
        skipped,
        publish,
    };

    log::info!(
        "Processed {} record(s): {} enriched, {} unchanged ({} lookup failure(s)), {} skipped; publish: {}",
        report.records.len(),
        report.enriched(),
        report.unchanged(),
        report.lookup_failures(),
        report.skipped,
        report.publish
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use geoconfirm_geocoder::{Candidate, GeocodeError};
    use geoconfirm_message_models::{CoordinateSource, GeoBounds, LatLng};
    use geoconfirm_stream::InboundRecord;
    use geoconfirm_stream::publish::{OutboundRecord, PublishError, SinkReport};
    use serde_json::json;

    const BROADWAY: LatLng = LatLng::new(40.748292, -73.988197);

    /// Answers by text: `"fail"` errors, `"slow"` hangs, anything else
    /// returns the configured candidates.
    struct ScriptedLookup {
        candidates: Vec<LatLng>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodingLookup for ScriptedLookup {
        async fn lookup(
            &self,
            text: &str,
            _bounds: &GeoBounds,
        ) -> Result<Vec<Candidate>, GeocodeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match text {
                "fail" => Err(GeocodeError::Service {
                    status: "UNKNOWN_ERROR".to_string(),
                    message: "try again".to_string(),
                }),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok(Vec::new())
                }
                _ => Ok(self
                    .candidates
                    .iter()
                    .map(|&location| Candidate {
                        location,
                        formatted_address: None,
                    })
                    .collect()),
            }
        }
    }

    #[derive(Default)]
    struct CapturingSink {
        batches: Mutex<Vec<Vec<OutboundRecord>>>,
        fail: bool,
    }

    #[async_trait]
    impl RecordSink for CapturingSink {
        async fn put_records(
            &self,
            stream_name: &str,
            records: Vec<OutboundRecord>,
        ) -> Result<SinkReport, PublishError> {
            if self.fail {
                return Err(PublishError::Sdk {
                    stream: stream_name.to_string(),
                    source: "stream not found".into(),
                });
            }
            self.batches.lock().unwrap().push(records);
            Ok(SinkReport::default())
        }
    }

    fn lookup(candidates: Vec<LatLng>) -> ScriptedLookup {
        ScriptedLookup {
            candidates,
            calls: AtomicUsize::new(0),
        }
    }

    fn agent() -> Agent {
        Agent {
            name: "geoconfirm_enrich".to_string(),
            version: "0.1.0".to_string(),
            hostname: "test-host".to_string(),
        }
    }

    fn options() -> PipelineOptions {
        PipelineOptions {
            stream_name: "enriched-messages".to_string(),
            default_search_radius: Some(1_000.0),
            lookup_timeout: Duration::from_secs(5),
            batch_deadline: Duration::from_secs(25),
            concurrency: 4,
        }
    }

    fn record(key: &str, text: &str, source: CoordinateSource) -> InboundRecord {
        let message: Message = serde_json::from_value(json!({
            "id": key,
            "content": text,
            "coordinates": "{40.754932, -73.984016}",
            "coordinateSource": source.to_string()
        }))
        .unwrap();
        InboundRecord::from_message(key, &message).unwrap()
    }

    fn event(records: Vec<InboundRecord>) -> StreamEvent {
        StreamEvent {
            records,
            debug: false,
        }
    }

    #[tokio::test]
    async fn enriches_stamps_and_publishes_in_order() {
        let lookup = lookup(vec![BROADWAY]);
        let sink = CapturingSink::default();
        let event = event(vec![
            record("a", "Broadway and W 32nd St", CoordinateSource::UnreliableOriginSource),
            record("b", "Broadway and W 32nd St", CoordinateSource::DeviceGpsSource),
            record("c", "Broadway and W 32nd St", CoordinateSource::GeocodingApiSource),
        ]);

        let report = process_batch(&lookup, &sink, &agent(), &event, &options()).await;

        assert_eq!(report.records.len(), 3);
        assert_eq!(report.enriched(), 1);
        assert_eq!(report.unchanged(), 2);
        assert_eq!(report.skipped, 0);
        assert!(report.publish.is_complete());
        assert_eq!(lookup.calls.load(Ordering::SeqCst), 1);

        let keys: Vec<_> = report.records.iter().map(|r| r.partition_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
        for message in report.messages() {
            assert_eq!(message.process_log.len(), 1);
        }
        assert_eq!(
            report.records[0].message.source(),
            Some(CoordinateSource::GeocodingApiSource)
        );

        let batches = sink.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let published: Vec<serde_json::Value> = batches[0]
            .iter()
            .map(|r| serde_json::from_slice(&r.data).unwrap())
            .collect();
        assert_eq!(published[0]["coordinates"], json!("{40.748292, -73.988197}"));
        assert_eq!(published[1]["coordinates"], json!("{40.754932, -73.984016}"));
        assert_eq!(published[2]["processLog"][0]["hostname"], json!("test-host"));
    }

    #[tokio::test]
    async fn corrupt_record_is_skipped_without_affecting_siblings() {
        let lookup = lookup(vec![BROADWAY]);
        let sink = CapturingSink::default();
        let event = event(vec![
            record("a", "Broadway", CoordinateSource::UnreliableOriginSource),
            InboundRecord::new("b", "definitely-not-base64!"),
            record("c", "Broadway", CoordinateSource::UnreliableOriginSource),
        ]);

        let report = process_batch(&lookup, &sink, &agent(), &event, &options()).await;

        assert_eq!(report.skipped, 1);
        let keys: Vec<_> = report.records.iter().map(|r| r.partition_key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(sink.batches.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn failing_lookup_does_not_abort_the_batch() {
        let lookup = lookup(vec![BROADWAY]);
        let sink = CapturingSink::default();
        let event = event(vec![
            record("a", "fail", CoordinateSource::UnreliableOriginSource),
            record("b", "Broadway", CoordinateSource::UnreliableOriginSource),
        ]);

        let report = process_batch(&lookup, &sink, &agent(), &event, &options()).await;

        assert_eq!(report.lookup_failures(), 1);
        assert_eq!(report.enriched(), 1);
        assert_eq!(
            report.records[0].message.source(),
            Some(CoordinateSource::UnreliableOriginSource)
        );
        assert_eq!(report.records[0].message.process_log.len(), 1);
        assert_eq!(sink.batches.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn no_match_is_published_unchanged() {
        let lookup = lookup(Vec::new());
        let sink = CapturingSink::default();
        let event = event(vec![record(
            "a",
            "Broadway",
            CoordinateSource::UnreliableOriginSource,
        )]);

        let report = process_batch(&lookup, &sink, &agent(), &event, &options()).await;

        assert_eq!(report.enriched(), 0);
        assert_eq!(
            report.records[0].message.encoded_coordinates(),
            Some("{40.754932, -73.984016}")
        );
        assert_eq!(report.records[0].message.process_log.len(), 1);
        assert_eq!(sink.batches.lock().unwrap()[0].len(), 1);
    }

    #[tokio::test]
    async fn publish_failure_still_returns_processed_records() {
        let lookup = lookup(vec![BROADWAY]);
        let sink = CapturingSink {
            fail: true,
            ..CapturingSink::default()
        };
        let event = event(vec![
            record("a", "Broadway", CoordinateSource::UnreliableOriginSource),
            record("b", "Broadway", CoordinateSource::ManualEntrySource),
        ]);

        let report = process_batch(&lookup, &sink, &agent(), &event, &options()).await;

        assert_eq!(report.records.len(), 2);
        assert_eq!(report.enriched(), 1);
        assert_eq!(report.publish.failed, 2);
        assert!(report.publish.error.as_deref().unwrap().contains("stream not found"));
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_lookup_is_cut_off_by_the_batch_deadline() {
        let lookup = lookup(vec![BROADWAY]);
        let sink = CapturingSink::default();
        let event = event(vec![
            record("a", "slow", CoordinateSource::UnreliableOriginSource),
            record("b", "Broadway", CoordinateSource::UnreliableOriginSource),
        ]);
        let options = PipelineOptions {
            lookup_timeout: Duration::from_secs(600),
            batch_deadline: Duration::from_secs(10),
            concurrency: 1,
            ..options()
        };

        let started = Instant::now();
        let report = process_batch(&lookup, &sink, &agent(), &event, &options).await;

        assert!(started.elapsed() <= Duration::from_secs(11));
        assert!(report.records[0].outcome.is_lookup_failure());
        // the second lookup would start after the deadline, so it is skipped
        assert_eq!(
            report.records[1].outcome,
            Outcome::Unchanged(crate::enricher::UnchangedReason::DeadlineExceeded)
        );
        assert_eq!(report.records.len(), 2);
        assert_eq!(sink.batches.lock().unwrap()[0].len(), 2);
    }

    #[tokio::test]
    async fn earlier_process_log_entries_are_published_verbatim() {
        let lookup = lookup(vec![BROADWAY]);
        let sink = CapturingSink::default();
        let earlier = json!([
            {
                "agentName": "ingest",
                "agentVersion": "2.0.0",
                "processedAt": "2024-05-01T12:00:00.000Z",
                "hostname": "a"
            },
            {
                "agentName": "dedupe",
                "agentVersion": "1.1.0",
                "processedAt": "2024-05-01T14:00:00+02:00",
                "hostname": "b",
                "durationMs": 12
            }
        ]);
        let message: Message = serde_json::from_value(json!({
            "content": "Broadway",
            "coordinates": "{40.754932, -73.984016}",
            "coordinateSource": "UnreliableOriginSource",
            "processLog": earlier
        }))
        .unwrap();
        let event = event(vec![InboundRecord::from_message("a", &message).unwrap()]);

        let report = process_batch(&lookup, &sink, &agent(), &event, &options()).await;
        assert_eq!(report.enriched(), 1);

        let batches = sink.batches.lock().unwrap();
        let published: serde_json::Value = serde_json::from_slice(&batches[0][0].data).unwrap();
        let log = published["processLog"].as_array().unwrap();
        assert_eq!(log.len(), 3);
        assert_eq!(log[..2], earlier.as_array().unwrap()[..]);
        assert_eq!(log[2]["hostname"], json!("test-host"));
    }

    #[tokio::test]
    async fn processlog_grows_by_exactly_one_on_every_branch() {
        let lookup = lookup(vec![BROADWAY]);
        let sink = CapturingSink::default();
        let mut records = Vec::new();
        for (i, (text, source)) in [
            ("Broadway", CoordinateSource::UnreliableOriginSource),
            ("fail", CoordinateSource::UnreliableOriginSource),
            ("", CoordinateSource::UnreliableOriginSource),
            ("Broadway", CoordinateSource::DeviceGpsSource),
        ]
        .into_iter()
        .enumerate()
        {
            let message: Message = serde_json::from_value(json!({
                "content": text,
                "coordinates": "{40.754932, -73.984016}",
                "coordinateSource": source.to_string(),
                "processLog": [{"stage": "a"}, {"stage": "b"}]
            }))
            .unwrap();
            records.push(InboundRecord::from_message(i.to_string(), &message).unwrap());
        }

        let report = process_batch(&lookup, &sink, &agent(), &event(records), &options()).await;

        assert_eq!(report.records.len(), 4);
        for message in report.messages() {
            assert_eq!(message.process_log.len(), 3);
        }
    }
}
