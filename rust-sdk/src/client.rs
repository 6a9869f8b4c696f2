use std::sync::Arc;
use std::time::Duration;

use beacon_core::event_delivery::{EventDeliveryConfig, HttpEventHandler};
use beacon_core::event_factory::EventFactory;
use beacon_core::event_handler::EventHandler;
use beacon_core::processor::{EventProcessor, EventProcessorBuilder, Processor};
use beacon_core::{EventRecord, Visitor, VisitorEvent};

use crate::{ClientConfig, Result, TrackEvent};

const CLIENT_NAME: &'static str = "rust-sdk";
const CLIENT_VERSION: &'static str = env!("CARGO_PKG_VERSION");

/// A client for tracking Beacon events.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// Tracked events are buffered and delivered in batches by a background pipeline, so
/// [`Client::track`] returns quickly and never fails; delivery results are reported through the
/// callbacks registered with [`ClientConfig::delivery_callback`]. Call [`Client::shutdown`] before
/// exiting to drain events still in the buffer.
///
/// # Examples
/// ```no_run
/// # fn main() -> beacon::Result<()> {
/// let client = beacon::ClientConfig::from_sdk_key("sdk-key")
///     .project("acct-1", "proj-1")
///     .to_client()?;
/// client.track_event("user-17", "checkout");
/// client.shutdown(std::time::Duration::from_secs(5));
/// # Ok(())
/// # }
/// ```
pub struct Client {
    processor: EventProcessor<TrackEvent>,
}

/// Project identity stamped on every record produced by the client.
struct RecordIdentity {
    account_id: String,
    project_id: String,
    revision: String,
    anonymize_ip: bool,
}

impl RecordIdentity {
    fn to_record(&self, event: TrackEvent) -> EventRecord {
        EventRecord {
            account_id: self.account_id.clone(),
            project_id: self.project_id.clone(),
            revision: self.revision.clone(),
            client_name: CLIENT_NAME.to_owned(),
            client_version: CLIENT_VERSION.to_owned(),
            anonymize_ip: self.anonymize_ip.then_some(true),
            visitors: vec![Visitor {
                visitor_id: event.visitor_id,
                attributes: event.attributes,
                events: vec![VisitorEvent {
                    uuid: uuid::Uuid::new_v4().to_string(),
                    timestamp: event
                        .timestamp
                        .unwrap_or_else(|| chrono::Utc::now().timestamp_millis()),
                    key: event.key,
                    tags: event.tags,
                }],
            }],
        }
    }
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// The delivery pipeline is assembled and started before the client is returned, so the client
    /// is ready to track events immediately.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] if the HTTP delivery runtime cannot be created.
    pub fn new(config: ClientConfig) -> Result<Client> {
        let event_handler: Arc<dyn EventHandler> = match config.event_handler {
            Some(event_handler) => event_handler,
            None => Arc::new(HttpEventHandler::new(EventDeliveryConfig::new(
                config.sdk_key.clone(),
            ))?),
        };
        let identity = RecordIdentity {
            account_id: config.account_id,
            project_id: config.project_id,
            revision: config.revision,
            anonymize_ip: config.anonymize_ip,
        };
        let event_factory = EventFactory::new(config.ingestion_url);

        let mut builder = EventProcessorBuilder::new()
            .converter(move |event: TrackEvent| Some(identity.to_record(event)))
            .event_factory(move |events| event_factory.create_log_request(events))
            .event_handler(event_handler)
            .batching(config.batching);
        for callback in config.callbacks {
            builder = builder.callback(callback);
        }

        let processor = builder.build()?;
        processor.start();
        log::debug!(target: "beacon", "beacon client started");

        Ok(Client { processor })
    }

    /// Track a single event.
    ///
    /// The event is stamped with a unique id, a timestamp (unless one was provided) and the
    /// configured project identity, then enqueued for batched delivery. This method never fails;
    /// delivery errors are reported via delivery callbacks. It may block briefly when the delivery
    /// pipeline is saturated.
    pub fn track(&self, event: TrackEvent) {
        self.processor.process(event);
    }

    /// Track an event with no extra attributes or tags.
    ///
    /// ```
    /// # fn test(client: &beacon::Client) {
    /// client.track_event("user-17", "add-to-cart");
    /// # }
    /// ```
    pub fn track_event(&self, visitor_id: impl Into<String>, key: impl Into<String>) {
        self.track(TrackEvent::new(visitor_id, key));
    }

    /// Force-close the current batch and hand it off for delivery.
    ///
    /// Returns once the batch has been queued, without waiting for the network round-trip.
    pub fn flush(&self) {
        self.processor.flush();
    }

    /// Shut down the client, draining buffered events.
    ///
    /// Returns `true` iff all buffered events were handed to the event handler within `timeout`.
    /// Events that could not be handed off in time are reported as failed to the delivery
    /// callbacks. Tracking calls made after shutdown are dropped.
    pub fn shutdown(self, timeout: Duration) -> bool {
        self.processor.stop(timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use beacon_core::processor::{BatchingConfig, FnCallback};
    use beacon_core::{Error, LogRequest};

    use super::*;

    fn recording_config(records: Arc<Mutex<Vec<EventRecord>>>) -> ClientConfig {
        ClientConfig::from_sdk_key("sdk-key")
            .project("acct-1", "proj-1")
            .event_handler(move |request: &LogRequest| -> beacon_core::Result<()> {
                records.lock().unwrap().push(request.events.clone());
                Ok(())
            })
            .batching(
                BatchingConfig::new()
                    .with_max_batch_size(10)
                    .with_max_batch_open(Duration::from_secs(3600)),
            )
    }

    #[test]
    fn tracked_events_are_stamped_and_delivered_in_one_request() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let client = recording_config(Arc::clone(&records)).to_client().unwrap();

        client.track(TrackEvent::new("alice", "checkout").with_tag("total", 42));
        client.track_event("bob", "signup");
        client.flush();
        assert!(client.shutdown(Duration::from_secs(1)));

        let records = records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.account_id, "acct-1");
        assert_eq!(record.project_id, "proj-1");
        assert_eq!(record.client_name, "rust-sdk");
        assert_eq!(record.visitors.len(), 2);

        let event = &record.visitors[0].events[0];
        assert!(!event.uuid.is_empty());
        assert!(event.timestamp > 0);
        assert_eq!(event.key, "checkout");
        assert_eq!(event.tags["total"], 42);
    }

    #[test]
    fn delivery_callbacks_fire_once_per_request() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let deliveries = Arc::new(AtomicUsize::new(0));
        let delivery_count = Arc::clone(&deliveries);
        let client = recording_config(records)
            .delivery_callback(FnCallback::new(
                move |_: &EventRecord| {
                    delivery_count.fetch_add(1, Ordering::SeqCst);
                },
                |_: &EventRecord, _: &Error| {},
            ))
            .to_client()
            .unwrap();

        client.track_event("alice", "checkout");
        client.track_event("bob", "checkout");
        client.flush();
        assert!(client.shutdown(Duration::from_secs(1)));

        assert_eq!(deliveries.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn explicit_timestamps_are_preserved() {
        let records = Arc::new(Mutex::new(Vec::new()));
        let client = recording_config(Arc::clone(&records)).to_client().unwrap();

        client.track(TrackEvent::new("alice", "checkout").with_timestamp(1_700_000_000_000));
        client.flush();
        assert!(client.shutdown(Duration::from_secs(1)));

        let records = records.lock().unwrap();
        assert_eq!(records[0].visitors[0].events[0].timestamp, 1_700_000_000_000);
    }
}
