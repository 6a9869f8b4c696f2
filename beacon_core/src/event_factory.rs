//! Construction of wire requests from merged event records.
use std::collections::HashMap;

use crate::events::{EventRecord, LogRequest, RequestMethod};

/// Default ingestion endpoint for event requests.
pub const DEFAULT_EVENTS_ENDPOINT: &'static str = "https://ingest.getbeacon.dev/v1/events";

/// Builds [`LogRequest`]s from merged [`EventRecord`]s: an HTTPS POST carrying the record as a
/// JSON payload.
#[derive(Debug, Clone)]
pub struct EventFactory {
    endpoint: String,
}

impl EventFactory {
    /// Create a factory producing requests against `endpoint`.
    pub fn new(endpoint: impl Into<String>) -> EventFactory {
        EventFactory {
            endpoint: endpoint.into(),
        }
    }

    /// Serialize `events` into a request against the configured endpoint.
    ///
    /// Returns `None` if the payload cannot be serialized; callers treat that as a dropped group.
    pub fn create_log_request(&self, events: EventRecord) -> Option<LogRequest> {
        let body = match serde_json::to_string(&events) {
            Ok(body) => body,
            Err(err) => {
                log::warn!(target: "beacon", "failed to serialize event payload: {}", err);
                return None;
            }
        };

        let mut headers = HashMap::new();
        headers.insert("content-type".to_owned(), "application/json".to_owned());

        Some(LogRequest::new(
            RequestMethod::Post,
            self.endpoint.clone(),
            headers,
            body,
            events,
        ))
    }
}

impl Default for EventFactory {
    fn default() -> EventFactory {
        EventFactory::new(DEFAULT_EVENTS_ENDPOINT)
    }
}
