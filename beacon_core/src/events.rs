use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::processor::AggregateCallback;

/// Canonical event record flowing through the processing pipeline. Records are immutable once they
/// pass the intercept stage and are shipped to the ingestion endpoint in batches.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct EventRecord {
    /// Account the events belong to.
    pub account_id: String,
    /// Project the events belong to.
    pub project_id: String,
    /// Revision of the project configuration the client was running when the events were produced.
    pub revision: String,
    /// Name of the client that produced the events (e.g. "rust-sdk").
    pub client_name: String,
    /// Version of the client that produced the events.
    pub client_version: String,
    /// Whether the ingestion endpoint should anonymize the sender IP address.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anonymize_ip: Option<bool>,
    /// Visitors carrying the tracked events.
    pub visitors: Vec<Visitor>,
}

impl EventRecord {
    /// Two records can be combined into a single ingestion request iff they were produced for the
    /// same account, project and revision.
    pub fn is_mergeable_with(&self, other: &EventRecord) -> bool {
        self.account_id == other.account_id
            && self.project_id == other.project_id
            && self.revision == other.revision
    }

    /// Append `other`'s visitors to this record, preserving order.
    ///
    /// Callers are expected to check [`EventRecord::is_mergeable_with`] first; merging records with
    /// different identities mislabels the absorbed visitors.
    pub fn merge(&mut self, other: EventRecord) {
        self.visitors.extend(other.visitors);
    }
}

/// A visitor entry within an [`EventRecord`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Visitor {
    /// The key identifying the visitor.
    pub visitor_id: String,
    /// Custom attributes of the visitor relevant to the tracked events.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attributes: HashMap<String, serde_json::Value>,
    /// The tracked occurrences attributed to this visitor.
    pub events: Vec<VisitorEvent>,
}

/// A single tracked occurrence attached to a [`Visitor`].
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VisitorEvent {
    /// Unique id of this occurrence, assigned by the client.
    pub uuid: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// The event key, as configured in the project.
    pub key: String,
    /// Additional user-defined tags for capturing extra information related to the event.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub tags: HashMap<String, serde_json::Value>,
}

/// HTTP method of a [`LogRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
}

/// A fully-prepared ingestion request produced by the merge stage: one request per group of
/// mergeable records, ready to be handed to an
/// [`EventHandler`](crate::event_handler::EventHandler).
#[derive(Clone)]
pub struct LogRequest {
    /// HTTP method to deliver the request with.
    pub method: RequestMethod,
    /// Ingestion endpoint URL.
    pub url: String,
    /// Extra headers to send along with the request.
    pub headers: HashMap<String, String>,
    /// Serialized JSON payload.
    pub body: String,
    /// The merged record this request was produced from. Kept around for callback reporting.
    pub events: EventRecord,

    callback: Option<Arc<AggregateCallback<EventRecord>>>,
}

impl LogRequest {
    /// Create a new request with no callback attached.
    pub fn new(
        method: RequestMethod,
        url: impl Into<String>,
        headers: HashMap<String, String>,
        body: impl Into<String>,
        events: EventRecord,
    ) -> LogRequest {
        LogRequest {
            method,
            url: url.into(),
            headers,
            body: body.into(),
            events,
            callback: None,
        }
    }

    pub(crate) fn set_callback(&mut self, callback: Arc<AggregateCallback<EventRecord>>) {
        self.callback = Some(callback);
    }

    pub(crate) fn callback(&self) -> Option<&AggregateCallback<EventRecord>> {
        self.callback.as_deref()
    }
}

impl fmt::Debug for LogRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body", &self.body)
            .finish_non_exhaustive()
    }
}
