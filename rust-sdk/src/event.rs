use std::collections::HashMap;

/// A single tracked action submitted by the application.
///
/// The client stamps each event with a unique id and the configured project identity before
/// handing it to the delivery pipeline.
///
/// # Examples
///
/// ```
/// # use beacon::TrackEvent;
/// let event = TrackEvent::new("user-17", "add-to-cart")
///     .with_tag("sku", "BEA-001")
///     .with_attribute("plan", "pro");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TrackEvent {
    /// The key identifying the visitor the event is attributed to.
    pub visitor_id: String,
    /// The event key, as configured in the project.
    pub key: String,
    /// Milliseconds since the Unix epoch. `None` lets the client stamp the submission time.
    pub timestamp: Option<i64>,
    /// Custom attributes of the visitor relevant to the event.
    pub attributes: HashMap<String, serde_json::Value>,
    /// Additional user-defined tags for capturing extra information related to the event.
    pub tags: HashMap<String, serde_json::Value>,
}

impl TrackEvent {
    /// Create a new event for the given visitor and event key.
    pub fn new(visitor_id: impl Into<String>, key: impl Into<String>) -> TrackEvent {
        TrackEvent {
            visitor_id: visitor_id.into(),
            key: key.into(),
            timestamp: None,
            attributes: HashMap::new(),
            tags: HashMap::new(),
        }
    }

    /// Override the event timestamp (milliseconds since the Unix epoch).
    pub fn with_timestamp(mut self, timestamp: i64) -> TrackEvent {
        self.timestamp = Some(timestamp);
        self
    }

    /// Attach a visitor attribute.
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> TrackEvent {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Attach an event tag.
    pub fn with_tag(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> TrackEvent {
        self.tags.insert(key.into(), value.into());
        self
    }
}
