use std::sync::Arc;

use beacon_core::event_handler::EventHandler;
use beacon_core::processor::{BatchingConfig, Callback};
use beacon_core::EventRecord;

use crate::{Client, Result};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # fn main() -> beacon::Result<()> {
/// let client = beacon::ClientConfig::from_sdk_key("sdk-key")
///     .project("acct-1", "proj-1")
///     .to_client()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientConfig {
    pub(crate) sdk_key: String,
    pub(crate) ingestion_url: String,
    pub(crate) account_id: String,
    pub(crate) project_id: String,
    pub(crate) revision: String,
    pub(crate) anonymize_ip: bool,
    pub(crate) batching: BatchingConfig,
    pub(crate) event_handler: Option<Arc<dyn EventHandler>>,
    pub(crate) callbacks: Vec<Box<dyn Callback<EventRecord>>>,
}

impl ClientConfig {
    /// Default ingestion URL for event delivery.
    pub const DEFAULT_INGESTION_URL: &'static str = "https://ingest.getbeacon.dev/v1/events";

    /// Create a default Beacon configuration using the specified SDK key.
    ///
    /// ```
    /// # use beacon::ClientConfig;
    /// ClientConfig::from_sdk_key("sdk-key");
    /// ```
    pub fn from_sdk_key(sdk_key: impl Into<String>) -> Self {
        ClientConfig {
            sdk_key: sdk_key.into(),
            ingestion_url: ClientConfig::DEFAULT_INGESTION_URL.to_owned(),
            account_id: String::new(),
            project_id: String::new(),
            revision: "0".to_owned(),
            anonymize_ip: false,
            batching: BatchingConfig::new(),
            event_handler: None,
            callbacks: Vec::new(),
        }
    }

    /// Set the account and project identity stamped on every event record. Both values are shown
    /// on the project's settings page.
    pub fn project(mut self, account_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        self.account_id = account_id.into();
        self.project_id = project_id.into();
        self
    }

    /// Set the project configuration revision reported with the events.
    pub fn revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = revision.into();
        self
    }

    /// Override ingestion URL for event delivery. Clients should use the default setting in most
    /// cases.
    pub fn ingestion_url(mut self, ingestion_url: impl Into<String>) -> Self {
        self.ingestion_url = ingestion_url.into();
        self
    }

    /// Request that the ingestion endpoint anonymizes the sender IP address.
    pub fn anonymize_ip(mut self, anonymize_ip: bool) -> Self {
        self.anonymize_ip = anonymize_ip;
        self
    }

    /// Tune how events are buffered and batched before delivery.
    pub fn batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = batching;
        self
    }

    /// Replace the HTTP delivery with a custom [`EventHandler`]. Useful for tests and custom
    /// transports.
    pub fn event_handler(mut self, event_handler: impl EventHandler + 'static) -> Self {
        self.event_handler = Some(Arc::new(event_handler));
        self
    }

    /// Register a callback fired once per delivered (or failed) event request.
    ///
    /// ```
    /// # use beacon::{ClientConfig, Error, EventRecord, FnCallback};
    /// let config = ClientConfig::from_sdk_key("sdk-key").delivery_callback(FnCallback::new(
    ///     |record: &EventRecord| println!("delivered {} visitor(s)", record.visitors.len()),
    ///     |_: &EventRecord, err: &Error| eprintln!("delivery failed: {err}"),
    /// ));
    /// ```
    pub fn delivery_callback(mut self, callback: impl Callback<EventRecord> + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Create a new [`Client`] using the specified configuration.
    ///
    /// ```
    /// # fn main() -> beacon::Result<()> {
    /// let client: beacon::Client = beacon::ClientConfig::from_sdk_key("sdk-key").to_client()?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = ClientConfig::from_sdk_key("sdk-key");

        assert_eq!(config.ingestion_url, ClientConfig::DEFAULT_INGESTION_URL);
        assert_eq!(config.revision, "0");
        assert!(!config.anonymize_ip);
        assert_eq!(config.batching, BatchingConfig::new());
        assert!(config.event_handler.is_none());
        assert!(config.callbacks.is_empty());
    }
}
