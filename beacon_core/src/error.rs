use std::sync::Arc;

/// Represents a result type for operations in the Beacon SDK.
///
/// This type alias is used throughout the SDK to indicate the result of operations that may return
/// errors specific to the Beacon SDK.
///
/// This `Result` type is a standard Rust `Result` type where the error variant is defined by the
/// beacon-specific [`Error`] enum.
pub type Result<T> = std::result::Result<T, Error>;

/// Enum representing possible errors that can occur in the Beacon SDK.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The event processor was assembled without a required collaborator.
    #[error("invalid event processor configuration: {0}")]
    InvalidConfiguration(&'static str),

    /// Invalid ingestion_url configuration.
    #[error("invalid ingestion_url configuration")]
    InvalidIngestionUrl(#[source] url::ParseError),

    /// The request was unauthorized, possibly due to an invalid SDK key.
    #[error("unauthorized, sdk_key is likely invalid")]
    Unauthorized,

    /// Events were still undelivered when the processor shutdown timeout expired.
    #[error("event delivery abandoned during shutdown")]
    DeliveryAbandoned,

    /// An event payload could not be serialized to JSON.
    #[error("failed to serialize event payload")]
    // serde_json::Error is not clonable, so we're wrapping it in an Arc.
    Serialization(#[source] Arc<serde_json::Error>),

    /// An I/O error.
    #[error(transparent)]
    // std::io::Error is not clonable, so we're wrapping it in an Arc.
    Io(Arc<std::io::Error>),

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(Arc::new(value))
    }
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        Error::Network(Arc::new(value.without_url()))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Serialization(Arc::new(value))
    }
}
