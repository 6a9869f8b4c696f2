//! An HTTP [`EventHandler`] that delivers event requests to the ingestion endpoint.
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use rand::{thread_rng, Rng};
use reqwest::{StatusCode, Url};

use crate::event_handler::EventHandler;
use crate::events::{LogRequest, RequestMethod};
use crate::{Error, Result};

/// Configuration for [`HttpEventHandler`].
#[derive(Debug, Clone)]
pub struct EventDeliveryConfig {
    /// SDK key sent along with every delivery.
    pub sdk_key: String,
    /// Number of delivery attempts per request, the first try included.
    ///
    /// Defaults to [`EventDeliveryConfig::DEFAULT_MAX_RETRIES`].
    pub max_retries: u32,
    /// Base delay before the first retry. Subsequent retries back off exponentially.
    ///
    /// Defaults to [`EventDeliveryConfig::DEFAULT_RETRY_INTERVAL`].
    pub retry_interval: Duration,
    /// Upper bound on the backoff delay.
    ///
    /// Defaults to [`EventDeliveryConfig::DEFAULT_MAX_RETRY_DELAY`].
    pub max_retry_delay: Duration,
}

impl EventDeliveryConfig {
    /// Default value for [`EventDeliveryConfig::max_retries`].
    pub const DEFAULT_MAX_RETRIES: u32 = 3;
    /// Default value for [`EventDeliveryConfig::retry_interval`].
    pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);
    /// Default value for [`EventDeliveryConfig::max_retry_delay`].
    pub const DEFAULT_MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

    /// Create a new `EventDeliveryConfig` for the given SDK key, using default retry behavior.
    pub fn new(sdk_key: impl Into<String>) -> EventDeliveryConfig {
        EventDeliveryConfig {
            sdk_key: sdk_key.into(),
            max_retries: EventDeliveryConfig::DEFAULT_MAX_RETRIES,
            retry_interval: EventDeliveryConfig::DEFAULT_RETRY_INTERVAL,
            max_retry_delay: EventDeliveryConfig::DEFAULT_MAX_RETRY_DELAY,
        }
    }

    /// Update max retries with `max_retries`.
    pub fn with_max_retries(mut self, max_retries: u32) -> EventDeliveryConfig {
        self.max_retries = max_retries;
        self
    }

    /// Update base retry interval with `retry_interval`.
    pub fn with_retry_interval(mut self, retry_interval: Duration) -> EventDeliveryConfig {
        self.retry_interval = retry_interval;
        self
    }

    /// Update max retry delay with `max_retry_delay`.
    pub fn with_max_retry_delay(mut self, max_retry_delay: Duration) -> EventDeliveryConfig {
        self.max_retry_delay = max_retry_delay;
        self
    }
}

/// An [`EventHandler`] delivering requests over HTTP with bounded, jittered retries.
///
/// Transient failures are retried with exponential backoff capped at
/// [`EventDeliveryConfig::max_retry_delay`]. A 401 Unauthorized response is terminal: it is cached
/// and all subsequent dispatches fail fast without touching the network.
pub struct HttpEventHandler {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
    runtime: tokio::runtime::Runtime,
    config: EventDeliveryConfig,
    /// If we receive a 401 Unauthorized error during a delivery, the SDK key is not valid. We
    /// cache this error so we don't issue additional requests to the server.
    unauthorized: AtomicBool,
}

impl HttpEventHandler {
    /// Create a new handler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the internal async runtime cannot be created.
    pub fn new(config: EventDeliveryConfig) -> Result<HttpEventHandler> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        Ok(HttpEventHandler {
            client: reqwest::Client::new(),
            runtime,
            config,
            unauthorized: AtomicBool::new(false),
        })
    }

    async fn deliver(&self, request: &LogRequest) -> Result<()> {
        let url = Url::parse(&request.url).map_err(Error::InvalidIngestionUrl)?;

        let mut delay = self.config.retry_interval;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.try_send(url.clone(), request).await {
                Ok(()) => return Ok(()),
                Err(err @ Error::Unauthorized) => {
                    self.unauthorized.store(true, Ordering::Relaxed);
                    return Err(err);
                }
                Err(err) => {
                    if attempt >= self.config.max_retries {
                        return Err(err);
                    }
                    log::debug!(target: "beacon", "retrying event delivery after error: {}", err);
                    tokio::time::sleep(jitter(delay, delay / 4)).await;
                    delay = next_delay(delay, self.config.max_retry_delay);
                }
            }
        }
    }

    async fn try_send(&self, url: Url, request: &LogRequest) -> Result<()> {
        let mut builder = match request.method {
            RequestMethod::Get => self.client.get(url),
            RequestMethod::Post => self.client.post(url),
        };
        builder = builder.header("x-sdk-key", self.config.sdk_key.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        log::debug!(target: "beacon", "delivering event request to {}", request.url);
        let response = builder.body(request.body.clone()).send().await?;

        response.error_for_status().map_err(|err| {
            if err.status() == Some(StatusCode::UNAUTHORIZED) {
                log::warn!(target: "beacon", "client is not authorized. Check your SDK key");
                Error::Unauthorized
            } else {
                log::warn!(target: "beacon", "received non-200 response delivering events: {:?}", err);
                Error::from(err)
            }
        })?;

        log::debug!(target: "beacon", "successfully delivered event request");

        Ok(())
    }
}

impl EventHandler for HttpEventHandler {
    fn dispatch(&self, request: &LogRequest) -> Result<()> {
        if self.unauthorized.load(Ordering::Relaxed) {
            return Err(Error::Unauthorized);
        }
        self.runtime.block_on(self.deliver(request))
    }
}

/// Apply randomized subtractive `jitter` to `delay`.
fn jitter(delay: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(delay, thread_rng().gen_range(Duration::ZERO..=jitter))
}

/// Double `current`, capped at `max`.
fn next_delay(current: Duration, max: Duration) -> Duration {
    Duration::min(current.saturating_mul(2), max)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    #[test]
    fn jitter_is_subtractive() {
        let delay = Duration::from_secs(4);
        let jitter = Duration::from_secs(1);

        let result = super::jitter(delay, jitter);

        assert!(result <= delay, "{result:?} must be <= {delay:?}");
        assert!(result >= delay - jitter);
    }

    #[test]
    fn jitter_works_with_zero_jitter() {
        let delay = Duration::from_secs(4);

        let result = super::jitter(delay, Duration::ZERO);

        assert_eq!(result, Duration::from_secs(4));
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let max = Duration::from_secs(30);

        let mut delay = Duration::from_secs(8);
        delay = super::next_delay(delay, max);
        assert_eq!(delay, Duration::from_secs(16));
        delay = super::next_delay(delay, max);
        assert_eq!(delay, Duration::from_secs(30));
        delay = super::next_delay(delay, max);
        assert_eq!(delay, Duration::from_secs(30));
    }
}
