use crate::events::LogRequest;
use crate::Result;

/// A trait for delivering prepared event requests to the ingestion endpoint. Implementations
/// typically perform the network call; the pipeline treats them as opaque.
pub trait EventHandler: Send + Sync {
    /// Deliver a single request.
    ///
    /// Called from executor threads, so implementations must be thread-safe. Implementations must
    /// not call back into the pipeline from the dispatching thread.
    ///
    /// # Errors
    ///
    /// Any returned error is treated as a dispatch failure for the whole request: it is reported
    /// to the registered callbacks and the request is not resubmitted by the pipeline.
    fn dispatch(&self, request: &LogRequest) -> Result<()>;
}

impl<T: Fn(&LogRequest) -> Result<()> + Send + Sync> EventHandler for T {
    fn dispatch(&self, request: &LogRequest) -> Result<()> {
        self(request)
    }
}
