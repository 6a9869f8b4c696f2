use std::sync::Arc;

use crate::event_handler::EventHandler;
use crate::events::LogRequest;
use crate::processor::callback::Callback;
use crate::processor::Processor;
use crate::Error;

pub(crate) type ExceptionHandlerFn = Box<dyn Fn(&LogRequest, &Error) + Send + Sync>;

/// Terminal pipeline stage adapting an [`EventHandler`] to the stage contract.
///
/// A successful dispatch fires `on_success` on the request's callback; a failed dispatch is routed
/// to the exception handler (or logged if none is configured) and fires `on_failure`. Failures
/// never propagate upward.
pub struct EventHandlerSink {
    event_handler: Arc<dyn EventHandler>,
    exception_handler: Option<ExceptionHandlerFn>,
}

impl EventHandlerSink {
    pub fn new(
        event_handler: Arc<dyn EventHandler>,
        exception_handler: Option<ExceptionHandlerFn>,
    ) -> EventHandlerSink {
        EventHandlerSink {
            event_handler,
            exception_handler,
        }
    }

    fn handle(&self, request: LogRequest) {
        log::trace!(target: "beacon", "dispatching event request to {}", request.url);
        match self.event_handler.dispatch(&request) {
            Ok(()) => {
                log::trace!(target: "beacon", "finished invoking event handler");
                if let Some(callback) = request.callback() {
                    callback.on_success(&request.events);
                }
            }
            Err(err) => {
                match &self.exception_handler {
                    Some(exception_handler) => exception_handler(&request, &err),
                    None => {
                        log::warn!(target: "beacon", "error dispatching event request: {}", err)
                    }
                }
                if let Some(callback) = request.callback() {
                    callback.on_failure(&request.events, &err);
                }
            }
        }
    }
}

impl Processor<LogRequest> for EventHandlerSink {
    fn process(&self, item: LogRequest) {
        self.handle(item);
    }

    fn process_batch(&self, items: Vec<LogRequest>) {
        for item in items {
            self.handle(item);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::events::{EventRecord, RequestMethod};
    use crate::processor::{AggregateCallback, FnCallback};
    use crate::Result;

    fn record() -> EventRecord {
        EventRecord {
            account_id: "acct-1".to_owned(),
            project_id: "proj-1".to_owned(),
            revision: "1".to_owned(),
            client_name: "rust-sdk".to_owned(),
            client_version: "0.1.0".to_owned(),
            anonymize_ip: None,
            visitors: Vec::new(),
        }
    }

    fn request_with_callback(callback: Arc<AggregateCallback<EventRecord>>) -> LogRequest {
        let mut request = LogRequest::new(
            RequestMethod::Post,
            "https://ingest.example.com/v1/events",
            HashMap::new(),
            "{}",
            record(),
        );
        request.set_callback(callback);
        request
    }

    fn counting_callbacks() -> (
        Arc<AggregateCallback<EventRecord>>,
        Arc<AtomicUsize>,
        Arc<AtomicUsize>,
    ) {
        let successes = Arc::new(AtomicUsize::new(0));
        let failures = Arc::new(AtomicUsize::new(0));
        let mut aggregate = AggregateCallback::new();
        let success_count = Arc::clone(&successes);
        let failure_count = Arc::clone(&failures);
        aggregate.add(Box::new(FnCallback::new(
            move |_: &EventRecord| {
                success_count.fetch_add(1, Ordering::SeqCst);
            },
            move |_: &EventRecord, _: &Error| {
                failure_count.fetch_add(1, Ordering::SeqCst);
            },
        )));
        (Arc::new(aggregate), successes, failures)
    }

    #[test]
    fn successful_dispatch_fires_on_success() {
        let (callbacks, successes, failures) = counting_callbacks();
        let sink = EventHandlerSink::new(Arc::new(|_: &LogRequest| -> Result<()> { Ok(()) }), None);

        sink.process(request_with_callback(callbacks));

        assert_eq!(successes.load(Ordering::SeqCst), 1);
        assert_eq!(failures.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failed_dispatch_fires_on_failure_and_exception_handler() {
        let (callbacks, successes, failures) = counting_callbacks();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = EventHandlerSink::new(
            Arc::new(|_: &LogRequest| -> Result<()> { Err(Error::Unauthorized) }),
            Some(Box::new(move |request: &LogRequest, error: &Error| {
                seen_clone
                    .lock()
                    .unwrap()
                    .push((request.url.clone(), error.to_string()));
            })),
        );

        sink.process(request_with_callback(callbacks));

        assert_eq!(successes.load(Ordering::SeqCst), 0);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].1.contains("unauthorized"));
    }
}
