//! Staged event-processing pipeline.
//!
//! The pipeline delivers events produced by application threads to an
//! [`EventHandler`](crate::event_handler::EventHandler) with low overhead, amortizing network cost
//! by batching and smoothing bursts by buffering. It is a linear composition of stages, in
//! data-flow order:
//!
//! 1. **Transform** — enrichment hooks annotating each input item.
//! 2. **Convert** — one-shot mapping from the input type to [`EventRecord`].
//! 3. **Intercept** — policy filters that may mutate or drop records.
//! 4. **Batch** — the [`BatchingProcessor`] coalescing records into bounded batches.
//! 5. **Merge** — combining adjacent mergeable records into single [`LogRequest`]s.
//! 6. **Sink** — handing requests to the event handler and routing results to callbacks.
//!
//! Stages are wired tail-first by [`EventProcessorBuilder`]: the sink is constructed first and
//! each upstream stage is constructed around its downstream successor. Lifecycle signals propagate
//! through the same chain: `start` readies the downstream before a stage begins emitting, and
//! `stop` drains a stage before its downstream goes away.

use std::sync::Arc;
use std::time::Duration;

use crate::event_factory::EventFactory;
use crate::event_handler::EventHandler;
use crate::events::{EventRecord, LogRequest};
use crate::executor::{Executor, ThreadExecutor};
use crate::{Error, Result};

mod batch;
mod callback;
mod convert;
mod intercept;
mod merge;
mod sink;
mod transform;

pub use batch::{BatchingConfig, BatchingProcessor};
pub use callback::{AggregateCallback, Callback, FnCallback};
pub use convert::ConvertStage;
pub use intercept::InterceptStage;
pub use merge::MergeStage;
pub use sink::EventHandlerSink;
pub use transform::TransformStage;

use convert::ConvertFn;
use intercept::InterceptFn;
use merge::EventFactoryFn;
use sink::ExceptionHandlerFn;
use transform::TransformFn;

/// The contract every pipeline stage implements.
///
/// Implementations never propagate failures to the caller: items are either forwarded downstream,
/// dropped with a log message, or reported through callbacks.
pub trait Processor<T>: Send + Sync {
    /// Submit one item.
    fn process(&self, item: T);

    /// Submit an ordered group of items. Equivalent to calling [`Processor::process`] per item;
    /// stages that can do better override this.
    fn process_batch(&self, items: Vec<T>) {
        for item in items {
            self.process(item);
        }
    }

    /// Ready this stage and everything downstream of it for processing.
    fn start(&self) {}

    /// Drain this stage and everything downstream of it, bounded by `timeout`.
    ///
    /// Returns `true` iff the drain completed in time. Never blocks past the timeout and never
    /// panics.
    fn stop(&self, timeout: Duration) -> bool {
        let _ = timeout;
        true
    }
}

impl<T, P: Processor<T> + ?Sized> Processor<T> for Arc<P> {
    fn process(&self, item: T) {
        (**self).process(item)
    }

    fn process_batch(&self, items: Vec<T>) {
        (**self).process_batch(items)
    }

    fn start(&self) {
        (**self).start()
    }

    fn stop(&self, timeout: Duration) -> bool {
        (**self).stop(timeout)
    }
}

/// The assembled event-processing pipeline.
///
/// Created by [`EventProcessorBuilder`]. The processor itself implements [`Processor`], so
/// applications submit items with [`Processor::process`] / [`Processor::process_batch`] and manage
/// the lifecycle with [`Processor::start`] / [`Processor::stop`].
pub struct EventProcessor<T> {
    head: Box<dyn Processor<T>>,
    batcher: Arc<BatchingProcessor<EventRecord>>,
}

impl<T> EventProcessor<T> {
    /// Force-close the open batch and hand it to the executor.
    ///
    /// Returns after the batch has been submitted for dispatch, not after it has been dispatched.
    /// Idempotent: repeated calls with no intervening input are no-ops.
    pub fn flush(&self) {
        self.batcher.flush();
    }
}

impl<T: Send> Processor<T> for EventProcessor<T> {
    fn process(&self, item: T) {
        self.head.process(item);
    }

    fn process_batch(&self, items: Vec<T>) {
        self.head.process_batch(items);
    }

    fn start(&self) {
        self.head.start();
    }

    fn stop(&self, timeout: Duration) -> bool {
        self.head.stop(timeout)
    }
}

/// Configures the processing flow for dispatching events to an
/// [`EventHandler`](crate::event_handler::EventHandler).
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use beacon_core::processor::{BatchingConfig, EventProcessorBuilder, Processor};
/// # use beacon_core::{EventRecord, Result};
/// # fn example(
/// #     convert: impl Fn(String) -> Option<EventRecord> + Send + Sync + 'static,
/// #     handler: Arc<dyn beacon_core::event_handler::EventHandler>,
/// # ) -> Result<()> {
/// let processor = EventProcessorBuilder::new()
///     .converter(convert)
///     .event_handler(handler)
///     .batching(BatchingConfig::new().with_max_batch_size(10))
///     .build()?;
/// processor.start();
/// processor.process("checkout".to_owned());
/// # Ok(())
/// # }
/// ```
pub struct EventProcessorBuilder<T> {
    transformers: Vec<TransformFn<T>>,
    converter: Option<ConvertFn<T, EventRecord>>,
    interceptors: Vec<InterceptFn<EventRecord>>,
    callbacks: AggregateCallback<EventRecord>,
    event_factory: Option<EventFactoryFn>,
    event_handler: Option<Arc<dyn EventHandler>>,
    exception_handler: Option<ExceptionHandlerFn>,
    batching: BatchingConfig,
    executor: Option<Arc<dyn Executor>>,
}

impl<T: Send + 'static> EventProcessorBuilder<T> {
    /// Create a builder with default batching configuration and no stages registered.
    pub fn new() -> EventProcessorBuilder<T> {
        EventProcessorBuilder {
            transformers: Vec::new(),
            converter: None,
            interceptors: Vec::new(),
            callbacks: AggregateCallback::new(),
            event_factory: None,
            event_handler: None,
            exception_handler: None,
            batching: BatchingConfig::new(),
            executor: None,
        }
    }

    /// Register an enrichment hook applied to every input item, in registration order.
    pub fn transformer(mut self, transformer: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.transformers.push(Box::new(transformer));
        self
    }

    /// Set the conversion from the input type to [`EventRecord`]. Required.
    ///
    /// Returning `None` drops the item silently.
    pub fn converter(
        mut self,
        converter: impl Fn(T) -> Option<EventRecord> + Send + Sync + 'static,
    ) -> Self {
        self.converter = Some(Box::new(converter));
        self
    }

    /// Register a policy interceptor applied to every record, in registration order.
    ///
    /// Returning `None` drops the record without firing callbacks.
    pub fn interceptor(
        mut self,
        interceptor: impl Fn(EventRecord) -> Option<EventRecord> + Send + Sync + 'static,
    ) -> Self {
        self.interceptors.push(Box::new(interceptor));
        self
    }

    /// Register a predicate interceptor: records failing `filter` are dropped.
    pub fn filter(mut self, filter: impl Fn(&EventRecord) -> bool + Send + Sync + 'static) -> Self {
        self.interceptors
            .push(Box::new(move |record| filter(&record).then_some(record)));
        self
    }

    /// Register a callback fired once per dispatched request.
    pub fn callback(mut self, callback: impl Callback<EventRecord> + 'static) -> Self {
        self.callbacks.add(Box::new(callback));
        self
    }

    /// Override the factory producing [`LogRequest`]s from merged records.
    ///
    /// Defaults to [`EventFactory`] pointed at the default ingestion endpoint.
    pub fn event_factory(
        mut self,
        event_factory: impl Fn(EventRecord) -> Option<LogRequest> + Send + Sync + 'static,
    ) -> Self {
        self.event_factory = Some(Box::new(event_factory));
        self
    }

    /// Set the event handler receiving prepared requests. Required.
    pub fn event_handler(mut self, event_handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(event_handler);
        self
    }

    /// Override the handler invoked with failed requests before callbacks fire.
    ///
    /// Defaults to logging the failure at error level.
    pub fn exception_handler(
        mut self,
        exception_handler: impl Fn(&LogRequest, &Error) + Send + Sync + 'static,
    ) -> Self {
        self.exception_handler = Some(Box::new(exception_handler));
        self
    }

    /// Configure the batching engine.
    pub fn batching(mut self, batching: BatchingConfig) -> Self {
        self.batching = batching;
        self
    }

    /// Set the executor supplying parallelism for batch dispatch.
    ///
    /// Defaults to a [`ThreadExecutor`].
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Assemble the pipeline, tail-first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfiguration`] if a required collaborator is missing.
    pub fn build(self) -> Result<EventProcessor<T>> {
        let converter = self
            .converter
            .ok_or(Error::InvalidConfiguration("converter is required"))?;
        let event_handler = self
            .event_handler
            .ok_or(Error::InvalidConfiguration("event_handler is required"))?;
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ThreadExecutor::new()));
        let event_factory = self.event_factory.unwrap_or_else(|| {
            let factory = EventFactory::default();
            Box::new(move |events| factory.create_log_request(events))
        });
        let exception_handler: ExceptionHandlerFn =
            self.exception_handler.unwrap_or_else(|| {
                Box::new(|request: &LogRequest, error: &Error| {
                    log::error!(target: "beacon", "error dispatching event request to {}: {}", request.url, error);
                })
            });

        let callbacks = Arc::new(self.callbacks);
        let sink = EventHandlerSink::new(event_handler, Some(exception_handler));
        let merge = MergeStage::new(event_factory, Arc::clone(&callbacks), sink);
        let drop_callbacks = Arc::clone(&callbacks);
        let batcher = Arc::new(
            BatchingProcessor::new(self.batching, executor, Arc::new(merge))
                .with_drop_handler(move |events: Vec<EventRecord>| {
                    for event in &events {
                        drop_callbacks.on_failure(event, &Error::DeliveryAbandoned);
                    }
                }),
        );
        let intercept = InterceptStage::new(self.interceptors, Arc::clone(&batcher));
        let convert = ConvertStage::new(converter, intercept);
        let transform = TransformStage::new(self.transformers, convert);

        Ok(EventProcessor {
            head: Box::new(transform),
            batcher,
        })
    }
}

impl<T: Send + 'static> Default for EventProcessorBuilder<T> {
    fn default() -> EventProcessorBuilder<T> {
        EventProcessorBuilder::new()
    }
}


#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::events::Visitor;

    struct RecordingHandler {
        bodies: Mutex<Vec<String>>,
        records: Mutex<Vec<EventRecord>>,
    }

    impl RecordingHandler {
        fn new() -> Arc<RecordingHandler> {
            Arc::new(RecordingHandler {
                bodies: Mutex::new(Vec::new()),
                records: Mutex::new(Vec::new()),
            })
        }
    }

    impl EventHandler for RecordingHandler {
        fn dispatch(&self, request: &LogRequest) -> Result<()> {
            self.bodies.lock().unwrap().push(request.body.clone());
            self.records.lock().unwrap().push(request.events.clone());
            Ok(())
        }
    }

    fn convert(item: &'static str) -> Option<EventRecord> {
        Some(EventRecord {
            account_id: "acct-1".to_owned(),
            project_id: "proj-1".to_owned(),
            revision: "1".to_owned(),
            client_name: "rust-sdk".to_owned(),
            client_version: "0.1.0".to_owned(),
            anonymize_ip: None,
            visitors: vec![Visitor {
                visitor_id: item.to_owned(),
                attributes: HashMap::new(),
                events: Vec::new(),
            }],
        })
    }

    #[test]
    fn pipeline_merges_a_batch_into_one_request() {
        let handler = RecordingHandler::new();
        let successes = Arc::new(AtomicUsize::new(0));
        let success_count = Arc::clone(&successes);
        let processor = EventProcessorBuilder::new()
            .converter(convert)
            .event_handler(handler.clone() as Arc<dyn EventHandler>)
            .callback(FnCallback::new(
                move |_: &EventRecord| {
                    success_count.fetch_add(1, Ordering::SeqCst);
                },
                |_: &EventRecord, _: &Error| {},
            ))
            .batching(
                BatchingConfig::new()
                    .with_max_batch_size(3)
                    .with_max_batch_open(Duration::from_secs(3600)),
            )
            .build()
            .unwrap();
        processor.start();

        processor.process("alice");
        processor.process("bob");
        processor.process("carol");

        assert!(processor.stop(Duration::from_secs(1)));
        let records = handler.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let visitors: Vec<_> = records[0]
            .visitors
            .iter()
            .map(|visitor| visitor.visitor_id.as_str())
            .collect();
        assert_eq!(visitors, vec!["alice", "bob", "carol"]);
        assert_eq!(successes.load(Ordering::SeqCst), 1);

        // The default factory serialized the merged record into the request body.
        let bodies = handler.bodies.lock().unwrap();
        let payload: serde_json::Value = serde_json::from_str(&bodies[0]).unwrap();
        assert_eq!(payload["visitors"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn transformers_and_filters_shape_the_stream() {
        let handler = RecordingHandler::new();
        let transformed = Arc::new(AtomicUsize::new(0));
        let transformed_count = Arc::clone(&transformed);
        let processor = EventProcessorBuilder::new()
            .transformer(move |_: &mut &'static str| {
                transformed_count.fetch_add(1, Ordering::SeqCst);
            })
            .converter(convert)
            .filter(|record| record.visitors[0].visitor_id != "blocked")
            .event_handler(handler.clone() as Arc<dyn EventHandler>)
            .batching(
                BatchingConfig::new()
                    .with_max_batch_size(10)
                    .with_max_batch_open(Duration::from_secs(3600)),
            )
            .build()
            .unwrap();
        processor.start();

        processor.process("alice");
        processor.process("blocked");
        processor.flush();

        assert!(processor.stop(Duration::from_secs(1)));
        assert_eq!(transformed.load(Ordering::SeqCst), 2);
        let records = handler.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].visitors[0].visitor_id, "alice");
    }

    #[test]
    fn dispatch_failure_routes_to_failure_callbacks() {
        let failures = Arc::new(AtomicUsize::new(0));
        let failure_count = Arc::clone(&failures);
        let exceptions = Arc::new(AtomicUsize::new(0));
        let exception_count = Arc::clone(&exceptions);
        let failing: Arc<dyn EventHandler> =
            Arc::new(|_: &LogRequest| -> Result<()> { Err(Error::Unauthorized) });
        let processor = EventProcessorBuilder::new()
            .converter(convert)
            .event_handler(failing)
            .exception_handler(move |_: &LogRequest, _: &Error| {
                exception_count.fetch_add(1, Ordering::SeqCst);
            })
            .callback(FnCallback::new(
                |_: &EventRecord| {},
                move |_: &EventRecord, _: &Error| {
                    failure_count.fetch_add(1, Ordering::SeqCst);
                },
            ))
            .batching(BatchingConfig::new().with_max_batch_size(1))
            .build()
            .unwrap();
        processor.start();

        processor.process("alice");

        assert!(processor.stop(Duration::from_secs(1)));
        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert_eq!(exceptions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn build_rejects_missing_collaborators() {
        let incomplete = EventProcessorBuilder::<&'static str>::new().build();
        assert!(matches!(
            incomplete,
            Err(Error::InvalidConfiguration("converter is required"))
        ));

        let no_handler = EventProcessorBuilder::<&'static str>::new()
            .converter(convert)
            .build();
        assert!(matches!(
            no_handler,
            Err(Error::InvalidConfiguration("event_handler is required"))
        ));
    }
}
