use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use crate::events::{EventRecord, LogRequest};
use crate::processor::{AggregateCallback, Processor};

pub(crate) type EventFactoryFn = Box<dyn Fn(EventRecord) -> Option<LogRequest> + Send + Sync>;

/// Pipeline stage combining adjacent mergeable records within a batch into single requests.
///
/// Consecutive records sharing the same account/project/revision identity collapse into one
/// record, and the event factory turns each merged record into a [`LogRequest`]. The aggregate
/// callback list is attached to every produced request so dispatch results route back to the
/// originally-registered callbacks. A factory returning `None` drops that group.
pub struct MergeStage<S> {
    event_factory: EventFactoryFn,
    callbacks: Arc<AggregateCallback<EventRecord>>,
    sink: S,
}

impl<S> MergeStage<S> {
    pub fn new(
        event_factory: EventFactoryFn,
        callbacks: Arc<AggregateCallback<EventRecord>>,
        sink: S,
    ) -> MergeStage<S> {
        MergeStage {
            event_factory,
            callbacks,
            sink,
        }
    }
}

impl<S: Processor<LogRequest>> MergeStage<S> {
    fn emit_group(&self, events: EventRecord) {
        match catch_unwind(AssertUnwindSafe(|| (self.event_factory)(events))) {
            Ok(Some(mut request)) => {
                request.set_callback(Arc::clone(&self.callbacks));
                self.sink.process(request);
            }
            Ok(None) => {
                log::debug!(target: "beacon", "event factory produced no request; dropping group")
            }
            Err(_) => log::warn!(target: "beacon", "event factory panicked; dropping group"),
        }
    }
}

impl<S: Processor<LogRequest>> Processor<EventRecord> for MergeStage<S> {
    fn process(&self, item: EventRecord) {
        self.emit_group(item);
    }

    fn process_batch(&self, items: Vec<EventRecord>) {
        let mut group: Option<EventRecord> = None;
        for event in items {
            group = match group {
                Some(mut merged) if merged.is_mergeable_with(&event) => {
                    merged.merge(event);
                    Some(merged)
                }
                Some(merged) => {
                    self.emit_group(merged);
                    Some(event)
                }
                None => Some(event),
            };
        }
        if let Some(merged) = group {
            self.emit_group(merged);
        }
    }

    fn start(&self) {
        self.sink.start();
    }

    fn stop(&self, timeout: Duration) -> bool {
        self.sink.stop(timeout)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::events::{RequestMethod, Visitor};
    use crate::processor::testing::CollectingSink;

    fn record(project_id: &str, visitor_id: &str) -> EventRecord {
        EventRecord {
            account_id: "acct-1".to_owned(),
            project_id: project_id.to_owned(),
            revision: "1".to_owned(),
            client_name: "rust-sdk".to_owned(),
            client_version: "0.1.0".to_owned(),
            anonymize_ip: None,
            visitors: vec![Visitor {
                visitor_id: visitor_id.to_owned(),
                attributes: HashMap::new(),
                events: Vec::new(),
            }],
        }
    }

    fn request(events: EventRecord) -> LogRequest {
        LogRequest::new(
            RequestMethod::Post,
            "https://ingest.example.com/v1/events",
            HashMap::new(),
            "{}",
            events,
        )
    }

    fn stage(sink: Arc<CollectingSink<LogRequest>>) -> MergeStage<Arc<CollectingSink<LogRequest>>> {
        MergeStage::new(
            Box::new(|events| Some(request(events))),
            Arc::new(AggregateCallback::new()),
            sink,
        )
    }

    #[test]
    fn adjacent_mergeable_records_collapse_into_one_request() {
        let sink = Arc::new(CollectingSink::new());
        stage(Arc::clone(&sink)).process_batch(vec![
            record("proj-1", "alice"),
            record("proj-1", "bob"),
            record("proj-2", "carol"),
            record("proj-1", "dave"),
        ]);

        let requests = sink.items();
        assert_eq!(requests.len(), 3);
        let visitors = |index: usize| -> Vec<String> {
            requests[index]
                .events
                .visitors
                .iter()
                .map(|visitor| visitor.visitor_id.clone())
                .collect()
        };
        assert_eq!(visitors(0), vec!["alice", "bob"]);
        assert_eq!(visitors(1), vec!["carol"]);
        assert_eq!(visitors(2), vec!["dave"]);
    }

    #[test]
    fn produced_requests_carry_the_aggregate_callback() {
        let sink = Arc::new(CollectingSink::new());
        stage(Arc::clone(&sink)).process(record("proj-1", "alice"));

        let requests = sink.items();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].callback().is_some());
    }

    #[test]
    fn factory_returning_none_drops_the_group() {
        let sink = Arc::new(CollectingSink::new());
        let stage = MergeStage::new(
            Box::new(|events: EventRecord| {
                (events.project_id != "proj-2").then(|| request(events))
            }),
            Arc::new(AggregateCallback::new()),
            Arc::clone(&sink),
        );

        stage.process_batch(vec![record("proj-1", "alice"), record("proj-2", "bob")]);

        let requests = sink.items();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].events.visitors[0].visitor_id, "alice");
    }
}
