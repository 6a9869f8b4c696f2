use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::processor::Processor;

pub(crate) type InterceptFn<E> = Box<dyn Fn(E) -> Option<E> + Send + Sync>;

/// Pipeline stage applying policy filters to canonical events, in registration order.
///
/// Each handler may pass the event through, replace it, or return `None` to drop it. A drop is a
/// policy decision, not a failure: the remaining handlers are skipped and no callback fires. A
/// panicking handler drops the affected event; later events are unaffected.
pub struct InterceptStage<E, S> {
    interceptors: Vec<InterceptFn<E>>,
    sink: S,
}

impl<E, S> InterceptStage<E, S> {
    pub fn new(interceptors: Vec<InterceptFn<E>>, sink: S) -> InterceptStage<E, S> {
        InterceptStage { interceptors, sink }
    }
}

impl<E, S: Processor<E>> Processor<E> for InterceptStage<E, S> {
    fn process(&self, item: E) {
        let mut current = item;
        for interceptor in &self.interceptors {
            match catch_unwind(AssertUnwindSafe(move || interceptor(current))) {
                Ok(Some(next)) => current = next,
                Ok(None) => {
                    log::debug!(target: "beacon", "interceptor dropped event");
                    return;
                }
                Err(_) => {
                    log::warn!(target: "beacon", "interceptor panicked; dropping event");
                    return;
                }
            }
        }
        self.sink.process(current);
    }

    fn start(&self) {
        self.sink.start();
    }

    fn stop(&self, timeout: Duration) -> bool {
        self.sink.stop(timeout)
    }
}
