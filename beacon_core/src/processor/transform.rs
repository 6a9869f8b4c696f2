use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::processor::Processor;

pub(crate) type TransformFn<T> = Box<dyn Fn(&mut T) + Send + Sync>;

/// Pipeline stage applying enrichment hooks to every item, in registration order.
///
/// Hooks annotate the item in place; the item itself always flows to the next stage. A panicking
/// hook is logged and skipped, so one faulty hook cannot poison the item or the pipeline.
pub struct TransformStage<T, S> {
    transformers: Vec<TransformFn<T>>,
    sink: S,
}

impl<T, S> TransformStage<T, S> {
    pub fn new(transformers: Vec<TransformFn<T>>, sink: S) -> TransformStage<T, S> {
        TransformStage { transformers, sink }
    }
}

impl<T, S: Processor<T>> Processor<T> for TransformStage<T, S> {
    fn process(&self, mut item: T) {
        for transformer in &self.transformers {
            if catch_unwind(AssertUnwindSafe(|| transformer(&mut item))).is_err() {
                log::warn!(target: "beacon", "transformer panicked; continuing with remaining transformers");
            }
        }
        self.sink.process(item);
    }

    fn start(&self) {
        self.sink.start();
    }

    fn stop(&self, timeout: Duration) -> bool {
        self.sink.stop(timeout)
    }
}
