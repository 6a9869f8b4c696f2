use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;

use crate::processor::Processor;

pub(crate) type ConvertFn<T, E> = Box<dyn Fn(T) -> Option<E> + Send + Sync>;

/// Pipeline stage mapping the caller's input type to the canonical event record.
///
/// Returning `None` drops the item silently: a failed conversion means "not an event yet", not a
/// dispatch failure, so no callback fires.
pub struct ConvertStage<T, E, S> {
    converter: ConvertFn<T, E>,
    sink: S,
}

impl<T, E, S> ConvertStage<T, E, S> {
    pub fn new(converter: ConvertFn<T, E>, sink: S) -> ConvertStage<T, E, S> {
        ConvertStage { converter, sink }
    }
}

impl<T, E, S: Processor<E>> Processor<T> for ConvertStage<T, E, S> {
    fn process(&self, item: T) {
        match catch_unwind(AssertUnwindSafe(|| (self.converter)(item))) {
            Ok(Some(event)) => self.sink.process(event),
            Ok(None) => {
                log::debug!(target: "beacon", "converter produced no event; dropping item")
            }
            Err(_) => log::warn!(target: "beacon", "converter panicked; dropping item"),
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
    use std::sync::Arc;

    use super::*;
    use crate::processor::testing::CollectingSink;

    fn stage(sink: Arc<CollectingSink<u32>>) -> ConvertStage<&'static str, u32, Arc<CollectingSink<u32>>> {
        ConvertStage::new(Box::new(|item: &'static str| item.parse().ok()), sink)
    }

    #[test]
    fn converted_items_flow_downstream() {
        let sink = Arc::new(CollectingSink::new());
        stage(Arc::clone(&sink)).process("17");

        assert_eq!(sink.items(), vec![17]);
    }

    #[test]
    fn failed_conversion_drops_the_item() {
        let sink = Arc::new(CollectingSink::new());
        stage(Arc::clone(&sink)).process("not-a-number");

        assert!(sink.items().is_empty());
    }
}
