//! Execution collaborators that run batch dispatch off the producer threads.

/// A unit of work accepted by an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send>;

/// A narrow capability interface supplying the parallelism for batch dispatch.
///
/// Executors are shared collaborators owned by the embedding application; the pipeline never shuts
/// one down. Implementations must be thread-safe.
pub trait Executor: Send + Sync {
    /// Run `task`, possibly on another thread. The task must eventually run or be dropped;
    /// dropping it unrun is treated by the pipeline as the dispatch having finished.
    fn execute(&self, task: Task);
}

/// An [`Executor`] that runs every task on a freshly spawned named thread.
///
/// Concurrency is bounded by the batching engine's inflight cap, so the thread-per-task strategy
/// never holds more than `max_inflight_batches` threads at a time.
#[derive(Debug, Default)]
pub struct ThreadExecutor;

impl ThreadExecutor {
    /// Create a new `ThreadExecutor`.
    pub fn new() -> ThreadExecutor {
        ThreadExecutor
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) {
        let spawned = std::thread::Builder::new()
            .name("beacon-dispatch".to_owned())
            .spawn(task);
        if let Err(err) = spawned {
            // The task is consumed by the failed spawn; its drop releases any
            // resources it carries.
            log::error!(target: "beacon", "failed to spawn dispatch thread: {:?}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_executor_runs_task_on_another_thread() {
        let (sender, receiver) = std::sync::mpsc::channel();

        ThreadExecutor::new().execute(Box::new(move || {
            let name = std::thread::current()
                .name()
                .map(str::to_owned)
                .unwrap_or_default();
            sender.send(name).unwrap();
        }));

        let name = receiver
            .recv_timeout(std::time::Duration::from_secs(1))
            .unwrap();
        assert_eq!(name, "beacon-dispatch");
    }
}
