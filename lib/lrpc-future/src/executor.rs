use std::time::Duration;

/// Anything a future can hand a continuation off to. `EventLoop` is the only real implementation
/// (spec §4.5 "Executor role"); tests use an inline executor that runs on the calling thread.
pub trait Executor: Send + Sync {
    fn schedule(&self, f: Box<dyn FnOnce() + Send + 'static>);
    fn schedule_later(&self, delay: Duration, f: Box<dyn FnOnce() + Send + 'static>);
}

/// Runs continuations synchronously on whatever thread calls `schedule`. Used by default when a
/// `.then()` has no executor, matching spec §4.6: "runs fn on whichever thread fulfils the
/// upstream promise."
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn schedule(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        f();
    }

    fn schedule_later(&self, _delay: Duration, f: Box<dyn FnOnce() + Send + 'static>) {
        // No timer of its own; callers that need real delay semantics supply a real executor.
        f();
    }
}
