use std::sync::Arc;
use std::time::Duration;

use crate::error::FutureError;
use crate::executor::{Executor, InlineExecutor};
use crate::promise::Promise;
use crate::result::FutureResult;
use crate::shared_state::SharedState;

/// The read side of a future/promise pair (spec §4.6).
pub struct Future<T, E = FutureError> {
    state: Arc<SharedState<T, E>>,
}

impl<T, E> Future<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub(crate) fn from_shared_state(state: Arc<SharedState<T, E>>) -> Self {
        Future { state }
    }

    pub fn ready(value: T) -> Self {
        let (promise, future) = Promise::new();
        promise.set_value(value);
        future
    }

    pub fn errored(error: E) -> Self {
        let (promise, future) = Promise::new();
        promise.set_exception(error);
        future
    }

    /// Blocks the calling thread (never the reactor's own thread — see spec §5 "Suspension
    /// points") until a value/exception arrives or `timeout` elapses.
    pub fn wait(self, timeout: Duration) -> FutureResult<T, E>
    where
        E: From<FutureError>,
    {
        match self.state.wait(Some(timeout)) {
            Some(result) => result,
            None => FutureResult::Exception(FutureError::Timeout.into()),
        }
    }

    /// Blocks with no deadline. Intended for test harnesses and synchronous bridges only, per
    /// spec §5.
    pub fn wait_forever(self) -> FutureResult<T, E> {
        self.state
            .wait(None)
            .expect("condvar woken spuriously with no result")
    }

    /// Schedules `cb` to run if the shared state is still `None` when `delay` elapses on
    /// `executor` (spec §4.6 `onTimeout`). No-op if the state has already settled.
    pub fn on_timeout<F>(&self, delay: Duration, executor: &Arc<dyn Executor>, cb: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let state = self.state.clone();
        executor.schedule_later(
            delay,
            Box::new(move || {
                if state.try_timeout() {
                    cb();
                }
            }),
        );
    }

    /// `f` returns a plain value `U`; the outer future resolves once `f` completes
    /// (spec §4.6, non-flattening `then`). Runs on `executor`, or synchronously on whichever
    /// thread fulfils the upstream promise if `executor` is `None`.
    pub fn then<U, F>(self, executor: Option<Arc<dyn Executor>>, f: F) -> Future<U, E>
    where
        U: Send + 'static,
        F: FnOnce(FutureResult<T, E>) -> FutureResult<U, E> + Send + 'static,
    {
        let executor = executor.unwrap_or_else(|| Arc::new(InlineExecutor));
        let (outer_promise, outer_future) = Promise::new();
        self.state.install_continuation(Box::new(move |result| {
            executor.schedule(Box::new(move || {
                outer_promise.set_result(f(result));
            }));
        }));
        outer_future
    }

    /// `f` returns `Future<U, E>`; the outer future is flattened — it resolves when `f`'s
    /// returned future resolves (spec §4.6 "flattened" variant).
    pub fn then_future<U, F>(self, executor: Option<Arc<dyn Executor>>, f: F) -> Future<U, E>
    where
        U: Send + 'static,
        F: FnOnce(FutureResult<T, E>) -> Future<U, E> + Send + 'static,
    {
        let executor = executor.unwrap_or_else(|| Arc::new(InlineExecutor));
        let (outer_promise, outer_future) = Promise::new();
        self.state.install_continuation(Box::new(move |result| {
            executor.schedule(Box::new(move || {
                let inner = f(result);
                inner.forward_to(outer_promise);
            }));
        }));
        outer_future
    }

    /// Forwards whichever result `self` settles with onto `promise`, without an intervening
    /// transform. Used to flatten `Future<Future<U>>` into `Future<U>`.
    fn forward_to(self, promise: Promise<T, E>) {
        self.state.install_continuation(Box::new(move |result| {
            promise.set_result(result);
        }));
    }

    /// Installs `cb` directly, with no executor hand-off — it runs on whichever thread fulfils
    /// the upstream promise. Used internally by the fan-in combinators, which need to observe
    /// every input future's completion without paying for an extra executor round-trip per leg.
    pub(crate) fn on_complete<F>(self, cb: F)
    where
        F: FnOnce(FutureResult<T, E>) + Send + 'static,
    {
        self.state.install_continuation(Box::new(cb));
    }
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Future { state: self.state.clone() }
    }
}
