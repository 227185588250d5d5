use lrpc_future::{Future, FutureResult, Promise};
use lrpc_future::FutureError;
use lrpc_reactor::Handle;

/// `EventLoop::Execute` from spec §4.5: run `f` (which itself returns a `Future`) on `handle`'s
/// loop, unwrapping the nested future so the caller sees a single `Future<T, E>` regardless of
/// whether it was already on that loop's thread.
pub fn execute<T, E, F>(handle: &Handle, f: F) -> Future<T, E>
where
    T: Send + 'static,
    E: Send + 'static + From<FutureError>,
    F: FnOnce() -> Future<T, E> + Send + 'static,
{
    if handle.is_in_loop_thread() {
        return f();
    }

    let (outer_promise, outer_future) = Promise::new();
    handle.run_in_loop(move |_| {
        let inner = f();
        let _ = inner.then(None, move |result: FutureResult<T, E>| {
            outer_promise.set_result(result);
            FutureResult::Value(())
        });
    });
    outer_future
}
