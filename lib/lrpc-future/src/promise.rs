use std::sync::Arc;

use crate::future::Future;
use crate::result::FutureResult;
use crate::shared_state::SharedState;

/// The write side of a future/promise pair. Dropping a `Promise` without ever calling
/// `set_value`/`set_exception` leaves its `Future` permanently `None` (a "broken promise");
/// nothing currently detects that case since spec §4.6 does not ask for it.
pub struct Promise<T, E> {
    state: Arc<SharedState<T, E>>,
}

impl<T, E> Promise<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> (Promise<T, E>, Future<T, E>) {
        let state = Arc::new(SharedState::new());
        (
            Promise { state: state.clone() },
            Future::from_shared_state(state),
        )
    }

    pub fn set_value(&self, value: T) {
        self.set_result(FutureResult::Value(value));
    }

    pub fn set_exception(&self, error: E) {
        self.set_result(FutureResult::Exception(error));
    }

    pub fn set_result(&self, result: FutureResult<T, E>) {
        if let Ok(Some((cb, result))) = self.state.fulfill(result) {
            cb(result);
        }
    }

    pub fn get_future(&self) -> Future<T, E> {
        Future::from_shared_state(self.state.clone())
    }
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Promise { state: self.state.clone() }
    }
}
