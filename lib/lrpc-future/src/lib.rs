//! Shared-state future/promise combinator library.
//!
//! A `Future<T, E>`/`Promise<T, E>` pair shares one mutex-guarded slot (`SharedState`) holding a
//! `FutureResult<T, E>` — the `{None, Value, Exception}` tagged union every call site eventually
//! settles. Continuations chain with `.then`/`.then_future`, hand off to an `Executor`, and the
//! fan-in combinators (`when_all`, `when_any`, `when_n`, `when_if_any`, `when_if_n`) compose many
//! futures into one.

mod combinators;
mod error;
mod executor;
mod future;
mod promise;
mod result;
mod shared_state;

pub use combinators::{when_all, when_all2, when_all3, when_any, when_if_any, when_if_n, when_n};
pub use error::FutureError;
pub use executor::{Executor, InlineExecutor};
pub use future::Future;
pub use promise::Promise;
pub use result::FutureResult;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn ready_future_round_trips() {
        let f: Future<i32> = Future::ready(42);
        match f.wait(Duration::from_millis(10)) {
            FutureResult::Value(v) => assert_eq!(v, 42),
            _ => panic!("expected a value"),
        }
    }

    #[test]
    fn errored_future_rethrows() {
        let f: Future<i32> = Future::errored(FutureError::Broken);
        match f.wait(Duration::from_millis(10)) {
            FutureResult::Exception(FutureError::Broken) => {}
            _ => panic!("expected Broken exception"),
        }
    }

    #[test]
    fn then_runs_synchronously_with_no_executor() {
        let (promise, future) = Promise::<i32, FutureError>::new();
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = ran.clone();
        let chained: Future<i32, FutureError> = future.then(None, move |r| {
            ran2.store(true, Ordering::SeqCst);
            match r {
                FutureResult::Value(v) => FutureResult::Value(v + 1),
                other => FutureResult::Exception(match other {
                    FutureResult::Exception(e) => e,
                    _ => unreachable!(),
                }),
            }
        });
        promise.set_value(41);
        assert!(ran.load(Ordering::SeqCst));
        match chained.wait(Duration::from_millis(10)) {
            FutureResult::Value(v) => assert_eq!(v, 42),
            _ => panic!("expected chained value"),
        }
    }

    #[test]
    fn then_future_flattens() {
        let (promise, future) = Promise::<i32, FutureError>::new();
        let flattened = future.then_future(None, |r| match r {
            FutureResult::Value(v) => Future::ready(v * 2),
            FutureResult::Exception(e) => Future::errored(e),
            FutureResult::None => unreachable!(),
        });
        promise.set_value(21);
        match flattened.wait(Duration::from_millis(10)) {
            FutureResult::Value(v) => assert_eq!(v, 42),
            _ => panic!("expected flattened value"),
        }
    }

    #[test]
    fn when_all_waits_for_both() {
        let (p1, f1) = Promise::<i32, FutureError>::new();
        let (p2, f2) = Promise::<&'static str, FutureError>::new();
        let joined = when_all2(f1, f2);
        p1.set_value(1);
        p2.set_value("two");
        match joined.wait(Duration::from_millis(10)) {
            FutureResult::Value((FutureResult::Value(1), FutureResult::Value("two"))) => {}
            _ => panic!("expected both values"),
        }
    }

    #[test]
    fn when_any_returns_first_winner() {
        let (p1, f1) = Promise::<i32, FutureError>::new();
        let (_p2, f2) = Promise::<i32, FutureError>::new();
        let race = when_any(vec![f1, f2]);
        p1.set_value(7);
        match race.wait(Duration::from_millis(10)) {
            FutureResult::Value((0, FutureResult::Value(7))) => {}
            _ => panic!("expected index 0 to win"),
        }
    }

    #[test]
    fn when_n_gathers_first_n() {
        let (p1, f1) = Promise::<i32, FutureError>::new();
        let (p2, f2) = Promise::<i32, FutureError>::new();
        let (_p3, f3) = Promise::<i32, FutureError>::new();
        let gathered = when_n(2, vec![f1, f2, f3]);
        p1.set_value(1);
        p2.set_value(2);
        match gathered.wait(Duration::from_millis(10)) {
            FutureResult::Value(v) => assert_eq!(v.len(), 2),
            _ => panic!("expected 2 gathered results"),
        }
    }

    #[test]
    fn when_if_any_fails_when_nothing_matches() {
        let (p1, f1) = Promise::<i32, FutureError>::new();
        let filtered = when_if_any(vec![f1], |r| matches!(r, FutureResult::Value(v) if *v > 100));
        p1.set_value(1);
        match filtered.wait(Duration::from_millis(10)) {
            FutureResult::Exception(FutureError::NoneMatched) => {}
            _ => panic!("expected NoneMatched"),
        }
    }

    #[test]
    fn on_timeout_fires_only_if_still_pending() {
        struct ImmediateExecutor;
        impl Executor for ImmediateExecutor {
            fn schedule(&self, f: Box<dyn FnOnce() + Send>) {
                f();
            }
            fn schedule_later(&self, _delay: Duration, f: Box<dyn FnOnce() + Send>) {
                f();
            }
        }
        let executor: Arc<dyn Executor> = Arc::new(ImmediateExecutor);
        let (_promise, future) = Promise::<i32, FutureError>::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        future.on_timeout(Duration::from_millis(1), &executor, move || {
            fired2.store(true, Ordering::SeqCst);
        });
        assert!(fired.load(Ordering::SeqCst));
    }
}
