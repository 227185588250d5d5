use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::FutureError;
use crate::future::Future;
use crate::promise::Promise;
use crate::result::FutureResult;

/// Vector flavor of `whenAll` (spec §4.6): fulfils once every input future has completed, in
/// input order regardless of completion order.
pub fn when_all<T, E>(futures: Vec<Future<T, E>>) -> Future<Vec<FutureResult<T, E>>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (promise, future) = Promise::new();
    let n = futures.len();
    if n == 0 {
        promise.set_value(Vec::new());
        return future;
    }

    let slots: Arc<Mutex<Vec<Option<FutureResult<T, E>>>>> =
        Arc::new(Mutex::new((0..n).map(|_| None).collect()));
    let remaining = Arc::new(AtomicUsize::new(n));

    for (i, fut) in futures.into_iter().enumerate() {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        fut.on_complete(move |result| {
            slots.lock().unwrap()[i] = Some(result);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let collected = slots
                    .lock()
                    .unwrap()
                    .drain(..)
                    .map(|slot| slot.expect("every slot filled by the time remaining hits 0"))
                    .collect();
                promise.set_value(collected);
            }
        });
    }
    future
}

/// `whenAny(begin, end) -> Future<(index, Result<T>)>` (spec §4.6): first-to-complete wins via
/// atomic CAS on a `done` flag.
pub fn when_any<T, E>(futures: Vec<Future<T, E>>) -> Future<(usize, FutureResult<T, E>), E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (promise, future) = Promise::new();
    let done = Arc::new(AtomicBool::new(false));
    for (i, fut) in futures.into_iter().enumerate() {
        let done = done.clone();
        let promise = promise.clone();
        fut.on_complete(move |result| {
            if done
                .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                promise.set_value((i, result));
            }
        });
    }
    future
}

/// `whenN(N, begin, end) -> Future<Vec<(index, Result<T>)>>` (spec §4.6): gather the first `n`
/// completions, in the order they complete.
pub fn when_n<T, E>(n: usize, futures: Vec<Future<T, E>>) -> Future<Vec<(usize, FutureResult<T, E>)>, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    let (promise, future) = Promise::new();
    if n == 0 {
        promise.set_value(Vec::new());
        return future;
    }
    let collected = Arc::new(Mutex::new(Vec::with_capacity(n)));
    let done = Arc::new(AtomicBool::new(false));
    for (i, fut) in futures.into_iter().enumerate() {
        let collected = collected.clone();
        let done = done.clone();
        let promise = promise.clone();
        fut.on_complete(move |result| {
            if done.load(Ordering::Acquire) {
                return;
            }
            let mut guard = collected.lock().unwrap();
            if done.load(Ordering::Acquire) || guard.len() >= n {
                return;
            }
            guard.push((i, result));
            if guard.len() == n {
                done.store(true, Ordering::Release);
                let out = std::mem::take(&mut *guard);
                drop(guard);
                promise.set_value(out);
            }
        });
    }
    future
}

/// `whenIfAny(begin, end, pred)` (spec §4.6): as `when_any`, but each completion is filtered by
/// `pred`; fails with `FutureError::NoneMatched` if every input completes without a match.
pub fn when_if_any<T, E, P>(futures: Vec<Future<T, E>>, pred: P) -> Future<(usize, FutureResult<T, E>), E>
where
    T: Send + 'static,
    E: Send + 'static + From<FutureError>,
    P: Fn(&FutureResult<T, E>) -> bool + Send + Sync + 'static,
{
    let (promise, future) = Promise::new();
    let total = futures.len();
    if total == 0 {
        promise.set_exception(FutureError::NoneMatched.into());
        return future;
    }
    let pred = Arc::new(pred);
    let done = Arc::new(AtomicBool::new(false));
    let remaining = Arc::new(AtomicUsize::new(total));
    for (i, fut) in futures.into_iter().enumerate() {
        let done = done.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        let pred = pred.clone();
        fut.on_complete(move |result| {
            if pred(&result)
                && done
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                promise.set_value((i, result));
                return;
            }
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 && !done.load(Ordering::Acquire) {
                promise.set_exception(FutureError::NoneMatched.into());
            }
        });
    }
    future
}

/// `whenIfN(N, begin, end, pred)` (spec §4.6): as `when_n`, but each completion is filtered by
/// `pred`; fails with `FutureError::NoneMatched` if fewer than `n` candidates ever match.
pub fn when_if_n<T, E, P>(
    n: usize,
    futures: Vec<Future<T, E>>,
    pred: P,
) -> Future<Vec<(usize, FutureResult<T, E>)>, E>
where
    T: Send + 'static,
    E: Send + 'static + From<FutureError>,
    P: Fn(&FutureResult<T, E>) -> bool + Send + Sync + 'static,
{
    let (promise, future) = Promise::new();
    if n == 0 {
        promise.set_value(Vec::new());
        return future;
    }
    let total = futures.len();
    let pred = Arc::new(pred);
    let collected = Arc::new(Mutex::new(Vec::with_capacity(n)));
    let done = Arc::new(AtomicBool::new(false));
    let remaining = Arc::new(AtomicUsize::new(total));
    for (i, fut) in futures.into_iter().enumerate() {
        let collected = collected.clone();
        let done = done.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        let pred = pred.clone();
        fut.on_complete(move |result| {
            if done.load(Ordering::Acquire) {
                return;
            }
            if pred(&result) {
                let mut guard = collected.lock().unwrap();
                if !done.load(Ordering::Acquire) && guard.len() < n {
                    guard.push((i, result));
                    if guard.len() == n {
                        done.store(true, Ordering::Release);
                        let out = std::mem::take(&mut *guard);
                        drop(guard);
                        promise.set_value(out);
                        return;
                    }
                }
            }
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 && !done.load(Ordering::Acquire) {
                promise.set_exception(FutureError::NoneMatched.into());
            }
        });
    }
    future
}

/// Tuple flavor of `whenAll` for two inputs (spec §4.6 `whenAll(fs...) ->
/// Future<tuple<Result<Ti>...>>`; Rust has no variadic generics, so each arity gets its own
/// function — the same realization choice `futures::join!` makes).
pub fn when_all2<T1, T2, E>(
    f1: Future<T1, E>,
    f2: Future<T2, E>,
) -> Future<(FutureResult<T1, E>, FutureResult<T2, E>), E>
where
    T1: Send + 'static,
    T2: Send + 'static,
    E: Send + 'static,
{
    let (promise, future) = Promise::new();
    let remaining = Arc::new(AtomicUsize::new(2));
    let slots: Arc<Mutex<(Option<FutureResult<T1, E>>, Option<FutureResult<T2, E>>)>> =
        Arc::new(Mutex::new((None, None)));

    {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        f1.on_complete(move |result| {
            slots.lock().unwrap().0 = Some(result);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let mut guard = slots.lock().unwrap();
                let tuple = (guard.0.take().unwrap(), guard.1.take().unwrap());
                drop(guard);
                promise.set_value(tuple);
            }
        });
    }
    {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        f2.on_complete(move |result| {
            slots.lock().unwrap().1 = Some(result);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let mut guard = slots.lock().unwrap();
                let tuple = (guard.0.take().unwrap(), guard.1.take().unwrap());
                drop(guard);
                promise.set_value(tuple);
            }
        });
    }
    future
}

/// Tuple flavor of `whenAll` for three inputs; see `when_all2`.
pub fn when_all3<T1, T2, T3, E>(
    f1: Future<T1, E>,
    f2: Future<T2, E>,
    f3: Future<T3, E>,
) -> Future<(FutureResult<T1, E>, FutureResult<T2, E>, FutureResult<T3, E>), E>
where
    T1: Send + 'static,
    T2: Send + 'static,
    T3: Send + 'static,
    E: Send + 'static,
{
    type Slots<T1, T2, T3, E> = (
        Option<FutureResult<T1, E>>,
        Option<FutureResult<T2, E>>,
        Option<FutureResult<T3, E>>,
    );

    let (promise, future) = Promise::new();
    let remaining = Arc::new(AtomicUsize::new(3));
    let slots: Arc<Mutex<Slots<T1, T2, T3, E>>> = Arc::new(Mutex::new((None, None, None)));

    fn finish<T1, T2, T3, E>(
        guard: &mut Slots<T1, T2, T3, E>,
    ) -> (FutureResult<T1, E>, FutureResult<T2, E>, FutureResult<T3, E>) {
        (guard.0.take().unwrap(), guard.1.take().unwrap(), guard.2.take().unwrap())
    }

    {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        f1.on_complete(move |result| {
            slots.lock().unwrap().0 = Some(result);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let tuple = finish(&mut slots.lock().unwrap());
                promise.set_value(tuple);
            }
        });
    }
    {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        f2.on_complete(move |result| {
            slots.lock().unwrap().1 = Some(result);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let tuple = finish(&mut slots.lock().unwrap());
                promise.set_value(tuple);
            }
        });
    }
    {
        let slots = slots.clone();
        let remaining = remaining.clone();
        let promise = promise.clone();
        f3.on_complete(move |result| {
            slots.lock().unwrap().2 = Some(result);
            if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let tuple = finish(&mut slots.lock().unwrap());
                promise.set_value(tuple);
            }
        });
    }
    future
}
