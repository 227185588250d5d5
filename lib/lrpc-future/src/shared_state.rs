use std::sync::{Condvar, Mutex};

use crate::result::FutureResult;

/// `None ──set_value/set_exception──▶ Done ──wait──▶ Retrieved`
/// `None ──timeout callback fires───▶ Timeout`
/// (spec §4.6). Any transition attempted from a non-`None` state is a no-op.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum Progress {
    None,
    Timeout,
    Done,
    Retrieved,
}

pub(crate) type Continuation<T, E> = Box<dyn FnOnce(FutureResult<T, E>) + Send>;

pub(crate) struct Inner<T, E> {
    pub progress: Progress,
    pub result: Option<FutureResult<T, E>>,
    pub continuation: Option<Continuation<T, E>>,
}

/// The mutex-guarded slot a `Promise`/`Future` pair shares (spec §3 "Promise/Future shared
/// state"). The mutex plus the condvar used by `wait` are two of the three cross-thread
/// primitives spec §5 allows.
pub(crate) struct SharedState<T, E> {
    inner: Mutex<Inner<T, E>>,
    condvar: Condvar,
}

impl<T, E> SharedState<T, E> {
    pub fn new() -> Self {
        SharedState {
            inner: Mutex::new(Inner {
                progress: Progress::None,
                result: None,
                continuation: None,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Attempts the `None -> Done` transition. Returns the `(continuation, result)` pair to
    /// invoke outside the lock if a continuation was already installed. No-ops (handing the
    /// result straight back) if the state had already left `None`.
    pub fn fulfill(
        &self,
        result: FutureResult<T, E>,
    ) -> Result<Option<(Continuation<T, E>, FutureResult<T, E>)>, FutureResult<T, E>> {
        let mut guard = self.inner.lock().unwrap();
        if guard.progress != Progress::None {
            return Err(result);
        }
        let continuation = guard.continuation.take();
        let outcome = match continuation {
            Some(cb) => {
                guard.progress = Progress::Retrieved;
                Some((cb, result))
            }
            None => {
                guard.progress = Progress::Done;
                guard.result = Some(result);
                None
            }
        };
        drop(guard);
        self.condvar.notify_all();
        Ok(outcome)
    }

    /// Installs `cb` to run once the state becomes `Done`. If the state is already `Done`, `cb`
    /// is invoked immediately (outside the lock) on the calling thread — `then(fn)` without an
    /// executor runs synchronously on whichever thread fulfils the upstream promise (spec
    /// §4.6), and `then(executor, fn)` relies on `cb` itself performing the executor hand-off.
    pub fn install_continuation(&self, cb: Continuation<T, E>) {
        let mut guard = self.inner.lock().unwrap();
        match guard.progress {
            Progress::None => {
                guard.continuation = Some(cb);
            }
            Progress::Done => {
                guard.progress = Progress::Retrieved;
                let result = guard.result.take().expect("Done state must carry a result");
                drop(guard);
                cb(result);
            }
            Progress::Timeout | Progress::Retrieved => {}
        }
    }

    /// Blocks the calling thread until the state leaves `None`, or `timeout` elapses.
    pub fn wait(&self, timeout: Option<std::time::Duration>) -> Option<FutureResult<T, E>> {
        let mut guard = self.inner.lock().unwrap();
        while guard.progress == Progress::None {
            match timeout {
                Some(d) => {
                    let (g, wait_result) = self.condvar.wait_timeout(guard, d).unwrap();
                    guard = g;
                    if wait_result.timed_out() && guard.progress == Progress::None {
                        return None;
                    }
                }
                None => {
                    guard = self.condvar.wait(guard).unwrap();
                }
            }
        }
        guard.progress = Progress::Retrieved;
        guard.result.take()
    }

    /// `None -> Timeout`. Returns `true` if the transition happened (i.e. the caller of
    /// `on_timeout` should run its callback).
    pub fn try_timeout(&self) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.progress == Progress::None {
            guard.progress = Progress::Timeout;
            drop(guard);
            self.condvar.notify_all();
            true
        } else {
            false
        }
    }

    pub fn is_none(&self) -> bool {
        self.inner.lock().unwrap().progress == Progress::None
    }
}
