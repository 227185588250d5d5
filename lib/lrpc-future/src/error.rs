use std::fmt;

/// Local failure modes of the future/promise machinery itself. RPC-level errors travel as the
/// `E` type parameter of `FutureResult<T, E>`, not through this enum.
#[derive(Debug)]
pub enum FutureError {
    /// `wait(timeout)` elapsed before the shared state reached `Done`.
    Timeout,
    /// The promise was dropped without ever calling `set_value`/`set_exception`.
    Broken,
    /// `get()` was called on a shared state that is still `None`.
    NotReady,
    /// `when_if_any`/`when_if_n` ran out of candidates before the predicate matched enough of
    /// them (spec §4.6: "if insufficient candidates match, the aggregate fails").
    NoneMatched,
}

impl fmt::Display for FutureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FutureError::Timeout => write!(f, "future timed out"),
            FutureError::Broken => write!(f, "promise dropped without a value"),
            FutureError::NotReady => write!(f, "future has no value yet"),
            FutureError::NoneMatched => write!(f, "no completed future matched the predicate"),
        }
    }
}

impl std::error::Error for FutureError {}
