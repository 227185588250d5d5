use crate::error::FutureError;

/// A tagged union over `{empty, value, exception}`, the payload carried by a future's shared
/// state (spec §3/§4.6). `E` defaults to `FutureError` for plain combinator use; RPC call sites
/// instantiate it with `lrpc_rpc::RpcError`.
#[derive(Debug)]
pub enum FutureResult<T, E = FutureError> {
    None,
    Value(T),
    Exception(E),
}

impl<T, E> FutureResult<T, E> {
    #[inline]
    pub fn is_none(&self) -> bool {
        matches!(self, FutureResult::None)
    }

    #[inline]
    pub fn has_value(&self) -> bool {
        matches!(self, FutureResult::Value(_))
    }

    #[inline]
    pub fn has_exception(&self) -> bool {
        matches!(self, FutureResult::Exception(_))
    }

    /// Unwraps the `Value` variant or turns the `Exception` into a `Result::Err`.
    ///
    /// # Panics
    /// Panics if the result is still `None` — callers must check readiness first (mirrors the
    /// original's `get()` throwing on an un-set `Result<T>`).
    pub fn get(self) -> Result<T, E>
    where
        E: From<FutureError>,
    {
        match self {
            FutureResult::Value(v) => Ok(v),
            FutureResult::Exception(e) => Err(e),
            FutureResult::None => panic!("FutureResult::get() called on an empty result"),
        }
    }

    pub fn as_ref(&self) -> FutureResult<&T, &E> {
        match self {
            FutureResult::None => FutureResult::None,
            FutureResult::Value(v) => FutureResult::Value(v),
            FutureResult::Exception(e) => FutureResult::Exception(e),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FutureResult<U, E> {
        match self {
            FutureResult::None => FutureResult::None,
            FutureResult::Value(v) => FutureResult::Value(f(v)),
            FutureResult::Exception(e) => FutureResult::Exception(e),
        }
    }
}

impl<T, E> From<Result<T, E>> for FutureResult<T, E> {
    fn from(r: Result<T, E>) -> Self {
        match r {
            Ok(v) => FutureResult::Value(v),
            Err(e) => FutureResult::Exception(e),
        }
    }
}
