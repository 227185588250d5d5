use std::fmt;

use lrpc_future::FutureError;

/// Stable numeric error taxonomy carried on the wire in `Response.error.errnum` (spec §6).
#[derive(Debug, Clone)]
pub enum RpcError {
    NoSuchService,
    NoSuchMethod,
    ConnectionLost,
    ConnectionReset,
    DecodeFail,
    EncodeFail,
    Timeout,
    TooLongFrame,
    EmptyRequest,
    MethodUndetermined,
    ThrowInMethod(String),
    NoAvailableEndpoint,
    ConnectRefused,
}

impl RpcError {
    pub fn errnum(&self) -> i32 {
        match self {
            RpcError::NoSuchService => 1,
            RpcError::NoSuchMethod => 2,
            RpcError::ConnectionLost => 3,
            RpcError::ConnectionReset => 4,
            RpcError::DecodeFail => 5,
            RpcError::EncodeFail => 6,
            RpcError::Timeout => 7,
            RpcError::TooLongFrame => 8,
            RpcError::EmptyRequest => 9,
            RpcError::MethodUndetermined => 10,
            RpcError::ThrowInMethod(_) => 11,
            RpcError::NoAvailableEndpoint => 12,
            RpcError::ConnectRefused => 13,
        }
    }

    pub fn from_wire(errnum: i32, msg: String) -> RpcError {
        match errnum {
            1 => RpcError::NoSuchService,
            2 => RpcError::NoSuchMethod,
            3 => RpcError::ConnectionLost,
            4 => RpcError::ConnectionReset,
            5 => RpcError::DecodeFail,
            6 => RpcError::EncodeFail,
            7 => RpcError::Timeout,
            8 => RpcError::TooLongFrame,
            9 => RpcError::EmptyRequest,
            10 => RpcError::MethodUndetermined,
            11 => RpcError::ThrowInMethod(msg),
            12 => RpcError::NoAvailableEndpoint,
            13 => RpcError::ConnectRefused,
            _ => RpcError::DecodeFail,
        }
    }

    /// Band 1 of spec §7: close the socket rather than keep serving on it.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            RpcError::DecodeFail | RpcError::TooLongFrame | RpcError::MethodUndetermined
        )
    }

    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RpcError::NoSuchService => write!(f, "no such service"),
            RpcError::NoSuchMethod => write!(f, "no such method"),
            RpcError::ConnectionLost => write!(f, "connection lost"),
            RpcError::ConnectionReset => write!(f, "connection reset"),
            RpcError::DecodeFail => write!(f, "failed to decode frame"),
            RpcError::EncodeFail => write!(f, "failed to encode frame"),
            RpcError::Timeout => write!(f, "call timed out"),
            RpcError::TooLongFrame => write!(f, "frame exceeds maximum length"),
            RpcError::EmptyRequest => write!(f, "request body was empty"),
            RpcError::MethodUndetermined => write!(f, "could not determine target method"),
            RpcError::ThrowInMethod(msg) => write!(f, "method implementation panicked: {msg}"),
            RpcError::NoAvailableEndpoint => write!(f, "no available endpoint"),
            RpcError::ConnectRefused => write!(f, "connection refused"),
        }
    }
}

impl std::error::Error for RpcError {}

/// Lets `Future<T, RpcError>::wait` build a `Timeout` on its own elapsed deadline (spec §4.6
/// `wait`), and a hung-up `Promise` read back as `ConnectionLost` rather than panicking.
impl From<FutureError> for RpcError {
    fn from(e: FutureError) -> RpcError {
        match e {
            FutureError::Timeout => RpcError::Timeout,
            FutureError::Broken => RpcError::ConnectionLost,
            FutureError::NotReady => RpcError::ConnectionLost,
            FutureError::NoneMatched => RpcError::NoAvailableEndpoint,
        }
    }
}
