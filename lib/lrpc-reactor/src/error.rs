use std::fmt;
use std::io;

/// Error surface for the reactor layer: poller setup, socket operations and timer-fd plumbing
/// can all fail with an `io::Error`; `AlreadyRunning`/`NotInLoopThread` capture the two loop
/// invariants spec §4.5 calls out.
#[derive(Debug)]
pub enum ReactorError {
    Io(io::Error),
    AlreadyRunning,
    NotInLoopThread,
}

impl fmt::Display for ReactorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactorError::Io(e) => write!(f, "reactor io error: {e}"),
            ReactorError::AlreadyRunning => write!(f, "event loop is already running"),
            ReactorError::NotInLoopThread => {
                write!(f, "operation must run on the owning event loop's thread")
            }
        }
    }
}

impl std::error::Error for ReactorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ReactorError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for ReactorError {
    fn from(e: io::Error) -> Self {
        ReactorError::Io(e)
    }
}

pub type ReactorResult<T> = Result<T, ReactorError>;
