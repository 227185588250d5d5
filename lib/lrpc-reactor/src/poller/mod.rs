mod epoll;
mod poll;

use std::os::unix::io::RawFd;
use std::time::Duration;

use crate::channel::Interest;
use crate::error::ReactorResult;

pub use epoll::EpollBackend;
pub use poll::PollBackend;

/// One fd's reported activity, handed back from `Backend::poll` to the owning `EventLoop` so it
/// can look up the matching `Channel` and dispatch (spec §4.4's `fillActiveChannels`).
pub struct ReadyEvent {
    pub fd: RawFd,
    pub revents: Interest,
}

/// The two I/O multiplexing strategies spec §4.4 calls out explicitly: a `poll(2)`-backed
/// backend (O(n) scan, no fd-count ceiling beyond `RLIMIT_NOFILE`) and an `epoll(2)`-backed one
/// (O(1) amortized, the default for anything but small fd counts or portability concerns).
pub trait Backend {
    fn register(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()>;
    fn reregister(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()>;
    fn deregister(&mut self, fd: RawFd) -> ReactorResult<()>;

    /// Blocks up to `timeout` (or forever if `None`) and appends ready events to `out`. Returns
    /// the number of fds that had activity.
    fn poll(&mut self, timeout: Option<Duration>, out: &mut Vec<ReadyEvent>) -> ReactorResult<usize>;
}

/// Which concrete `Backend` an `EventLoop` should construct. Selectable per process (or per
/// loop, for tests) instead of being compiled in, since spec §4.4 treats the choice as a runtime
/// policy, not a platform capability switch.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum PollerKind {
    Poll,
    Epoll,
}

/// Either backend behind one type, so `EventLoop` doesn't need to be generic over it.
pub enum Poller {
    Poll(PollBackend),
    Epoll(EpollBackend),
}

impl Poller {
    pub fn new(kind: PollerKind) -> ReactorResult<Poller> {
        Ok(match kind {
            PollerKind::Poll => Poller::Poll(PollBackend::new()),
            PollerKind::Epoll => Poller::Epoll(EpollBackend::new()?),
        })
    }
}

impl Backend for Poller {
    fn register(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()> {
        match self {
            Poller::Poll(p) => p.register(fd, interest),
            Poller::Epoll(p) => p.register(fd, interest),
        }
    }

    fn reregister(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()> {
        match self {
            Poller::Poll(p) => p.reregister(fd, interest),
            Poller::Epoll(p) => p.reregister(fd, interest),
        }
    }

    fn deregister(&mut self, fd: RawFd) -> ReactorResult<()> {
        match self {
            Poller::Poll(p) => p.deregister(fd),
            Poller::Epoll(p) => p.deregister(fd),
        }
    }

    fn poll(&mut self, timeout: Option<Duration>, out: &mut Vec<ReadyEvent>) -> ReactorResult<usize> {
        match self {
            Poller::Poll(p) => p.poll(timeout, out),
            Poller::Epoll(p) => p.poll(timeout, out),
        }
    }
}
