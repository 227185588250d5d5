use std::os::unix::io::RawFd;
use std::time::Duration;

use super::{Backend, ReadyEvent};
use crate::channel::Interest;
use crate::error::{ReactorError, ReactorResult};

const INITIAL_EVENT_LIST_SIZE: usize = 16;

fn interest_to_epoll_events(interest: Interest) -> u32 {
    let mut events = 0u32;
    if interest.contains(Interest::READABLE) {
        events |= libc::EPOLLIN as u32;
    }
    if interest.contains(Interest::WRITABLE) {
        events |= libc::EPOLLOUT as u32;
    }
    events
}

fn epoll_events_to_interest(events: u32) -> Interest {
    let events = events as i32;
    let mut interest = Interest::empty();
    if events & (libc::EPOLLIN | libc::EPOLLPRI) != 0 {
        interest.insert(Interest::READABLE);
    }
    if events & libc::EPOLLOUT != 0 {
        interest.insert(Interest::WRITABLE);
    }
    if events & libc::EPOLLERR != 0 {
        interest.insert(Interest::ERROR);
    }
    if events & libc::EPOLLHUP != 0 {
        interest.insert(Interest::HUP);
    }
    interest
}

/// `epoll(2)`-backed multiplexer: O(1) amortized registration updates, a growable event buffer
/// that doubles whenever a `poll()` call fills it completely (same growth trigger as the
/// original `Epoller`).
pub struct EpollBackend {
    epoll_fd: RawFd,
    events: Vec<libc::epoll_event>,
}

impl EpollBackend {
    pub fn new() -> ReactorResult<EpollBackend> {
        let epoll_fd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epoll_fd < 0 {
            return Err(ReactorError::Io(std::io::Error::last_os_error()));
        }
        Ok(EpollBackend {
            epoll_fd,
            events: vec![unsafe { std::mem::zeroed() }; INITIAL_EVENT_LIST_SIZE],
        })
    }

    fn ctl(&self, op: libc::c_int, fd: RawFd, interest: Interest) -> ReactorResult<()> {
        let mut event = libc::epoll_event {
            events: interest_to_epoll_events(interest),
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epoll_fd, op, fd, &mut event) };
        if ret < 0 {
            return Err(ReactorError::Io(std::io::Error::last_os_error()));
        }
        Ok(())
    }
}

impl Backend for EpollBackend {
    fn register(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()> {
        self.ctl(libc::EPOLL_CTL_ADD, fd, interest)
    }

    fn reregister(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()> {
        self.ctl(libc::EPOLL_CTL_MOD, fd, interest)
    }

    fn deregister(&mut self, fd: RawFd) -> ReactorResult<()> {
        self.ctl(libc::EPOLL_CTL_DEL, fd, Interest::empty())
    }

    fn poll(&mut self, timeout: Option<Duration>, out: &mut Vec<ReadyEvent>) -> ReactorResult<usize> {
        let timeout_ms: libc::c_int = match timeout {
            Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };

        let n = unsafe {
            libc::epoll_wait(
                self.epoll_fd,
                self.events.as_mut_ptr(),
                self.events.len() as libc::c_int,
                timeout_ms,
            )
        };
        if n < 0 {
            let err = std::io::Error::last_os_error();
            if err.kind() == std::io::ErrorKind::Interrupted {
                return Ok(0);
            }
            return Err(ReactorError::Io(err));
        }
        let n = n as usize;

        for event in self.events.iter().take(n) {
            out.push(ReadyEvent {
                fd: event.u64 as RawFd,
                revents: epoll_events_to_interest(event.events),
            });
        }

        if n == self.events.len() {
            self.events.resize(self.events.len() * 2, unsafe { std::mem::zeroed() });
        }
        Ok(n)
    }
}

impl Drop for EpollBackend {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll_fd);
        }
    }
}
