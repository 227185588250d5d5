use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::time::Duration;

use super::{Backend, ReadyEvent};
use crate::channel::Interest;
use crate::error::{ReactorError, ReactorResult};

fn interest_to_poll_events(interest: Interest) -> libc::c_short {
    let mut events = 0;
    if interest.contains(Interest::READABLE) {
        events |= libc::POLLIN;
    }
    if interest.contains(Interest::WRITABLE) {
        events |= libc::POLLOUT;
    }
    events as libc::c_short
}

fn poll_revents_to_interest(revents: libc::c_short) -> Interest {
    let revents = revents as libc::c_int;
    let mut interest = Interest::empty();
    if revents & (libc::POLLIN | libc::POLLPRI) != 0 {
        interest.insert(Interest::READABLE);
    }
    if revents & libc::POLLOUT != 0 {
        interest.insert(Interest::WRITABLE);
    }
    if revents & libc::POLLERR != 0 {
        interest.insert(Interest::ERROR);
    }
    if revents & libc::POLLHUP != 0 {
        interest.insert(Interest::HUP);
    }
    interest
}

/// `poll(2)`-backed multiplexer. Mirrors the original `Poller`: a flat `pollfd` vector plus an
/// fd-to-index map, with swap-remove on deregister so the vector never leaves holes.
pub struct PollBackend {
    pollfds: Vec<libc::pollfd>,
    index_by_fd: HashMap<RawFd, usize>,
}

impl PollBackend {
    pub fn new() -> PollBackend {
        PollBackend {
            pollfds: Vec::new(),
            index_by_fd: HashMap::new(),
        }
    }
}

impl Default for PollBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for PollBackend {
    fn register(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()> {
        let pfd = libc::pollfd {
            fd,
            events: interest_to_poll_events(interest),
            revents: 0,
        };
        self.index_by_fd.insert(fd, self.pollfds.len());
        self.pollfds.push(pfd);
        Ok(())
    }

    fn reregister(&mut self, fd: RawFd, interest: Interest) -> ReactorResult<()> {
        let idx = *self
            .index_by_fd
            .get(&fd)
            .expect("reregister on an fd that was never registered");
        self.pollfds[idx].events = interest_to_poll_events(interest);
        self.pollfds[idx].revents = 0;
        Ok(())
    }

    fn deregister(&mut self, fd: RawFd) -> ReactorResult<()> {
        let idx = self
            .index_by_fd
            .remove(&fd)
            .expect("deregister on an fd that was never registered");
        let last = self.pollfds.len() - 1;
        if idx != last {
            self.pollfds.swap(idx, last);
            let moved_fd = self.pollfds[idx].fd;
            self.index_by_fd.insert(moved_fd, idx);
        }
        self.pollfds.pop();
        Ok(())
    }

    fn poll(&mut self, timeout: Option<Duration>, out: &mut Vec<ReadyEvent>) -> ReactorResult<usize> {
        let timeout_ms: libc::c_int = match timeout {
            Some(d) => d.as_millis().min(libc::c_int::MAX as u128) as libc::c_int,
            None => -1,
        };

        let n = unsafe {
            libc::poll(
                self.pollfds.as_mut_ptr(),
                self.pollfds.len() as libc::nfds_t,
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

        let mut remaining = n;
        for pfd in self.pollfds.iter_mut() {
            if remaining == 0 {
                break;
            }
            if pfd.revents != 0 {
                remaining -= 1;
                out.push(ReadyEvent {
                    fd: pfd.fd,
                    revents: poll_revents_to_interest(pfd.revents),
                });
                pfd.revents = 0;
            }
        }
        Ok(n as usize)
    }
}
