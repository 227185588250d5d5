use std::os::unix::io::RawFd;

bitflags::bitflags! {
    /// Interest/revents mask. Mirrors the `POLLIN`/`POLLOUT`/`POLLERR`/`POLLHUP` bits the
    /// original selects on — kept as our own small bitset instead of pulling in the raw `libc`
    /// constants at every call site.
    #[derive(Clone, Copy, Eq, PartialEq, Default)]
    pub struct Interest: u32 {
        const READABLE = 0b001;
        const WRITABLE = 0b010;
        const ERROR    = 0b100;
        const HUP      = 0b1000;
    }
}

/// One fd's registration with the owning `EventLoop`'s poller, plus the callbacks to run when
/// the poller reports activity on it. A `Channel` never owns `fd` — whoever created the socket
/// (an `Acceptor`, a `Connector`, a `TcpConnection`) is responsible for closing it; `Channel`
/// only tracks interest bits and dispatches (spec §4.4 "Channel").
///
/// Callbacks are `Send` even though a `Channel` only ever *runs* on the thread of the
/// `EventLoop` that owns it (spec §4.5's per-thread reactor model) — a freshly accepted
/// `TcpConnection`'s `Channel` is built on the accepting loop's thread and handed to its target
/// worker loop via `run_in_loop`, so it has to survive one hop across threads before settling.
pub struct Channel {
    fd: RawFd,
    interest: Interest,
    revents: Interest,
    index: i32,
    read_callback: Option<Box<dyn FnMut() + Send + 'static>>,
    write_callback: Option<Box<dyn FnMut() + Send + 'static>>,
    close_callback: Option<Box<dyn FnMut() + Send + 'static>>,
    error_callback: Option<Box<dyn FnMut() + Send + 'static>>,
}

impl Channel {
    pub fn new(fd: RawFd) -> Channel {
        Channel {
            fd,
            interest: Interest::empty(),
            revents: Interest::empty(),
            index: -1,
            read_callback: None,
            write_callback: None,
            close_callback: None,
            error_callback: None,
        }
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }

    #[inline]
    pub fn interest(&self) -> Interest {
        self.interest
    }

    #[inline]
    pub fn is_none_event(&self) -> bool {
        self.interest.is_empty()
    }

    /// Bookkeeping slot used by the `poll(2)` backend (index into its `pollfd` vector) and the
    /// `epoll(2)` backend (new/added/deleted tri-state) — the meaning is backend-specific, same
    /// as the original's `Channel::index_`.
    #[inline]
    pub fn index(&self) -> i32 {
        self.index
    }

    #[inline]
    pub fn set_index(&mut self, index: i32) {
        self.index = index;
    }

    #[inline]
    pub fn set_revents(&mut self, revents: Interest) {
        self.revents = revents;
    }

    pub fn enable_reading(&mut self) {
        self.interest.insert(Interest::READABLE);
    }

    pub fn disable_reading(&mut self) {
        self.interest.remove(Interest::READABLE);
    }

    pub fn enable_writing(&mut self) {
        self.interest.insert(Interest::WRITABLE);
    }

    pub fn disable_writing(&mut self) {
        self.interest.remove(Interest::WRITABLE);
    }

    pub fn is_writing(&self) -> bool {
        self.interest.contains(Interest::WRITABLE)
    }

    pub fn disable_all(&mut self) {
        self.interest = Interest::empty();
    }

    pub fn set_read_callback(&mut self, cb: impl FnMut() + Send + 'static) {
        self.read_callback = Some(Box::new(cb));
    }

    pub fn set_write_callback(&mut self, cb: impl FnMut() + Send + 'static) {
        self.write_callback = Some(Box::new(cb));
    }

    pub fn set_close_callback(&mut self, cb: impl FnMut() + Send + 'static) {
        self.close_callback = Some(Box::new(cb));
    }

    pub fn set_error_callback(&mut self, cb: impl FnMut() + Send + 'static) {
        self.error_callback = Some(Box::new(cb));
    }

    /// Dispatches the revents last reported by the poller, in the same order the original uses:
    /// hangup first (unless the peer still has data queued), then error, then readable, then
    /// writable.
    pub fn handle_event(&mut self) {
        let revents = self.revents;

        if revents.contains(Interest::HUP) && !revents.contains(Interest::READABLE) {
            if let Some(cb) = self.close_callback.as_mut() {
                cb();
            }
        }
        if revents.contains(Interest::ERROR) {
            if let Some(cb) = self.error_callback.as_mut() {
                cb();
            }
        }
        if revents.contains(Interest::READABLE) {
            if let Some(cb) = self.read_callback.as_mut() {
                cb();
            }
        }
        if revents.contains(Interest::WRITABLE) {
            if let Some(cb) = self.write_callback.as_mut() {
                cb();
            }
        }
    }
}
