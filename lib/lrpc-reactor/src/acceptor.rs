use std::ffi::CString;
use std::os::unix::io::RawFd;

use slog::Logger;

use crate::channel::Channel;
use crate::error::ReactorResult;
use crate::event_loop::EventLoop;
use crate::socket::{InetAddress, Socket};

fn open_idle_fd() -> RawFd {
    let path = CString::new("/dev/null").unwrap();
    unsafe { libc::open(path.as_ptr(), libc::O_RDONLY | libc::O_CLOEXEC) }
}

/// Owns the listen socket and turns inbound connections into `(Socket, InetAddress)` pairs
/// handed to `on_new_connection` (spec §4.11). A `Channel`'s callback only has `&mut self`, not
/// a back-reference to its owning `EventLoop`, so unlike the original (whose callback holds
/// `EventLoop*` directly and can register the new connection's `Channel` inline),
/// `on_new_connection` here has to go through a captured `Handle::run_in_loop` to register
/// further state — deferred by one pending-functor tick rather than happening inline.
pub struct Acceptor {
    listen_fd: RawFd,
}

impl Acceptor {
    /// Binds, listens, and registers the accept `Channel` on `el`. `on_new_connection` runs on
    /// `el`'s thread for every accepted connection.
    pub fn install(
        el: &mut EventLoop,
        listen_addr: InetAddress,
        reuse_port: bool,
        mut on_new_connection: impl FnMut(Socket, InetAddress) + Send + 'static,
        log: Logger,
    ) -> ReactorResult<Acceptor> {
        let socket = Socket::new_nonblocking()?;
        socket.set_reuse_addr(true)?;
        if reuse_port {
            socket.set_reuse_port(true)?;
        }
        socket.bind(&listen_addr)?;
        socket.listen()?;
        let listen_fd = socket.fd();

        let mut idle_fd = open_idle_fd();
        let mut channel = Channel::new(listen_fd);
        channel.enable_reading();
        channel.set_read_callback(move || loop {
            match socket.accept() {
                Ok(Some((conn_socket, peer))) => {
                    slog::debug!(log, "accepted connection"; "peer" => peer.to_host_port());
                    on_new_connection(conn_socket, peer);
                }
                Ok(None) => break,
                Err(e) => {
                    if let crate::error::ReactorError::Io(io_err) = &e {
                        if io_err.raw_os_error() == Some(libc::EMFILE) {
                            slog::warn!(log, "fd exhaustion on accept, dropping via idle reserve");
                            unsafe { libc::close(idle_fd) };
                            if let Ok(Some(_)) = socket.accept() {
                                // accepted-then-dropped, freeing the backlog entry
                            }
                            idle_fd = open_idle_fd();
                        } else {
                            slog::error!(log, "accept failed"; "error" => %io_err);
                        }
                    }
                    break;
                }
            }
        });

        el.register_channel(channel)?;

        Ok(Acceptor { listen_fd })
    }

    pub fn listen_fd(&self) -> RawFd {
        self.listen_fd
    }
}
