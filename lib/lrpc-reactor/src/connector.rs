use std::sync::{Arc, Mutex};
use std::time::Duration;

use slog::Logger;

use crate::channel::Channel;
use crate::error::ReactorError;
use crate::event_loop::{EventLoop, Handle};
use crate::socket::{InetAddress, Socket};
use crate::timer::TimerId;

const INIT_RETRY_DELAY: Duration = Duration::from_millis(500);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum State {
    Disconnected,
    Connecting,
    Connected,
}

struct Inner {
    state: State,
    retry_delay: Duration,
    connect_enabled: bool,
    timer_id: Option<TimerId>,
}

/// Drives a non-blocking connect with exponential backoff (spec §4.11). `connect(2)`'s errno is
/// classified into the same three bands the original does: transient-in-progress (watch for
/// writability), retry-worthy (schedule backoff), and structural (give up, log).
pub struct Connector {
    handle: Handle,
    server_addr: InetAddress,
    inner: Mutex<Inner>,
    on_connected: Mutex<Box<dyn FnMut(Socket) + Send>>,
    log: Logger,
}

impl Connector {
    pub fn new(
        handle: Handle,
        server_addr: InetAddress,
        on_connected: impl FnMut(Socket) + Send + 'static,
        log: Logger,
    ) -> Arc<Connector> {
        Arc::new(Connector {
            handle,
            server_addr,
            inner: Mutex::new(Inner {
                state: State::Disconnected,
                retry_delay: INIT_RETRY_DELAY,
                connect_enabled: false,
                timer_id: None,
            }),
            on_connected: Mutex::new(Box::new(on_connected)),
            log,
        })
    }

    pub fn start(self: &Arc<Self>) {
        self.inner.lock().unwrap().connect_enabled = true;
        let this = self.clone();
        self.handle.clone().run_in_loop(move |el| this.start_in_loop(el));
    }

    pub fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_enabled = false;
        if let Some(id) = inner.timer_id.take() {
            self.handle.cancel_timer(id);
        }
    }

    fn start_in_loop(self: Arc<Self>, el: &mut EventLoop) {
        let enabled = self.inner.lock().unwrap().connect_enabled;
        if enabled {
            self.connect(el);
        } else {
            slog::debug!(self.log, "connector stopped before first attempt");
        }
    }

    fn connect(self: Arc<Self>, el: &mut EventLoop) {
        let socket = match Socket::new_nonblocking() {
            Ok(s) => s,
            Err(e) => {
                slog::error!(self.log, "failed to create socket"; "error" => %e);
                return;
            }
        };

        match socket.connect(&self.server_addr) {
            Ok(_) => self.connecting(el, socket),
            Err(ReactorError::Io(io_err)) => match io_err.raw_os_error() {
                Some(libc::EINTR) | Some(libc::EISCONN) => self.connecting(el, socket),
                Some(libc::EAGAIN)
                | Some(libc::EADDRINUSE)
                | Some(libc::EADDRNOTAVAIL)
                | Some(libc::ECONNREFUSED)
                | Some(libc::ENETUNREACH) => self.retry(socket),
                _ => {
                    slog::error!(self.log, "structural connect error, giving up"; "error" => %io_err);
                }
            },
            Err(_) => {}
        }
    }

    fn connecting(self: Arc<Self>, el: &mut EventLoop, socket: Socket) {
        self.inner.lock().unwrap().state = State::Connecting;

        let fd = socket.fd();
        let mut channel = Channel::new(fd);
        channel.enable_writing();

        let socket_slot = Arc::new(Mutex::new(Some(socket)));

        let write_this = self.clone();
        let write_handle = self.handle.clone();
        let write_slot = socket_slot.clone();
        channel.set_write_callback(move || {
            if let Some(socket) = write_slot.lock().unwrap().take() {
                let this = write_this.clone();
                write_handle.run_in_loop(move |el| this.handle_write(el, socket));
            }
        });

        let err_this = self.clone();
        let err_handle = self.handle.clone();
        let err_slot = socket_slot;
        channel.set_error_callback(move || {
            if let Some(socket) = err_slot.lock().unwrap().take() {
                let this = err_this.clone();
                err_handle.run_in_loop(move |el| this.handle_error(el, socket));
            }
        });

        let _ = el.register_channel(channel);
    }

    fn handle_write(self: Arc<Self>, el: &mut EventLoop, socket: Socket) {
        if self.inner.lock().unwrap().state != State::Connecting {
            return;
        }
        let _ = el.remove_channel(socket.fd());

        match socket.take_error() {
            Ok(0) if socket.is_self_connect() => {
                slog::warn!(self.log, "self connect, retrying");
                self.retry(socket);
            }
            Ok(0) => {
                self.inner.lock().unwrap().state = State::Connected;
                let connect_enabled = self.inner.lock().unwrap().connect_enabled;
                if connect_enabled {
                    (self.on_connected.lock().unwrap())(socket);
                }
            }
            Ok(err) => {
                slog::warn!(self.log, "connect failed"; "so_error" => err);
                self.retry(socket);
            }
            Err(e) => slog::error!(self.log, "SO_ERROR read failed"; "error" => %e),
        }
    }

    fn handle_error(self: Arc<Self>, el: &mut EventLoop, socket: Socket) {
        let _ = el.remove_channel(socket.fd());
        let err = socket.take_error().unwrap_or(-1);
        slog::error!(self.log, "connect error event"; "so_error" => err);
        self.retry(socket);
    }

    fn retry(self: Arc<Self>, socket: Socket) {
        drop(socket);

        let mut inner = self.inner.lock().unwrap();
        inner.state = State::Disconnected;
        let connect_enabled = inner.connect_enabled;
        let delay = inner.retry_delay;
        inner.retry_delay = (delay * 2).min(MAX_RETRY_DELAY);
        drop(inner);

        if !connect_enabled {
            return;
        }

        slog::info!(self.log, "retrying connect";
            "addr" => self.server_addr.to_host_port(), "delay_ms" => delay.as_millis() as u64);

        let this = self.clone();
        let handle_for_retry = self.handle.clone();
        let timer_id = self.handle.run_after(delay, move || {
            let this = this.clone();
            handle_for_retry.run_in_loop(move |el| this.start_in_loop(el));
        });
        self.inner.lock().unwrap().timer_id = Some(timer_id);
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::mpsc;

    use super::*;
    use crate::event_loop_pool::EventLoopThread;
    use crate::logging;

    /// Spec §4.11's backoff starts at 500 ms and doubles per attempt. Asserting the full
    /// 500ms..30s sequence would make this test take minutes to run, so this only checks that
    /// the first retry lands in the expected window: a listener that refuses the first dial and
    /// then starts accepting should get connected to only once that first backoff has elapsed,
    /// not immediately and not after the *second* backoff interval either.
    #[test]
    fn first_retry_lands_within_expected_backoff_window() {
        let log = logging::init();
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = InetAddress::parse(&listener.local_addr().unwrap().to_string()).unwrap();
        drop(listener);

        let thread = EventLoopThread::spawn(crate::poller::PollerKind::Epoll, log.clone()).unwrap();
        let handle = thread.handle();

        let (tx, rx) = mpsc::channel();
        let connector = Connector::new(handle.clone(), addr, move |_socket| {
            let _ = tx.send(std::time::Instant::now());
        }, log);
        connector.start();

        let started = std::time::Instant::now();
        // give the first connect attempt time to hit ECONNREFUSED and schedule a retry
        std::thread::sleep(Duration::from_millis(200));
        let relisten = TcpListener::bind(addr.to_host_port()).unwrap();
        drop(relisten.set_nonblocking(true));
        // accept in the background so the retried connect can complete its handshake
        std::thread::spawn(move || {
            let _ = relisten.accept();
        });

        let connected_at = rx.recv_timeout(Duration::from_secs(3)).expect("connector never connected");
        let elapsed = connected_at.duration_since(started);
        assert!(elapsed >= Duration::from_millis(400), "connected too early: {elapsed:?}");
        assert!(elapsed < Duration::from_millis(1500), "connected too late for the first backoff: {elapsed:?}");

        connector.stop();
    }
}
