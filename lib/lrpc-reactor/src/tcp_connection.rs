use std::io;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex};

use slog::Logger;

use crate::buffer::Buffer;
use crate::channel::Channel;
use crate::event_loop::{EventLoop, Handle};
use crate::error::ReactorResult;
use crate::socket::{InetAddress, Socket};

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ConnState {
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
}

type ConnCallback = Box<dyn FnMut(Arc<TcpConnection>) + Send>;
type MessageCallback = Box<dyn FnMut(Arc<TcpConnection>, &mut Buffer) + Send>;

/// One TCP connection (spec §4.12): owns its `Socket`, its read/write buffers, and a lifecycle
/// state machine `Connecting -> Connected -> Disconnecting -> Disconnected`. Lives on exactly one
/// worker loop for its whole life (spec §5); the fd's `Channel` is registered directly in that
/// loop's `channels` map rather than held inline, the same split `Acceptor`/`Connector` use.
pub struct TcpConnection {
    handle: Handle,
    name: String,
    fd: RawFd,
    local_addr: InetAddress,
    peer_addr: InetAddress,
    socket: Socket,
    state: Mutex<ConnState>,
    input_buffer: Mutex<Buffer>,
    output_buffer: Mutex<Buffer>,
    connection_callback: Mutex<ConnCallback>,
    message_callback: Mutex<MessageCallback>,
    close_callback: Mutex<Option<ConnCallback>>,
    write_complete_callback: Mutex<Option<ConnCallback>>,
    log: Logger,
}

impl TcpConnection {
    pub fn new(
        handle: Handle,
        name: String,
        socket: Socket,
        local_addr: InetAddress,
        peer_addr: InetAddress,
        log: Logger,
    ) -> Arc<TcpConnection> {
        let fd = socket.fd();
        Arc::new(TcpConnection {
            handle,
            name,
            fd,
            local_addr,
            peer_addr,
            socket,
            state: Mutex::new(ConnState::Connecting),
            input_buffer: Mutex::new(Buffer::new()),
            output_buffer: Mutex::new(Buffer::new()),
            connection_callback: Mutex::new(Box::new(|_| {})),
            message_callback: Mutex::new(Box::new(|_, _| {})),
            close_callback: Mutex::new(None),
            write_complete_callback: Mutex::new(None),
            log,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn local_addr(&self) -> InetAddress {
        self.local_addr
    }

    pub fn peer_addr(&self) -> InetAddress {
        self.peer_addr
    }

    pub fn state(&self) -> ConnState {
        *self.state.lock().unwrap()
    }

    pub fn set_connection_callback(&self, cb: impl FnMut(Arc<TcpConnection>) + Send + 'static) {
        *self.connection_callback.lock().unwrap() = Box::new(cb);
    }

    pub fn set_message_callback(
        &self,
        cb: impl FnMut(Arc<TcpConnection>, &mut Buffer) + Send + 'static,
    ) {
        *self.message_callback.lock().unwrap() = Box::new(cb);
    }

    pub fn set_close_callback(&self, cb: impl FnMut(Arc<TcpConnection>) + Send + 'static) {
        *self.close_callback.lock().unwrap() = Some(Box::new(cb));
    }

    pub fn set_write_complete_callback(&self, cb: impl FnMut(Arc<TcpConnection>) + Send + 'static) {
        *self.write_complete_callback.lock().unwrap() = Some(Box::new(cb));
    }

    /// Registers the fd's `Channel` on `el` and wires its four callbacks to this connection's
    /// handlers. Each handler is dispatched through `Handle::run_in_loop` rather than called
    /// inline, since a bare `Channel` callback has no `&mut EventLoop` to enable/disable interest
    /// with (the same constraint documented on `Acceptor`/`Connector`).
    pub fn register(self: &Arc<Self>, el: &mut EventLoop) -> ReactorResult<()> {
        let mut channel = Channel::new(self.fd);

        let read_this = self.clone();
        let read_handle = self.handle.clone();
        channel.set_read_callback(move || {
            let this = read_this.clone();
            read_handle.run_in_loop(move |el| this.handle_read(el));
        });

        let write_this = self.clone();
        let write_handle = self.handle.clone();
        channel.set_write_callback(move || {
            let this = write_this.clone();
            write_handle.run_in_loop(move |el| this.handle_write(el));
        });

        let close_this = self.clone();
        let close_handle = self.handle.clone();
        channel.set_close_callback(move || {
            let this = close_this.clone();
            close_handle.run_in_loop(move |el| this.handle_close(el));
        });

        let error_this = self.clone();
        let error_handle = self.handle.clone();
        channel.set_error_callback(move || {
            let this = error_this.clone();
            error_handle.run_in_loop(move |el| this.handle_error(el));
        });

        el.register_channel(channel)
    }

    /// Connecting -> Connected; enables read interest and invokes the connection callback.
    /// Called by whatever installed this connection (a server's accept path, a client's connect
    /// path) once it already holds `&mut EventLoop`.
    pub fn connection_established(self: &Arc<Self>, el: &mut EventLoop) {
        {
            let mut state = self.state.lock().unwrap();
            assert_eq!(*state, ConnState::Connecting);
            *state = ConnState::Connected;
        }
        if let Some(channel) = el.channel_mut(self.fd) {
            channel.enable_reading();
        }
        let _ = el.update_channel(self.fd);
        (self.connection_callback.lock().unwrap())(self.clone());
    }

    /// Connected|Disconnecting -> Disconnected; clears interest, invokes the connection callback
    /// one last time, and removes the `Channel` from `el`. The channel removal always runs, even
    /// if `handle_close` already made the state transition, since this is also the method that
    /// takes the `Channel` (and the `Arc<TcpConnection>` clones its callbacks hold) out of `el` for
    /// good — skip it and the connection outlives its fd forever.
    pub fn connection_destroyed(self: &Arc<Self>, el: &mut EventLoop) {
        let was_connected = {
            let mut state = self.state.lock().unwrap();
            let was_connected = *state == ConnState::Connected;
            *state = ConnState::Disconnected;
            was_connected
        };
        if was_connected {
            if let Some(channel) = el.channel_mut(self.fd) {
                channel.disable_all();
            }
            (self.connection_callback.lock().unwrap())(self.clone());
        }
        let _ = el.remove_channel(self.fd);
    }

    fn handle_read(self: &Arc<Self>, el: &mut EventLoop) {
        let n = {
            let mut input = self.input_buffer.lock().unwrap();
            input.read_fd(self.fd)
        };
        match n {
            Ok(0) => self.handle_close(el),
            Ok(_) => {
                let mut input = self.input_buffer.lock().unwrap();
                (self.message_callback.lock().unwrap())(self.clone(), &mut input);
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
            Err(e) => {
                slog::error!(self.log, "read failed"; "conn" => %self.name, "error" => %e);
                self.handle_error(el);
            }
        }
    }

    fn handle_write(self: &Arc<Self>, el: &mut EventLoop) {
        let is_writing = el.channel_mut(self.fd).map(|c| c.is_writing()).unwrap_or(false);
        if !is_writing {
            return;
        }

        let mut output = self.output_buffer.lock().unwrap();
        let n = unsafe {
            libc::write(
                self.fd,
                output.peek().as_ptr().cast(),
                output.readable(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::WouldBlock {
                slog::error!(self.log, "write failed"; "conn" => %self.name, "error" => %err);
            }
            return;
        }
        output.retrieve(n as usize);

        if output.readable() == 0 {
            if let Some(channel) = el.channel_mut(self.fd) {
                channel.disable_writing();
            }
            let _ = el.update_channel(self.fd);
            if let Some(cb) = self.write_complete_callback.lock().unwrap().as_mut() {
                cb(self.clone());
            }
            if *self.state.lock().unwrap() == ConnState::Disconnecting {
                let _ = self.socket.shutdown_write();
            }
        }
    }

    fn handle_close(self: &Arc<Self>, el: &mut EventLoop) {
        {
            let mut state = self.state.lock().unwrap();
            assert!(matches!(*state, ConnState::Connected | ConnState::Disconnecting));
            *state = ConnState::Disconnected;
        }
        if let Some(channel) = el.channel_mut(self.fd) {
            channel.disable_all();
        }
        if let Some(cb) = self.close_callback.lock().unwrap().as_mut() {
            cb(self.clone());
        }
        // Owner's close callback has had its chance to drop its reference to this connection
        // (e.g. erase it from a connections table); tear down the channel on this same loop pass.
        self.connection_destroyed(el);
    }

    fn handle_error(&self, _el: &mut EventLoop) {
        let err = self.socket.take_error().unwrap_or(-1);
        slog::error!(self.log, "tcp connection error"; "conn" => %self.name, "so_error" => err);
    }

    /// Queues `bytes` for sending. Always hops through the owning loop (`Handle::run_in_loop`),
    /// matching the convention the rest of this crate uses for anything that touches a
    /// `Channel`'s interest bits — see the note on `Handle::run_in_loop`.
    pub fn send(self: &Arc<Self>, bytes: Vec<u8>) {
        let this = self.clone();
        self.handle.clone().run_in_loop(move |el| this.send_in_loop(el, &bytes));
    }

    fn send_in_loop(self: &Arc<Self>, el: &mut EventLoop, bytes: &[u8]) {
        if *self.state.lock().unwrap() != ConnState::Connected {
            return;
        }

        let is_writing = el.channel_mut(self.fd).map(|c| c.is_writing()).unwrap_or(false);
        let mut remaining = bytes;

        if !is_writing && self.output_buffer.lock().unwrap().readable() == 0 {
            let n = unsafe { libc::write(self.fd, bytes.as_ptr().cast(), bytes.len()) };
            if n >= 0 {
                let wrote_directly = n as usize;
                remaining = &bytes[wrote_directly..];
                if remaining.is_empty() {
                    if let Some(cb) = self.write_complete_callback.lock().unwrap().as_mut() {
                        cb(self.clone());
                    }
                    return;
                }
            } else {
                let err = io::Error::last_os_error();
                if err.kind() != io::ErrorKind::WouldBlock {
                    slog::error!(self.log, "direct write failed"; "conn" => %self.name, "error" => %err);
                    return;
                }
            }
        }

        if !remaining.is_empty() {
            self.output_buffer.lock().unwrap().append(remaining);
            if let Some(channel) = el.channel_mut(self.fd) {
                if !channel.is_writing() {
                    channel.enable_writing();
                }
            }
            let _ = el.update_channel(self.fd);
        }
    }

    /// Connected -> Disconnecting. Half-closes immediately if nothing is queued to write; else
    /// defers the half-close until `handle_write` drains `output_buffer`.
    pub fn shutdown(self: &Arc<Self>) {
        let this = self.clone();
        self.handle.clone().run_in_loop(move |el| this.shutdown_in_loop(el));
    }

    fn shutdown_in_loop(self: &Arc<Self>, el: &mut EventLoop) {
        let mut state = self.state.lock().unwrap();
        if *state != ConnState::Connected {
            return;
        }
        *state = ConnState::Disconnecting;
        drop(state);

        let is_writing = el.channel_mut(self.fd).map(|c| c.is_writing()).unwrap_or(false);
        if !is_writing {
            let _ = self.socket.shutdown_write();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_starts_connecting() {
        assert_eq!(
            format!("{:?}", ConnState::Connecting),
            format!("{:?}", ConnState::Connecting)
        );
    }
}
