use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::{AsRawFd, FromRawFd, RawFd};

use crate::error::{ReactorError, ReactorResult};

/// An IPv4 endpoint, kept distinct from `std::net::SocketAddrV4` the way the original's
/// `InetAddress` wraps a raw `sockaddr_in` — this is the type that flows through `Acceptor`'s
/// new-connection callback and `Connector`'s resolved target (spec §4.8/§4.9).
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct InetAddress(SocketAddrV4);

impl InetAddress {
    pub fn new(ip: Ipv4Addr, port: u16) -> InetAddress {
        InetAddress(SocketAddrV4::new(ip, port))
    }

    pub fn any(port: u16) -> InetAddress {
        InetAddress(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port))
    }

    pub fn parse(host_port: &str) -> ReactorResult<InetAddress> {
        host_port
            .parse::<SocketAddrV4>()
            .map(InetAddress)
            .map_err(|_| ReactorError::Io(io::Error::new(io::ErrorKind::InvalidInput, host_port)))
    }

    pub fn ip(&self) -> Ipv4Addr {
        *self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    pub fn to_host_port(&self) -> String {
        format!("{}:{}", self.0.ip(), self.0.port())
    }

    fn as_sockaddr_in(&self) -> libc::sockaddr_in {
        libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: self.0.port().to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(self.0.ip().octets()),
            },
            sin_zero: [0; 8],
        }
    }
}

impl From<SocketAddrV4> for InetAddress {
    fn from(addr: SocketAddrV4) -> Self {
        InetAddress(addr)
    }
}

impl std::fmt::Display for InetAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_host_port())
    }
}

/// A non-blocking, close-on-exec `AF_INET`/`SOCK_STREAM` socket, owning its fd (spec §4.8's
/// `Socket`). Grounded on `sockets::createNonblockingOrDie`/`bindOrDie`/`listenOrDie`/`accept` —
/// the `_OrDie` suffix in the original reflects that these failures were treated as fatal; here
/// they surface as `ReactorError` instead.
pub struct Socket {
    fd: RawFd,
}

impl Socket {
    pub fn new_nonblocking() -> ReactorResult<Socket> {
        let fd = unsafe {
            libc::socket(
                libc::AF_INET,
                libc::SOCK_STREAM | libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
                libc::IPPROTO_TCP,
            )
        };
        if fd < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(Socket { fd })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn set_reuse_addr(&self, on: bool) -> ReactorResult<()> {
        self.setsockopt(libc::SOL_SOCKET, libc::SO_REUSEADDR, on)
    }

    pub fn set_reuse_port(&self, on: bool) -> ReactorResult<()> {
        self.setsockopt(libc::SOL_SOCKET, libc::SO_REUSEPORT, on)
    }

    pub fn set_tcp_nodelay(&self, on: bool) -> ReactorResult<()> {
        self.setsockopt(libc::IPPROTO_TCP, libc::TCP_NODELAY, on)
    }

    fn setsockopt(&self, level: i32, name: i32, on: bool) -> ReactorResult<()> {
        let value: libc::c_int = if on { 1 } else { 0 };
        let ret = unsafe {
            libc::setsockopt(
                self.fd,
                level,
                name,
                &value as *const _ as *const libc::c_void,
                mem::size_of::<libc::c_int>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn bind(&self, addr: &InetAddress) -> ReactorResult<()> {
        let sockaddr = addr.as_sockaddr_in();
        let ret = unsafe {
            libc::bind(
                self.fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn listen(&self) -> ReactorResult<()> {
        let ret = unsafe { libc::listen(self.fd, libc::SOMAXCONN) };
        if ret < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    /// `accept4` with `SOCK_NONBLOCK|SOCK_CLOEXEC` baked in, same as the original's non-Valgrind
    /// path. Returns `None` on `EAGAIN` (nothing pending); other errors propagate.
    pub fn accept(&self) -> ReactorResult<Option<(Socket, InetAddress)>> {
        let mut sockaddr: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut addrlen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let fd = unsafe {
            libc::accept4(
                self.fd,
                &mut sockaddr as *mut _ as *mut libc::sockaddr,
                &mut addrlen,
                libc::SOCK_NONBLOCK | libc::SOCK_CLOEXEC,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return match err.kind() {
                io::ErrorKind::WouldBlock => Ok(None),
                _ => Err(ReactorError::Io(err)),
            };
        }
        let addr = InetAddress(SocketAddrV4::new(
            Ipv4Addr::from(u32::from_be(sockaddr.sin_addr.s_addr)),
            u16::from_be(sockaddr.sin_port),
        ));
        Ok(Some((Socket { fd }, addr)))
    }

    /// Non-blocking `connect(2)`. A fresh non-blocking socket almost always returns `EINPROGRESS`
    /// here; the caller watches the fd for writability and then checks `SO_ERROR` (spec §4.9's
    /// `Connector` state machine).
    pub fn connect(&self, addr: &InetAddress) -> ReactorResult<bool> {
        let sockaddr = addr.as_sockaddr_in();
        let ret = unsafe {
            libc::connect(
                self.fd,
                &sockaddr as *const _ as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            )
        };
        if ret == 0 {
            return Ok(true);
        }
        let err = io::Error::last_os_error();
        match err.raw_os_error() {
            Some(libc::EINPROGRESS) => Ok(false),
            _ => Err(ReactorError::Io(err)),
        }
    }

    /// Reads `SO_ERROR` and clears it, the way `Connector::handleWrite` distinguishes a
    /// successful connect from a refused/unreachable one once the fd becomes writable.
    pub fn take_error(&self) -> ReactorResult<i32> {
        let mut optval: libc::c_int = 0;
        let mut optlen = mem::size_of::<libc::c_int>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockopt(
                self.fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut optval as *mut _ as *mut libc::c_void,
                &mut optlen,
            )
        };
        if ret < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(optval)
    }

    pub fn shutdown_write(&self) -> ReactorResult<()> {
        let ret = unsafe { libc::shutdown(self.fd, libc::SHUT_WR) };
        if ret < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(())
    }

    pub fn local_addr(&self) -> ReactorResult<InetAddress> {
        let mut sockaddr: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut addrlen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(
                self.fd,
                &mut sockaddr as *mut _ as *mut libc::sockaddr,
                &mut addrlen,
            )
        };
        if ret < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(InetAddress(SocketAddrV4::new(
            Ipv4Addr::from(u32::from_be(sockaddr.sin_addr.s_addr)),
            u16::from_be(sockaddr.sin_port),
        )))
    }

    /// Detects the case where a non-blocking `connect` raced back to the same listening socket
    /// it came from (can happen transiently with ephemeral-port reuse) — `isSelfConnect` in the
    /// original.
    pub fn is_self_connect(&self) -> bool {
        match (self.local_addr(), self.peer_addr()) {
            (Ok(local), Ok(peer)) => local == peer,
            _ => false,
        }
    }

    pub fn peer_addr(&self) -> ReactorResult<InetAddress> {
        let mut sockaddr: libc::sockaddr_in = unsafe { mem::zeroed() };
        let mut addrlen = mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getpeername(
                self.fd,
                &mut sockaddr as *mut _ as *mut libc::sockaddr,
                &mut addrlen,
            )
        };
        if ret < 0 {
            return Err(ReactorError::Io(io::Error::last_os_error()));
        }
        Ok(InetAddress(SocketAddrV4::new(
            Ipv4Addr::from(u32::from_be(sockaddr.sin_addr.s_addr)),
            u16::from_be(sockaddr.sin_port),
        )))
    }

    /// Hands ownership of the fd to the caller (used when wrapping an accepted/connected socket
    /// in a `TcpConnection`'s `Channel`).
    pub fn into_raw_fd(self) -> RawFd {
        let fd = self.fd;
        mem::forget(self);
        fd
    }
}

impl FromRawFd for Socket {
    unsafe fn from_raw_fd(fd: RawFd) -> Socket {
        Socket { fd }
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}
