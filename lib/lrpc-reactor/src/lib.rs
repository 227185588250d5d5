//! Per-thread I/O reactor: `Buffer`, `Channel`, `Poller` (poll/epoll), `TimerQueue`, `EventLoop`,
//! `Acceptor`/`Connector`, `TcpConnection`. One `EventLoop` owns exactly one OS thread; everything
//! it registers — channels, timers, connections — lives and dies with that thread (spec §4.5).

pub mod acceptor;
pub mod buffer;
pub mod channel;
pub mod connector;
pub mod error;
pub mod event_loop;
pub mod event_loop_pool;
pub mod logging;
pub mod poller;
pub mod socket;
pub mod tcp_connection;
pub mod timer;
pub mod timer_queue;

pub use acceptor::Acceptor;
pub use buffer::Buffer;
pub use channel::{Channel, Interest};
pub use connector::Connector;
pub use error::{ReactorError, ReactorResult};
pub use event_loop::{EventLoop, Handle};
pub use event_loop_pool::{EventLoopThread, EventLoopThreadPool, SharedEventLoopThreadPool};
pub use poller::{Backend, Poller, PollerKind};
pub use socket::{InetAddress, Socket};
pub use tcp_connection::{ConnState, TcpConnection};
pub use timer::{Timer, TimerId};
pub use timer_queue::TimerQueue;
