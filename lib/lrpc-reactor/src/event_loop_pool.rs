use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use slog::Logger;

use crate::event_loop::{EventLoop, Handle};
use crate::error::ReactorResult;
use crate::poller::PollerKind;

/// Owns a background thread running exactly one `EventLoop`. The constructor blocks until the
/// child thread has actually built its `EventLoop` and can hand back a `Handle`, matching the
/// original's condvar handshake in `startLoop` — done here with a channel instead, since that is
/// the idiomatic Rust way to wait for a one-shot value from a spawned thread.
pub struct EventLoopThread {
    join_handle: Option<JoinHandle<()>>,
    handle: Handle,
}

impl EventLoopThread {
    pub fn spawn(kind: PollerKind, log: Logger) -> ReactorResult<EventLoopThread> {
        let (tx, rx) = mpsc::channel();
        let join_handle = std::thread::spawn(move || {
            let mut loop_ = match EventLoop::new(kind, log) {
                Ok(loop_) => loop_,
                Err(e) => {
                    let _ = tx.send(Err(e));
                    return;
                }
            };
            let _ = tx.send(Ok(loop_.handle()));
            let _ = loop_.run();
        });

        let handle = rx
            .recv()
            .expect("event loop thread died before reporting its handle")?;

        Ok(EventLoopThread {
            join_handle: Some(join_handle),
            handle,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }
}

impl Drop for EventLoopThread {
    fn drop(&mut self) {
        self.handle.quit();
        if let Some(join_handle) = self.join_handle.take() {
            let _ = join_handle.join();
        }
    }
}

/// Round-robins new work across a fixed pool of worker loops, falling back to the base loop if
/// the pool has zero threads — `EventLoopThreadPool::getNextLoop`'s exact behavior (spec §4.5
/// names this as the mechanism a server's `Acceptor` uses to hand off freshly accepted
/// connections).
pub struct EventLoopThreadPool {
    base_handle: Handle,
    threads: Vec<EventLoopThread>,
    next: std::sync::atomic::AtomicUsize,
}

impl EventLoopThreadPool {
    pub fn start(base_handle: Handle, num_threads: usize, kind: PollerKind, log: Logger) -> ReactorResult<EventLoopThreadPool> {
        let mut threads = Vec::with_capacity(num_threads);
        for i in 0..num_threads {
            let worker_log = log.new(slog::o!("worker" => i));
            threads.push(EventLoopThread::spawn(kind, worker_log)?);
        }
        Ok(EventLoopThreadPool {
            base_handle,
            threads,
            next: std::sync::atomic::AtomicUsize::new(0),
        })
    }

    pub fn next_loop(&self) -> Handle {
        if self.threads.is_empty() {
            return self.base_handle.clone();
        }
        let idx = self.next.fetch_add(1, std::sync::atomic::Ordering::Relaxed) % self.threads.len();
        self.threads[idx].handle()
    }

    pub fn all_loops(&self) -> Vec<Handle> {
        if self.threads.is_empty() {
            vec![self.base_handle.clone()]
        } else {
            self.threads.iter().map(EventLoopThread::handle).collect()
        }
    }
}

/// Shared ownership wrapper so a pool can be handed to multiple accepting components
/// (`RpcServer`'s listener, a `ClientStub` picking a loop for outbound connects) without cloning
/// the underlying threads.
pub type SharedEventLoopThreadPool = Arc<EventLoopThreadPool>;
