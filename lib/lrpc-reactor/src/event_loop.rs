use std::cell::Cell;
use std::collections::HashMap;
use std::io;
use std::os::unix::io::RawFd;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::ThreadId;
use std::time::{Duration, Instant};

use lrpc_future::Executor;
use slog::Logger;

use crate::channel::{Channel, Interest};
use crate::error::{ReactorError, ReactorResult};
use crate::poller::{Backend, Poller, PollerKind};
use crate::timer::{Timer, TimerId};
use crate::timer_queue::TimerQueue;

thread_local! {
    static LOOP_IN_THIS_THREAD: Cell<bool> = Cell::new(false);
}

type PendingFn = Box<dyn FnOnce(&mut EventLoop) + Send>;

fn create_eventfd() -> ReactorResult<RawFd> {
    let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
    if fd < 0 {
        return Err(ReactorError::Io(io::Error::last_os_error()));
    }
    Ok(fd)
}

/// A cheap, `Send + Sync` handle to submit work onto an `EventLoop` from any thread — the
/// cross-thread half of spec §4.5. `EventLoop::run` is the only operation that actually needs
/// `&mut EventLoop`; everything reachable from other threads goes through the `Arc`-shared state
/// a `Handle` carries instead.
#[derive(Clone)]
pub struct Handle {
    pending: Arc<Mutex<Vec<PendingFn>>>,
    wakeup_fd: RawFd,
    quit: Arc<AtomicBool>,
    thread_id: ThreadId,
    calling_pending: Arc<AtomicBool>,
}

impl Handle {
    pub fn is_in_loop_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    /// Identifies which loop this handle belongs to, independent of whatever thread is currently
    /// calling in — used to key per-loop tables (e.g. `ClientStub`'s connection pool, spec §4.10)
    /// since a `Handle` can be cloned and handed to any thread.
    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    fn wakeup(&self) {
        let one: u64 = 1;
        unsafe {
            libc::write(
                self.wakeup_fd,
                &one as *const u64 as *const libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }

    /// Enqueues `f` and wakes the loop if the caller is off-loop, or if the loop is currently
    /// mid-`do_pending_functors` (so a functor that enqueues another is serviced promptly
    /// instead of waiting for the next `poll` timeout).
    pub fn queue_in_loop(&self, f: impl FnOnce(&mut EventLoop) + Send + 'static) {
        self.pending.lock().unwrap().push(Box::new(f));
        if !self.is_in_loop_thread() || self.calling_pending.load(Ordering::Acquire) {
            self.wakeup();
        }
    }

    /// Runs `f` synchronously if already on the loop thread, otherwise defers it.
    ///
    /// Note: unlike the original (which can invoke `fn` immediately against the live
    /// `EventLoop*` it always has on hand), a bare `Handle` on the loop thread still has no
    /// `&mut EventLoop` to call `f` with — callers that already hold one should just call `f`
    /// directly instead of going through a `Handle`. This method always defers; it exists so the
    /// same call works whether or not the caller happens to be on-loop.
    pub fn run_in_loop(&self, f: impl FnOnce(&mut EventLoop) + Send + 'static) {
        self.queue_in_loop(f);
    }

    pub fn run_at(&self, when: Instant, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.schedule_timer(when, None, cb)
    }

    pub fn run_after(&self, delay: Duration, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.schedule_timer(Instant::now() + delay, None, cb)
    }

    pub fn run_every(&self, interval: Duration, cb: impl FnMut() + Send + 'static) -> TimerId {
        self.schedule_timer(Instant::now() + interval, Some(interval), cb)
    }

    fn schedule_timer(
        &self,
        when: Instant,
        interval: Option<Duration>,
        cb: impl FnMut() + Send + 'static,
    ) -> TimerId {
        let timer = Timer::new(cb, when, interval);
        let id = timer.sequence();
        self.run_in_loop(move |el| {
            let _ = el.timer_queue.insert(timer);
        });
        id
    }

    pub fn cancel_timer(&self, id: TimerId) {
        self.run_in_loop(move |el| el.timer_queue.cancel(id));
    }

    pub fn quit(&self) {
        self.quit.store(true, Ordering::Release);
        if !self.is_in_loop_thread() {
            self.wakeup();
        }
    }
}

impl Executor for Handle {
    fn schedule(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        self.queue_in_loop(move |_| f());
    }

    fn schedule_later(&self, delay: Duration, f: Box<dyn FnOnce() + Send + 'static>) {
        let f = Mutex::new(Some(f));
        self.run_after(delay, move || {
            if let Some(f) = f.lock().unwrap().take() {
                f();
            }
        });
    }
}

/// Single-thread-affinity I/O reactor (spec §4.5). Exactly one `EventLoop` may exist per OS
/// thread — enforced by a thread-local sentinel set at construction — and `channels`/`poller`
/// are only ever touched from that thread, so `EventLoop` itself carries no internal locking.
pub struct EventLoop {
    poller: Poller,
    channels: HashMap<RawFd, Channel>,
    timer_queue: TimerQueue,
    wakeup_fd: RawFd,
    pending: Arc<Mutex<Vec<PendingFn>>>,
    calling_pending: Arc<AtomicBool>,
    quit: Arc<AtomicBool>,
    thread_id: ThreadId,
    log: Logger,
}

impl EventLoop {
    pub fn new(kind: PollerKind, log: Logger) -> ReactorResult<EventLoop> {
        let already_running = LOOP_IN_THIS_THREAD.with(|cell| cell.replace(true));
        if already_running {
            return Err(ReactorError::AlreadyRunning);
        }

        let mut poller = Poller::new(kind)?;
        let timer_queue = TimerQueue::new()?;
        let wakeup_fd = create_eventfd()?;

        poller.register(timer_queue.fd(), Interest::READABLE)?;
        poller.register(wakeup_fd, Interest::READABLE)?;

        Ok(EventLoop {
            poller,
            channels: HashMap::new(),
            timer_queue,
            wakeup_fd,
            pending: Arc::new(Mutex::new(Vec::new())),
            calling_pending: Arc::new(AtomicBool::new(false)),
            quit: Arc::new(AtomicBool::new(false)),
            thread_id: std::thread::current().id(),
            log,
        })
    }

    pub fn handle(&self) -> Handle {
        Handle {
            pending: self.pending.clone(),
            wakeup_fd: self.wakeup_fd,
            quit: self.quit.clone(),
            thread_id: self.thread_id,
            calling_pending: self.calling_pending.clone(),
        }
    }

    pub fn logger(&self) -> &Logger {
        &self.log
    }

    pub fn is_in_loop_thread(&self) -> bool {
        std::thread::current().id() == self.thread_id
    }

    pub fn assert_in_loop_thread(&self) -> ReactorResult<()> {
        if self.is_in_loop_thread() {
            Ok(())
        } else {
            Err(ReactorError::NotInLoopThread)
        }
    }

    pub fn register_channel(&mut self, channel: Channel) -> ReactorResult<()> {
        let fd = channel.fd();
        self.poller.register(fd, channel.interest())?;
        self.channels.insert(fd, channel);
        Ok(())
    }

    pub fn update_channel(&mut self, fd: RawFd) -> ReactorResult<()> {
        let interest = self
            .channels
            .get(&fd)
            .map(Channel::interest)
            .ok_or_else(|| ReactorError::Io(io::Error::new(io::ErrorKind::NotFound, "unknown fd")))?;
        self.poller.reregister(fd, interest)
    }

    pub fn remove_channel(&mut self, fd: RawFd) -> ReactorResult<Option<Channel>> {
        if self.channels.contains_key(&fd) {
            self.poller.deregister(fd)?;
        }
        Ok(self.channels.remove(&fd))
    }

    pub fn channel_mut(&mut self, fd: RawFd) -> Option<&mut Channel> {
        self.channels.get_mut(&fd)
    }

    /// Runs `f` immediately if already on this thread, else defers via the same pending-functor
    /// queue `Handle::run_in_loop` uses.
    pub fn run_in_loop(&mut self, f: impl FnOnce(&mut EventLoop) + Send + 'static) {
        if self.is_in_loop_thread() {
            f(self);
        } else {
            self.handle().queue_in_loop(f);
        }
    }

    fn drain_wakeup(&self) {
        let mut counter: u64 = 0;
        unsafe {
            libc::read(
                self.wakeup_fd,
                &mut counter as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            );
        }
    }

    fn do_pending_functors(&mut self) {
        self.calling_pending.store(true, Ordering::Release);
        let local: Vec<PendingFn> = std::mem::take(&mut *self.pending.lock().unwrap());
        for f in local {
            f(self);
        }
        self.calling_pending.store(false, Ordering::Release);
    }

    /// Drives the reactor until `quit()` is called. Every iteration: poll for up to 10 seconds,
    /// dispatch ready fds (the wakeup and timer fds are handled inline; everything else goes
    /// through its registered `Channel`), then drain pending functors (spec §4.5 `loop()`).
    pub fn run(&mut self) -> ReactorResult<()> {
        self.assert_in_loop_thread()?;
        slog::info!(self.log, "event loop starting");

        let mut ready = Vec::new();
        while !self.quit.load(Ordering::Acquire) {
            ready.clear();
            self.poller.poll(Some(Duration::from_secs(10)), &mut ready)?;

            for event in &ready {
                if event.fd == self.wakeup_fd {
                    self.drain_wakeup();
                } else if event.fd == self.timer_queue.fd() {
                    if self.timer_queue.consume_expiration_count()? > 0 {
                        self.timer_queue.run_expired(Instant::now())?;
                    }
                } else if let Some(channel) = self.channels.get_mut(&event.fd) {
                    channel.set_revents(event.revents);
                    channel.handle_event();
                }
            }

            self.do_pending_functors();
        }

        slog::info!(self.log, "event loop stopping");
        Ok(())
    }
}

impl Executor for EventLoop {
    fn schedule(&self, f: Box<dyn FnOnce() + Send + 'static>) {
        self.handle().schedule(f);
    }

    fn schedule_later(&self, delay: Duration, f: Box<dyn FnOnce() + Send + 'static>) {
        self.handle().schedule_later(delay, f);
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.wakeup_fd);
        }
        LOOP_IN_THIS_THREAD.with(|cell| cell.set(false));
    }
}
