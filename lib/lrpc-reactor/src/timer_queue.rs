use std::collections::{BTreeMap, HashSet};
use std::io;
use std::os::unix::io::RawFd;
use std::time::{Duration, Instant};

use crate::error::{ReactorError, ReactorResult};
use crate::timer::{Timer, TimerId};

/// Lower bound on what we hand `timerfd_settime`, mirroring the original's 100-microsecond
/// floor: an expiration at or before "now" still needs a strictly-positive relative timeout or
/// the kernel treats it as "disarm".
const MIN_RELATIVE: Duration = Duration::from_micros(100);

fn create_timerfd() -> ReactorResult<RawFd> {
    let fd = unsafe { libc::timerfd_create(libc::CLOCK_MONOTONIC, libc::TFD_NONBLOCK | libc::TFD_CLOEXEC) };
    if fd < 0 {
        return Err(ReactorError::Io(io::Error::last_os_error()));
    }
    Ok(fd)
}

fn arm_timerfd(fd: RawFd, expiration: Option<Instant>, now: Instant) -> ReactorResult<()> {
    let relative = match expiration {
        Some(when) => when.saturating_duration_since(now).max(MIN_RELATIVE),
        None => Duration::ZERO,
    };
    let new_value = libc::itimerspec {
        it_interval: libc::timespec { tv_sec: 0, tv_nsec: 0 },
        it_value: libc::timespec {
            tv_sec: relative.as_secs() as libc::time_t,
            tv_nsec: relative.subsec_nanos() as libc::c_long,
        },
    };
    let ret = unsafe {
        libc::timerfd_settime(fd, 0, &new_value, std::ptr::null_mut())
    };
    if ret < 0 {
        return Err(ReactorError::Io(io::Error::last_os_error()));
    }
    Ok(())
}

/// Min-heap of pending timers keyed by `(expiration, sequence)`, backed by a single
/// `timerfd(2)` armed for the earliest one — the same design as the original `TimerQueue`, with
/// a `BTreeMap` standing in for its `std::set<pair<Timestamp, Timer*>>` (spec §4.5's timer
/// support). Every method here assumes it runs on the owning `EventLoop`'s thread; only
/// `EventLoop::run_at`/`run_after`/`run_every` are meant to be called cross-thread, and they
/// hop onto the loop thread via `run_in_loop` before touching this queue.
pub struct TimerQueue {
    timer_fd: RawFd,
    timers: BTreeMap<(Instant, TimerId), Timer>,
    active: HashSet<TimerId>,
    canceling: HashSet<TimerId>,
    calling_expired: bool,
}

impl TimerQueue {
    pub fn new() -> ReactorResult<TimerQueue> {
        Ok(TimerQueue {
            timer_fd: create_timerfd()?,
            timers: BTreeMap::new(),
            active: HashSet::new(),
            canceling: HashSet::new(),
            calling_expired: false,
        })
    }

    pub fn fd(&self) -> RawFd {
        self.timer_fd
    }

    /// Inserts `timer`, (re-)arming the fd if it is now the earliest pending one.
    pub fn insert(&mut self, timer: Timer) -> ReactorResult<TimerId> {
        let id = timer.sequence();
        let earliest_changed = self
            .timers
            .keys()
            .next()
            .map(|(when, _)| timer.expiration() < *when)
            .unwrap_or(true);

        self.active.insert(id);
        self.timers.insert((timer.expiration(), id), timer);

        if earliest_changed {
            arm_timerfd(self.timer_fd, Some(self.timers.keys().next().unwrap().0), Instant::now())?;
        }
        Ok(id)
    }

    /// Removes a still-pending timer. If called while its own callback is running (a timer that
    /// cancels itself), it is recorded in `canceling` instead so `reset` knows not to reschedule
    /// it even though it was a repeating timer.
    pub fn cancel(&mut self, id: TimerId) {
        if self.active.remove(&id) {
            self.timers.retain(|&(_, tid), _| tid != id);
        } else if self.calling_expired {
            self.canceling.insert(id);
        }
    }

    /// Drains the timerfd's expiration counter; called once the owning `EventLoop` sees
    /// `fd()` become readable.
    pub fn consume_expiration_count(&self) -> ReactorResult<u64> {
        let mut how_many: u64 = 0;
        let n = unsafe {
            libc::read(
                self.timer_fd,
                &mut how_many as *mut u64 as *mut libc::c_void,
                std::mem::size_of::<u64>(),
            )
        };
        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                return Ok(0);
            }
            return Err(ReactorError::Io(err));
        }
        Ok(how_many)
    }

    /// Runs every timer whose expiration is `<= now`, reschedules repeating ones, and rearms the
    /// fd for whatever is earliest afterward.
    pub fn run_expired(&mut self, now: Instant) -> ReactorResult<()> {
        let mut expired = Vec::new();
        loop {
            match self.timers.keys().next().copied() {
                Some((when, id)) if when <= now => {
                    let timer = self.timers.remove(&(when, id)).unwrap();
                    self.active.remove(&id);
                    expired.push(timer);
                }
                _ => break,
            }
        }

        self.calling_expired = true;
        self.canceling.clear();
        for timer in expired.iter_mut() {
            timer.run();
        }
        self.calling_expired = false;

        for mut timer in expired {
            let id = timer.sequence();
            if timer.repeats() && !self.canceling.contains(&id) {
                timer.restart(now);
                self.active.insert(id);
                self.timers.insert((timer.expiration(), id), timer);
            }
        }

        let next = self.timers.keys().next().map(|(when, _)| *when);
        arm_timerfd(self.timer_fd, next, now)
    }
}

impl Drop for TimerQueue {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.timer_fd);
        }
    }
}
