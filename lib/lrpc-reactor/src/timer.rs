use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

static NEXT_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Identifies a scheduled timer for cancellation. The original pairs a `Timer*` with a sequence
/// number so a stale pointer can't be mistaken for a still-live timer; here the sequence alone
/// is the identity, since nothing else needs the address.
pub type TimerId = u64;

pub struct Timer {
    callback: Box<dyn FnMut() + Send + 'static>,
    expiration: Instant,
    interval: Option<Duration>,
    sequence: TimerId,
}

impl Timer {
    pub fn new(
        callback: impl FnMut() + Send + 'static,
        expiration: Instant,
        interval: Option<Duration>,
    ) -> Timer {
        Timer {
            callback: Box::new(callback),
            expiration,
            interval,
            sequence: NEXT_SEQUENCE.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn run(&mut self) {
        (self.callback)();
    }

    pub fn expiration(&self) -> Instant {
        self.expiration
    }

    pub fn repeats(&self) -> bool {
        self.interval.is_some()
    }

    pub fn sequence(&self) -> TimerId {
        self.sequence
    }

    /// Advances `expiration` by the repeat interval, anchored at `now` the way the original's
    /// `restart` is — a slow callback doesn't cause the next firing to play catch-up.
    pub fn restart(&mut self, now: Instant) {
        if let Some(interval) = self.interval {
            self.expiration = now + interval;
        }
    }
}
