//! Timer scheduling for the household apps host
//!
//! Timers never call back into apps directly. Each timer is a tokio task that
//! sends a [`FiredTimer`] into a channel owned by the app runtime, which
//! delivers it to the apps between other callbacks. Before delivering, the
//! runtime calls [`Scheduler::claim`]: a timer canceled after it fired but
//! before its callback ran is discarded there.

use chrono::{NaiveDateTime, NaiveTime};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

/// Shortest period of a repeating timer
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Identifies a scheduled timer; returned by every `run_*` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TimerHandle(u64);

impl TimerHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

/// A timer that elapsed, carrying the payload given at schedule time
#[derive(Debug, Clone)]
pub struct FiredTimer<T> {
    pub handle: TimerHandle,
    pub payload: T,
}

struct TimerEntry {
    task: JoinHandle<()>,
    repeating: bool,
}

/// Schedules timers whose payloads are delivered through a channel
///
/// `run_*` must be called from within a tokio runtime.
pub struct Scheduler<T> {
    timers: DashMap<TimerHandle, TimerEntry>,
    next_id: AtomicU64,
    tx: mpsc::UnboundedSender<FiredTimer<T>>,
}

impl<T: Clone + Send + 'static> Scheduler<T> {
    /// Create a scheduler and the receiver its timers fire into
    pub fn new() -> (Self, mpsc::UnboundedReceiver<FiredTimer<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            timers: DashMap::new(),
            next_id: AtomicU64::new(1),
            tx,
        };
        (scheduler, rx)
    }

    fn next_handle(&self) -> TimerHandle {
        TimerHandle(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Fire once after `delay`
    pub fn run_in(&self, delay: Duration, payload: T) -> TimerHandle {
        let handle = self.next_handle();
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(FiredTimer { handle, payload });
        });

        debug!(%handle, ?delay, "Scheduled one-shot timer");
        self.timers.insert(
            handle,
            TimerEntry {
                task,
                repeating: false,
            },
        );
        handle
    }

    /// Fire after `start`, then every `interval` until canceled
    ///
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn run_every(&self, start: Duration, interval: Duration, payload: T) -> TimerHandle {
        let handle = self.next_handle();
        let tx = self.tx.clone();
        if interval < MIN_INTERVAL {
            warn!(%handle, ?interval, "Repeat interval too short, using {:?}", MIN_INTERVAL);
        }
        let interval = interval.max(MIN_INTERVAL);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx
                    .send(FiredTimer {
                        handle,
                        payload: payload.clone(),
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        debug!(%handle, ?start, ?interval, "Scheduled repeating timer");
        self.timers.insert(
            handle,
            TimerEntry {
                task,
                repeating: true,
            },
        );
        handle
    }

    /// Fire every day at the given local wall-clock time
    pub fn run_daily(&self, at: NaiveTime, payload: T) -> TimerHandle {
        let handle = self.next_handle();
        let tx = self.tx.clone();

        let task = tokio::spawn(async move {
            loop {
                let now = chrono::Local::now().naive_local();
                tokio::time::sleep(until_next(at, now)).await;
                if tx
                    .send(FiredTimer {
                        handle,
                        payload: payload.clone(),
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        debug!(%handle, %at, "Scheduled daily timer");
        self.timers.insert(
            handle,
            TimerEntry {
                task,
                repeating: true,
            },
        );
        handle
    }

    /// Cancel a timer; unknown or already finished handles are a no-op
    pub fn cancel_timer(&self, handle: TimerHandle) -> bool {
        match self.timers.remove(&handle) {
            Some((_, entry)) => {
                entry.task.abort();
                debug!(%handle, "Canceled timer");
                true
            }
            None => {
                trace!(%handle, "Cancel of inactive timer ignored");
                false
            }
        }
    }

    /// Decide whether a fired timer may still be delivered
    ///
    /// Returns false when the timer was canceled in the meantime. A one-shot
    /// timer is retired by a successful claim.
    pub fn claim(&self, fired: &FiredTimer<T>) -> bool {
        let repeating = match self.timers.get(&fired.handle) {
            Some(entry) => entry.repeating,
            None => return false,
        };
        if !repeating {
            self.timers.remove(&fired.handle);
        }
        true
    }

    pub fn is_active(&self, handle: TimerHandle) -> bool {
        self.timers.contains_key(&handle)
    }

    pub fn active_count(&self) -> usize {
        self.timers.len()
    }

    /// Cancel every timer, used on shutdown
    pub fn cancel_all(&self) {
        for entry in self.timers.iter() {
            entry.task.abort();
        }
        self.timers.clear();
    }
}

/// Time from `now` until the next occurrence of `at`
///
/// An occurrence exactly at `now` counts as already passed, so a daily timer
/// that just fired waits a full day.
pub fn until_next(at: NaiveTime, now: NaiveDateTime) -> Duration {
    let today = now.date().and_time(at);
    let next = if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or_default()
}
