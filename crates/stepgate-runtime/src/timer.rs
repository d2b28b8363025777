//! Timer thread for delayed token resolution
//!
//! A single thread keeps a min-heap of deadlines and waits on a condvar until
//! the earliest one is due, so registering a timer never spawns a thread.

use crate::error::RuntimeError;
use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use stepgate::Token;

type TimerAction = Box<dyn FnOnce() + Send>;

/// Entry in the timer heap
struct TimerEntry {
    /// When to fire
    fire_at: Instant,
    /// Registration order, breaks ties between equal deadlines
    seq: u64,
    action: TimerAction,
}

// Reverse ordering for min-heap (earliest deadline first)
impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .fire_at
            .cmp(&self.fire_at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

struct TimerState {
    entries: BinaryHeap<TimerEntry>,
    next_seq: u64,
}

/// State shared with the timer thread
struct TimerShared {
    state: Mutex<TimerState>,
    /// Wakes the thread when an earlier entry is added or on shutdown
    notify: Condvar,
    shutdown: AtomicBool,
}

/// Background thread running delayed actions
///
/// The thread only holds the shared state, so dropping the last handle stops
/// it.
pub struct Timer {
    shared: Arc<TimerShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Create a timer and start its thread
    pub fn start(name: impl Into<String>) -> Result<Arc<Self>, RuntimeError> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                entries: BinaryHeap::new(),
                next_seq: 0,
            }),
            notify: Condvar::new(),
            shutdown: AtomicBool::new(false),
        });

        let name = name.into();
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || worker.run_loop())
            .map_err(|source| RuntimeError::Spawn { name, source })?;
        Ok(Arc::new(Self {
            shared,
            handle: Mutex::new(Some(handle)),
        }))
    }

    /// Run `action` on the timer thread once `delay` has elapsed
    ///
    /// Actions with the same deadline run in registration order. An action
    /// registered after [`Timer::stop`] is dropped without running, which
    /// reports any token it owns as abandoned.
    pub fn schedule(&self, delay: Duration, action: impl FnOnce() + Send + 'static) {
        let fire_at = Instant::now() + delay;
        let action: TimerAction = Box::new(action);
        let rejected = {
            let mut state = self.shared.state.lock();
            if self.shared.shutdown.load(AtomicOrdering::Acquire) {
                Some(action)
            } else {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.entries.push(TimerEntry {
                    fire_at,
                    seq,
                    action,
                });
                // The new entry may be earlier than the one the thread sleeps on.
                self.shared.notify.notify_one();
                None
            }
        };

        // Dropped unlocked: a token inside may resume its task right here.
        if let Some(action) = rejected {
            tracing::warn!(error = %RuntimeError::ShutDown("timer"), "timer action rejected");
            drop(action);
        }
    }

    /// Resolve `token` with no value once `delay` has elapsed
    pub fn sleep(&self, delay: Duration, token: Token) {
        self.schedule(delay, move || {
            let _ = token.done();
        });
    }

    /// Number of actions waiting to fire
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    /// Stop the timer thread; actions not yet due are dropped
    pub fn stop(&self) {
        self.shared.shutdown.store(true, AtomicOrdering::Release);
        {
            // Taking the lock orders the notify after the thread's shutdown
            // check, so the wakeup cannot be lost.
            let _state = self.shared.state.lock();
            self.shared.notify.notify_one();
        }

        if let Some(handle) = self.handle.lock().take() {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside an action; the loop exits on its own.
                return;
            }
            let _ = handle.join();
        }
    }
}

impl TimerShared {
    fn run_loop(&self) {
        loop {
            let due = {
                let mut state = self.state.lock();
                if self.shutdown.load(AtomicOrdering::Acquire) {
                    break;
                }

                let now = Instant::now();
                let mut due = Vec::new();
                while let Some(entry) = state.entries.peek() {
                    if entry.fire_at > now {
                        break;
                    }
                    if let Some(entry) = state.entries.pop() {
                        due.push(entry.action);
                    }
                }

                if due.is_empty() {
                    match state.entries.peek().map(|next| next.fire_at) {
                        Some(fire_at) => {
                            self.notify.wait_until(&mut state, fire_at);
                        }
                        None => self.notify.wait(&mut state),
                    }
                    continue;
                }
                due
            };

            // Actions may schedule more timers, so run them unlocked.
            for action in due {
                action();
            }
        }

        // Nothing is pushed once shutdown is set, so this empties the heap
        // for good.
        let dropped = std::mem::take(&mut self.state.lock().entries);
        if !dropped.is_empty() {
            tracing::debug!(count = dropped.len(), "timer stopped with actions pending");
        }
        drop(dropped);
        tracing::trace!("timer thread shutting down");
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}
