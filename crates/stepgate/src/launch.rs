//! Launching tasks and observing their completion

use crate::bag::ResultBag;
use crate::ctx::Ctx;
use crate::driver::{Driver, Phase, TaskId};
use crate::error::{TaskError, TaskResult};
use parking_lot::{Condvar, Mutex};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Bind a body to a new task
///
/// The body is handed the task's [`Ctx`] and builds the future that will be
/// stepped; nothing in it runs until [`Launcher::start`] or
/// [`Launcher::spawn`].
pub fn launch<F, Fut>(body: F) -> Launcher
where
    F: FnOnce(Ctx) -> Fut,
    Fut: Future<Output = TaskResult> + Send + 'static,
{
    let driver = Driver::new();
    let future = body(Ctx::new(Arc::clone(&driver)));
    driver.bind(Box::pin(future));
    Launcher { driver }
}

/// A task that has been built but not started
#[must_use = "a task does nothing until it is started"]
pub struct Launcher {
    driver: Arc<Driver>,
}

impl Launcher {
    /// ID of the task
    pub fn id(&self) -> TaskId {
        self.driver.id()
    }

    /// Current phase of the task
    pub fn phase(&self) -> Phase {
        self.driver.phase()
    }

    /// Start the task; `handler` is called exactly once when it ends
    ///
    /// The first step runs on the calling thread before this returns, so a
    /// body that never waits on another thread completes (and calls
    /// `handler`) inside this call.
    pub fn start<H>(self, handler: H)
    where
        H: FnOnce(Option<TaskError>, ResultBag) + Send + 'static,
    {
        self.driver.start(Box::new(handler));
    }

    /// Start the task and return a handle to wait for its outcome
    pub fn spawn(self) -> CompletionHandle {
        let slot = Arc::new(CompletionSlot {
            outcome: Mutex::new(SlotState::Running),
            ready: Condvar::new(),
        });
        let id = self.id();
        let sink = Arc::clone(&slot);
        self.start(move |error, bag| sink.complete(Outcome { error, bag }));
        CompletionHandle { id, slot }
    }
}

impl Drop for Launcher {
    fn drop(&mut self) {
        // Releases the body of a launcher that was never started.
        self.driver.discard();
    }
}

/// How a task ended
#[derive(Debug)]
pub struct Outcome {
    /// Error that escaped the body, if any
    pub error: Option<TaskError>,
    /// Everything labeled tokens resolved with
    pub bag: ResultBag,
}

impl Outcome {
    /// Whether the body finished without an error
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Convert into a `Result`, dropping the bag on failure
    pub fn into_result(self) -> Result<ResultBag, TaskError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.bag),
        }
    }
}

enum SlotState {
    Running,
    Finished(Outcome),
    Taken,
}

struct CompletionSlot {
    outcome: Mutex<SlotState>,
    ready: Condvar,
}

impl CompletionSlot {
    fn complete(&self, outcome: Outcome) {
        let mut state = self.outcome.lock();
        *state = SlotState::Finished(outcome);
        self.ready.notify_all();
    }
}

/// Handle to a task started with [`Launcher::spawn`]
pub struct CompletionHandle {
    id: TaskId,
    slot: Arc<CompletionSlot>,
}

impl CompletionHandle {
    /// ID of the task
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Whether the task has ended
    pub fn is_finished(&self) -> bool {
        !matches!(*self.slot.outcome.lock(), SlotState::Running)
    }

    /// Block until the task ends
    ///
    /// Blocks forever if one of the task's tokens is never resolved.
    pub fn wait(self) -> Outcome {
        let mut state = self.slot.outcome.lock();
        loop {
            match std::mem::replace(&mut *state, SlotState::Taken) {
                SlotState::Finished(outcome) => return outcome,
                SlotState::Running => {
                    *state = SlotState::Running;
                    self.slot.ready.wait(&mut state);
                }
                // `wait` consumes the handle and `wait_timeout` only takes a
                // finished outcome, so nothing else can have taken it.
                SlotState::Taken => unreachable!("task outcome already taken"),
            }
        }
    }

    /// Block until the task ends or `timeout` elapses
    ///
    /// Returns the outcome the first time it is available; later calls
    /// return `None`.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.outcome.lock();
        while matches!(*state, SlotState::Running) {
            if self.slot.ready.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Finished(outcome) => Some(outcome),
            other => {
                *state = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::mpsc;

    #[test]
    fn test_start_runs_first_step_synchronously() {
        let (tx, rx) = mpsc::channel();
        launch(|ctx| async move {
            ctx.token("d1").ok("a")?;
            ctx.checkpoint().await?;
            ctx.token("d2").ok("b")?;
            ctx.checkpoint().await?;
            Ok(())
        })
        .start(move |err, bag| {
            let _ = tx.send((err, bag));
        });

        let (err, bag) = rx.try_recv().unwrap();
        assert!(err.is_none());
        assert_eq!(bag.get_str("d1"), Some("a"));
        assert_eq!(bag.get_str("d2"), Some("b"));
    }

    #[test]
    fn test_unstarted_launcher_runs_nothing() {
        let (tx, rx) = mpsc::channel::<()>();
        let launcher = launch(move |_ctx| async move {
            let _ = tx.send(());
            Ok(())
        });
        assert_eq!(launcher.phase(), Phase::Created);
        drop(launcher);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_outcome_into_result() {
        let ok = Outcome {
            error: None,
            bag: ResultBag::new(),
        };
        assert!(ok.is_ok());
        assert!(ok.into_result().is_ok());

        let failed = Outcome {
            error: Some(TaskError::msg("error1")),
            bag: ResultBag::new(),
        };
        assert_eq!(failed.into_result().unwrap_err().to_string(), "error1");
    }

    #[test]
    fn test_wait_timeout_on_stalled_task() {
        let parked: Arc<Mutex<Option<crate::Token>>> = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&parked);
        let handle = launch(move |ctx| async move {
            *slot.lock() = Some(ctx.token("d1"));
            ctx.checkpoint().await?;
            Ok(())
        })
        .spawn();

        assert!(!handle.is_finished());
        assert!(handle.wait_timeout(Duration::from_millis(20)).is_none());

        let token = parked.lock().take().unwrap();
        token.ok(json!("late")).unwrap();

        let outcome = handle.wait_timeout(Duration::from_secs(1)).unwrap();
        assert!(outcome.is_ok());
        assert_eq!(outcome.bag.get_str("d1"), Some("late"));
        assert!(handle.wait_timeout(Duration::from_millis(1)).is_none());
    }
}
