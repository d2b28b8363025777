//! Driver state machine
//!
//! A driver owns one task body and steps it. Each step is a single poll of
//! the body future on the current thread. The body parks at checkpoints;
//! while it is parked with outstanding tokens the driver is Awaiting, and
//! the resolver that brings the pending count back to zero performs the
//! next step on whatever thread it runs on.

use crate::bag::ResultBag;
use crate::error::{ContractViolation, TaskError, TaskResult};
use parking_lot::Mutex;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, ThreadId};

/// Boxed task body
pub(crate) type BoxedBody = Pin<Box<dyn Future<Output = TaskResult> + Send>>;

/// Boxed completion handler
pub(crate) type CompletionFn = Box<dyn FnOnce(Option<TaskError>, ResultBag) + Send>;

/// Unique identifier for a driver
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Phase of a driver
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Built, no completion handler supplied yet
    Created,
    /// A thread is inside a step of the body
    Stepping,
    /// Parked at a checkpoint, waiting on outstanding tokens
    Awaiting,
    /// Finished or failed; absorbing
    Terminal,
}

/// How a resolver hands an error to the body
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Delivery {
    /// Return the error to the resolver's caller when it runs on the
    /// stepping thread; latch it otherwise
    CallSite,
    /// Always latch the error for the next checkpoint
    Latch,
}

struct DriverState {
    started: bool,
    terminal: bool,
    pending: usize,
    round_error: Option<TaskError>,
    stepping: Option<ThreadId>,
    /// Error handed to the checkpoint the body resumes at
    injected: Option<TaskError>,
    /// Set when the body parks at a checkpoint during the current step
    parked: bool,
    bag: ResultBag,
    completion: Option<CompletionFn>,
}

impl DriverState {
    fn begin_step(&mut self, injected: Option<TaskError>) {
        self.round_error = None;
        self.stepping = Some(thread::current().id());
        self.injected = injected;
        self.parked = false;
    }

    fn is_stepping_here(&self) -> bool {
        self.stepping == Some(thread::current().id())
    }
}

/// State machine coordinating one task body and its outstanding tokens
pub(crate) struct Driver {
    id: TaskId,
    state: Mutex<DriverState>,
    /// Held only while polling; taken when the driver terminates
    body: Mutex<Option<BoxedBody>>,
}

impl Driver {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            id: TaskId::new(),
            state: Mutex::new(DriverState {
                started: false,
                terminal: false,
                pending: 0,
                round_error: None,
                stepping: None,
                injected: None,
                parked: false,
                bag: ResultBag::new(),
                completion: None,
            }),
            body: Mutex::new(None),
        })
    }

    pub(crate) fn bind(&self, body: BoxedBody) {
        *self.body.lock() = Some(body);
    }

    pub(crate) fn id(&self) -> TaskId {
        self.id
    }

    pub(crate) fn phase(&self) -> Phase {
        let state = self.state.lock();
        if state.terminal {
            Phase::Terminal
        } else if state.stepping.is_some() {
            Phase::Stepping
        } else if !state.started {
            Phase::Created
        } else {
            Phase::Awaiting
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().pending
    }

    pub(crate) fn with_bag<R>(&self, f: impl FnOnce(&ResultBag) -> R) -> R {
        f(&self.state.lock().bag)
    }

    /// Install the completion handler and run the first step
    pub(crate) fn start(self: &Arc<Self>, completion: CompletionFn) {
        {
            let mut state = self.state.lock();
            if state.started || state.terminal {
                return;
            }
            state.started = true;
            state.completion = Some(completion);
        }
        tracing::debug!(task = %self.id, "task started");
        self.advance(None);
    }

    /// Drop the body of a driver that was never started
    pub(crate) fn discard(&self) {
        {
            let mut state = self.state.lock();
            if state.started || state.terminal {
                return;
            }
            state.terminal = true;
        }
        let body = self.body.lock().take();
        drop(body);
    }

    /// Count a new outstanding token
    ///
    /// Only the thread currently stepping this driver may create tokens.
    pub(crate) fn register_token(&self, label: Option<&str>) -> Result<(), ContractViolation> {
        let mut state = self.state.lock();
        if state.terminal || !state.is_stepping_here() {
            tracing::warn!(task = %self.id, label = ?label, "token created outside of a step");
            return Err(ContractViolation::TokenOutsideStep);
        }
        state.pending += 1;
        tracing::trace!(task = %self.id, label = ?label, pending = state.pending, "token created");
        Ok(())
    }

    /// Resolve one outstanding token
    pub(crate) fn resolve(
        self: &Arc<Self>,
        label: Option<String>,
        error: Option<TaskError>,
        values: Vec<Value>,
        delivery: Delivery,
    ) -> TaskResult {
        let mut state = self.state.lock();
        if state.terminal {
            tracing::trace!(task = %self.id, label = ?label, "token resolved after completion");
            return Ok(());
        }

        debug_assert!(state.pending > 0, "token resolved with nothing pending");
        state.pending = state.pending.saturating_sub(1);
        tracing::trace!(
            task = %self.id,
            label = ?label,
            failed = error.is_some(),
            pending = state.pending,
            "token resolved"
        );
        if let Some(label) = label {
            state.bag.store(label, values);
        }

        if delivery == Delivery::CallSite && state.is_stepping_here() {
            return match error {
                Some(error) => Err(error),
                None => Ok(()),
            };
        }

        if let Some(error) = error {
            if state.round_error.is_none() {
                state.round_error = Some(error);
            } else {
                tracing::debug!(task = %self.id, error = %error, "secondary token error dropped");
            }
        }

        if state.stepping.is_none() && state.pending == 0 {
            let latched = state.round_error.take();
            drop(state);
            self.advance(latched);
        }
        Ok(())
    }

    /// Mark that the body parked at a checkpoint during this step
    pub(crate) fn park(&self) {
        self.state.lock().parked = true;
    }

    /// Take the error to deliver at the checkpoint being resumed
    pub(crate) fn take_injected(&self) -> Option<TaskError> {
        self.state.lock().injected.take()
    }

    /// Step the body until it parks with pending tokens or finishes
    ///
    /// Checkpoints that leave nothing pending are drained in place rather
    /// than by recursion.
    fn advance(self: &Arc<Self>, injected: Option<TaskError>) {
        {
            let mut state = self.state.lock();
            if state.terminal || state.stepping.is_some() {
                return;
            }
            state.begin_step(injected);
        }

        loop {
            let polled = self.poll_body();

            let mut state = self.state.lock();
            state.stepping = None;
            let parked = std::mem::take(&mut state.parked);
            let error = match polled {
                Ok(Poll::Pending) if parked => {
                    if state.pending > 0 {
                        tracing::trace!(task = %self.id, pending = state.pending, "task awaiting");
                        return;
                    }
                    let latched = state.round_error.take();
                    state.begin_step(latched);
                    continue;
                }
                Ok(Poll::Pending) => {
                    tracing::warn!(task = %self.id, "task body suspended outside a checkpoint");
                    Some(TaskError::Contract(ContractViolation::ForeignSuspend))
                }
                Ok(Poll::Ready(result)) => result.err(),
                Err(payload) => Some(TaskError::Panicked(panic_message(payload.as_ref()))),
            };
            drop(state);
            self.finish(error);
            return;
        }
    }

    fn poll_body(&self) -> thread::Result<Poll<TaskResult>> {
        let mut body = self.body.lock();
        let Some(future) = body.as_mut() else {
            return Ok(Poll::Ready(Ok(())));
        };
        let mut cx = Context::from_waker(Waker::noop());
        panic::catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx)))
    }

    /// Enter the terminal phase and fire the completion handler once
    fn finish(&self, error: Option<TaskError>) {
        let (completion, bag) = {
            let mut state = self.state.lock();
            if state.terminal {
                return;
            }
            state.terminal = true;
            state.stepping = None;
            state.round_error = None;
            state.injected = None;
            (state.completion.take(), std::mem::take(&mut state.bag))
        };

        // Tokens still owned by the body resolve into a terminal driver here.
        let body = self.body.lock().take();
        drop(body);

        match &error {
            Some(error) => tracing::debug!(task = %self.id, error = %error, "task failed"),
            None => tracing::debug!(task = %self.id, labels = bag.len(), "task finished"),
        }
        if let Some(completion) = completion {
            completion(error, bag);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
