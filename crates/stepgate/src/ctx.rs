//! Handle a task body uses to create tokens and reach checkpoints

use crate::bag::ResultBag;
use crate::driver::{Driver, Phase, TaskId};
use crate::error::{ContractViolation, TaskError, TaskResult};
use crate::launch::launch;
use crate::token::Token;
use parking_lot::Mutex;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::thread;

/// Body-side handle of a task
///
/// Passed to the body by [`launch`]. Cloning is cheap; every clone refers to
/// the same driver.
#[derive(Clone)]
pub struct Ctx {
    driver: Arc<Driver>,
}

impl Ctx {
    pub(crate) fn new(driver: Arc<Driver>) -> Self {
        Self { driver }
    }

    /// ID of the task this handle belongs to
    pub fn id(&self) -> TaskId {
        self.driver.id()
    }

    /// Current phase of the task
    pub fn phase(&self) -> Phase {
        self.driver.phase()
    }

    /// Number of tokens not yet resolved
    pub fn pending(&self) -> usize {
        self.driver.pending()
    }

    /// Create a token whose result is stored under `label`
    ///
    /// # Panics
    ///
    /// Panics when called outside a step of this task, e.g. from another
    /// thread or after the body parked. Use [`Ctx::try_token`] to handle
    /// that case instead.
    pub fn token(&self, label: impl Into<String>) -> Token {
        self.try_token(Some(label.into()))
            .unwrap_or_else(|violation| panic!("{}", violation))
    }

    /// Create a token whose result is discarded
    ///
    /// # Panics
    ///
    /// Same conditions as [`Ctx::token`].
    pub fn unlabeled_token(&self) -> Token {
        self.try_token(None)
            .unwrap_or_else(|violation| panic!("{}", violation))
    }

    /// Create a token, reporting a contract violation instead of panicking
    pub fn try_token(&self, label: Option<String>) -> Result<Token, ContractViolation> {
        self.driver.register_token(label.as_deref())?;
        Ok(Token::new(Arc::clone(&self.driver), label))
    }

    /// Suspend until every token created so far has been resolved
    ///
    /// Resolves to the first error reported by a token since the previous
    /// checkpoint, if any.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            driver: Arc::clone(&self.driver),
            parked: false,
        }
    }

    /// Clone the value stored under `label`
    pub fn get(&self, label: &str) -> Option<Value> {
        self.driver.with_bag(|bag| bag.get(label).cloned())
    }

    /// Clone the string stored under `label`
    pub fn get_string(&self, label: &str) -> Option<String> {
        self.driver
            .with_bag(|bag| bag.get_str(label).map(str::to_string))
    }

    /// Run `f` against the result bag
    ///
    /// The driver state is locked for the duration of `f`. Calling back into
    /// this task from `f` deadlocks: resolving one of its tokens, or any
    /// other `Ctx` method (`get`, `pending`, `phase`, `token`, ...).
    pub fn with_bag<R>(&self, f: impl FnOnce(&ResultBag) -> R) -> R {
        self.driver.with_bag(f)
    }

    /// Launch a nested task whose bag is stored under `label`
    ///
    /// When the nested task fails before this call returns, its error is
    /// returned here. Later failures arrive at this task's next checkpoint.
    pub fn spawn<F, Fut>(&self, label: impl Into<String>, body: F) -> TaskResult
    where
        F: FnOnce(Ctx) -> Fut,
        Fut: Future<Output = TaskResult> + Send + 'static,
    {
        let token = self.token(label);
        let origin = thread::current().id();
        let returned = Arc::new(AtomicBool::new(false));
        let raised: Arc<Mutex<Option<TaskError>>> = Arc::new(Mutex::new(None));

        let nested = launch(body);
        tracing::trace!(task = %self.id(), nested = %nested.id(), "nested task launched");
        {
            let returned = Arc::clone(&returned);
            let raised = Arc::clone(&raised);
            nested.start(move |error, bag| {
                let synchronous =
                    !returned.load(Ordering::Acquire) && thread::current().id() == origin;
                if synchronous {
                    if let Err(error) = token.resolve_with(error, vec![bag.into_value()]) {
                        *raised.lock() = Some(error);
                    }
                } else {
                    token.settle(error, bag.into_value());
                }
            });
        }
        returned.store(true, Ordering::Release);

        let raised = raised.lock().take();
        match raised {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Future returned by [`Ctx::checkpoint`]
///
/// The first poll always suspends the body. The driver polls again once no
/// tokens are pending, and the checkpoint then yields the injected error, if
/// any.
#[must_use = "checkpoints do nothing unless awaited"]
pub struct Checkpoint {
    driver: Arc<Driver>,
    parked: bool,
}

impl Future for Checkpoint {
    type Output = TaskResult;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<TaskResult> {
        if !self.parked {
            self.parked = true;
            self.driver.park();
            return Poll::Pending;
        }
        match self.driver.take_injected() {
            Some(error) => Poll::Ready(Err(error)),
            None => Poll::Ready(Ok(())),
        }
    }
}
