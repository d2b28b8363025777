//! Wait tokens handed to asynchronous operations

use crate::bag::ResultBag;
use crate::driver::{Delivery, Driver};
use crate::error::{TaskError, TaskResult};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Handle for one outstanding operation of a task
///
/// A token is created by [`Ctx::token`](crate::Ctx::token) during a step and
/// must be resolved exactly once; every resolver consumes it. The task
/// resumes past its next checkpoint only after all tokens created before
/// that checkpoint have been resolved.
///
/// Resolvers return `Err` only when they run on the thread currently
/// stepping the task and carry an error: the body then sees the failure at
/// the call site and can propagate it with `?`. Off-step resolutions always
/// return `Ok(())`; their errors are delivered at the next checkpoint.
///
/// Dropping a token without resolving it resolves it with
/// [`TaskError::Abandoned`].
#[must_use = "a token must be resolved or its task never resumes"]
pub struct Token {
    driver: Option<Arc<Driver>>,
    label: Option<String>,
}

impl Token {
    pub(crate) fn new(driver: Arc<Driver>, label: Option<String>) -> Self {
        Self {
            driver: Some(driver),
            label,
        }
    }

    /// Label the result is stored under, if any
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// Resolve with an optional error and any number of values
    ///
    /// Labeled tokens store their values even when an error is passed.
    pub fn resolve_with(mut self, error: Option<TaskError>, values: Vec<Value>) -> TaskResult {
        self.finish(error, values, Delivery::CallSite)
    }

    /// Resolve from a `Result`, failures storing no value
    pub fn resolve(self, outcome: TaskResult<Vec<Value>>) -> TaskResult {
        match outcome {
            Ok(values) => self.resolve_with(None, values),
            Err(error) => self.resolve_with(Some(error), Vec::new()),
        }
    }

    /// Resolve successfully with a single value
    pub fn ok(self, value: impl Into<Value>) -> TaskResult {
        self.resolve_with(None, vec![value.into()])
    }

    /// Resolve successfully with no value
    pub fn done(self) -> TaskResult {
        self.resolve_with(None, Vec::new())
    }

    /// Resolve with an error
    pub fn fail(self, error: impl Into<TaskError>) -> TaskResult {
        self.resolve_with(Some(error.into()), Vec::new())
    }

    /// Turn the token into a completion handler for a nested task
    ///
    /// The nested task's bag becomes this token's value and its error, if
    /// any, is delivered to this task at its next checkpoint.
    pub fn into_completion(self) -> impl FnOnce(Option<TaskError>, ResultBag) + Send + 'static {
        move |error, bag| self.settle(error, bag.into_value())
    }

    /// Resolve with a single value, latching any error for the next
    /// checkpoint instead of returning it
    pub(crate) fn settle(mut self, error: Option<TaskError>, value: Value) {
        // Latch delivery never returns an error.
        let _ = self.finish(error, vec![value], Delivery::Latch);
    }

    fn finish(&mut self, error: Option<TaskError>, values: Vec<Value>, delivery: Delivery) -> TaskResult {
        match self.driver.take() {
            Some(driver) => driver.resolve(self.label.take(), error, values, delivery),
            None => Ok(()),
        }
    }
}

impl Drop for Token {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            tracing::warn!(task = %driver.id(), label = ?self.label, "token dropped without being resolved");
            let label = self.label.take();
            let error = TaskError::Abandoned {
                label: label.clone(),
            };
            let _ = driver.resolve(label, Some(error), Vec::new(), Delivery::Latch);
        }
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("task", &self.driver.as_ref().map(|d| d.id()))
            .field("label", &self.label)
            .finish()
    }
}
