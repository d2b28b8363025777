//! Stepgate - cooperative task driver
//!
//! A task body is an async block that runs in steps. During a step it fans
//! out any number of callback-style operations, each holding a [`Token`],
//! then awaits a checkpoint. The task resumes past the checkpoint once every
//! token has been resolved, on whichever thread resolved the last one. The
//! first error reported in a round is raised at that checkpoint, where the
//! body can recover from it or let it end the task.
//!
//! - **Result bag**: labeled token values (`bag` module)
//! - **Tokens**: single-use resolvers (`token` module)
//! - **Driver**: the step/await state machine (`driver` module)
//! - **Launcher**: starting tasks and collecting outcomes (`launch` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use stepgate::launch;
//!
//! let outcome = launch(|ctx| async move {
//!     read_file("a.txt", ctx.token("a"));
//!     read_file("b.txt", ctx.token("b"));
//!     ctx.checkpoint().await?;
//!
//!     let a = ctx.get_string("a").unwrap_or_default();
//!     ctx.token("len").ok(a.len())?;
//!     Ok(())
//! })
//! .spawn()
//! .wait();
//! ```

#![warn(missing_docs)]

pub mod bag;
pub mod ctx;
pub mod driver;
pub mod error;
pub mod launch;
pub mod token;

pub use bag::ResultBag;
pub use ctx::{Checkpoint, Ctx};
pub use driver::{Phase, TaskId};
pub use error::{ContractViolation, TaskError, TaskResult};
pub use launch::{launch, CompletionHandle, Launcher, Outcome};
pub use serde_json::Value;
pub use token::Token;
