//! Blocking IO worker pool
//!
//! Workers pull closures from a shared channel and run them to completion.
//! Each closure owns the token it resolves, so a finished job resolves its
//! token on the worker thread.

use crate::error::RuntimeError;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use stepgate::{TaskError, Token};

type IoJob = Box<dyn FnOnce() + Send>;

/// Pool of threads for blocking work
pub struct IoPool {
    work_tx: Mutex<Option<Sender<IoJob>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl IoPool {
    /// Start `workers` threads named `<prefix>-io-<n>`
    pub fn start(workers: usize, prefix: &str) -> Result<Self, RuntimeError> {
        let (work_tx, work_rx) = channel::unbounded::<IoJob>();
        let pool = Self {
            work_tx: Mutex::new(Some(work_tx)),
            handles: Mutex::new(Vec::with_capacity(workers)),
        };

        for i in 0..workers.max(1) {
            let rx = work_rx.clone();
            let name = format!("{}-io-{}", prefix, i);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || Self::worker_loop(rx))
                .map_err(|source| RuntimeError::Spawn { name, source })?;
            pool.handles.lock().push(handle);
        }
        Ok(pool)
    }

    /// Number of worker threads still attached to the pool
    pub fn worker_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Queue a closure on the pool
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) -> Result<(), RuntimeError> {
        let guard = self.work_tx.lock();
        let tx = guard.as_ref().ok_or(RuntimeError::ShutDown("io pool"))?;
        tx.send(Box::new(job))
            .map_err(|_| RuntimeError::ShutDown("io pool"))
    }

    /// Run `work` on the pool and resolve `token` with its result
    ///
    /// If the pool is shut down the token is dropped, which reports it as
    /// abandoned to its task.
    pub fn run<F>(&self, token: Token, work: F)
    where
        F: FnOnce() -> Result<Value, TaskError> + Send + 'static,
    {
        let submitted = self.submit(move || {
            let _ = token.resolve(work().map(|value| vec![value]));
        });
        if let Err(err) = submitted {
            tracing::warn!(error = %err, "io job rejected");
        }
    }

    /// Read a UTF-8 file; the token receives its contents
    pub fn read_to_string(&self, path: impl AsRef<Path>, token: Token) {
        let path: PathBuf = path.as_ref().to_path_buf();
        self.run(token, move || {
            fs::read_to_string(&path)
                .map(Value::String)
                .map_err(|err| TaskError::io_at(path, err))
        });
    }

    /// Write a file; the token receives the number of bytes written
    pub fn write(&self, path: impl AsRef<Path>, contents: impl Into<Vec<u8>>, token: Token) {
        let path: PathBuf = path.as_ref().to_path_buf();
        let contents = contents.into();
        self.run(token, move || {
            fs::write(&path, &contents)
                .map(|()| Value::from(contents.len()))
                .map_err(|err| TaskError::io_at(path, err))
        });
    }

    /// Stop accepting work and join the workers once the queue drains
    pub fn shutdown(&self) {
        // Dropping the sender disconnects the channel after queued jobs run.
        self.work_tx.lock().take();

        let current = thread::current().id();
        for handle in self.handles.lock().drain(..) {
            if handle.thread().id() == current {
                continue;
            }
            let _ = handle.join();
        }
    }

    fn worker_loop(work_rx: Receiver<IoJob>) {
        while let Ok(job) = work_rx.recv() {
            job();
        }
        tracing::trace!("io worker shutting down");
    }
}

impl Drop for IoPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
