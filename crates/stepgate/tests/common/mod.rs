//! Shared helpers for stepgate integration tests

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Once};
use stepgate::Ctx;
use stepgate_runtime::{Runtime, RuntimeConfig};
use tempfile::TempDir;

static INIT_LOGGING: Once = Once::new();

/// Install a test-writer subscriber once per test binary
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .with_thread_names(true)
            .with_ansi(false)
            .try_init();
    });
}

/// Files the tests read: `a` holds "aaaa", `b` holds "bbbb", the
/// `missing*` paths do not exist
pub struct Fixtures {
    _dir: TempDir,
    pub a: PathBuf,
    pub b: PathBuf,
    pub missing1: PathBuf,
    pub missing2: PathBuf,
}

pub fn fixtures() -> Fixtures {
    let dir = tempfile::tempdir().unwrap();
    let a = dir.path().join("_a.txt");
    let b = dir.path().join("_b.txt");
    std::fs::write(&a, "aaaa").unwrap();
    std::fs::write(&b, "bbbb").unwrap();
    Fixtures {
        a,
        b,
        missing1: dir.path().join("not_found1"),
        missing2: dir.path().join("not_found2"),
        _dir: dir,
    }
}

/// A small runtime for one test
pub fn runtime() -> Arc<Runtime> {
    init_test_logging();
    let config = RuntimeConfig::default()
        .with_io_workers(4)
        .with_thread_prefix("stepgate-test");
    Arc::new(Runtime::new(config).unwrap())
}

/// Concatenate the string values stored under `labels`
pub fn concat(ctx: &Ctx, labels: &[&str]) -> String {
    labels
        .iter()
        .map(|label| ctx.get_string(label).unwrap_or_default())
        .collect()
}
