use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;
use stepgate::launch;
use stepgate_runtime::{IoPool, Runtime, RuntimeConfig};

/// Rounds of 1, 2, .., `rounds` tokens, each resolved by an IO worker
fn run_rounds(pool: Arc<Runtime>, rounds: usize) {
    let outcome = launch(move |ctx| async move {
        for round in 1..=rounds {
            for _ in 0..round {
                let token = ctx.unlabeled_token();
                let _ = pool.io().submit(move || {
                    let _ = token.done();
                });
            }
            ctx.checkpoint().await?;
        }
        Ok(())
    })
    .spawn()
    .wait();
    assert!(outcome.is_ok());
}

fn bench_sync_steps(c: &mut Criterion) {
    c.bench_function("sync_steps", |b| {
        b.iter(|| {
            let outcome = launch(|ctx| async move {
                for i in 0..4 {
                    ctx.token(format!("d{}", i)).ok(black_box(i))?;
                    ctx.checkpoint().await?;
                }
                Ok(())
            })
            .spawn()
            .wait();
            assert!(outcome.is_ok());
        });
    });
}

fn bench_async_rounds(c: &mut Criterion) {
    let config = RuntimeConfig::default().with_thread_prefix("stepgate-bench");
    let runtime = match Runtime::new(config) {
        Ok(runtime) => Arc::new(runtime),
        Err(err) => panic!("runtime: {}", err),
    };

    let mut group = c.benchmark_group("async_rounds");
    for rounds in [1usize, 4, 8] {
        group.bench_with_input(BenchmarkId::from_parameter(rounds), &rounds, |b, &rounds| {
            b.iter(|| run_rounds(Arc::clone(&runtime), rounds));
        });
    }
    group.finish();
}

fn bench_io_pool_submit(c: &mut Criterion) {
    let pool = match IoPool::start(2, "stepgate-bench") {
        Ok(pool) => pool,
        Err(err) => panic!("io pool: {}", err),
    };
    c.bench_function("io_pool_submit", |b| {
        b.iter(|| {
            let (tx, rx) = std::sync::mpsc::channel();
            let _ = pool.submit(move || {
                let _ = tx.send(());
            });
            let _ = rx.recv();
        });
    });
}

criterion_group!(benches, bench_sync_steps, bench_async_rounds, bench_io_pool_submit);
criterion_main!(benches);
