use worker_pools::{Pool, PoolOptions};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Debug)]
struct Job {
  id: usize,
  delay_ms: u64,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Basic Usage Example ---");

  let (done_tx, mut done_rx) = mpsc::unbounded_channel::<usize>();
  let pool = Pool::new(
    PoolOptions::<Job>::new()
      .name("basic_pool")
      .size(2)
      .debug(true)
      .on_task(|job, worker| async move {
        info!("Job {} starting on worker {}, will sleep for {}ms", job.id, worker, job.delay_ms);
        tokio::time::sleep(Duration::from_millis(job.delay_ms)).await;
      })
      .on_done(move |job, worker| {
        let done_tx = done_tx.clone();
        async move {
          info!("Job {} finished on worker {}", job.id, worker);
          let _ = done_tx.send(job.id);
        }
      }),
  );

  for id in 0..5 {
    let delay_ms = 200 + (id as u64 % 3 * 150);
    if pool.is_full() {
      info!("Pool is saturated, job {} will wait for a free worker.", id);
    }
    pool.submit(Job { id, delay_ms }).await.expect("Pool exited unexpectedly");
  }

  for _ in 0..5 {
    let _ = done_rx.recv().await;
  }

  info!("All jobs done. Shutting down pool.");
  pool.exit();
  pool.join().await;
  info!("--- Basic Usage Example End ---");
}
