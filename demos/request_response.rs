use worker_pools::{Pool, PoolError, PoolOptions};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// A lookup whose answer travels back on the channel carried by the task.
struct Lookup {
  key: String,
  reply: mpsc::Sender<Result<Option<u64>, String>>,
}

/// Turns the pool's fire-and-forget submission into a request/response call.
async fn lookup(pool: &Pool<Lookup>, key: &str) -> Result<Option<u64>, String> {
  let (reply, mut rx) = mpsc::channel(1);
  pool
    .submit(Lookup {
      key: key.to_string(),
      reply,
    })
    .await
    .map_err(|e: PoolError| e.to_string())?;
  rx.recv().await.unwrap_or_else(|| Err("worker dropped the reply".to_string()))
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_target(false).init();

  let table: Arc<HashMap<String, u64>> = Arc::new(HashMap::from([("a".to_string(), 1), ("b".to_string(), 2)]));
  let pool = Pool::new(PoolOptions::<Lookup>::new().name("table_pool").size(4).on_task(move |task, _| {
    let table = table.clone();
    async move {
      let outcome = if task.key.is_empty() {
        Err("empty key".to_string())
      } else {
        Ok(table.get(&task.key).copied())
      };
      let _ = task.reply.send(outcome).await;
    }
  }));

  for key in ["a", "b", "c", ""] {
    info!("lookup({:?}) = {:?}", key, lookup(&pool, key).await);
  }

  pool.exit();
  pool.join().await;
}
