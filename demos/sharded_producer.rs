use worker_pools::{PoolOptions, ShardedPool};
use std::time::Duration;
use tracing::info;

#[derive(Debug)]
struct Message {
  key: String,
  value: String,
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt().with_target(false).init();

  let producer = ShardedPool::new(
    3,
    PoolOptions::<Message>::new().name("publisher").on_task(|msg, worker| async move {
      tokio::time::sleep(Duration::from_millis(50)).await;
      info!("published key={} value={} (worker {})", msg.key, msg.value, worker);
    }),
  );

  for round in 0..3 {
    for user in ["u1", "u2", "u3", "u4"] {
      info!("{} -> shard {}", user, producer.shard_for(user));
      producer
        .submit(
          user,
          Message {
            key: user.to_string(),
            value: format!("event-{}", round),
          },
        )
        .await
        .expect("Producer exited unexpectedly");
    }
  }

  producer.exit();
  producer.join().await;
}
