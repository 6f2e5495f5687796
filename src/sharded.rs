use crate::error::PoolError;
use crate::options::PoolOptions;
use crate::pool::Pool;

use std::fmt;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::debug;

/// Routes tasks to one of several single-worker pools by hashing a key.
///
/// All tasks for a given key land on the same shard, so tasks submitted one
/// after another for that key are handled in order, while different keys
/// are handled in parallel.
pub struct ShardedPool<T: Send + Sync + 'static> {
  shards: Vec<Arc<Pool<T>>>,
}

impl<T: Send + Sync + 'static> ShardedPool<T> {
  /// Starts `shard_count` pools from `options`. The configured size is
  /// replaced by one worker per shard and shards are named `<name>-shard-<i>`.
  ///
  /// # Panics
  /// Panics if `shard_count` is zero or the options are otherwise invalid.
  pub fn new(shard_count: usize, options: PoolOptions<T>) -> Self {
    if shard_count == 0 {
      panic!("{}", PoolError::InvalidSize);
    }

    let base_name = options.name.clone().unwrap_or_else(|| "sharded".to_string());
    let shards: Vec<Arc<Pool<T>>> = (0..shard_count)
      .map(|index| {
        let shard_options = options.clone().size(1).name(&format!("{}-shard-{}", base_name, index));
        Pool::new(shard_options)
      })
      .collect();

    debug!(name = %base_name, shard_count, "Sharded pool started.");
    Self { shards }
  }

  pub fn shard_count(&self) -> usize {
    self.shards.len()
  }

  /// The shard index `key` is routed to. Stable across processes.
  pub fn shard_for(&self, key: &str) -> usize {
    shard_index(key, self.shards.len())
  }

  pub fn shard(&self, index: usize) -> Option<&Arc<Pool<T>>> {
    self.shards.get(index)
  }

  pub async fn submit(&self, key: &str, task: T) -> Result<(), PoolError> {
    self.shards[self.shard_for(key)].submit(task).await
  }

  /// Whether the shard serving `key` is busy.
  pub fn is_full(&self, key: &str) -> bool {
    self.shards[self.shard_for(key)].is_full()
  }

  pub fn exit(&self) {
    for shard in &self.shards {
      shard.exit();
    }
  }

  pub async fn join(&self) {
    for shard in &self.shards {
      shard.join().await;
    }
  }
}

impl<T: Send + Sync + 'static> fmt::Debug for ShardedPool<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedPool").field("shards", &self.shards).finish()
  }
}

fn shard_index(key: &str, shard_count: usize) -> usize {
  let digest = Sha256::digest(key.as_bytes());
  let mut prefix = [0u8; 8];
  prefix.copy_from_slice(&digest[..8]);
  (u64::from_be_bytes(prefix) % shard_count as u64) as usize
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn test_shard_index_is_stable() {
    for key in ["user-1", "user-2", "", "a much longer routing key"] {
      assert_eq!(shard_index(key, 7), shard_index(key, 7));
      assert!(shard_index(key, 7) < 7);
    }
  }

  #[test]
  fn test_single_shard_takes_every_key() {
    for i in 0..50 {
      assert_eq!(shard_index(&format!("key-{}", i), 1), 0);
    }
  }

  #[test]
  fn test_keys_spread_over_shards() {
    let used: HashSet<usize> = (0..200).map(|i| shard_index(&format!("key-{}", i), 4)).collect();
    assert_eq!(used.len(), 4);
  }
}
