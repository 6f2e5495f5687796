use crate::error::PoolError;
use crate::options::PoolOptions;
use crate::pool::Pool;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};

/// A fixed set of independently configured pools, addressed by name.
///
/// The set of names is decided at construction. Addressing a name that was
/// not configured is a programming error and panics.
pub struct PoolSet<T: Send + Sync + 'static> {
  name_to_pool: HashMap<String, Arc<Pool<T>>>,
}

impl<T: Send + Sync + 'static> PoolSet<T> {
  /// Builds one pool per entry. Pools without an explicit name are named
  /// after their key.
  ///
  /// # Panics
  /// Panics if any entry's options are invalid, like [`Pool::new`].
  pub fn new(pool_set: HashMap<String, PoolOptions<T>>) -> Self {
    let name_to_pool = pool_set
      .into_iter()
      .map(|(name, options)| {
        let options = match options.name {
          Some(_) => options,
          None => options.name(&name),
        };
        (name, Pool::new(options))
      })
      .collect::<HashMap<_, _>>();

    debug!(pools = ?name_to_pool.keys().collect::<Vec<_>>(), "Pool set started.");
    Self { name_to_pool }
  }

  fn pool_or_panic(&self, name: &str) -> &Arc<Pool<T>> {
    match self.name_to_pool.get(name) {
      Some(pool) => pool,
      None => panic!("{} not exist", name),
    }
  }

  /// Hands `task` to the pool called `name`.
  ///
  /// # Panics
  /// Panics if no pool is called `name`.
  pub async fn submit(&self, name: &str, task: T) -> Result<(), PoolError> {
    self.pool_or_panic(name).submit(task).await
  }

  /// Non-blocking variant of [`submit`](PoolSet::submit).
  ///
  /// # Panics
  /// Panics if no pool is called `name`.
  pub fn try_submit(&self, name: &str, task: T) -> Result<(), PoolError> {
    self.pool_or_panic(name).try_submit(task)
  }

  /// # Panics
  /// Panics if no pool is called `name`.
  pub fn is_full(&self, name: &str) -> bool {
    self.pool_or_panic(name).is_full()
  }

  pub fn get(&self, name: &str) -> Option<&Arc<Pool<T>>> {
    self.name_to_pool.get(name)
  }

  pub fn names(&self) -> impl Iterator<Item = &str> {
    self.name_to_pool.keys().map(String::as_str)
  }

  pub fn len(&self) -> usize {
    self.name_to_pool.len()
  }

  pub fn is_empty(&self) -> bool {
    self.name_to_pool.is_empty()
  }

  /// Signals every pool to exit.
  pub fn exit(&self) {
    info!("Exiting {} pools.", self.name_to_pool.len());
    for pool in self.name_to_pool.values() {
      pool.exit();
    }
  }

  /// Waits for the workers of every pool to stop.
  pub async fn join(&self) {
    for pool in self.name_to_pool.values() {
      pool.join().await;
    }
  }
}

impl<T: Send + Sync + 'static> fmt::Debug for PoolSet<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_map().entries(self.name_to_pool.iter()).finish()
  }
}
