use crate::error::PoolError;

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;

/// Idle period after which a waiting worker emits a diagnostic, for callers
/// that want the diagnostic without picking their own cadence.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Type-erased async callback invoked by a worker with the task and the
/// worker's index.
pub(crate) type TaskCallback<T> = Arc<dyn Fn(Arc<T>, usize) -> BoxFuture<'static, ()> + Send + Sync + 'static>;

/// Configuration for a single [`Pool`](crate::Pool).
///
/// Built by chaining methods starting from [`PoolOptions::new`]. `size` and
/// `on_task` are required; everything else is optional.
pub struct PoolOptions<T> {
  pub(crate) size: usize,
  pub(crate) on_task: Option<TaskCallback<T>>,
  pub(crate) on_done: Option<TaskCallback<T>>,
  pub(crate) debug: bool,
  pub(crate) idle_timeout: Option<Duration>,
  pub(crate) name: Option<String>,
  pub(crate) runtime: Option<TokioHandle>,
}

impl<T> PoolOptions<T> {
  pub fn new() -> Self {
    Self {
      size: 0,
      on_task: None,
      on_done: None,
      debug: false,
      idle_timeout: None,
      name: None,
      runtime: None,
    }
  }

  /// Number of workers. Must be greater than zero.
  pub fn size(mut self, size: usize) -> Self {
    self.size = size;
    self
  }

  /// Handler run by a worker for every task it accepts.
  pub fn on_task<F, Fut>(mut self, handler: F) -> Self
  where
    F: Fn(Arc<T>, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.on_task = Some(erase(handler));
    self
  }

  /// Hook run by the same worker right after the handler returns.
  pub fn on_done<F, Fut>(mut self, hook: F) -> Self
  where
    F: Fn(Arc<T>, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    self.on_done = Some(erase(hook));
    self
  }

  /// Emits worker lifecycle events at `info` instead of `trace`.
  pub fn debug(mut self, debug: bool) -> Self {
    self.debug = debug;
    self
  }

  /// Logs a diagnostic whenever a worker waits this long without a task.
  /// The worker keeps waiting afterwards.
  pub fn idle_timeout(mut self, idle_timeout: Duration) -> Self {
    self.idle_timeout = Some(idle_timeout);
    self
  }

  /// Name used in log fields.
  pub fn name(mut self, name: &str) -> Self {
    self.name = Some(name.to_string());
    self
  }

  /// Runtime the workers are spawned on. Defaults to the current runtime.
  pub fn runtime(mut self, handle: TokioHandle) -> Self {
    self.runtime = Some(handle);
    self
  }

  pub fn validate(&self) -> Result<(), PoolError> {
    if self.size == 0 {
      return Err(PoolError::InvalidSize);
    }
    if self.on_task.is_none() {
      return Err(PoolError::MissingHandler);
    }
    Ok(())
  }
}

fn erase<T, F, Fut>(callback: F) -> TaskCallback<T>
where
  F: Fn(Arc<T>, usize) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  Arc::new(move |task, worker| callback(task, worker).boxed())
}

impl<T> Default for PoolOptions<T> {
  fn default() -> Self {
    Self::new()
  }
}

// Callbacks are shared, so cloning never requires `T: Clone`.
impl<T> Clone for PoolOptions<T> {
  fn clone(&self) -> Self {
    Self {
      size: self.size,
      on_task: self.on_task.clone(),
      on_done: self.on_done.clone(),
      debug: self.debug,
      idle_timeout: self.idle_timeout,
      name: self.name.clone(),
      runtime: self.runtime.clone(),
    }
  }
}

impl<T> fmt::Debug for PoolOptions<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PoolOptions")
      .field("size", &self.size)
      .field("on_task_is_some", &self.on_task.is_some())
      .field("on_done_is_some", &self.on_done.is_some())
      .field("debug", &self.debug)
      .field("idle_timeout", &self.idle_timeout)
      .field("name", &self.name)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_validate_rejects_zero_size() {
    let options = PoolOptions::<u32>::new().on_task(|_, _| async {});
    assert_eq!(options.validate(), Err(PoolError::InvalidSize));
  }

  #[test]
  fn test_validate_rejects_missing_handler() {
    let options = PoolOptions::<u32>::new().size(4);
    assert_eq!(options.validate(), Err(PoolError::MissingHandler));
  }

  #[test]
  fn test_validate_accepts_minimal_options() {
    let options = PoolOptions::<u32>::new().size(1).on_task(|_, _| async {});
    assert_eq!(options.validate(), Ok(()));
    assert!(options.on_done.is_none());
    assert!(options.idle_timeout.is_none());
    assert!(!options.debug);
  }

  #[test]
  fn test_clone_shares_callbacks() {
    let options = PoolOptions::<String>::new()
      .size(3)
      .name("cloned")
      .debug(true)
      .idle_timeout(DEFAULT_IDLE_TIMEOUT)
      .on_task(|_, _| async {})
      .on_done(|_, _| async {});
    let cloned = options.clone();

    assert_eq!(cloned.size, 3);
    assert_eq!(cloned.name.as_deref(), Some("cloned"));
    assert_eq!(cloned.idle_timeout, Some(Duration::from_secs(180)));
    assert!(cloned.debug);
    let (Some(a), Some(b)) = (&options.on_task, &cloned.on_task) else {
      panic!("handler should survive clone");
    };
    assert!(Arc::ptr_eq(a, b));
  }
}
