use thiserror::Error;

/// Errors that can occur within the `worker_pools` crate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("size is less than or equal 0")]
  InvalidSize,

  #[error("task handler is not set")]
  MissingHandler,

  #[error("No Tokio runtime available to spawn pool workers: {0}")]
  NoRuntime(String),

  #[error("Pool is shutting down or already shut down, cannot accept new tasks")]
  PoolShuttingDown,

  #[error("All workers are busy, task was not handed off")]
  Saturated,
}
