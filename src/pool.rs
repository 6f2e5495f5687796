use crate::error::PoolError;
use crate::options::{PoolOptions, TaskCallback};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

// Worker lifecycle events are only interesting when a pool is being debugged.
macro_rules! lifecycle {
  ($debug:expr, $($arg:tt)+) => {
    if $debug {
      tracing::info!($($arg)+);
    } else {
      tracing::trace!($($arg)+);
    }
  };
}

/// A fixed number of workers consuming tasks from a zero-capacity intake.
///
/// Every worker runs the configured handler, then the optional completion
/// hook, for each task it accepts. [`submit`](Pool::submit) returns once a
/// worker has taken the task, not once the task has finished. Callers that
/// need a result embed their own reply channel in the task:
///
/// ```ignore
/// struct Lookup {
///   key: String,
///   reply: tokio::sync::mpsc::Sender<Option<String>>,
/// }
///
/// let (reply, mut rx) = tokio::sync::mpsc::channel(1);
/// pool.submit(Lookup { key, reply }).await?;
/// let value = rx.recv().await;
/// ```
///
/// Callbacks receive the task as an `Arc<T>`, shared between the handler and
/// the completion hook, so `T` must be `Send + Sync` and a callback can only
/// use `&T`. A reply sender whose `send` consumes it, such as
/// `tokio::sync::oneshot::Sender`, has to be wrapped so it can be taken out
/// through a shared reference, for example
/// `parking_lot::Mutex<Option<oneshot::Sender<R>>>`. A `mpsc::Sender` works
/// as is. Payloads that are not `Sync` need the same kind of wrapper.
pub struct Pool<T: Send + Sync + 'static> {
  pool_name: Arc<String>,
  size: usize,
  debug: bool,
  task_tx: kanal::AsyncSender<T>,
  in_flight: Arc<AtomicUsize>,
  shutdown_token: CancellationToken,
  worker_join_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> Pool<T> {
  /// Creates the pool and starts all of its workers.
  ///
  /// # Panics
  /// Panics when the options are invalid (zero size or no handler) or when
  /// no Tokio runtime is available. Use [`Pool::try_new`] to get the error
  /// back instead.
  pub fn new(options: PoolOptions<T>) -> Arc<Self> {
    match Self::try_new(options) {
      Ok(pool) => pool,
      Err(pool_error) => {
        error!("Pool construction failed: {}", pool_error);
        panic!("{}", pool_error);
      }
    }
  }

  pub fn try_new(options: PoolOptions<T>) -> Result<Arc<Self>, PoolError> {
    options.validate()?;
    let on_task = options.on_task.ok_or(PoolError::MissingHandler)?;
    let tokio_handle = match options.runtime {
      Some(handle) => handle,
      None => TokioHandle::try_current().map_err(|e| PoolError::NoRuntime(e.to_string()))?,
    };

    let pool_id = NEXT_POOL_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let pool_name = Arc::new(options.name.unwrap_or_else(|| format!("pool-{}", pool_id)));
    let (task_tx, task_rx) = kanal::bounded_async::<T>(0);
    let in_flight = Arc::new(AtomicUsize::new(0));

    let worker_join_handles: Vec<JoinHandle<()>> = (0..options.size)
      .map(|index| {
        let worker = Worker {
          pool_name: pool_name.clone(),
          index,
          task_rx: task_rx.clone(),
          in_flight: in_flight.clone(),
          on_task: on_task.clone(),
          on_done: options.on_done.clone(),
          idle_timeout: options.idle_timeout,
          debug: options.debug,
        };
        tokio_handle.spawn(
          worker
            .run()
            .instrument(info_span!("pool_worker", pool_name = %*pool_name, worker = index)),
        )
      })
      .collect();

    debug!(pool_name = %*pool_name, size = options.size, "Pool started.");

    Ok(Arc::new(Self {
      pool_name,
      size: options.size,
      debug: options.debug,
      task_tx,
      in_flight,
      shutdown_token: CancellationToken::new(),
      worker_join_handles: Mutex::new(worker_join_handles),
    }))
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// Number of workers.
  pub fn size(&self) -> usize {
    self.size
  }

  /// Number of tasks currently inside a handler or completion hook.
  pub fn in_flight(&self) -> usize {
    self.in_flight.load(AtomicOrdering::Acquire)
  }

  /// Advisory saturation probe: `true` while every worker is busy.
  ///
  /// The answer can be stale by the time the caller acts on it.
  pub fn is_full(&self) -> bool {
    self.in_flight() >= self.size
  }

  pub fn is_exited(&self) -> bool {
    self.shutdown_token.is_cancelled()
  }

  /// Hands `task` to a worker, waiting until one is free to accept it.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` once [`exit`](Pool::exit) has been
  /// called, including for a submission that was still waiting at that time.
  pub async fn submit(&self, task: T) -> Result<(), PoolError> {
    if self.shutdown_token.is_cancelled() {
      warn!(pool_name = %*self.pool_name, "Submit: Attempted to submit task to a pool that has exited.");
      return Err(PoolError::PoolShuttingDown);
    }

    match self.task_tx.send(task).await {
      Ok(()) => Ok(()),
      Err(send_error) => {
        debug!(pool_name = %*self.pool_name, "Submit: Intake closed while handing off task: {:?}", send_error);
        Err(PoolError::PoolShuttingDown)
      }
    }
  }

  /// Hands `task` to a worker only if one is waiting right now.
  ///
  /// The task is dropped when it could not be handed off.
  ///
  /// # Errors
  /// `PoolError::Saturated` when no worker is idle, `PoolError::PoolShuttingDown`
  /// after [`exit`](Pool::exit).
  pub fn try_submit(&self, task: T) -> Result<(), PoolError> {
    if self.shutdown_token.is_cancelled() {
      return Err(PoolError::PoolShuttingDown);
    }

    match self.task_tx.try_send(task) {
      Ok(true) => Ok(()),
      Ok(false) => Err(PoolError::Saturated),
      Err(_) => Err(PoolError::PoolShuttingDown),
    }
  }

  /// Broadcasts shutdown to every worker.
  ///
  /// Idle workers stop immediately. Busy workers finish their current task
  /// and then stop. Calling this more than once has no further effect.
  pub fn exit(&self) {
    if self.shutdown_token.is_cancelled() {
      debug!(pool_name = %*self.pool_name, "Exit already requested for this pool.");
      return;
    }

    lifecycle!(self.debug, pool_name = %*self.pool_name, "Exiting pool, signalling {} workers.", self.size);
    self.shutdown_token.cancel();
    let _ = self.task_tx.close();
  }

  /// Waits until every worker has stopped. Only returns after
  /// [`exit`](Pool::exit) has been called (or the pool was dropped).
  pub async fn join(&self) {
    let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_join_handles.lock());

    for handle in handles {
      if let Err(join_error) = handle.await {
        error!(pool_name = %*self.pool_name, "Error joining pool worker: {:?}", join_error);
      }
    }
  }
}

impl<T: Send + Sync + 'static> fmt::Debug for Pool<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Pool")
      .field("name", &self.pool_name)
      .field("size", &self.size)
      .field("in_flight", &self.in_flight())
      .field("exited", &self.is_exited())
      .finish_non_exhaustive()
  }
}

impl<T: Send + Sync + 'static> Drop for Pool<T> {
  fn drop(&mut self) {
    if !self.shutdown_token.is_cancelled() {
      info!(
        pool_name = %*self.pool_name,
        "Pool dropped without exit. Signalling workers to stop."
      );
      self.exit();
    }
  }
}

struct Worker<T> {
  pool_name: Arc<String>,
  index: usize,
  task_rx: kanal::AsyncReceiver<T>,
  in_flight: Arc<AtomicUsize>,
  on_task: TaskCallback<T>,
  on_done: Option<TaskCallback<T>>,
  idle_timeout: Option<Duration>,
  debug: bool,
}

impl<T: Send + Sync + 'static> Worker<T> {
  async fn run(self) {
    lifecycle!(self.debug, pool_name = %*self.pool_name, worker = self.index, "Worker started.");

    while let Some(task) = self.next_task().await {
      self.process(task).await;
    }

    lifecycle!(self.debug, pool_name = %*self.pool_name, worker = self.index, "Worker exited.");
  }

  /// Waits for the next task. `None` once the intake is closed.
  async fn next_task(&self) -> Option<T> {
    // The receive future lives across idle timeouts so a hand-off that is
    // already under way is never abandoned.
    let recv = self.task_rx.recv();
    tokio::pin!(recv);

    let received = match self.idle_timeout {
      None => recv.await,
      Some(idle_timeout) => loop {
        tokio::select! {
          result = &mut recv => break result,
          _ = tokio::time::sleep(idle_timeout) => {
            lifecycle!(
              self.debug,
              pool_name = %*self.pool_name,
              worker = self.index,
              "Worker idle for {:?}, still waiting for tasks.",
              idle_timeout
            );
          }
        }
      },
    };

    received.ok()
  }

  async fn process(&self, task: T) {
    let task = Arc::new(task);
    let in_flight = self.in_flight.fetch_add(1, AtomicOrdering::AcqRel) + 1;
    lifecycle!(self.debug, pool_name = %*self.pool_name, worker = self.index, in_flight, "Task received.");

    let index = self.index;
    let on_task = self.on_task.clone();
    let on_done = self.on_done.clone();
    let outcome = AssertUnwindSafe(async move {
      on_task(task.clone(), index).await;
      if let Some(on_done) = on_done {
        on_done(task, index).await;
      }
    })
    .catch_unwind()
    .await;

    self.in_flight.fetch_sub(1, AtomicOrdering::AcqRel);

    if outcome.is_err() {
      error!(
        pool_name = %*self.pool_name,
        worker = self.index,
        "Task handler panicked. Remaining callbacks for this task were skipped."
      );
    }
  }
}
