//! Tokio-based fixed-size worker pools for bounding fan-out concurrency,
//! with saturation probing, named pool registries and key-sharded pools.

mod debuffer;
mod error;
mod options;
mod pool;
mod pool_set;
mod sharded;

pub use debuffer::{no_block, unbounded_handoff};
pub use error::PoolError;
pub use options::{PoolOptions, DEFAULT_IDLE_TIMEOUT};
pub use pool::Pool;
pub use pool_set::PoolSet;
pub use sharded::ShardedPool;
