//! Worker pool for the parallel fusion phases.
//!
//! Fusion uses rayon fork-join loops throughout. By default they run on
//! rayon's global pool; a bounded pool keeps fusion off other work sharing
//! the process.
//!
//! # Usage
//!
//! ```ignore
//! let pool = FusionPool::with_threads(4)?;
//! let mut integrator = MapIntegrator::new(pool);
//! ```

use std::fmt;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::Result;

/// Where the fusion phases run.
#[derive(Default)]
pub struct FusionPool {
  /// `None` runs on rayon's global pool.
  pool: Option<ThreadPool>,
}

impl FusionPool {
  /// Run on rayon's global pool.
  pub fn global() -> Self {
    Self { pool: None }
  }

  /// Dedicated pool of `num_threads` workers, 0 for one per core.
  pub fn with_threads(num_threads: usize) -> Result<Self> {
    let pool = ThreadPoolBuilder::new()
      .num_threads(num_threads)
      .thread_name(|i| format!("fusion-{i}"))
      .build()?;

    #[cfg(feature = "tracing")]
    tracing::debug!(threads = pool.current_num_threads(), "fusion pool created");

    Ok(Self { pool: Some(pool) })
  }

  /// Run `op` with this pool as the target of nested rayon calls.
  pub fn install<OP, R>(&self, op: OP) -> R
  where
    OP: FnOnce() -> R + Send,
    R: Send,
  {
    match &self.pool {
      Some(pool) => pool.install(op),
      None => op(),
    }
  }

  pub fn num_threads(&self) -> usize {
    match &self.pool {
      Some(pool) => pool.current_num_threads(),
      None => rayon::current_num_threads(),
    }
  }
}

impl fmt::Debug for FusionPool {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FusionPool")
      .field("dedicated", &self.pool.is_some())
      .field("num_threads", &self.num_threads())
      .finish()
  }
}
