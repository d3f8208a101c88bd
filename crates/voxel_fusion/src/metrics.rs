//! Fusion timing and per-frame counters.
//!
//! Compiled in with the `metrics` feature and toggled at runtime through
//! [`COLLECT_METRICS`]. Without the feature every `record_*` call is a no-op.
//!
//! # Usage
//!
//! ```ignore
//! use voxel_fusion::metrics::COLLECT_METRICS;
//!
//! COLLECT_METRICS.store(false, Ordering::Relaxed);
//!
//! integrator.integrate_depth(&mut map, &camera, &measurements, None)?;
//! let avg_update_us = integrator.metrics().update_us.average();
//! ```

use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
#[cfg(feature = "metrics")]
use std::sync::atomic::Ordering;

use crate::integrator::FrameStats;

/// Runtime toggle for metrics collection.
pub static COLLECT_METRICS: AtomicBool = AtomicBool::new(true);

/// True if metrics are compiled in and switched on.
#[inline]
pub fn is_enabled() -> bool {
  #[cfg(feature = "metrics")]
  {
    COLLECT_METRICS.load(Ordering::Relaxed)
  }
  #[cfg(not(feature = "metrics"))]
  {
    false
  }
}

/// Fixed-capacity history, oldest values evicted first.
#[derive(Debug, Clone)]
pub struct RollingWindow<T> {
  buffer: VecDeque<T>,
  capacity: usize,
}

impl<T> RollingWindow<T> {
  pub fn new(capacity: usize) -> Self {
    Self {
      buffer: VecDeque::with_capacity(capacity),
      capacity: capacity.max(1),
    }
  }

  pub fn push(&mut self, value: T) {
    if self.buffer.len() >= self.capacity {
      self.buffer.pop_front();
    }
    self.buffer.push_back(value);
  }

  pub fn len(&self) -> usize {
    self.buffer.len()
  }

  pub fn is_empty(&self) -> bool {
    self.buffer.is_empty()
  }

  pub fn clear(&mut self) {
    self.buffer.clear();
  }

  /// Oldest to newest.
  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.buffer.iter()
  }

  pub fn last(&self) -> Option<&T> {
    self.buffer.back()
  }
}

impl RollingWindow<u64> {
  pub fn sum(&self) -> u64 {
    self.buffer.iter().sum()
  }

  pub fn average(&self) -> f64 {
    if self.buffer.is_empty() {
      0.0
    } else {
      self.sum() as f64 / self.buffer.len() as f64
    }
  }

  pub fn min_max(&self) -> Option<(u64, u64)> {
    let min = self.buffer.iter().min()?;
    let max = self.buffer.iter().max()?;
    Some((*min, *max))
  }
}

impl Default for RollingWindow<u64> {
  fn default() -> Self {
    Self::new(128)
  }
}

/// Timing history and totals of fused frames.
#[derive(Debug, Clone, Default)]
pub struct FusionMetrics {
  /// Carver time per frame in microseconds.
  pub carve_us: RollingWindow<u64>,
  /// Updater time per frame (fusion and propagation) in microseconds.
  pub update_us: RollingWindow<u64>,
  /// Frames recorded.
  pub frames: u64,
  pub total_pruned_nodes: u64,
  pub total_scale_switches: u64,
  /// Counters of the most recent frame.
  pub last: FrameStats,
}

impl FusionMetrics {
  /// Record one fused frame. No-op unless [`is_enabled`].
  pub fn record_frame(&mut self, stats: &FrameStats, carve_us: u64, update_us: u64) {
    if !is_enabled() {
      return;
    }
    self.carve_us.push(carve_us);
    self.update_us.push(update_us);
    self.frames += 1;
    self.total_pruned_nodes += stats.pruned_nodes as u64;
    self.total_scale_switches += stats.scale_switches as u64;
    self.last = *stats;
  }

  pub fn reset(&mut self) {
    *self = Self::default();
  }
}
