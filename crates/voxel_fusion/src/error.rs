//! Error type for fallible map operations.
//!
//! Tree invariant violations (bad child index, scale outside the block range,
//! missing parent) are programming errors and stay `debug_assert!`s. Everything
//! a caller can trigger with valid code is reported through [`MapError`].

use glam::IVec3;
use thiserror::Error;

/// Errors surfaced by map construction, allocation and fusion.
#[derive(Debug, Error)]
pub enum MapError {
  /// A configuration value is outside its supported range.
  #[error("invalid configuration: {reason}")]
  InvalidConfig { reason: String },

  /// The octant arena reached its configured capacity.
  #[error("octant arena exhausted ({capacity} octants)")]
  ArenaExhausted { capacity: usize },

  /// A handle does not refer to a live octant of the expected kind.
  #[error("octant handle does not refer to a live {expected}")]
  InvalidOctant { expected: &'static str },

  /// A voxel coordinate lies outside the octree.
  #[error("voxel coordinate {coord} is outside the octree")]
  OutOfBounds { coord: IVec3 },

  /// An input image does not match the sensor resolution.
  #[error("image is {actual:?} but the sensor expects {expected:?}")]
  ImageSizeMismatch {
    expected: (u32, u32),
    actual: (u32, u32),
  },

  /// The bounded worker pool could not be created.
  #[error("failed to build fusion thread pool")]
  ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl MapError {
  pub(crate) fn invalid_config(reason: impl Into<String>) -> Self {
    Self::InvalidConfig {
      reason: reason.into(),
    }
  }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, MapError>;
