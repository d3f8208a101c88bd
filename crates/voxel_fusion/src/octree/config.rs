//! OctreeConfig - octree extent, block size and allocation limit.

use super::geometry::round_up_pow2;
use crate::error::{MapError, Result};

/// Largest supported block edge length.
pub const MAX_BLOCK_SIZE: i32 = 64;

/// Configuration for octree construction.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OctreeConfig {
  /// Requested edge length in voxels. Rounded up to a power of two no
  /// smaller than twice the block size.
  pub size: i32,

  /// Block edge length in voxels. Power of two.
  pub block_size: i32,

  /// Maximum number of live octants (0 = unbounded).
  pub max_octants: usize,
}

impl OctreeConfig {
  pub const DEFAULT: Self = Self {
    size: 512,
    block_size: 8,
    max_octants: 0,
  };

  /// Edge length the octree is actually built with.
  #[inline]
  pub fn effective_size(&self) -> i32 {
    round_up_pow2(self.size).max(2 * self.block_size)
  }

  pub fn validate(&self) -> Result<()> {
    if self.block_size < 2
      || self.block_size > MAX_BLOCK_SIZE
      || (self.block_size & (self.block_size - 1)) != 0
    {
      return Err(MapError::invalid_config(format!(
        "block_size {} must be a power of two in [2, {MAX_BLOCK_SIZE}]",
        self.block_size
      )));
    }
    if self.size <= 0 || self.size > 1 << 30 {
      return Err(MapError::invalid_config(format!(
        "octree size {} must be in [1, 2^30]",
        self.size
      )));
    }
    if self.max_octants == 1 {
      return Err(MapError::invalid_config(
        "max_octants must leave room for more than the root",
      ));
    }
    Ok(())
  }
}

impl Default for OctreeConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_effective_size_rounds_up() {
    let config = OctreeConfig {
      size: 100,
      ..OctreeConfig::DEFAULT
    };
    assert_eq!(config.effective_size(), 128);
  }

  #[test]
  fn test_effective_size_at_least_two_blocks() {
    let config = OctreeConfig {
      size: 3,
      block_size: 8,
      max_octants: 0,
    };
    assert_eq!(config.effective_size(), 16);
  }

  #[test]
  fn test_validate_block_size() {
    let config = OctreeConfig {
      block_size: 6,
      ..OctreeConfig::DEFAULT
    };
    assert!(config.validate().is_err());
    assert!(OctreeConfig::DEFAULT.validate().is_ok());
  }
}
