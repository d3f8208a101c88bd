//! Sensor configuration shared by every model plus per-model intrinsics.

use glam::Affine3A;

use crate::error::{MapError, Result};

/// Resolution, range limits and scale selection thresholds of a sensor.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SensorConfig {
  /// Image width in pixels.
  pub width: u32,
  /// Image height in pixels.
  pub height: u32,
  /// Closest measurable distance in metres. Keep above zero.
  pub near_plane: f32,
  /// Farthest measurable distance in metres.
  pub far_plane: f32,
  /// Sensor frame to body frame.
  pub t_bs: Affine3A,
  /// Ascending pixel/voxel size ratios selecting the integration scale:
  /// a ratio below `[0]` integrates at scale 0, below `[1]` at scale 1, and
  /// so on.
  pub pixel_voxel_ratio_per_scale: Vec<f32>,
}

impl SensorConfig {
  pub fn validate(&self) -> Result<()> {
    if self.width == 0 || self.height == 0 {
      return Err(MapError::invalid_config("sensor resolution must be non-zero"));
    }
    if !(self.near_plane > 0.0 && self.far_plane > self.near_plane) {
      return Err(MapError::invalid_config(format!(
        "sensor planes must satisfy 0 < near ({}) < far ({})",
        self.near_plane, self.far_plane
      )));
    }
    if self
      .pixel_voxel_ratio_per_scale
      .windows(2)
      .any(|pair| pair[0] >= pair[1])
      || self.pixel_voxel_ratio_per_scale.iter().any(|&r| r <= 0.0)
    {
      return Err(MapError::invalid_config(
        "pixel_voxel_ratio_per_scale must be positive and strictly ascending",
      ));
    }
    Ok(())
  }
}

impl Default for SensorConfig {
  fn default() -> Self {
    Self {
      width: 640,
      height: 480,
      near_plane: 0.01,
      far_plane: 10.0,
      t_bs: Affine3A::IDENTITY,
      pixel_voxel_ratio_per_scale: vec![1.5, 3.0, 6.0],
    }
  }
}

/// Pinhole intrinsics in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PinholeConfig {
  pub fx: f32,
  pub fy: f32,
  pub cx: f32,
  pub cy: f32,
}

impl PinholeConfig {
  /// 640x480 RGB-D camera.
  pub const DEFAULT: Self = Self {
    fx: 525.0,
    fy: 525.0,
    cx: 320.0,
    cy: 240.0,
  };

  pub fn validate(&self) -> Result<()> {
    if !(self.fx > 0.0 && self.fy > 0.0) {
      return Err(MapError::invalid_config("focal lengths must be positive"));
    }
    Ok(())
  }
}

impl Default for PinholeConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// Elevation band of a spinning LiDAR. Azimuth always spans 360 degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LidarConfig {
  pub elevation_min_deg: f32,
  pub elevation_max_deg: f32,
}

impl LidarConfig {
  /// 64-beam sensor with a 45 degree vertical field of view.
  pub const DEFAULT: Self = Self {
    elevation_min_deg: -22.5,
    elevation_max_deg: 22.5,
  };

  pub fn validate(&self) -> Result<()> {
    if !(self.elevation_min_deg >= -90.0
      && self.elevation_max_deg <= 90.0
      && self.elevation_min_deg < self.elevation_max_deg)
    {
      return Err(MapError::invalid_config(
        "elevation band must satisfy -90 <= min < max <= 90",
      ));
    }
    Ok(())
  }
}

impl Default for LidarConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults_validate() {
    assert!(SensorConfig::default().validate().is_ok());
    assert!(PinholeConfig::DEFAULT.validate().is_ok());
    assert!(LidarConfig::DEFAULT.validate().is_ok());
  }

  #[test]
  fn test_ratios_must_ascend() {
    let config = SensorConfig {
      pixel_voxel_ratio_per_scale: vec![1.5, 1.5, 6.0],
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_planes_must_be_ordered() {
    let config = SensorConfig {
      near_plane: 2.0,
      far_plane: 1.0,
      ..Default::default()
    };
    assert!(config.validate().is_err());
  }
}
