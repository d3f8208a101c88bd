//! Pinhole depth camera.
//!
//! The camera looks down `+z` with `+x` right and `+y` down. Depth images
//! store `z`, not range.

use glam::{Vec2, Vec3};

use super::config::{PinholeConfig, SensorConfig};
use super::SensorModel;
use crate::error::Result;

/// Pinhole camera with a frustum of four side planes plus near/far.
#[derive(Clone, Debug)]
pub struct PinholeCamera {
  config: SensorConfig,
  intrinsics: PinholeConfig,
  /// Inward unit normals of the left, right, top and bottom planes. All
  /// planes pass through the optical centre.
  side_normals: [Vec3; 4],
}

impl PinholeCamera {
  pub fn new(config: SensorConfig, intrinsics: PinholeConfig) -> Result<Self> {
    config.validate()?;
    intrinsics.validate()?;
    let PinholeConfig { fx, fy, cx, cy } = intrinsics;
    let (w, h) = (config.width as f32, config.height as f32);
    let side_normals = [
      Vec3::new(1.0, 0.0, cx / fx).normalize(),
      Vec3::new(-1.0, 0.0, (w - cx) / fx).normalize(),
      Vec3::new(0.0, 1.0, cy / fy).normalize(),
      Vec3::new(0.0, -1.0, (h - cy) / fy).normalize(),
    ];
    Ok(Self {
      config,
      intrinsics,
      side_normals,
    })
  }

  #[inline]
  pub fn intrinsics(&self) -> &PinholeConfig {
    &self.intrinsics
  }

  /// Ray through continuous pixel `pixel` with unit `z`.
  #[inline]
  pub fn back_project(&self, pixel: Vec2) -> Vec3 {
    let PinholeConfig { fx, fy, cx, cy } = self.intrinsics;
    Vec3::new((pixel.x - cx) / fx, (pixel.y - cy) / fy, 1.0)
  }
}

impl SensorModel for PinholeCamera {
  #[inline]
  fn config(&self) -> &SensorConfig {
    &self.config
  }

  #[inline]
  fn project_unclipped(&self, point_s: Vec3) -> Option<Vec2> {
    if point_s.z <= f32::EPSILON {
      return None;
    }
    let PinholeConfig { fx, fy, cx, cy } = self.intrinsics;
    Some(Vec2::new(
      fx * point_s.x / point_s.z + cx,
      fy * point_s.y / point_s.z + cy,
    ))
  }

  #[inline]
  fn measurement_from_point(&self, point_s: Vec3) -> f32 {
    point_s.z
  }

  fn point_in_frustum(&self, point_s: Vec3) -> bool {
    point_s.z >= self.config.near_plane
      && point_s.z <= self.config.far_plane
      && self.side_normals.iter().all(|n| n.dot(point_s) >= 0.0)
  }

  fn sphere_in_frustum(&self, centre_s: Vec3, radius: f32) -> bool {
    centre_s.z + radius >= self.config.near_plane
      && centre_s.z - radius <= self.config.far_plane
      && self.side_normals.iter().all(|n| n.dot(centre_s) >= -radius)
  }

  #[inline]
  fn pixel_dim_at(&self, point_s: Vec3) -> f32 {
    point_s.z.max(0.0) / self.intrinsics.fx
  }
}
