//! Sensor models consumed by the carver and the updater.
//!
//! Every model projects points given in its own frame `S` into pixel
//! coordinates. Pixel `(u, v)` covers `[u, u + 1) x [v, v + 1)`, so integer
//! pixel indices are the floor of the projection.
//!
//! # Models
//!
//! - [`PinholeCamera`]: depth images, measurement is the `z` coordinate
//! - [`Lidar`]: spherical range images, measurement is the range

pub mod config;
pub mod lidar;
pub mod pinhole;

use glam::{IVec2, Vec2, Vec3};

pub use config::{LidarConfig, PinholeConfig, SensorConfig};
pub use lidar::Lidar;
pub use pinhole::PinholeCamera;

use crate::image::PixelRect;

/// Distance in metres a block centre is shifted along its ray before a scale
/// change is accepted.
pub const HYSTERESIS_DISTANCE: f32 = 0.25;

/// Why a point has no pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProjectionFailure {
  /// The point cannot be projected at all (behind a camera, at the origin).
  Behind,
  /// The point projects outside the image.
  OutsideImage,
}

/// Projection model and frustum of a depth sensor.
pub trait SensorModel: Send + Sync {
  fn config(&self) -> &SensorConfig;

  #[inline]
  fn width(&self) -> u32 {
    self.config().width
  }

  #[inline]
  fn height(&self) -> u32 {
    self.config().height
  }

  #[inline]
  fn near_plane(&self) -> f32 {
    self.config().near_plane
  }

  #[inline]
  fn far_plane(&self) -> f32 {
    self.config().far_plane
  }

  /// Continuous pixel coordinates of `point_s`, possibly outside the image.
  fn project_unclipped(&self, point_s: Vec3) -> Option<Vec2>;

  /// Depth-like measurement `point_s` would produce.
  fn measurement_from_point(&self, point_s: Vec3) -> f32;

  fn point_in_frustum(&self, point_s: Vec3) -> bool;

  /// Conservative sphere test. May report spheres just outside as visible.
  fn sphere_in_frustum(&self, centre_s: Vec3, radius: f32) -> bool;

  /// Edge length in metres of one pixel back-projected to `point_s`.
  fn pixel_dim_at(&self, point_s: Vec3) -> f32;

  /// Continuous pixel coordinates of `point_s` inside the image.
  #[inline]
  fn project(&self, point_s: Vec3) -> Result<Vec2, ProjectionFailure> {
    let pixel = self
      .project_unclipped(point_s)
      .ok_or(ProjectionFailure::Behind)?;
    let inside = pixel.x >= 0.0
      && pixel.y >= 0.0
      && pixel.x < self.width() as f32
      && pixel.y < self.height() as f32;
    if inside {
      Ok(pixel)
    } else {
      Err(ProjectionFailure::OutsideImage)
    }
  }

  /// Smallest and largest measurement inside the box spanned by `corners_s`.
  ///
  /// Exact for measurements linear in the point, such as pinhole depth.
  fn measurement_range(&self, corners_s: &[Vec3; 8]) -> (f32, f32) {
    corners_s
      .iter()
      .map(|&corner| self.measurement_from_point(corner))
      .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), m| {
        (lo.min(m), hi.max(m))
      })
  }

  /// Integer pixel of `point_s`, if it falls inside the image.
  #[inline]
  fn project_to_pixel(&self, point_s: Vec3) -> Option<IVec2> {
    let pixel = self.project(point_s).ok()?.floor().as_ivec2();
    let max = IVec2::new(self.width() as i32 - 1, self.height() as i32 - 1);
    Some(pixel.min(max))
  }

  /// Scale a block centred at `block_centre_s` should integrate at.
  ///
  /// The back-projected pixel is compared to the voxel space diagonal against
  /// `pixel_voxel_ratio_per_scale`. An initialised block only changes scale
  /// when the decision still holds [`HYSTERESIS_DISTANCE`] further along the
  /// ray in the direction of the change.
  fn compute_integration_scale(
    &self,
    block_centre_s: Vec3,
    map_res: f32,
    last_scale: i32,
    min_scale: i32,
    max_block_scale: i32,
  ) -> i32 {
    let pv_ratio = self.pixel_dim_at(block_centre_s) / (3f32.sqrt() * map_res);
    let scale = (self
      .config()
      .pixel_voxel_ratio_per_scale
      .iter()
      .take_while(|&&ratio| pv_ratio >= ratio)
      .count() as i32)
      .min(max_block_scale);

    if min_scale == -1 || scale == last_scale {
      return scale;
    }
    let ray = block_centre_s.normalize_or_zero() * HYSTERESIS_DISTANCE;
    let shifted = if scale > last_scale {
      block_centre_s - ray
    } else {
      block_centre_s + ray
    };
    self.compute_integration_scale(shifted, map_res, last_scale, -1, max_block_scale)
  }

  /// Pixel rectangle covering the convex hull of `corners_s`.
  ///
  /// `None` if the hull projects entirely outside the image. Hulls that cannot
  /// be fully projected cover the whole image and are marked clipped.
  fn pixel_bounds(&self, corners_s: &[Vec3; 8]) -> Option<PixelRect> {
    let (width, height) = (self.width(), self.height());
    let mut min = Vec2::splat(f32::INFINITY);
    let mut max = Vec2::splat(f32::NEG_INFINITY);
    for &corner in corners_s {
      let Some(pixel) = self.project_unclipped(corner) else {
        return Some(PixelRect::full(width, height, true));
      };
      min = min.min(pixel);
      max = max.max(pixel);
    }
    clamp_rect(min.floor().as_ivec2(), max.floor().as_ivec2(), width, height)
  }
}

/// Clamp an inclusive rectangle to the image, `None` if disjoint.
pub(crate) fn clamp_rect(min: IVec2, max: IVec2, width: u32, height: u32) -> Option<PixelRect> {
  let limit = IVec2::new(width as i32 - 1, height as i32 - 1);
  if max.x < 0 || max.y < 0 || min.x > limit.x || min.y > limit.y {
    return None;
  }
  let clipped = min.cmplt(IVec2::ZERO).any() || max.cmpgt(limit).any();
  Some(PixelRect {
    min: min.max(IVec2::ZERO),
    max: max.min(limit),
    clipped,
  })
}

#[cfg(test)]
#[path = "sensor_test.rs"]
mod sensor_test;
