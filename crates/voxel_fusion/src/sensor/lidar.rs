//! Spinning LiDAR producing spherical range images.
//!
//! Columns sweep the full azimuth, rows the configured elevation band from
//! top to bottom:
//!
//! ```text
//! u = (1/2 - azimuth / 2pi) * width          azimuth = atan2(y, x)
//! v = (elev_max - elevation) / (elev_max - elev_min) * height
//! ```
//!
//! The image wraps horizontally, so a block behind the sensor may straddle
//! the first and last columns.

use std::f32::consts::{PI, TAU};

use glam::{IVec2, Vec2, Vec3};

use super::config::{LidarConfig, SensorConfig};
use super::{clamp_rect, SensorModel};
use crate::error::Result;
use crate::image::PixelRect;

#[derive(Clone, Debug)]
pub struct Lidar {
  config: SensorConfig,
  band: LidarConfig,
  elevation_min: f32,
  elevation_max: f32,
  /// `2 tan(max_ray_angle / 2)`: pixel chord per metre of range.
  pixel_dim_tan: f32,
}

impl Lidar {
  pub fn new(config: SensorConfig, band: LidarConfig) -> Result<Self> {
    config.validate()?;
    band.validate()?;
    let azimuth_step = 360.0 / config.width as f32;
    let elevation_step = (band.elevation_max_deg - band.elevation_min_deg) / config.height as f32;
    let max_ray_angle = azimuth_step.max(elevation_step).to_radians();
    Ok(Self {
      elevation_min: band.elevation_min_deg.to_radians(),
      elevation_max: band.elevation_max_deg.to_radians(),
      pixel_dim_tan: 2.0 * (0.5 * max_ray_angle).tan(),
      config,
      band,
    })
  }

  #[inline]
  pub fn band(&self) -> &LidarConfig {
    &self.band
  }

  #[inline]
  fn azimuth_to_u(&self, azimuth: f32) -> f32 {
    let width = self.config.width as f32;
    ((0.5 - azimuth / TAU) * width).rem_euclid(width)
  }

  #[inline]
  fn elevation_to_v(&self, elevation: f32) -> f32 {
    (self.elevation_max - elevation) / (self.elevation_max - self.elevation_min)
      * self.config.height as f32
  }

  #[inline]
  fn elevation(point_s: Vec3, range: f32) -> f32 {
    (point_s.z / range).clamp(-1.0, 1.0).asin()
  }

  /// Column span of the corners' azimuths, `None` when they surround the
  /// sensor's vertical axis or wrap across the image seam.
  fn column_span(&self, corners_s: &[Vec3; 8]) -> Option<(i32, i32)> {
    let mut azimuths = [0f32; 8];
    for (azimuth, corner) in azimuths.iter_mut().zip(corners_s) {
      if corner.x.abs() <= f32::EPSILON && corner.y.abs() <= f32::EPSILON {
        return None;
      }
      *azimuth = corner.y.atan2(corner.x);
    }
    azimuths.sort_unstable_by(f32::total_cmp);

    // The hull occupies the complement of the largest angular gap.
    let mut gap = azimuths[0] + TAU - azimuths[7];
    let mut start = azimuths[0];
    for pair in azimuths.windows(2) {
      if pair[1] - pair[0] > gap {
        gap = pair[1] - pair[0];
        start = pair[1];
      }
    }
    if gap < PI {
      return None;
    }
    let end = start + (TAU - gap);
    let width = self.config.width as f32;
    let u_hi = (0.5 - start / TAU) * width;
    let u_lo = (0.5 - end / TAU) * width;
    if u_lo < 0.0 || u_hi >= width {
      return None;
    }
    Some((u_lo.floor() as i32, u_hi.floor() as i32))
  }
}

impl SensorModel for Lidar {
  #[inline]
  fn config(&self) -> &SensorConfig {
    &self.config
  }

  #[inline]
  fn project_unclipped(&self, point_s: Vec3) -> Option<Vec2> {
    let range = point_s.length();
    if range <= f32::EPSILON {
      return None;
    }
    Some(Vec2::new(
      self.azimuth_to_u(point_s.y.atan2(point_s.x)),
      self.elevation_to_v(Self::elevation(point_s, range)),
    ))
  }

  #[inline]
  fn measurement_from_point(&self, point_s: Vec3) -> f32 {
    point_s.length()
  }

  fn point_in_frustum(&self, point_s: Vec3) -> bool {
    let range = point_s.length();
    if range < self.config.near_plane || range > self.config.far_plane {
      return false;
    }
    let elevation = Self::elevation(point_s, range);
    (self.elevation_min..=self.elevation_max).contains(&elevation)
  }

  fn sphere_in_frustum(&self, centre_s: Vec3, radius: f32) -> bool {
    let range = centre_s.length();
    if range - radius > self.config.far_plane || range + radius < self.config.near_plane {
      return false;
    }
    if range <= radius {
      return true;
    }
    let elevation = Self::elevation(centre_s, range);
    let outside_by = if elevation < self.elevation_min {
      self.elevation_min - elevation
    } else if elevation > self.elevation_max {
      elevation - self.elevation_max
    } else {
      return true;
    };
    // Distance from the centre to the cone bounding the band.
    outside_by.sin() * range <= radius
  }

  #[inline]
  fn pixel_dim_at(&self, point_s: Vec3) -> f32 {
    point_s.length() * self.pixel_dim_tan
  }

  /// The farthest point of a box is a corner; the nearest may lie on a face,
  /// so its range comes from the bounding sphere.
  fn measurement_range(&self, corners_s: &[Vec3; 8]) -> (f32, f32) {
    let (centre, radius) = bounding_sphere(corners_s);
    let far = corners_s.iter().map(|c| c.length()).fold(0.0f32, f32::max);
    ((centre.length() - radius).max(0.0), far)
  }

  /// Rows come from the bounding sphere of the corners, columns from their
  /// azimuths. Spans that wrap across the seam cover the full width.
  fn pixel_bounds(&self, corners_s: &[Vec3; 8]) -> Option<PixelRect> {
    let (width, height) = (self.config.width, self.config.height);
    let (centre, radius) = bounding_sphere(corners_s);
    let range = centre.length();
    if range <= radius {
      return Some(PixelRect::full(width, height, true));
    }

    let elevation = Self::elevation(centre, range);
    let half_angle = (radius / range).clamp(-1.0, 1.0).asin();
    let v_min = self.elevation_to_v(elevation + half_angle).floor() as i32;
    let v_max = self.elevation_to_v(elevation - half_angle).floor() as i32;

    let (u_min, u_max) = self
      .column_span(corners_s)
      .unwrap_or((0, width as i32 - 1));
    clamp_rect(
      IVec2::new(u_min.max(0), v_min),
      IVec2::new(u_max.min(width as i32 - 1), v_max),
      width,
      height,
    )
  }
}

/// Centroid of the corners and the distance to the farthest one.
fn bounding_sphere(corners_s: &[Vec3; 8]) -> (Vec3, f32) {
  let centre = corners_s.iter().copied().sum::<Vec3>() / 8.0;
  let radius = corners_s
    .iter()
    .map(|c| c.distance(centre))
    .fold(0.0f32, f32::max);
  (centre, radius)
}
