//! Test fixtures shared by the fusion tests.
//!
//! The standard scene is an 8 m map at 12.5 cm centred on the world origin,
//! with a small pinhole camera at the origin looking down `+z` at a wall.

use glam::{Affine3A, Vec3};

use crate::data::{OccupancyConfig, OccupancyData};
use crate::image::DepthImage;
use crate::map::{Map, MapConfig};
use crate::sensor::{PinholeCamera, PinholeConfig, SensorConfig};

pub const WIDTH: u32 = 160;
pub const HEIGHT: u32 = 120;
pub const RES: f32 = 0.125;
pub const DIM: f32 = 8.0;

/// 160x120 camera with a 62 degree horizontal field of view.
pub fn camera() -> PinholeCamera {
  let config = SensorConfig {
    width: WIDTH,
    height: HEIGHT,
    near_plane: 0.1,
    far_plane: 6.0,
    ..Default::default()
  };
  let intrinsics = PinholeConfig {
    fx: 131.25,
    fy: 131.25,
    cx: 80.0,
    cy: 60.0,
  };
  PinholeCamera::new(config, intrinsics).expect("camera")
}

/// Same image as [`camera`] with a 126 by 113 degree field of view, so that
/// whole blocks one metre ahead fit in the image.
pub fn wide_camera() -> PinholeCamera {
  let config = SensorConfig {
    width: WIDTH,
    height: HEIGHT,
    near_plane: 0.1,
    far_plane: 6.0,
    ..Default::default()
  };
  let intrinsics = PinholeConfig {
    fx: 40.0,
    fy: 40.0,
    cx: 80.0,
    cy: 60.0,
  };
  PinholeCamera::new(config, intrinsics).expect("camera")
}

pub fn map_config() -> MapConfig {
  MapConfig::centred(Vec3::splat(DIM), RES)
}

pub fn map() -> Map<OccupancyData> {
  Map::new(&map_config(), OccupancyConfig::DEFAULT).expect("map")
}

/// Fronto-parallel wall at `depth` metres filling the whole image.
pub fn wall(depth: f32) -> DepthImage {
  DepthImage::new(WIDTH, HEIGHT, depth)
}

/// Wall at `depth` with the columns left of `hole_width` missing.
pub fn wall_with_hole(depth: f32, hole_width: u32) -> DepthImage {
  DepthImage::from_fn(WIDTH, HEIGHT, |x, _| if x < hole_width { 0.0 } else { depth })
}

/// Camera at the world origin looking down `+z`.
pub fn origin_pose() -> Affine3A {
  Affine3A::IDENTITY
}
