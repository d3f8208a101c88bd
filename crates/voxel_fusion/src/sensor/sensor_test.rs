use glam::{Vec2, Vec3};

use super::*;

fn camera() -> PinholeCamera {
  PinholeCamera::new(SensorConfig::default(), PinholeConfig::DEFAULT).expect("camera")
}

fn lidar() -> Lidar {
  let config = SensorConfig {
    width: 1024,
    height: 64,
    near_plane: 0.5,
    far_plane: 60.0,
    ..Default::default()
  };
  Lidar::new(config, LidarConfig::DEFAULT).expect("lidar")
}

fn cube_corners(min: Vec3, size: f32) -> [Vec3; 8] {
  std::array::from_fn(|i| {
    min + Vec3::new((i & 1) as f32, ((i >> 1) & 1) as f32, ((i >> 2) & 1) as f32) * size
  })
}

// =========================================================================
// Pinhole
// =========================================================================

#[test]
fn test_pinhole_projects_principal_point() {
  let camera = camera();
  let pixel = camera.project(Vec3::new(0.0, 0.0, 2.0)).expect("project");
  assert_eq!(pixel, Vec2::new(320.0, 240.0));
  assert_eq!(camera.measurement_from_point(Vec3::new(1.0, 1.0, 2.0)), 2.0);
}

#[test]
fn test_pinhole_projection_failures() {
  let camera = camera();
  assert_eq!(
    camera.project(Vec3::new(0.0, 0.0, -1.0)),
    Err(ProjectionFailure::Behind)
  );
  assert_eq!(
    camera.project(Vec3::new(5.0, 0.0, 1.0)),
    Err(ProjectionFailure::OutsideImage)
  );
}

#[test]
fn test_pinhole_back_project_inverts_projection() {
  let camera = camera();
  let point = Vec3::new(0.3, -0.2, 1.5);
  let pixel = camera.project(point).expect("project");
  let ray = camera.back_project(pixel);
  assert!((ray * point.z - point).length() < 1e-5);
}

#[test]
fn test_pinhole_frustum_tests() {
  let camera = camera();
  assert!(camera.point_in_frustum(Vec3::new(0.0, 0.0, 1.0)));
  assert!(!camera.point_in_frustum(Vec3::new(0.0, 0.0, 11.0)));
  assert!(!camera.point_in_frustum(Vec3::new(2.0, 0.0, 1.0)));

  // Sphere just left of the frustum but overlapping it.
  assert!(camera.sphere_in_frustum(Vec3::new(-0.7, 0.0, 1.0), 0.2));
  assert!(!camera.sphere_in_frustum(Vec3::new(-3.0, 0.0, 1.0), 0.2));
  assert!(!camera.sphere_in_frustum(Vec3::new(0.0, 0.0, -1.0), 0.5));
}

#[test]
fn test_pinhole_pixel_bounds() {
  let camera = camera();

  let rect = camera
    .pixel_bounds(&cube_corners(Vec3::new(-0.05, -0.05, 1.0), 0.1))
    .expect("visible");
  assert!(!rect.clipped);
  assert!(rect.min.x <= 320 && rect.max.x >= 320);
  assert!(rect.min.y <= 240 && rect.max.y >= 240);

  let clipped = camera
    .pixel_bounds(&cube_corners(Vec3::new(0.5, -0.05, 1.0), 0.2))
    .expect("partly visible");
  assert!(clipped.clipped);
  assert_eq!(clipped.max.x, 639);

  assert!(camera
    .pixel_bounds(&cube_corners(Vec3::new(-5.0, 0.0, 1.0), 0.5))
    .is_none());
}

/// Corners behind the camera force a full, clipped rectangle.
#[test]
fn test_pinhole_pixel_bounds_behind() {
  let camera = camera();
  let rect = camera
    .pixel_bounds(&cube_corners(Vec3::new(-0.5, -0.5, -0.2), 1.0))
    .expect("bounds");
  assert!(rect.clipped);
  assert_eq!(rect, crate::image::PixelRect::full(640, 480, true));
}

// =========================================================================
// Integration scale
// =========================================================================

#[test]
fn test_integration_scale_grows_with_distance() {
  let camera = camera();
  let res = 0.01;
  let scale_at = |z: f32| camera.compute_integration_scale(Vec3::new(0.0, 0.0, z), res, 0, -1, 3);
  assert_eq!(scale_at(1.0), 0);
  assert_eq!(scale_at(20.0), 1);
  assert_eq!(scale_at(40.0), 2);
  assert_eq!(scale_at(80.0), 3);
  assert_eq!(scale_at(400.0), 3);
}

/// The scale 0/1 threshold sits near z = 13.64 m at 1 cm resolution.
#[test]
fn test_integration_scale_hysteresis() {
  let camera = camera();
  let res = 0.01;
  let centre = Vec3::new(0.0, 0.0, 13.8);

  // Fresh blocks take the raw recommendation.
  assert_eq!(camera.compute_integration_scale(centre, res, 0, -1, 3), 1);
  // Initialised blocks need the decision to hold 0.25 m closer.
  assert_eq!(camera.compute_integration_scale(centre, res, 0, 0, 3), 0);
  let farther = Vec3::new(0.0, 0.0, 14.0);
  assert_eq!(camera.compute_integration_scale(farther, res, 0, 0, 3), 1);
}

// =========================================================================
// LiDAR
// =========================================================================

#[test]
fn test_lidar_projection() {
  let lidar = lidar();
  let forward = lidar.project(Vec3::new(5.0, 0.0, 0.0)).expect("project");
  assert!((forward - Vec2::new(512.0, 32.0)).length() < 1e-3);

  let left = lidar.project(Vec3::new(0.0, 5.0, 0.0)).expect("project");
  assert!((left.x - 256.0).abs() < 1e-3);

  let behind = lidar.project(Vec3::new(-5.0, 0.0, 0.0)).expect("project");
  assert!(behind.x.abs() < 1e-3);

  assert_eq!(
    lidar.project(Vec3::new(1.0, 0.0, 2.0)),
    Err(ProjectionFailure::OutsideImage)
  );
  assert_eq!(lidar.measurement_from_point(Vec3::new(3.0, 4.0, 0.0)), 5.0);
}

#[test]
fn test_lidar_frustum_tests() {
  let lidar = lidar();
  assert!(lidar.point_in_frustum(Vec3::new(10.0, 0.0, 1.0)));
  assert!(!lidar.point_in_frustum(Vec3::new(1.0, 0.0, 1.0)));
  assert!(!lidar.point_in_frustum(Vec3::new(0.1, 0.0, 0.0)));

  // Centre 4 degrees above the band, about 0.79 m from its cone.
  let centre = Vec3::new(10.0, 0.0, 5.0);
  assert!(lidar.sphere_in_frustum(centre, 1.0));
  assert!(!lidar.sphere_in_frustum(centre, 0.5));
}

#[test]
fn test_lidar_pixel_bounds_in_front() {
  let lidar = lidar();
  let rect = lidar
    .pixel_bounds(&cube_corners(Vec3::new(5.0, -0.1, -0.1), 0.2))
    .expect("visible");
  assert!(rect.min.x <= 512 && rect.max.x >= 511);
  assert!(rect.max.x - rect.min.x < 16);
  assert!(!rect.clipped);
}

/// Blocks straddling the image seam cover the full width.
#[test]
fn test_lidar_pixel_bounds_wrap() {
  let lidar = lidar();
  let rect = lidar
    .pixel_bounds(&cube_corners(Vec3::new(-5.2, -0.1, -0.1), 0.2))
    .expect("visible");
  assert_eq!((rect.min.x, rect.max.x), (0, 1023));
}

#[test]
fn test_lidar_pixel_bounds_above_band() {
  let lidar = lidar();
  assert!(lidar
    .pixel_bounds(&cube_corners(Vec3::new(-0.5, -0.5, 3.0), 1.0))
    .is_none());
}
