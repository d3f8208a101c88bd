//! VolumeCarver - frustum-driven allocation.
//!
//! Walks the octree from the root and decides, per octant, whether the frame
//! can affect it:
//!
//! ```text
//! outside frustum / no valid depth ─► skip
//! sensor inside octant            ─► descend (blocks: Gradient, clipped)
//! behind the surface band         ─► skip (Undefined)
//! node wholly in free space       ─► node_list
//! anything else                   ─► descend, allocating all children
//! block                           ─► block_list with its variance
//! ```
//!
//! The carver never fuses data. Every octant appears in at most one list.

use glam::{Affine3A, IVec3, Vec3};

use super::{MeasurementBounds, Measurements, Variance};
use crate::data::{Occupancy, VoxelData};
use crate::error::Result;
use crate::image::{DensePoolingImage, KnownStatus};
use crate::map::Map;
use crate::octree::{OctantId, Octree};
use crate::sensor::SensorModel;

/// Octants beyond the surface band by this multiple of `tau` are hidden;
/// octants in front of it by this multiple of `3 sigma` are free.
pub(super) const VARIANCE_BAND_FACTOR: f32 = 1.25;

/// Octants a frame touches, consumed by the updater.
#[derive(Clone, Debug, Default)]
pub struct VolumeCarverAllocation {
  /// Nodes lying entirely in free space.
  pub node_list: Vec<OctantId>,
  pub block_list: Vec<OctantId>,
  /// Variance of each entry of `block_list`.
  pub variance_list: Vec<Variance>,
  /// Whether each block projects fully inside the image onto valid depth.
  pub projects_inside_list: Vec<bool>,
}

impl VolumeCarverAllocation {
  #[inline]
  fn push_block(&mut self, id: OctantId, variance: Variance, projects_inside: bool) {
    self.block_list.push(id);
    self.variance_list.push(variance);
    self.projects_inside_list.push(projects_inside);
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.node_list.is_empty() && self.block_list.is_empty()
  }
}

/// One-shot allocator for a single frame.
pub struct VolumeCarver<'a, D: VoxelData, S: SensorModel + ?Sized> {
  octree: &'a mut Octree<D>,
  sensor: &'a S,
  pooling: DensePoolingImage,
  /// Max-pooled per-pixel sigma, if the frame carries one.
  sigma_pooling: Option<DensePoolingImage>,
  /// Map frame to sensor frame.
  t_sm: Affine3A,
  /// Sensor origin in continuous voxel coordinates.
  sensor_voxel: Vec3,
  res: f32,
  bounds: MeasurementBounds,
}

impl<'a, D, S> VolumeCarver<'a, D, S>
where
  D: VoxelData<Field = Occupancy>,
  S: SensorModel + ?Sized,
{
  pub fn new(map: &'a mut Map<D>, sensor: &'a S, measurements: &Measurements<'_>) -> Self {
    let res = map.res();
    let t_sm = measurements.t_sm(map.t_wm());
    let bounds = MeasurementBounds::new(map.data_config(), res);
    let sensor_voxel = Vec3::from(t_sm.inverse().translation) / res;
    let pooling = DensePoolingImage::new(measurements.depth, sensor.near_plane());
    // Any finite non-negative sigma is a measurement.
    let sigma_pooling = measurements
      .sigma
      .map(|sigma| DensePoolingImage::new(sigma, 0.0));
    Self {
      octree: map.octree_mut(),
      sensor,
      pooling,
      sigma_pooling,
      t_sm,
      sensor_voxel,
      res,
      bounds,
    }
  }

  /// Allocate and classify every octant the frame may affect.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "carver::carve"))]
  pub fn carve(mut self) -> Result<VolumeCarverAllocation> {
    let mut allocation = VolumeCarverAllocation::default();
    let root = self.octree.root();
    self.carve_octant(root, &mut allocation)?;

    #[cfg(feature = "tracing")]
    tracing::trace!(
      nodes = allocation.node_list.len(),
      blocks = allocation.block_list.len(),
      "carved"
    );

    Ok(allocation)
  }

  fn carve_octant(&mut self, id: OctantId, allocation: &mut VolumeCarverAllocation) -> Result<()> {
    let Some(octant) = self.octree.get(id) else {
      return Ok(());
    };
    let (coord, size, is_block) = (octant.coord(), octant.size(), octant.is_block());
    let is_leaf_node = octant.as_node().is_some_and(|node| node.is_leaf());

    let centre_m = (coord.as_vec3() + Vec3::splat(0.5 * size as f32)) * self.res;
    let radius = 0.5 * 3f32.sqrt() * size as f32 * self.res;
    if !self
      .sensor
      .sphere_in_frustum(self.t_sm.transform_point3(centre_m), radius)
    {
      return Ok(());
    }

    if self.sensor_inside(coord, size) {
      if is_block {
        allocation.push_block(id, Variance::Gradient, false);
        return Ok(());
      }
      return self.descend(id, allocation);
    }

    let corners = self.corners_s(coord, size);
    let Some(rect) = self.sensor.pixel_bounds(&corners) else {
      return Ok(());
    };
    let pixel = self.pooling.conservative_pixel(rect);
    if pixel.known == KnownStatus::Unknown {
      return Ok(());
    }

    let sigma = self
      .sigma_pooling
      .as_ref()
      .map(|pooling| pooling.conservative_pixel(rect))
      .filter(|sigma| sigma.known != KnownStatus::Unknown)
      .map(|sigma| sigma.max);

    let (dist_min, dist_max) = self.sensor.measurement_range(&corners);
    let variance = self.variance(dist_min, dist_max, pixel.min, pixel.max, sigma);
    if variance == Variance::Undefined {
      return Ok(());
    }
    let projects_inside = pixel.known == KnownStatus::Known && !pixel.crossing;

    if is_block {
      allocation.push_block(id, variance, projects_inside);
    } else if variance == Variance::Constant && projects_inside {
      if is_leaf_node {
        self.octree.aabb_extend(coord, size);
      }
      allocation.node_list.push(id);
    } else {
      self.descend(id, allocation)?;
    }
    Ok(())
  }

  fn descend(&mut self, id: OctantId, allocation: &mut VolumeCarverAllocation) -> Result<()> {
    let children = self.octree.allocate_all_children(id)?;
    for (child, _) in children {
      self.carve_octant(child, allocation)?;
    }
    Ok(())
  }

  #[inline]
  fn sensor_inside(&self, coord: IVec3, size: i32) -> bool {
    let min = coord.as_vec3();
    self.sensor_voxel.cmpge(min).all() && self.sensor_voxel.cmplt(min + size as f32).all()
  }

  fn corners_s(&self, coord: IVec3, size: i32) -> [Vec3; 8] {
    std::array::from_fn(|i| {
      let offset = IVec3::new((i & 1) as i32, ((i >> 1) & 1) as i32, ((i >> 2) & 1) as i32);
      let corner_m = (coord + offset * size).as_vec3() * self.res;
      self.t_sm.transform_point3(corner_m)
    })
  }

  /// Compare the octant's measurement range with the depth range it sees.
  ///
  /// `sigma_max` is the largest per-pixel sigma over the octant's pixels; the
  /// sigma model at `depth_max` is used without one.
  fn variance(
    &self,
    dist_min: f32,
    dist_max: f32,
    depth_min: f32,
    depth_max: f32,
    sigma_max: Option<f32>,
  ) -> Variance {
    let z_diff_max = dist_max - depth_min;
    let z_diff_min = dist_min - depth_max;
    let tau = self.bounds.tau(depth_max);
    let three_sigma = self.bounds.three_sigma(depth_max, sigma_max);

    if z_diff_min > VARIANCE_BAND_FACTOR * tau {
      Variance::Undefined
    } else if z_diff_max < -VARIANCE_BAND_FACTOR * three_sigma {
      Variance::Constant
    } else {
      Variance::Gradient
    }
  }
}
