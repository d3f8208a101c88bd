//! Map - an octree placed in the world.
//!
//! The octree works in integer voxel coordinates of the map frame `M`. The
//! map adds the metric resolution and the rigid transform to the world frame
//! `W`:
//!
//! ```text
//! point_M = T_MW * point_W
//! voxel   = floor(point_M / res)
//! ```

use glam::{Affine3A, IVec3, Vec3};

use crate::data::{FieldConfig, FieldData, VoxelData};
use crate::error::{MapError, Result};
use crate::octree::{InFrustum, Octree, OctreeConfig, OctreeIter};
use crate::sensor::SensorModel;

/// Extent, resolution and placement of a map.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MapConfig {
  /// Edge lengths in metres. The octree covers the largest one.
  pub dim: Vec3,
  /// Voxel edge length in metres.
  pub res: f32,
  /// World frame to map frame.
  pub t_mw: Affine3A,
  pub block_size: i32,
  /// Octant limit, 0 for unbounded.
  pub max_octants: usize,
}

impl MapConfig {
  /// 10 m cube at 10 cm with the map origin at the world origin.
  pub const DEFAULT: Self = Self {
    dim: Vec3::splat(10.0),
    res: 0.1,
    t_mw: Affine3A::IDENTITY,
    block_size: 8,
    max_octants: 0,
  };

  /// Map of `dim` metres whose centre sits at the world origin.
  pub fn centred(dim: Vec3, res: f32) -> Self {
    Self {
      dim,
      res,
      t_mw: Affine3A::from_translation(dim * 0.5),
      ..Self::DEFAULT
    }
  }

  pub fn octree_config(&self) -> OctreeConfig {
    OctreeConfig {
      size: (self.dim.max_element() / self.res).ceil() as i32,
      block_size: self.block_size,
      max_octants: self.max_octants,
    }
  }

  pub fn validate(&self) -> Result<()> {
    if !(self.res.is_finite() && self.res > 0.0) {
      return Err(MapError::invalid_config(format!(
        "resolution {} must be positive",
        self.res
      )));
    }
    if !self.dim.cmpgt(Vec3::ZERO).all() || !self.dim.is_finite() {
      return Err(MapError::invalid_config(format!(
        "map dimensions {} must be positive",
        self.dim
      )));
    }
    self.octree_config().validate()
  }
}

impl Default for MapConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// Octree with its metric frame and field parameters.
#[derive(Debug)]
pub struct Map<D: VoxelData> {
  octree: Octree<D>,
  res: f32,
  dim: Vec3,
  t_mw: Affine3A,
  t_wm: Affine3A,
  data_config: FieldConfig<D>,
}

impl<D: VoxelData> Map<D> {
  pub fn new(config: &MapConfig, data_config: FieldConfig<D>) -> Result<Self> {
    config.validate()?;
    D::Field::validate_config(&data_config)?;
    let octree = Octree::new(&config.octree_config())?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
      res = config.res,
      size = octree.size(),
      "map created"
    );

    Ok(Self {
      octree,
      res: config.res,
      dim: config.dim,
      t_mw: config.t_mw,
      t_wm: config.t_mw.inverse(),
      data_config,
    })
  }

  #[inline]
  pub fn res(&self) -> f32 {
    self.res
  }

  #[inline]
  pub fn dim(&self) -> Vec3 {
    self.dim
  }

  /// Map frame to world frame.
  #[inline]
  pub fn t_wm(&self) -> Affine3A {
    self.t_wm
  }

  /// World frame to map frame.
  #[inline]
  pub fn t_mw(&self) -> Affine3A {
    self.t_mw
  }

  #[inline]
  pub fn octree(&self) -> &Octree<D> {
    &self.octree
  }

  #[inline]
  pub fn octree_mut(&mut self) -> &mut Octree<D> {
    &mut self.octree
  }

  #[inline]
  pub fn data_config(&self) -> &FieldConfig<D> {
    &self.data_config
  }

  /// Octree and field parameters borrowed together.
  #[inline]
  pub(crate) fn split_mut(&mut self) -> (&mut Octree<D>, &FieldConfig<D>) {
    (&mut self.octree, &self.data_config)
  }

  /// Continuous voxel coordinates of a world point.
  #[inline]
  pub fn point_to_voxel_f(&self, point_w: Vec3) -> Vec3 {
    self.t_mw.transform_point3(point_w) / self.res
  }

  /// Voxel containing a world point, `None` outside the map.
  #[inline]
  pub fn point_to_voxel(&self, point_w: Vec3) -> Option<IVec3> {
    let voxel = self.point_to_voxel_f(point_w).floor().as_ivec3();
    self.octree.contains(voxel).then_some(voxel)
  }

  /// World position of a voxel centre.
  #[inline]
  pub fn voxel_to_point(&self, voxel: IVec3) -> Vec3 {
    self.octant_centre(voxel, 1)
  }

  /// World position of the centre of an octant.
  #[inline]
  pub fn octant_centre(&self, coord: IVec3, size: i32) -> Vec3 {
    let centre_m = (coord.as_vec3() + Vec3::splat(0.5 * size as f32)) * self.res;
    self.t_wm.transform_point3(centre_m)
  }

  #[inline]
  pub fn contains_point(&self, point_w: Vec3) -> bool {
    self.point_to_voxel(point_w).is_some()
  }

  /// Allocated blocks a sensor at `t_ws` (sensor to world) may see.
  pub fn blocks_in_frustum<'a, S: SensorModel + ?Sized>(
    &'a self,
    sensor: &'a S,
    t_ws: Affine3A,
  ) -> OctreeIter<'a, D, InFrustum<'a, S>> {
    let t_sm = t_ws.inverse() * self.t_wm;
    self.octree.iter_with(InFrustum::new(sensor, t_sm, self.res))
  }
}
