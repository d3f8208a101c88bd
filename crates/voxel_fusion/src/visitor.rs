//! Visitor - read-only queries on a fused octree.
//!
//! Point queries take integer voxel coordinates; interpolation and gradient
//! queries take continuous voxel coordinates, where voxel `v` spans
//! `[v, v + 1)` and its sample sits at the centre. The `*_at_point`
//! variants work in the world frame of a [`Map`].
//!
//! # Multi-resolution sampling
//!
//! Interpolation starts at the finest scale the queried block holds (or the
//! desired scale if coarser) and moves one scale coarser whenever a
//! neighbour is missing or only stored coarser:
//!
//! ```text
//! scale s:   8 neighbours available at s? ──yes──► trilinear at s
//!                       │ no
//!                       ▼
//!            s + 1 ... max block scale ─────────► None
//! ```
//!
//! Any neighbour without valid data makes the whole query `None`.
//!
//! Queries must not run concurrently with fusion into the same octree.

use std::ops::{Add, Mul};

use glam::{IVec3, Vec3};

use crate::data::{ColourData, FieldData, VoxelData};
use crate::map::Map;
use crate::octree::fetcher;
use crate::octree::geometry::{child_offset, scale_to_size, size_to_scale, NUM_CHILDREN};
use crate::octree::{Octant, Octree};

// =============================================================================
// Point queries
// =============================================================================

/// Data of the voxel at the scale it is stored at; default if unallocated.
pub fn get_data<D: VoxelData>(octree: &Octree<D>, voxel: IVec3) -> D {
  match fetcher::leaf(octree, voxel) {
    Some((_, Octant::Block(block))) => block.current_data(voxel),
    Some((_, Octant::Node(node))) => node.data(),
    None => D::default(),
  }
}

/// Data of the voxel at `desired_scale` or the finest coarser scale stored,
/// with the scale actually returned.
pub fn get_data_at_scale<D: VoxelData>(
  octree: &Octree<D>,
  voxel: IVec3,
  desired_scale: i32,
) -> (D, i32) {
  match fetcher::leaf(octree, voxel) {
    Some((_, Octant::Block(block))) => {
      let scale = desired_scale.clamp(block.current_scale(), block.max_scale());
      (block.data(voxel, scale), scale)
    }
    Some((_, Octant::Node(node))) => (node.data(), desired_scale),
    None => (D::default(), desired_scale),
  }
}

/// Minimum summary of the octant of `desired_scale` containing `voxel`.
pub fn get_min_data<D: VoxelData>(octree: &Octree<D>, voxel: IVec3, desired_scale: i32) -> D {
  match fetcher::octant(octree, voxel, desired_scale) {
    Some((_, Octant::Block(block))) => {
      let scale = desired_scale.clamp(block.current_scale(), block.max_scale());
      block.min_data(voxel, scale)
    }
    Some((_, Octant::Node(node))) => *node.min_data(),
    None => D::default(),
  }
}

/// Maximum summary of the octant of `desired_scale` containing `voxel`.
pub fn get_max_data<D: VoxelData>(octree: &Octree<D>, voxel: IVec3, desired_scale: i32) -> D {
  match fetcher::octant(octree, voxel, desired_scale) {
    Some((_, Octant::Block(block))) => {
      let scale = desired_scale.clamp(block.current_scale(), block.max_scale());
      block.max_data(voxel, scale)
    }
    Some((_, Octant::Node(node))) => *node.max_data(),
    None => D::default(),
  }
}

/// Field value of the voxel, `None` if it holds no valid data.
pub fn get_field<D: VoxelData>(octree: &Octree<D>, voxel: IVec3) -> Option<f32> {
  let data = get_data(octree, voxel);
  data.is_valid().then(|| data.field().field_value())
}

// =============================================================================
// Interpolation
// =============================================================================

/// Outcome of sampling the eight neighbours at one scale.
enum Sample<T> {
  Value(T),
  /// A neighbour holds no valid data.
  Invalid,
  /// A neighbour is missing or stored only at a coarser scale.
  Unavailable,
}

#[inline]
fn field_of<D: VoxelData>(data: &D) -> Option<f32> {
  data.is_valid().then(|| data.field().field_value())
}

#[inline]
fn colour_of<D: VoxelData>(data: &D) -> Option<Vec3> {
  if !data.is_valid() {
    return None;
  }
  data.colour().to_vec3()
}

fn trilinear<T>(values: &[T; NUM_CHILDREN], t: Vec3) -> T
where
  T: Copy + Add<Output = T> + Mul<f32, Output = T>,
{
  let tc = Vec3::ONE - t;
  (((values[0] * tc.x + values[1] * t.x) * tc.y + (values[2] * tc.x + values[3] * t.x) * t.y)
    * tc.z)
    + (((values[4] * tc.x + values[5] * t.x) * tc.y + (values[6] * tc.x + values[7] * t.x) * t.y)
      * t.z)
}

/// Trilinear sample of `voxel_f` from the eight voxel centres around it at
/// `scale`.
fn sample_at_scale<D, T>(
  octree: &Octree<D>,
  voxel_f: Vec3,
  scale: i32,
  get: &impl Fn(&D) -> Option<T>,
) -> Sample<T>
where
  D: VoxelData,
  T: Copy + Default + Add<Output = T> + Mul<f32, Output = T>,
{
  let stride = scale_to_size(scale);
  let base_f = voxel_f / stride as f32 - Vec3::splat(0.5);
  let base = base_f.floor().as_ivec3() * stride;

  let mut values = [T::default(); NUM_CHILDREN];
  for (idx, value) in values.iter_mut().enumerate() {
    let coord = base + child_offset(idx as u8) * stride;
    let data = match fetcher::leaf(octree, coord) {
      None => return Sample::Unavailable,
      Some((_, Octant::Block(block))) if scale < block.current_scale() => {
        return Sample::Unavailable
      }
      Some((_, Octant::Block(block))) => block.data(coord, scale),
      Some((_, Octant::Node(node))) => node.data(),
    };
    match get(&data) {
      Some(v) => *value = v,
      None => return Sample::Invalid,
    }
  }
  Sample::Value(trilinear(&values, base_f - base_f.floor()))
}

fn interp<D, T>(
  octree: &Octree<D>,
  voxel_f: Vec3,
  desired_scale: i32,
  get: impl Fn(&D) -> Option<T>,
) -> Option<(T, i32)>
where
  D: VoxelData,
  T: Copy + Default + Add<Output = T> + Mul<f32, Output = T>,
{
  let voxel = voxel_f.floor().as_ivec3();
  if !octree.aabb().contains(voxel) {
    return None;
  }
  let (_, leaf) = fetcher::leaf(octree, voxel)?;
  let init_scale = match leaf {
    Octant::Block(block) => block.current_scale().max(desired_scale),
    Octant::Node(_) => 0,
  };

  for scale in init_scale..=octree.max_block_scale() {
    match sample_at_scale(octree, voxel_f, scale, &get) {
      Sample::Value(value) => {
        let scale = match leaf {
          Octant::Block(_) => scale,
          Octant::Node(node) => size_to_scale(node.base().size),
        };
        return Some((value, scale));
      }
      Sample::Invalid => return None,
      Sample::Unavailable => {}
    }
  }
  None
}

/// Trilinearly interpolated field value and the scale it was sampled at.
pub fn get_field_interp<D: VoxelData>(
  octree: &Octree<D>,
  voxel_f: Vec3,
  desired_scale: i32,
) -> Option<(f32, i32)> {
  interp(octree, voxel_f, desired_scale, field_of::<D>)
}

/// Trilinearly interpolated colour in `[0, 255]` and the scale it was
/// sampled at. `None` for data types without colour.
pub fn get_colour_interp<D: VoxelData>(
  octree: &Octree<D>,
  voxel_f: Vec3,
  desired_scale: i32,
) -> Option<(Vec3, i32)> {
  if !<D::Colour as ColourData>::ENABLED {
    return None;
  }
  interp(octree, voxel_f, desired_scale, colour_of::<D>)
}

// =============================================================================
// Gradient
// =============================================================================

/// Field gradient per voxel by central differences of interpolated values,
/// with the scale it was computed at.
///
/// Observed leaf nodes are uniform free space and report a zero gradient.
pub fn get_field_grad<D: VoxelData>(
  octree: &Octree<D>,
  voxel_f: Vec3,
  desired_scale: i32,
) -> Option<(Vec3, i32)> {
  let (_, octant) = fetcher::octant(octree, voxel_f.floor().as_ivec3(), desired_scale)?;
  let block = match octant {
    Octant::Block(block) => block,
    Octant::Node(node) => {
      let uniform = node.is_leaf() && node.data().is_valid();
      return uniform.then(|| (Vec3::ZERO, size_to_scale(node.base().size)));
    }
  };

  'scales: for scale in block.current_scale().max(desired_scale)..=block.max_scale() {
    let stride = scale_to_size(scale) as f32;
    let mut grad = Vec3::ZERO;
    for axis in 0..3 {
      let step = Vec3::AXES[axis] * stride;
      let ahead = sample_at_scale(octree, voxel_f + step, scale, &field_of::<D>);
      let behind = sample_at_scale(octree, voxel_f - step, scale, &field_of::<D>);
      match (ahead, behind) {
        (Sample::Value(ahead), Sample::Value(behind)) => {
          grad[axis] = (ahead - behind) / (2.0 * stride);
        }
        (Sample::Invalid, _) | (_, Sample::Invalid) => return None,
        _ => continue 'scales,
      }
    }
    return Some((grad, scale));
  }
  None
}

// =============================================================================
// World-frame queries
// =============================================================================

/// Data of the voxel containing a world point.
pub fn get_data_at_point<D: VoxelData>(map: &Map<D>, point_w: Vec3) -> D {
  map
    .point_to_voxel(point_w)
    .map_or_else(D::default, |voxel| get_data(map.octree(), voxel))
}

/// Interpolated field at a world point, at the finest available scale.
pub fn get_field_interp_at_point<D: VoxelData>(map: &Map<D>, point_w: Vec3) -> Option<f32> {
  get_field_interp(map.octree(), map.point_to_voxel_f(point_w), 0).map(|(value, _)| value)
}

/// Interpolated colour at a world point.
pub fn get_colour_interp_at_point<D: VoxelData>(map: &Map<D>, point_w: Vec3) -> Option<Vec3> {
  get_colour_interp(map.octree(), map.point_to_voxel_f(point_w), 0).map(|(colour, _)| colour)
}

/// Field gradient at a world point, per metre in the world frame.
pub fn get_field_grad_at_point<D: VoxelData>(map: &Map<D>, point_w: Vec3) -> Option<Vec3> {
  let (grad, _) = get_field_grad(map.octree(), map.point_to_voxel_f(point_w), 0)?;
  Some(map.t_wm().transform_vector3(grad) / map.res())
}

#[cfg(test)]
#[path = "visitor_test.rs"]
mod visitor_test;
