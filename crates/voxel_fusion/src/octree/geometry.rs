//! Integer octant geometry.
//!
//! Octants are axis-aligned cubes addressed by the voxel coordinate of their
//! minimum corner and a power-of-two edge length. Child indices pack the
//! per-axis offset bits:
//!
//! ```text
//! child index = x | y << 1 | z << 2      (each bit = upper half on that axis)
//! child coord = parent coord + offset * (parent size / 2)
//! ```

use glam::IVec3;

/// Number of children of an interior node.
pub const NUM_CHILDREN: usize = 8;

/// Per-axis offset of child `idx`, in units of half the parent size.
#[inline]
pub fn child_offset(idx: u8) -> IVec3 {
  debug_assert!(idx < 8, "child index {idx} out of range");
  IVec3::new(
    (idx & 1) as i32,
    ((idx >> 1) & 1) as i32,
    ((idx >> 2) & 1) as i32,
  )
}

/// Minimum corner of child `idx` of the octant at `parent_coord`.
#[inline]
pub fn child_coord(parent_coord: IVec3, parent_size: i32, idx: u8) -> IVec3 {
  parent_coord + child_offset(idx) * (parent_size / 2)
}

/// Index of the child of a `parent_size` octant containing `coord`.
///
/// Only valid when the parent is aligned to its size, which every octant is.
#[inline]
pub fn child_index(coord: IVec3, parent_size: i32) -> u8 {
  let half = parent_size / 2;
  ((coord.x & half != 0) as u8)
    | (((coord.y & half != 0) as u8) << 1)
    | (((coord.z & half != 0) as u8) << 2)
}

/// Scale of an octant with edge length `size` (log2).
#[inline]
pub fn size_to_scale(size: i32) -> i32 {
  debug_assert!(size > 0 && (size & (size - 1)) == 0, "size {size} is not a power of two");
  size.trailing_zeros() as i32
}

/// Edge length of a voxel at `scale`.
#[inline]
pub fn scale_to_size(scale: i32) -> i32 {
  debug_assert!((0..31).contains(&scale), "scale {scale} out of range");
  1 << scale
}

/// Smallest power of two `>= value` (at least 1).
#[inline]
pub fn round_up_pow2(value: i32) -> i32 {
  (value.max(1) as u32).next_power_of_two() as i32
}

/// Number of voxels per edge of a `block_size` block at `scale`.
#[inline]
pub fn voxels_per_edge(block_size: i32, scale: i32) -> i32 {
  block_size >> scale
}

/// Linear index of `voxel` inside the block at `block_coord` for `scale`.
///
/// Layout is x fastest, then y, then z.
#[inline]
pub fn voxel_index(voxel: IVec3, block_coord: IVec3, block_size: i32, scale: i32) -> usize {
  let local = (voxel - block_coord) >> scale;
  let edge = voxels_per_edge(block_size, scale);
  debug_assert!(
    local.cmpge(IVec3::ZERO).all() && local.cmplt(IVec3::splat(edge)).all(),
    "voxel {voxel} outside block {block_coord}"
  );
  (local.x + edge * (local.y + edge * local.z)) as usize
}

/// Inverse of [`voxel_index`]: voxel coordinate of linear index `idx`.
#[inline]
pub fn index_to_voxel(idx: usize, block_coord: IVec3, block_size: i32, scale: i32) -> IVec3 {
  let edge = voxels_per_edge(block_size, scale) as usize;
  let local = IVec3::new(
    (idx % edge) as i32,
    ((idx / edge) % edge) as i32,
    (idx / (edge * edge)) as i32,
  );
  block_coord + (local << scale)
}
