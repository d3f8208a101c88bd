//! Point lookups by descending from the root.
//!
//! At every level the child index comes straight from the coordinate bits
//! (see [`child_index`]), so a lookup costs one arena access per level.

use glam::IVec3;

use super::arena::OctantId;
use super::block::Block;
use super::geometry::{child_index, scale_to_size};
use super::octant::Octant;
use super::tree::Octree;
use crate::data::VoxelData;

/// Deepest allocated octant containing `voxel` whose size is not below the
/// size of `scale`.
pub fn octant<D: VoxelData>(
  octree: &Octree<D>,
  voxel: IVec3,
  scale: i32,
) -> Option<(OctantId, &Octant<D>)> {
  if !octree.contains(voxel) {
    return None;
  }
  let stop_size = scale_to_size(scale.clamp(0, octree.max_scale()));
  let mut id = octree.root();
  loop {
    let octant = octree.get(id)?;
    let Octant::Node(node) = octant else {
      return Some((id, octant));
    };
    if node.base().size <= stop_size {
      return Some((id, octant));
    }
    match node.child(child_index(voxel, node.base().size)) {
      Some(child) => id = child,
      None => return Some((id, octant)),
    }
  }
}

/// Deepest allocated octant containing `voxel`.
#[inline]
pub fn leaf<D: VoxelData>(octree: &Octree<D>, voxel: IVec3) -> Option<(OctantId, &Octant<D>)> {
  octant(octree, voxel, 0)
}

/// Block containing `voxel`, if allocated.
#[inline]
pub fn block<D: VoxelData>(octree: &Octree<D>, voxel: IVec3) -> Option<(OctantId, &Block<D>)> {
  leaf(octree, voxel).and_then(|(id, octant)| octant.as_block().map(|block| (id, block)))
}
