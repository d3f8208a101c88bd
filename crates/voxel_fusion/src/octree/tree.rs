//! Octree - arena-backed sparse tree of nodes and blocks.

use glam::IVec3;
use smallvec::SmallVec;

use super::aabb::IAabb3;
use super::arena::{Arena, OctantId};
use super::config::OctreeConfig;
use super::geometry::{child_index, size_to_scale, NUM_CHILDREN};
use super::iter::{
  AllOctants, BlocksOnly, LeavesOnly, NodesOnly, OctreeIter, TraversalFilter, UpdatedSince,
};
use super::octant::{Node, Octant, Timestamp};
use crate::data::VoxelData;
use crate::error::{MapError, Result};

/// Sparse octree over a cube of `size` voxels.
///
/// Not `Clone`: a copy would duplicate every block of the map.
#[derive(Debug)]
pub struct Octree<D: VoxelData> {
  arena: Arena<D>,
  root: OctantId,
  size: i32,
  block_size: i32,
  aabb: IAabb3,
}

impl<D: VoxelData> Octree<D> {
  /// Build an empty octree containing only the root node.
  pub fn new(config: &OctreeConfig) -> Result<Self> {
    config.validate()?;
    let size = config.effective_size();
    let mut arena = Arena::new(config.block_size, config.max_octants);
    let root = arena.insert(Octant::Node(Node::new(IVec3::ZERO, size, None, D::default())))?;

    #[cfg(feature = "tracing")]
    tracing::debug!(size, block_size = config.block_size, "octree created");

    Ok(Self {
      arena,
      root,
      size,
      block_size: config.block_size,
      aabb: IAabb3::EMPTY,
    })
  }

  /// Edge length in voxels.
  #[inline]
  pub fn size(&self) -> i32 {
    self.size
  }

  #[inline]
  pub fn block_size(&self) -> i32 {
    self.block_size
  }

  /// Scale of the root.
  #[inline]
  pub fn max_scale(&self) -> i32 {
    size_to_scale(self.size)
  }

  /// Largest scale inside a block.
  #[inline]
  pub fn max_block_scale(&self) -> i32 {
    size_to_scale(self.block_size)
  }

  /// Depth of the block level. The root is at depth 0.
  #[inline]
  pub fn block_depth(&self) -> i32 {
    size_to_scale(self.size / self.block_size)
  }

  /// Depth of an octant with edge `size`.
  #[inline]
  pub fn depth_of(&self, size: i32) -> i32 {
    self.max_scale() - size_to_scale(size)
  }

  #[inline]
  pub fn contains(&self, voxel: IVec3) -> bool {
    voxel.cmpge(IVec3::ZERO).all() && voxel.cmplt(IVec3::splat(self.size)).all()
  }

  #[inline]
  pub fn root(&self) -> OctantId {
    self.root
  }

  /// Bounding box of every allocated leaf.
  #[inline]
  pub fn aabb(&self) -> IAabb3 {
    self.aabb
  }

  /// Grow the leaf bounding box to include an octant.
  ///
  /// Callers creating leaf nodes directly must call this themselves; blocks
  /// are tracked on allocation.
  #[inline]
  pub fn aabb_extend(&mut self, coord: IVec3, size: i32) {
    self.aabb.extend(coord, size);
  }

  /// Number of live octants.
  #[inline]
  pub fn len(&self) -> usize {
    self.arena.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.arena.is_empty()
  }

  #[inline]
  pub fn arena(&self) -> &Arena<D> {
    &self.arena
  }

  #[inline]
  pub(crate) fn arena_mut(&mut self) -> &mut Arena<D> {
    &mut self.arena
  }

  #[inline]
  pub fn get(&self, id: OctantId) -> Option<&Octant<D>> {
    self.arena.get(id)
  }

  #[inline]
  pub fn get_mut(&mut self, id: OctantId) -> Option<&mut Octant<D>> {
    self.arena.get_mut(id)
  }

  // ===========================================================================
  // Allocation
  // ===========================================================================

  /// Allocate child `idx` of `parent`, tracking new blocks in the AABB.
  pub fn allocate_child(&mut self, parent: OctantId, idx: u8) -> Result<(OctantId, bool)> {
    let (id, newly) = self.arena.allocate_child(parent, idx)?;
    if newly {
      self.extend_if_block(id);
    }
    Ok((id, newly))
  }

  /// Allocate all eight children of `parent`.
  pub fn allocate_all_children(
    &mut self,
    parent: OctantId,
  ) -> Result<SmallVec<[(OctantId, bool); NUM_CHILDREN]>> {
    let children = self.arena.allocate_all_children(parent)?;
    for &(id, newly) in &children {
      if newly {
        self.extend_if_block(id);
      }
    }
    Ok(children)
  }

  /// Recursively delete every descendant of `parent`.
  #[inline]
  pub fn delete_children(&mut self, parent: OctantId) -> usize {
    self.arena.delete_children(parent)
  }

  /// Allocate the path from the root to the block containing `voxel`.
  pub fn allocate_block(&mut self, voxel: IVec3) -> Result<OctantId> {
    if !self.contains(voxel) {
      return Err(MapError::OutOfBounds { coord: voxel });
    }
    let mut id = self.root;
    let mut size = self.size;
    while size > self.block_size {
      (id, _) = self.allocate_child(id, child_index(voxel, size))?;
      size /= 2;
    }
    Ok(id)
  }

  fn extend_if_block(&mut self, id: OctantId) {
    if let Some(Octant::Block(block)) = self.arena.get(id) {
      self.aabb.extend(block.coord(), block.size());
    }
  }

  // ===========================================================================
  // Traversal
  // ===========================================================================

  /// Depth-first traversal from the root with a custom filter.
  #[inline]
  pub fn iter_with<F: TraversalFilter<D>>(&self, filter: F) -> OctreeIter<'_, D, F> {
    OctreeIter::new(&self.arena, self.root, filter)
  }

  pub fn iter(&self) -> OctreeIter<'_, D, AllOctants> {
    self.iter_with(AllOctants)
  }

  pub fn nodes(&self) -> OctreeIter<'_, D, NodesOnly> {
    self.iter_with(NodesOnly)
  }

  pub fn blocks(&self) -> OctreeIter<'_, D, BlocksOnly> {
    self.iter_with(BlocksOnly)
  }

  pub fn leaves(&self) -> OctreeIter<'_, D, LeavesOnly> {
    self.iter_with(LeavesOnly)
  }

  /// Blocks modified at or after `timestamp`.
  pub fn blocks_updated_since(&self, timestamp: Timestamp) -> OctreeIter<'_, D, UpdatedSince> {
    self.iter_with(UpdatedSince(timestamp))
  }
}

#[cfg(test)]
#[path = "tree_test.rs"]
mod tree_test;
