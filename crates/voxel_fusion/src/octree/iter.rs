//! Depth-first octree traversal.
//!
//! Iteration uses an explicit stack, so its depth is bounded by the tree
//! depth times eight regardless of call depth. A [`TraversalFilter`] decides
//! which octants are yielded (`is_next`) and which subtrees are skipped
//! entirely (`do_ignore`).

use glam::{Affine3A, Vec3};
use smallvec::SmallVec;

use super::arena::{Arena, OctantId};
use super::octant::{Octant, Timestamp};
use crate::data::VoxelData;
use crate::sensor::SensorModel;

/// Predicates steering an [`OctreeIter`].
pub trait TraversalFilter<D: VoxelData> {
  /// Yield this octant.
  fn is_next(&self, octant: &Octant<D>) -> bool;

  /// Skip this octant and its whole subtree.
  #[inline]
  fn do_ignore(&self, _octant: &Octant<D>) -> bool {
    false
  }
}

/// Every octant.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllOctants;

impl<D: VoxelData> TraversalFilter<D> for AllOctants {
  #[inline]
  fn is_next(&self, _octant: &Octant<D>) -> bool {
    true
  }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NodesOnly;

impl<D: VoxelData> TraversalFilter<D> for NodesOnly {
  #[inline]
  fn is_next(&self, octant: &Octant<D>) -> bool {
    !octant.is_block()
  }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BlocksOnly;

impl<D: VoxelData> TraversalFilter<D> for BlocksOnly {
  #[inline]
  fn is_next(&self, octant: &Octant<D>) -> bool {
    octant.is_block()
  }
}

/// Blocks, plus childless nodes in occupancy maps.
#[derive(Clone, Copy, Debug, Default)]
pub struct LeavesOnly;

impl<D: VoxelData> TraversalFilter<D> for LeavesOnly {
  #[inline]
  fn is_next(&self, octant: &Octant<D>) -> bool {
    octant.is_leaf()
  }
}

/// Blocks modified at or after the given timestamp.
///
/// Subtrees whose root is older are skipped, which relies on up-propagation
/// stamping every ancestor of a modified block.
#[derive(Clone, Copy, Debug)]
pub struct UpdatedSince(pub Timestamp);

impl<D: VoxelData> TraversalFilter<D> for UpdatedSince {
  #[inline]
  fn is_next(&self, octant: &Octant<D>) -> bool {
    octant.is_block() && octant.timestamp() >= self.0
  }

  #[inline]
  fn do_ignore(&self, octant: &Octant<D>) -> bool {
    octant.timestamp() < self.0
  }
}

/// Blocks whose bounding sphere intersects a sensor frustum.
pub struct InFrustum<'a, S: SensorModel + ?Sized> {
  sensor: &'a S,
  /// Map frame to sensor frame.
  t_sm: Affine3A,
  res: f32,
}

impl<'a, S: SensorModel + ?Sized> InFrustum<'a, S> {
  pub fn new(sensor: &'a S, t_sm: Affine3A, res: f32) -> Self {
    Self { sensor, t_sm, res }
  }

  #[inline]
  fn sphere_visible<D: VoxelData>(&self, octant: &Octant<D>) -> bool {
    let size = octant.size() as f32;
    let centre_m = (octant.coord().as_vec3() + Vec3::splat(size * 0.5)) * self.res;
    let radius = 0.5 * 3f32.sqrt() * size * self.res;
    self
      .sensor
      .sphere_in_frustum(self.t_sm.transform_point3(centre_m), radius)
  }
}

impl<D: VoxelData, S: SensorModel + ?Sized> TraversalFilter<D> for InFrustum<'_, S> {
  #[inline]
  fn is_next(&self, octant: &Octant<D>) -> bool {
    octant.is_block() && self.sphere_visible(octant)
  }

  #[inline]
  fn do_ignore(&self, octant: &Octant<D>) -> bool {
    !self.sphere_visible(octant)
  }
}

/// Explicit-stack depth-first iterator.
pub struct OctreeIter<'a, D: VoxelData, F> {
  arena: &'a Arena<D>,
  stack: SmallVec<[OctantId; 64]>,
  filter: F,
}

impl<'a, D: VoxelData, F: TraversalFilter<D>> OctreeIter<'a, D, F> {
  pub fn new(arena: &'a Arena<D>, root: OctantId, filter: F) -> Self {
    let mut stack = SmallVec::new();
    stack.push(root);
    Self {
      arena,
      stack,
      filter,
    }
  }
}

impl<'a, D: VoxelData, F: TraversalFilter<D>> Iterator for OctreeIter<'a, D, F> {
  type Item = (OctantId, &'a Octant<D>);

  fn next(&mut self) -> Option<Self::Item> {
    while let Some(id) = self.stack.pop() {
      let Some(octant) = self.arena.get(id) else {
        continue;
      };
      if self.filter.do_ignore(octant) {
        continue;
      }
      if let Octant::Node(node) = octant {
        // Reverse push so children pop in index order.
        for idx in (0..8u8).rev() {
          if let Some(child) = node.child(idx) {
            self.stack.push(child);
          }
        }
      }
      if self.filter.is_next(octant) {
        return Some((id, octant));
      }
    }
    None
  }
}
