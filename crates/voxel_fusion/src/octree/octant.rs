//! Octant types stored in the arena.
//!
//! An [`Octant`] is either an interior [`Node`] or a leaf [`Block`]. Both
//! carry an [`OctantBase`]: minimum corner, edge length, weak parent handle
//! and the timestamp of the last frame that modified them.

use glam::IVec3;

use super::arena::OctantId;
use super::block::Block;
use super::geometry::{child_coord, NUM_CHILDREN};
use crate::data::{FieldData, FieldKind, VoxelData};

/// Frame counter. `0` means "never modified".
pub type Timestamp = u64;

/// Fields shared by nodes and blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OctantBase {
  pub coord: IVec3,
  pub size: i32,
  pub parent: Option<OctantId>,
  pub timestamp: Timestamp,
}

impl OctantBase {
  pub fn new(coord: IVec3, size: i32, parent: Option<OctantId>) -> Self {
    Self {
      coord,
      size,
      parent,
      timestamp: 0,
    }
  }

  /// True if `voxel` lies inside this octant.
  #[inline]
  pub fn contains(&self, voxel: IVec3) -> bool {
    voxel.cmpge(self.coord).all() && voxel.cmplt(self.coord + self.size).all()
  }
}

// =============================================================================
// Node
// =============================================================================

/// Interior octant with up to eight children.
///
/// For occupancy maps the node keeps min/max summaries of its subtree and
/// may itself be a leaf once its children have been pruned.
#[derive(Clone, Debug)]
pub struct Node<D: VoxelData> {
  pub(crate) base: OctantBase,
  children: [Option<OctantId>; NUM_CHILDREN],
  child_mask: u8,
  min_data: D,
  max_data: D,
}

impl<D: VoxelData> Node<D> {
  pub fn new(coord: IVec3, size: i32, parent: Option<OctantId>, init_data: D) -> Self {
    Self {
      base: OctantBase::new(coord, size, parent),
      children: [None; NUM_CHILDREN],
      child_mask: 0,
      min_data: init_data,
      max_data: init_data,
    }
  }

  #[inline]
  pub fn base(&self) -> &OctantBase {
    &self.base
  }

  #[inline]
  pub fn child(&self, idx: u8) -> Option<OctantId> {
    debug_assert!(idx < 8, "child index {idx} out of range");
    self.children[idx as usize]
  }

  /// Present children with their indices.
  pub fn children(&self) -> impl Iterator<Item = (u8, OctantId)> + '_ {
    self
      .children
      .iter()
      .enumerate()
      .filter_map(|(idx, child)| child.map(|id| (idx as u8, id)))
  }

  /// Bit `i` is set iff child slot `i` is occupied.
  #[inline]
  pub fn child_mask(&self) -> u8 {
    self.child_mask
  }

  #[inline]
  pub fn is_leaf(&self) -> bool {
    self.child_mask == 0
  }

  /// Minimum corner of child slot `idx`.
  #[inline]
  pub fn child_coord(&self, idx: u8) -> IVec3 {
    child_coord(self.base.coord, self.base.size, idx)
  }

  #[inline]
  pub fn min_data(&self) -> &D {
    &self.min_data
  }

  #[inline]
  pub fn max_data(&self) -> &D {
    &self.max_data
  }

  /// Data a query sees when this node is the deepest octant at a point.
  ///
  /// Only observed occupancy leaves carry data; everything else is default.
  pub fn data(&self) -> D {
    if <D::Field as FieldData>::KIND == FieldKind::Occupancy
      && self.is_leaf()
      && self.max_data.field().is_observed()
    {
      self.max_data
    } else {
      D::default()
    }
  }

  pub(crate) fn set_summary(&mut self, min_data: D, max_data: D) {
    self.min_data = min_data;
    self.max_data = max_data;
  }

  /// Set or clear a child slot, keeping the mask in sync.
  pub(crate) fn set_child(&mut self, idx: u8, child: Option<OctantId>) {
    debug_assert!(idx < 8, "child index {idx} out of range");
    self.children[idx as usize] = child;
    match child {
      Some(_) => self.child_mask |= 1 << idx,
      None => self.child_mask &= !(1 << idx),
    }
  }

  pub(crate) fn take_children(&mut self) -> [Option<OctantId>; NUM_CHILDREN] {
    self.child_mask = 0;
    std::mem::take(&mut self.children)
  }
}

// =============================================================================
// Octant
// =============================================================================

/// Closed set of octant kinds.
#[derive(Debug)]
pub enum Octant<D: VoxelData> {
  Node(Node<D>),
  Block(Box<Block<D>>),
}

impl<D: VoxelData> Octant<D> {
  #[inline]
  pub fn base(&self) -> &OctantBase {
    match self {
      Octant::Node(node) => &node.base,
      Octant::Block(block) => &block.base,
    }
  }

  #[inline]
  pub(crate) fn base_mut(&mut self) -> &mut OctantBase {
    match self {
      Octant::Node(node) => &mut node.base,
      Octant::Block(block) => &mut block.base,
    }
  }

  #[inline]
  pub fn coord(&self) -> IVec3 {
    self.base().coord
  }

  #[inline]
  pub fn size(&self) -> i32 {
    self.base().size
  }

  #[inline]
  pub fn parent(&self) -> Option<OctantId> {
    self.base().parent
  }

  #[inline]
  pub fn timestamp(&self) -> Timestamp {
    self.base().timestamp
  }

  #[inline]
  pub fn set_timestamp(&mut self, timestamp: Timestamp) {
    self.base_mut().timestamp = timestamp;
  }

  #[inline]
  pub fn is_block(&self) -> bool {
    matches!(self, Octant::Block(_))
  }

  /// Blocks always report an empty mask.
  #[inline]
  pub fn child_mask(&self) -> u8 {
    match self {
      Octant::Node(node) => node.child_mask(),
      Octant::Block(_) => 0,
    }
  }

  /// Blocks, and childless nodes of occupancy maps.
  #[inline]
  pub fn is_leaf(&self) -> bool {
    match self {
      Octant::Node(node) => {
        <D::Field as FieldData>::KIND == FieldKind::Occupancy && node.is_leaf()
      }
      Octant::Block(_) => true,
    }
  }

  #[inline]
  pub fn as_node(&self) -> Option<&Node<D>> {
    match self {
      Octant::Node(node) => Some(node),
      Octant::Block(_) => None,
    }
  }

  #[inline]
  pub fn as_node_mut(&mut self) -> Option<&mut Node<D>> {
    match self {
      Octant::Node(node) => Some(node),
      Octant::Block(_) => None,
    }
  }

  #[inline]
  pub fn as_block(&self) -> Option<&Block<D>> {
    match self {
      Octant::Block(block) => Some(block),
      Octant::Node(_) => None,
    }
  }

  #[inline]
  pub fn as_block_mut(&mut self) -> Option<&mut Block<D>> {
    match self {
      Octant::Block(block) => Some(block),
      Octant::Node(_) => None,
    }
  }

  /// Min and max summary of the whole octant.
  ///
  /// Blocks report their coarsest-scale summaries.
  pub fn summary(&self) -> (D, D) {
    match self {
      Octant::Node(node) => (*node.min_data(), *node.max_data()),
      Octant::Block(block) => {
        let coord = block.coord();
        let scale = block.max_scale();
        (block.min_data(coord, scale), block.max_data(coord, scale))
      }
    }
  }
}
