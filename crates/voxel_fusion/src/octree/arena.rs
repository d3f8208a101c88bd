//! Arena owning every node and block of an octree.
//!
//! Octants are addressed by generational [`OctantId`] handles. A slot freed by
//! [`Arena::delete_children`] bumps its generation, so handles to deleted
//! octants resolve to `None` instead of aliasing a later allocation.
//!
//! The arena is the only place that creates or destroys octants:
//! - [`Arena::allocate_child`] is idempotent per child slot.
//! - [`Arena::delete_children`] recursively frees a subtree and clears the
//!   parent's child mask in the same call.

use smallvec::SmallVec;

use super::block::Block;
use super::geometry::NUM_CHILDREN;
use super::octant::{Node, Octant};
use crate::data::VoxelData;
use crate::error::{MapError, Result};

/// Stable handle to an octant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OctantId {
  index: u32,
  generation: u32,
}

impl OctantId {
  /// Slot index, unique among live octants.
  #[inline]
  pub fn index(&self) -> usize {
    self.index as usize
  }
}

#[derive(Debug)]
struct Slot<D: VoxelData> {
  generation: u32,
  octant: Option<Octant<D>>,
}

/// Slot storage for octants.
#[derive(Debug)]
pub struct Arena<D: VoxelData> {
  slots: Vec<Slot<D>>,
  free: Vec<u32>,
  live: usize,
  block_size: i32,
  /// Maximum number of live octants, 0 for unbounded.
  capacity: usize,
}

impl<D: VoxelData> Arena<D> {
  pub fn new(block_size: i32, capacity: usize) -> Self {
    Self {
      slots: Vec::new(),
      free: Vec::new(),
      live: 0,
      block_size,
      capacity,
    }
  }

  /// Number of live octants.
  #[inline]
  pub fn len(&self) -> usize {
    self.live
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.live == 0
  }

  #[inline]
  pub fn capacity(&self) -> usize {
    self.capacity
  }

  #[inline]
  pub fn block_size(&self) -> i32 {
    self.block_size
  }

  #[inline]
  pub fn get(&self, id: OctantId) -> Option<&Octant<D>> {
    let slot = self.slots.get(id.index())?;
    if slot.generation != id.generation {
      return None;
    }
    slot.octant.as_ref()
  }

  #[inline]
  pub fn get_mut(&mut self, id: OctantId) -> Option<&mut Octant<D>> {
    let slot = self.slots.get_mut(id.index())?;
    if slot.generation != id.generation {
      return None;
    }
    slot.octant.as_mut()
  }

  #[inline]
  pub fn contains(&self, id: OctantId) -> bool {
    self.get(id).is_some()
  }

  /// Store `octant` in a free slot.
  pub(crate) fn insert(&mut self, octant: Octant<D>) -> Result<OctantId> {
    if self.capacity != 0 && self.live >= self.capacity {
      #[cfg(feature = "tracing")]
      tracing::warn!(capacity = self.capacity, "octant arena exhausted");
      return Err(MapError::ArenaExhausted {
        capacity: self.capacity,
      });
    }

    self.live += 1;
    if let Some(index) = self.free.pop() {
      let slot = &mut self.slots[index as usize];
      slot.octant = Some(octant);
      return Ok(OctantId {
        index,
        generation: slot.generation,
      });
    }

    let index = self.slots.len() as u32;
    self.slots.push(Slot {
      generation: 0,
      octant: Some(octant),
    });
    Ok(OctantId {
      index,
      generation: 0,
    })
  }

  fn remove(&mut self, id: OctantId) -> Option<Octant<D>> {
    let slot = self.slots.get_mut(id.index())?;
    if slot.generation != id.generation {
      return None;
    }
    let octant = slot.octant.take()?;
    slot.generation = slot.generation.wrapping_add(1);
    self.free.push(id.index);
    self.live -= 1;
    Some(octant)
  }

  // ===========================================================================
  // Child allocation
  // ===========================================================================

  /// Allocate child `idx` of `parent`.
  ///
  /// Returns the child and whether it was newly allocated. An existing child
  /// is returned as-is. New children inherit the parent's leaf data, so a
  /// subdivided free node keeps what it knew.
  pub fn allocate_child(&mut self, parent: OctantId, idx: u8) -> Result<(OctantId, bool)> {
    debug_assert!(idx < 8, "child index {idx} out of range");
    let Some(Octant::Node(node)) = self.get(parent) else {
      debug_assert!(false, "allocate_child on a missing or block octant");
      return Err(MapError::InvalidOctant { expected: "node" });
    };
    if let Some(existing) = node.child(idx) {
      return Ok((existing, false));
    }

    let coord = node.child_coord(idx);
    let child_size = node.base().size / 2;
    let init_data = node.data();
    let child = if child_size == self.block_size {
      Octant::Block(Box::new(Block::new(coord, child_size, Some(parent), init_data)))
    } else {
      Octant::Node(Node::new(coord, child_size, Some(parent), init_data))
    };

    let id = self.insert(child)?;
    if let Some(Octant::Node(node)) = self.get_mut(parent) {
      node.set_child(idx, Some(id));
    }
    Ok((id, true))
  }

  /// Allocate every missing child of `parent`. Returns all eight children.
  pub fn allocate_all_children(
    &mut self,
    parent: OctantId,
  ) -> Result<SmallVec<[(OctantId, bool); NUM_CHILDREN]>> {
    (0..NUM_CHILDREN as u8)
      .map(|idx| self.allocate_child(parent, idx))
      .collect()
  }

  /// Recursively free every descendant of `parent` and clear its mask.
  ///
  /// Returns the number of octants freed.
  pub fn delete_children(&mut self, parent: OctantId) -> usize {
    let Some(Octant::Node(node)) = self.get_mut(parent) else {
      return 0;
    };
    let mut stack: SmallVec<[OctantId; 64]> = node.take_children().into_iter().flatten().collect();

    let mut freed = 0;
    while let Some(id) = stack.pop() {
      if let Some(Octant::Node(mut node)) = self.remove(id) {
        stack.extend(node.take_children().into_iter().flatten());
      }
      freed += 1;
    }
    freed
  }

  // ===========================================================================
  // Disjoint mutable access
  // ===========================================================================

  /// Mutable references to several distinct octants at once.
  ///
  /// `ids` must not contain duplicates. Stale handles are skipped. Results are
  /// ordered by slot index.
  pub fn get_disjoint_mut(&mut self, ids: &[OctantId]) -> Vec<(OctantId, &mut Octant<D>)> {
    let mut sorted = ids.to_vec();
    sorted.sort_unstable();
    debug_assert!(
      sorted.windows(2).all(|w| w[0].index != w[1].index),
      "duplicate octant in disjoint access"
    );
    sorted.dedup_by_key(|id| id.index);

    let mut out = Vec::with_capacity(sorted.len());
    let mut slots = self.slots.iter_mut();
    let mut cursor = 0usize;
    for id in sorted {
      let Some(slot) = slots.nth(id.index() - cursor) else {
        break;
      };
      cursor = id.index() + 1;
      if slot.generation != id.generation {
        continue;
      }
      if let Some(octant) = slot.octant.as_mut() {
        out.push((id, octant));
      }
    }
    out
  }

  /// Live octants in slot order.
  pub fn iter(&self) -> impl Iterator<Item = (OctantId, &Octant<D>)> + '_ {
    self.slots.iter().enumerate().filter_map(|(index, slot)| {
      slot.octant.as_ref().map(|octant| {
        (
          OctantId {
            index: index as u32,
            generation: slot.generation,
          },
          octant,
        )
      })
    })
  }
}

#[cfg(test)]
#[path = "arena_test.rs"]
mod arena_test;
