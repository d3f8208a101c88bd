use glam::IVec3;

use super::*;
use crate::data::OccupancyData;

const BLOCK_SIZE: i32 = 8;

fn arena_with_root(size: i32, capacity: usize) -> (Arena<OccupancyData>, OctantId) {
  let mut arena = Arena::new(BLOCK_SIZE, capacity);
  let root = arena
    .insert(Octant::Node(Node::new(IVec3::ZERO, size, None, OccupancyData::default())))
    .expect("root");
  (arena, root)
}

// =========================================================================
// Allocation
// =========================================================================

/// Re-allocating a child returns the existing handle.
#[test]
fn test_allocate_child_is_idempotent() {
  let (mut arena, root) = arena_with_root(32, 0);

  let (first, new_first) = arena.allocate_child(root, 5).expect("alloc");
  let (second, new_second) = arena.allocate_child(root, 5).expect("alloc");

  assert!(new_first);
  assert!(!new_second);
  assert_eq!(first, second);
  assert_eq!(arena.len(), 2);
}

/// Child geometry follows from the parent and the index.
#[test]
fn test_child_coord_and_size() {
  let (mut arena, root) = arena_with_root(32, 0);
  let (child, _) = arena.allocate_child(root, 0b110).expect("alloc");

  let octant = arena.get(child).expect("child");
  assert_eq!(octant.coord(), IVec3::new(0, 16, 16));
  assert_eq!(octant.size(), 16);
  assert_eq!(octant.parent(), Some(root));
  assert!(!octant.is_block());
}

/// Children of block size become blocks.
#[test]
fn test_block_sized_children_are_blocks() {
  let (mut arena, root) = arena_with_root(16, 0);
  let children = arena.allocate_all_children(root).expect("alloc");

  assert_eq!(children.len(), 8);
  for (id, newly) in children {
    assert!(newly);
    assert!(arena.get(id).is_some_and(Octant::is_block));
  }
  assert_eq!(arena.get(root).map(Octant::child_mask), Some(0xFF));
}

/// The child mask matches the occupied slots.
#[test]
fn test_child_mask_matches_slots() {
  let (mut arena, root) = arena_with_root(32, 0);
  arena.allocate_child(root, 1).expect("alloc");
  arena.allocate_child(root, 6).expect("alloc");

  let node = arena.get(root).and_then(Octant::as_node).expect("root");
  assert_eq!(node.child_mask(), 0b0100_0010);
  let present: Vec<u8> = node.children().map(|(idx, _)| idx).collect();
  assert_eq!(present, vec![1, 6]);
}

/// Allocation past the configured capacity is an error.
#[test]
fn test_capacity_exhaustion() {
  let (mut arena, root) = arena_with_root(32, 3);
  arena.allocate_child(root, 0).expect("alloc");
  arena.allocate_child(root, 1).expect("alloc");

  let err = arena.allocate_child(root, 2).unwrap_err();
  assert!(matches!(err, MapError::ArenaExhausted { capacity: 3 }));
  // The failed slot stays empty.
  assert_eq!(arena.get(root).map(Octant::child_mask), Some(0b11));
}

// =========================================================================
// Deletion
// =========================================================================

/// Deleting children frees the whole subtree and clears the mask.
#[test]
fn test_delete_children_frees_subtree() {
  let (mut arena, root) = arena_with_root(32, 0);
  let (child, _) = arena.allocate_child(root, 0).expect("alloc");
  let grandchildren = arena.allocate_all_children(child).expect("alloc");
  assert_eq!(arena.len(), 10);

  let freed = arena.delete_children(root);
  assert_eq!(freed, 9);
  assert_eq!(arena.len(), 1);
  assert!(arena.get(child).is_none());
  for (id, _) in grandchildren {
    assert!(!arena.contains(id));
  }
  assert_eq!(arena.get(root).map(Octant::child_mask), Some(0));
}

/// Stale handles never alias a reused slot.
#[test]
fn test_stale_handle_after_reuse() {
  let (mut arena, root) = arena_with_root(32, 0);
  let (old, _) = arena.allocate_child(root, 3).expect("alloc");
  arena.delete_children(root);

  let (new, _) = arena.allocate_child(root, 3).expect("alloc");
  assert_eq!(old.index(), new.index());
  assert_ne!(old, new);
  assert!(arena.get(old).is_none());
  assert!(arena.get(new).is_some());
}

// =========================================================================
// Disjoint access
// =========================================================================

#[test]
fn test_get_disjoint_mut() {
  let (mut arena, root) = arena_with_root(16, 0);
  let children: Vec<OctantId> = arena
    .allocate_all_children(root)
    .expect("alloc")
    .into_iter()
    .map(|(id, _)| id)
    .collect();

  let picked = [children[6], children[1], children[3]];
  let refs = arena.get_disjoint_mut(&picked);
  assert_eq!(refs.len(), 3);
  for (_, octant) in refs {
    octant.set_timestamp(7);
  }

  for (i, id) in children.iter().enumerate() {
    let expected = if [1, 3, 6].contains(&i) { 7 } else { 0 };
    assert_eq!(arena.get(*id).map(Octant::timestamp), Some(expected));
  }
}
