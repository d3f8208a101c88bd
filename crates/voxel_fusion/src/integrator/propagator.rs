//! Node summaries from their children.
//!
//! A node keeps the min and max data of its subtree. Both are recomputed
//! from the direct children only, so propagation must run finest depth
//! first:
//!
//! ```text
//! block (coarsest scale) ─┐
//! node summary ───────────┼─► min_of / max_of ─► parent summary
//! ...                    ─┘
//! ```

use std::collections::HashSet;

use rayon::prelude::*;
use smallvec::SmallVec;

use crate::data::{max_of, min_of, FieldData, FieldKind, VoxelData};
use crate::octree::{AllOctants, Node, OctantId, Octree, OctreeIter, Timestamp, NUM_CHILDREN};

/// Min and max summary of `node` from its children, `None` if it has none.
pub fn node_summary<D: VoxelData>(octree: &Octree<D>, node: &Node<D>) -> Option<(D, D)> {
  let mut mins: SmallVec<[D; NUM_CHILDREN]> = SmallVec::new();
  let mut maxs: SmallVec<[D; NUM_CHILDREN]> = SmallVec::new();
  for (_, child) in node.children() {
    if let Some(octant) = octree.get(child) {
      let (min, max) = octant.summary();
      mins.push(min);
      maxs.push(max);
    }
  }
  if mins.is_empty() {
    return None;
  }
  Some((min_of(&mins), max_of(&maxs)))
}

/// Recompute the summary of node `id` and stamp it with `timestamp`.
///
/// Returns the new max data, or `None` if `id` is not a node with children.
pub fn propagate_node<D: VoxelData>(
  octree: &mut Octree<D>,
  id: OctantId,
  timestamp: Timestamp,
) -> Option<D> {
  let node = octree.get(id)?.as_node()?;
  let (min, max) = node_summary(octree, node)?;
  let octant = octree.get_mut(id)?;
  octant.set_timestamp(timestamp);
  octant.as_node_mut()?.set_summary(min, max);
  Some(max)
}

/// Propagate the nodes in `node_sets` level by level, finest first, then the
/// root.
///
/// `node_sets[d]` holds nodes at depth `d` whose children changed. Nodes
/// already stamped with `timestamp` are skipped, so a second pass in the same
/// frame changes nothing. Occupancy nodes whose max data is observed and at
/// or below `prune_threshold` lose their children; every removed octant is
/// also removed from `updated`.
///
/// Returns the number of pruned nodes.
#[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "propagator::to_root"))]
pub fn propagate_to_root<D: VoxelData>(
  octree: &mut Octree<D>,
  mut node_sets: Vec<HashSet<OctantId>>,
  timestamp: Timestamp,
  prune_threshold: f32,
  mut updated: Option<&mut HashSet<OctantId>>,
) -> usize {
  let prunable = <D::Field as FieldData>::KIND == FieldKind::Occupancy;
  let mut pruned = 0;

  for depth in (1..node_sets.len()).rev() {
    let pending = std::mem::take(&mut node_sets[depth]);

    // Children are final at this point, so summaries can be gathered in
    // parallel and applied in one sequential pass.
    let summaries: Vec<(OctantId, D, D)> = {
      let octree = &*octree;
      pending
        .par_iter()
        .filter_map(|&id| {
          let octant = octree.get(id)?;
          if octant.timestamp() == timestamp {
            return None;
          }
          let (min, max) = node_summary(octree, octant.as_node()?)?;
          Some((id, min, max))
        })
        .collect()
    };

    for (id, min, max) in summaries {
      let Some(octant) = octree.get_mut(id) else {
        continue;
      };
      octant.set_timestamp(timestamp);
      let parent = octant.parent();
      if let Some(node) = octant.as_node_mut() {
        node.set_summary(min, max);
      }
      if let Some(parent) = parent {
        node_sets[depth - 1].insert(parent);
      }
      if let Some(set) = updated.as_deref_mut() {
        set.insert(id);
      }

      let field = max.field();
      if prunable && field.is_observed() && field.field_value() <= prune_threshold {
        if let Some(set) = updated.as_deref_mut() {
          for (descendant, _) in OctreeIter::new(octree.arena(), id, AllOctants).skip(1) {
            set.remove(&descendant);
          }
        }
        let freed = octree.delete_children(id);
        pruned += 1;

        #[cfg(feature = "tracing")]
        tracing::trace!(depth, freed, "pruned free node");
        #[cfg(not(feature = "tracing"))]
        let _ = freed;
      }
    }
  }

  let root = octree.root();
  propagate_node(octree, root, timestamp);
  pruned
}

#[cfg(test)]
mod tests {
  use glam::IVec3;

  use super::*;
  use crate::data::{FieldData, Occupancy, OccupancyData};
  use crate::octree::OctreeConfig;

  fn octree() -> Octree<OccupancyData> {
    Octree::new(&OctreeConfig {
      size: 32,
      block_size: 8,
      max_octants: 0,
    })
    .expect("octree")
  }

  fn observed(occupancy: f32) -> OccupancyData {
    OccupancyData {
      field: Occupancy {
        occupancy,
        weight: 1.0,
        observed: true,
      },
      ..Default::default()
    }
  }

  #[test]
  fn test_childless_node_has_no_summary() {
    let mut octree = octree();
    let root = octree.root();
    assert!(propagate_node(&mut octree, root, 1).is_none());
    assert_eq!(octree.get(root).map(|o| o.timestamp()), Some(0));
  }

  /// Summaries take the extremes over the children and stay unobserved
  /// while any child slot is empty.
  #[test]
  fn test_summary_from_partial_children() {
    let mut octree = octree();
    let root = octree.root();
    let (a, _) = octree.allocate_child(root, 0).expect("child");
    let (b, _) = octree.allocate_child(root, 7).expect("child");
    for (id, value) in [(a, -2.0), (b, 3.0)] {
      let node = octree.get_mut(id).and_then(|o| o.as_node_mut()).expect("node");
      node.set_summary(observed(value), observed(value));
    }

    let max = propagate_node(&mut octree, root, 4).expect("summary");
    assert_eq!(max.field.occupancy, 3.0);
    assert!(!max.field.is_observed());

    let node = octree.get(root).and_then(|o| o.as_node()).expect("root");
    assert_eq!(node.min_data().field.occupancy, -2.0);
    assert_eq!(octree.get(root).map(|o| o.timestamp()), Some(4));
  }

  #[test]
  fn test_block_children_report_coarsest_scale() {
    let mut octree = octree();
    let block = octree.allocate_block(IVec3::ZERO).expect("block");
    {
      let block = octree.get_mut(block).and_then(|o| o.as_block_mut()).expect("block");
      block.allocate_down_to(2);
      block.set_current_scale(2);
      for data in block.current_data_mut().expect("scale 2") {
        *data = observed(-1.5);
      }
      block.propagate_to_coarsest_scale();
    }
    let parent = octree.get(block).and_then(|o| o.parent()).expect("parent");
    let max = propagate_node(&mut octree, parent, 1).expect("summary");
    assert_eq!(max.field.occupancy, -1.5);
  }

  /// Node at depth 1 whose eight block children hold `data` at their
  /// coarsest scale.
  fn node_with_blocks(octree: &mut Octree<OccupancyData>, data: OccupancyData) -> OctantId {
    let root = octree.root();
    let (node, _) = octree.allocate_child(root, 0).expect("node");
    for (block, _) in octree.allocate_all_children(node).expect("blocks") {
      let block = octree.get_mut(block).and_then(|o| o.as_block_mut()).expect("block");
      let scale = block.max_scale();
      block.allocate_down_to(scale);
      block.current_data_mut().expect("coarsest")[0] = data;
    }
    node
  }

  fn node_sets(octree: &Octree<OccupancyData>, node: OctantId) -> Vec<HashSet<OctantId>> {
    let mut sets = vec![HashSet::new(); octree.block_depth() as usize];
    sets[1].insert(node);
    sets
  }

  fn free(weight: f32) -> OccupancyData {
    OccupancyData {
      field: Occupancy {
        occupancy: -5.0,
        weight,
        observed: true,
      },
      ..Default::default()
    }
  }

  #[test]
  fn test_prune_removes_subtree() {
    let mut octree = octree();
    let node = node_with_blocks(&mut octree, free(20.0));
    let blocks: Vec<OctantId> = octree.blocks().map(|(id, _)| id).collect();
    assert_eq!(blocks.len(), 8);

    let mut updated: HashSet<OctantId> = blocks.iter().copied().collect();
    let sets = node_sets(&octree, node);
    let pruned = propagate_to_root(&mut octree, sets, 1, -95.0, Some(&mut updated));

    assert_eq!(pruned, 1);
    assert_eq!(octree.len(), 2);
    assert!(blocks.iter().all(|&id| octree.get(id).is_none()));
    assert!(blocks.iter().all(|id| !updated.contains(id)));
    assert!(updated.contains(&node));

    let node = octree.get(node).and_then(|o| o.as_node()).expect("node");
    assert!(node.is_leaf());
    assert_eq!(node.data().field.occupancy, -5.0);
  }

  /// Weight 10 gives a field value of -50, above the threshold.
  #[test]
  fn test_confident_threshold_required() {
    let mut octree = octree();
    let node = node_with_blocks(&mut octree, free(10.0));
    let sets = node_sets(&octree, node);
    assert_eq!(propagate_to_root(&mut octree, sets, 1, -95.0, None), 0);
    assert_eq!(octree.len(), 10);
  }

  /// A second pass with the same timestamp leaves summaries alone even if
  /// the children changed in between.
  #[test]
  fn test_same_frame_propagation_is_idempotent() {
    let mut octree = octree();
    let node = node_with_blocks(&mut octree, observed(2.0));
    let sets = node_sets(&octree, node);

    propagate_to_root(&mut octree, sets.clone(), 3, -95.0, None);
    let summary = octree.get(node).map(|o| o.summary()).expect("node");
    let root_summary = octree.get(octree.root()).map(|o| o.summary()).expect("root");
    assert_eq!(summary.1.field.occupancy, 2.0);

    let block = octree.blocks().map(|(id, _)| id).next().expect("block");
    let block = octree.get_mut(block).and_then(|o| o.as_block_mut()).expect("block");
    block.current_data_mut().expect("coarsest")[0] = observed(4.0);

    assert_eq!(propagate_to_root(&mut octree, sets, 3, -95.0, None), 0);
    assert_eq!(octree.get(node).map(|o| o.summary()), Some(summary));
    assert_eq!(octree.get(octree.root()).map(|o| o.summary()), Some(root_summary));
  }
}
