//! Updater - parallel occupancy fusion of one carved frame.
//!
//! # Phases
//!
//! ```text
//! 1. free space   node_list leaves ──► free update (par)
//!                                      parents ─► node_sets[depth - 1]
//! 2. blocks       block_list ────────► scale selection + integration (par)
//! 3. coarsening   integrated + freed blocks ─► coarsest scale (par)
//! 4. to root      node_sets, finest depth first ─► summaries, pruning
//! ```
//!
//! Workers never share an octant: the carver lists each octant at most once
//! and free-space leaves lie below listed nodes only. Parents recorded by
//! workers go through one lock per depth (`node_lock`), freed blocks through
//! `block_lock`.
//!
//! # Log-odds model
//!
//! With `d = range_diff` (positive behind the surface):
//!
//! ```text
//! d < -3 sigma       log_odd_min
//! d < tau / 2        log_odd_min - log_odd_min / (3 sigma) * (d + 3 sigma)
//! d < tau            -log_odd_min * tau / (6 sigma)
//! otherwise          unchanged
//! ```
//!
//! Occupied samples are clamped to `log_odd_max`.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

use crossbeam_channel as channel;
use glam::{Affine3A, IVec3, Vec3};
use rayon::prelude::*;

use super::carver::VolumeCarverAllocation;
use super::propagator::propagate_to_root;
use super::{FrameStats, MeasurementBounds, Measurements, Variance};
use crate::data::{ColourData, IdData, Occupancy, OccupancyConfig, VoxelData};
use crate::map::Map;
use crate::octree::geometry::{index_to_voxel, scale_to_size, size_to_scale};
use crate::octree::{Block, LeavesOnly, Node, Octant, OctantId, Octree, OctreeIter, Timestamp};
use crate::sensor::SensorModel;

/// Share of `log_odd_min` below which a block counts as confidently free.
const FREE_BLOCK_RATIO: f32 = 0.95;

/// Fuse a measurement into an occupancy field.
///
/// Returns true if the voxel was observed for the first time. Voxels more
/// than `tau` behind the surface are left untouched.
pub fn update_voxel(
  field: &mut Occupancy,
  range_diff: f32,
  tau: f32,
  three_sigma: f32,
  config: &OccupancyConfig,
  max_weight: f32,
) -> bool {
  let log_odd_min = config.log_odd_min;
  let sample = if range_diff < -three_sigma {
    log_odd_min
  } else if range_diff < 0.5 * tau {
    (log_odd_min - log_odd_min / three_sigma * (range_diff + three_sigma)).min(config.log_odd_max)
  } else if range_diff < tau {
    (-log_odd_min * tau / (2.0 * three_sigma)).min(config.log_odd_max)
  } else {
    return false;
  };
  field.update(sample, max_weight)
}

/// Fuse a free-space sample. Returns true on the first observation.
#[inline]
pub fn free_voxel(field: &mut Occupancy, config: &OccupancyConfig, max_weight: f32) -> bool {
  field.update(config.log_odd_min, max_weight)
}

/// How a block is updated this frame.
#[derive(Clone, Copy, Debug)]
enum BlockUpdate {
  /// Below a free node: every voxel is free, no projection needed.
  Free,
  Measured {
    low_variance: bool,
    projects_inside: bool,
  },
}

/// Read-only per-frame state shared by all workers.
struct Fusion<'a, S: SensorModel + ?Sized> {
  sensor: &'a S,
  measurements: Measurements<'a>,
  /// Map frame to sensor frame.
  t_sm: Affine3A,
  res: f32,
  config: &'a OccupancyConfig,
  bounds: MeasurementBounds,
  max_weight: f32,
}

/// Applies a [`VolumeCarverAllocation`] to the map.
pub struct Updater<'a, D: VoxelData, S: SensorModel + ?Sized> {
  octree: &'a mut Octree<D>,
  fusion: Fusion<'a, S>,
  timestamp: Timestamp,
}

impl<'a, D, S> Updater<'a, D, S>
where
  D: VoxelData<Field = Occupancy>,
  S: SensorModel + ?Sized,
{
  pub fn new(
    map: &'a mut Map<D>,
    sensor: &'a S,
    measurements: &Measurements<'a>,
    timestamp: Timestamp,
  ) -> Self {
    let res = map.res();
    let t_sm = measurements.t_sm(map.t_wm());
    let (octree, config) = map.split_mut();
    Self {
      octree,
      fusion: Fusion {
        sensor,
        measurements: *measurements,
        t_sm,
        res,
        bounds: MeasurementBounds::new(config, res),
        max_weight: config.max_weight(),
        config,
      },
      timestamp,
    }
  }

  /// Fuse the frame and propagate to the root.
  ///
  /// `updated` receives every integrated block, freed block, free leaf node
  /// and propagated node. Octants removed by pruning are taken out again.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "updater::update"))]
  pub fn update(
    self,
    allocation: &VolumeCarverAllocation,
    mut updated: Option<&mut HashSet<OctantId>>,
  ) -> FrameStats {
    let Self {
      octree,
      fusion,
      timestamp,
    } = self;
    let block_depth = octree.block_depth();
    let max_scale = octree.max_scale();

    // node_lock: one shard per depth
    let node_sets: Vec<Mutex<HashSet<OctantId>>> =
      (0..block_depth).map(|_| Mutex::default()).collect();
    // block_lock
    let freed_blocks: Mutex<Vec<OctantId>> = Mutex::default();
    let (switch_tx, switch_rx) = channel::unbounded::<OctantId>();

    let record_parent = |depth: i32, parent: Option<OctantId>| {
      if let (Some(parent), Ok(idx)) = (parent, usize::try_from(depth - 1)) {
        if let Some(set) = node_sets.get(idx) {
          set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(parent);
        }
      }
    };

    // Phase 1: free space
    {
      #[cfg(feature = "tracing")]
      let _span = tracing::info_span!("free_nodes").entered();
      let targets = free_space_leaves(octree, &allocation.node_list);
      octree
        .arena_mut()
        .get_disjoint_mut(&targets)
        .into_par_iter()
        .for_each_with(switch_tx.clone(), |switches, (id, octant)| {
          octant.set_timestamp(timestamp);
          let depth = max_scale - size_to_scale(octant.size());
          let parent = octant.parent();
          match octant {
            Octant::Node(node) => fusion.free_node(node),
            Octant::Block(block) => {
              if fusion.fuse_block(block, BlockUpdate::Free) {
                report_switch(switches, id);
              }
              freed_blocks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(id);
            }
          }
          record_parent(depth, parent);
        });
    }

    // Phase 2: measured blocks
    {
      #[cfg(feature = "tracing")]
      let _span = tracing::info_span!("update_blocks").entered();
      let meta: HashMap<OctantId, BlockUpdate> = allocation
        .block_list
        .iter()
        .zip(&allocation.variance_list)
        .zip(&allocation.projects_inside_list)
        .map(|((&id, &variance), &projects_inside)| {
          let update = BlockUpdate::Measured {
            low_variance: variance == Variance::Constant,
            projects_inside,
          };
          (id, update)
        })
        .collect();
      octree
        .arena_mut()
        .get_disjoint_mut(&allocation.block_list)
        .into_par_iter()
        .for_each_with(switch_tx, |switches, (id, octant)| {
          let (Some(&update), Some(block)) = (meta.get(&id), octant.as_block_mut()) else {
            return;
          };
          if fusion.fuse_block(block, update) {
            report_switch(switches, id);
          }
          octant.set_timestamp(timestamp);
        });
    }

    let freed_blocks = freed_blocks
      .into_inner()
      .unwrap_or_else(PoisonError::into_inner);
    let scale_switches = switch_rx.try_iter().count();

    // Phase 3: block scales
    {
      #[cfg(feature = "tracing")]
      let _span = tracing::info_span!("propagate_blocks").entered();
      let mut blocks = allocation.block_list.clone();
      blocks.extend_from_slice(&freed_blocks);
      octree
        .arena_mut()
        .get_disjoint_mut(&blocks)
        .into_par_iter()
        .for_each(|(_, octant)| {
          if let Some(block) = octant.as_block_mut() {
            block.propagate_to_coarsest_scale();
          }
        });
    }

    // Pruning below invalidates handles, so the set must be complete first.
    if let Some(set) = updated.as_deref_mut() {
      set.extend(allocation.block_list.iter().copied());
      set.extend(freed_blocks.iter().copied());
      set.extend(
        allocation
          .node_list
          .iter()
          .copied()
          .filter(|&id| octree.get(id).is_some_and(|octant| octant.is_leaf())),
      );
    }

    // Phase 4: to root
    let mut node_sets: Vec<HashSet<OctantId>> = node_sets
      .into_iter()
      .map(|set| set.into_inner().unwrap_or_else(PoisonError::into_inner))
      .collect();
    if let Some(finest) = node_sets.last_mut() {
      for &id in &allocation.block_list {
        if let Some(parent) = octree.get(id).and_then(|octant| octant.parent()) {
          finest.insert(parent);
        }
      }
    }
    let pruned_nodes = propagate_to_root(
      octree,
      node_sets,
      timestamp,
      fusion.config.prune_threshold(),
      updated.as_deref_mut(),
    );

    FrameStats {
      nodes: allocation.node_list.len(),
      blocks: allocation.block_list.len(),
      freed_blocks: freed_blocks.len(),
      pruned_nodes,
      scale_switches,
      updated_octants: updated.map_or(0, |set| set.len()),
    }
  }
}

/// Queue a committed scale switch for [`FrameStats::scale_switches`].
///
/// The receiver lives until both fusion phases have joined, so a failed send
/// only happens if that ordering is broken.
#[inline]
fn report_switch(switches: &channel::Sender<OctantId>, id: OctantId) {
  if switches.send(id).is_err() {
    #[cfg(feature = "tracing")]
    tracing::warn!(?id, "scale switch dropped from frame stats");
  }
}

/// Leaves below the free nodes: childless nodes and blocks.
fn free_space_leaves<D: VoxelData>(octree: &Octree<D>, node_list: &[OctantId]) -> Vec<OctantId> {
  node_list
    .iter()
    .flat_map(|&id| OctreeIter::new(octree.arena(), id, LeavesOnly).map(|(leaf, _)| leaf))
    .collect()
}

impl<S: SensorModel + ?Sized> Fusion<'_, S> {
  fn free_node<D: VoxelData<Field = Occupancy>>(&self, node: &mut Node<D>) {
    let mut data = node.data();
    free_voxel(data.field_mut(), self.config, self.max_weight);
    node.set_summary(data, data);
  }

  /// Select the integration scale and fuse the block.
  ///
  /// Returns true if the block committed its buffer as the new scale.
  fn fuse_block<D: VoxelData<Field = Occupancy>>(
    &self,
    block: &mut Block<D>,
    update: BlockUpdate,
  ) -> bool {
    let (coord, size) = (block.coord(), block.size());
    let centre_s = self
      .t_sm
      .transform_point3((coord.as_vec3() + Vec3::splat(0.5 * size as f32)) * self.res);
    let recommended = self.recommended_scale(block, centre_s, update);
    let tau = self
      .bounds
      .tau(self.sensor.measurement_from_point(centre_s));

    if !block.is_initialized() {
      block.allocate_down_to(recommended);
      block.set_current_scale(recommended);
      block.init_curr_count();
      block.set_init_data(D::default());
    } else if recommended != block.current_scale() {
      if block.buffer_scale() != Some(recommended) {
        block.init_buffer(recommended);
      }
      let observed = block
        .buffer_data_mut()
        .map_or(0, |data| self.fuse_scale(data, coord, size, recommended, update, tau));
      block.add_buffer_observed(observed);
      block.incr_buffer_integr_count(match update {
        BlockUpdate::Free => true,
        BlockUpdate::Measured {
          projects_inside, ..
        } => projects_inside,
      });
      if block.switch_data() {
        #[cfg(feature = "tracing")]
        tracing::trace!(%coord, scale = recommended, "block switched scale");
        return true;
      }
    } else {
      block.reset_buffer();
    }

    let scale = block.current_scale();
    let observed = block
      .current_data_mut()
      .map_or(0, |data| self.fuse_scale(data, coord, size, scale, update, tau));
    block.add_curr_observed(observed);
    block.incr_curr_integr_count();
    false
  }

  /// Scale from the sensor, bounded to one step from the current scale.
  ///
  /// Free and low-variance blocks that are new or confidently free may drop
  /// to `fs_integr_scale`.
  fn recommended_scale<D: VoxelData<Field = Occupancy>>(
    &self,
    block: &Block<D>,
    centre_s: Vec3,
    update: BlockUpdate,
  ) -> i32 {
    let initialized = block.is_initialized();
    let max_scale = block.max_scale();
    let last = if initialized { block.current_scale() } else { 0 };
    let computed =
      self
        .sensor
        .compute_integration_scale(centre_s, self.res, last, block.min_scale(), max_scale);

    let low_variance = match update {
      BlockUpdate::Free => true,
      BlockUpdate::Measured { low_variance, .. } => low_variance,
    };
    let confidently_free = !initialized
      || block.max_data(block.coord(), max_scale).field().occupancy
        < FREE_BLOCK_RATIO * self.config.log_odd_min;
    let min_scale = if low_variance && confidently_free {
      self.config.fs_integr_scale
    } else {
      (last - 1).max(0)
    };
    if !initialized {
      return computed.max(min_scale).min(max_scale);
    }
    let max_step = (last + 1).min(max_scale);
    computed.max(min_scale).min(max_step).max((last - 1).max(0))
  }

  /// Fuse every voxel of `data`, the block's array at `scale`.
  ///
  /// Returns how many voxels were observed for the first time.
  fn fuse_scale<D: VoxelData<Field = Occupancy>>(
    &self,
    data: &mut [D],
    coord: IVec3,
    size: i32,
    scale: i32,
    update: BlockUpdate,
    tau: f32,
  ) -> u32 {
    let half_stride = 0.5 * scale_to_size(scale) as f32;
    let mut observed = 0;
    for (idx, voxel_data) in data.iter_mut().enumerate() {
      let newly_observed = match update {
        BlockUpdate::Free => free_voxel(voxel_data.field_mut(), self.config, self.max_weight),
        BlockUpdate::Measured { low_variance, .. } => {
          let voxel = index_to_voxel(idx, coord, size, scale);
          let point_m = (voxel.as_vec3() + Vec3::splat(half_stride)) * self.res;
          self.measure_voxel(voxel_data, self.t_sm.transform_point3(point_m), low_variance, tau)
        }
      };
      observed += newly_observed as u32;
    }
    observed
  }

  fn measure_voxel<D: VoxelData<Field = Occupancy>>(
    &self,
    data: &mut D,
    point_s: Vec3,
    low_variance: bool,
    tau: f32,
  ) -> bool {
    let Some(pixel) = self.sensor.project_to_pixel(point_s) else {
      return false;
    };
    let Some(depth) = self.measurements.depth.pixel(pixel) else {
      return false;
    };
    // Also rejects NaN.
    if !(depth >= self.sensor.near_plane()) {
      return false;
    }
    if low_variance {
      return free_voxel(data.field_mut(), self.config, self.max_weight);
    }

    let measurement = self.sensor.measurement_from_point(point_s);
    let range_diff = (measurement - depth) * (point_s.length() / measurement);
    let sigma = self.measurements.sigma.and_then(|sigma| sigma.pixel(pixel));
    let three_sigma = self.bounds.three_sigma(depth, sigma);
    let newly_observed = update_voxel(
      data.field_mut(),
      range_diff,
      tau,
      three_sigma,
      self.config,
      self.max_weight,
    );

    let near_surface = range_diff > -three_sigma && range_diff < tau;
    if near_surface && depth <= self.sensor.far_plane() {
      if let Some(rgb) = self.measurements.colour.and_then(|colour| colour.pixel(pixel)) {
        data.colour_mut().update(rgb, self.max_weight as u16);
      }
      if let Some(id) = self.measurements.id.and_then(|ids| ids.pixel(pixel)) {
        data.id_mut().update(id);
      }
    }
    newly_observed
  }
}
