//! Multi-resolution leaf block.
//!
//! A block of edge `size` stores voxel data at scales `0` (finest, one voxel
//! per unit) up to `max_scale = log2(size)` (a single voxel). Per scale it
//! keeps mean data plus min/max summaries:
//!
//! ```text
//! scale:  max_scale ... current_scale == min_scale ... 0
//! mean:   always      allocated between             unallocated
//! min/max own arrays above min_scale, alias mean at min_scale
//! ```
//!
//! # Scale state machine
//!
//! - **Uninitialized** (`min_scale == -1`): only the coarsest scale exists and
//!   holds `init_data`.
//! - **Single scale**: integration happens at `current_scale`.
//! - **Trial buffer**: a second scale, one level finer or coarser, is
//!   integrated alongside the current one. [`Block::switch_data`] commits it
//!   once it has at least [`BUFFER_MIN_INTEGRATIONS`] integrations and covers
//!   at least 90% of the current scale's observed volume.
//!   [`Block::reset_buffer`] discards it.

use glam::IVec3;

use super::arena::OctantId;
use super::geometry::{index_to_voxel, size_to_scale, voxel_index, voxels_per_edge};
use super::octant::OctantBase;
use crate::data::{max_of, mean_of, min_of, FieldData, VoxelData};

/// Integrations a buffer needs before it may be committed.
pub const BUFFER_MIN_INTEGRATIONS: u32 = 20;

/// Fraction of the current observed volume a buffer must cover to commit.
pub const BUFFER_COVERAGE_RATIO: f64 = 0.9;

type ScaleData<D> = Option<Box<[D]>>;

/// Speculative scale integrated next to the current one.
#[derive(Clone, Debug)]
pub struct ScaleBuffer<D> {
  scale: i32,
  data: Box<[D]>,
  integr_count: u32,
  observed_count: u32,
}

impl<D> ScaleBuffer<D> {
  #[inline]
  pub fn scale(&self) -> i32 {
    self.scale
  }

  #[inline]
  pub fn data(&self) -> &[D] {
    &self.data
  }

  #[inline]
  pub fn integr_count(&self) -> u32 {
    self.integr_count
  }

  #[inline]
  pub fn observed_count(&self) -> u32 {
    self.observed_count
  }
}

/// Leaf octant holding voxel data.
#[derive(Clone, Debug)]
pub struct Block<D: VoxelData> {
  pub(crate) base: OctantBase,
  max_scale: i32,
  current_scale: i32,
  min_scale: i32,
  mean: Vec<ScaleData<D>>,
  min: Vec<ScaleData<D>>,
  max: Vec<ScaleData<D>>,
  buffer: Option<ScaleBuffer<D>>,
  init_data: D,
  curr_integr_count: u32,
  curr_observed_count: u32,
}

impl<D: VoxelData> Block<D> {
  /// Create an uninitialized block whose coarsest voxel holds `init_data`.
  pub fn new(coord: IVec3, size: i32, parent: Option<OctantId>, init_data: D) -> Self {
    let max_scale = size_to_scale(size);
    let levels = max_scale as usize + 1;
    let mut mean = vec![None; levels];
    mean[max_scale as usize] = Some(vec![init_data; 1].into_boxed_slice());
    Self {
      base: OctantBase::new(coord, size, parent),
      max_scale,
      current_scale: max_scale,
      min_scale: -1,
      mean,
      min: vec![None; levels],
      max: vec![None; levels],
      buffer: None,
      init_data,
      curr_integr_count: 0,
      curr_observed_count: 0,
    }
  }

  #[inline]
  pub fn coord(&self) -> IVec3 {
    self.base.coord
  }

  #[inline]
  pub fn size(&self) -> i32 {
    self.base.size
  }

  #[inline]
  pub fn max_scale(&self) -> i32 {
    self.max_scale
  }

  #[inline]
  pub fn current_scale(&self) -> i32 {
    self.current_scale
  }

  /// Finest allocated scale, `-1` before the first integration.
  #[inline]
  pub fn min_scale(&self) -> i32 {
    self.min_scale
  }

  #[inline]
  pub fn is_initialized(&self) -> bool {
    self.min_scale != -1
  }

  #[inline]
  pub fn buffer(&self) -> Option<&ScaleBuffer<D>> {
    self.buffer.as_ref()
  }

  #[inline]
  pub fn buffer_scale(&self) -> Option<i32> {
    self.buffer.as_ref().map(|b| b.scale)
  }

  #[inline]
  pub fn init_data(&self) -> &D {
    &self.init_data
  }

  #[inline]
  pub fn set_init_data(&mut self, init_data: D) {
    self.init_data = init_data;
  }

  pub fn set_current_scale(&mut self, scale: i32) {
    debug_assert!(
      (0..=self.max_scale).contains(&scale),
      "scale {scale} outside [0, {}]",
      self.max_scale
    );
    self.current_scale = scale;
  }

  #[inline]
  pub fn curr_integr_count(&self) -> u32 {
    self.curr_integr_count
  }

  #[inline]
  pub fn curr_observed_count(&self) -> u32 {
    self.curr_observed_count
  }

  /// Voxels per edge at `scale`.
  #[inline]
  pub fn edge(&self, scale: i32) -> i32 {
    voxels_per_edge(self.base.size, scale)
  }

  /// Voxel count at `scale`.
  #[inline]
  pub fn num_voxels(&self, scale: i32) -> usize {
    let edge = self.edge(scale) as usize;
    edge * edge * edge
  }

  /// Voxel coordinate of linear index `idx` at `scale`.
  #[inline]
  pub fn voxel_at(&self, idx: usize, scale: i32) -> IVec3 {
    index_to_voxel(idx, self.base.coord, self.base.size, scale)
  }

  #[inline]
  fn index(&self, voxel: IVec3, scale: i32) -> usize {
    debug_assert!(
      (0..=self.max_scale).contains(&scale),
      "scale {scale} outside [0, {}]",
      self.max_scale
    );
    voxel_index(voxel, self.base.coord, self.base.size, scale)
  }

  // ===========================================================================
  // Data access
  // ===========================================================================

  /// Mean data of `voxel` at `scale`; `init_data` if that scale is absent.
  pub fn data(&self, voxel: IVec3, scale: i32) -> D {
    let idx = self.index(voxel, scale);
    self.mean[scale as usize]
      .as_deref()
      .map_or(self.init_data, |data| data[idx])
  }

  /// Mean data of `voxel` at the current scale.
  #[inline]
  pub fn current_data(&self, voxel: IVec3) -> D {
    self.data(voxel, self.current_scale)
  }

  pub fn min_data(&self, voxel: IVec3, scale: i32) -> D {
    let idx = self.index(voxel, scale);
    summary_or_mean(&self.min, &self.mean, scale)
      .map_or(self.init_data, |data| data[idx])
  }

  pub fn max_data(&self, voxel: IVec3, scale: i32) -> D {
    let idx = self.index(voxel, scale);
    summary_or_mean(&self.max, &self.mean, scale)
      .map_or(self.init_data, |data| data[idx])
  }

  /// Mean array at `scale`, if allocated.
  #[inline]
  pub fn scale_data(&self, scale: i32) -> Option<&[D]> {
    self.mean.get(scale as usize)?.as_deref()
  }

  #[inline]
  pub fn scale_data_mut(&mut self, scale: i32) -> Option<&mut [D]> {
    self.mean.get_mut(scale as usize)?.as_deref_mut()
  }

  /// Mutable mean data at the current scale.
  #[inline]
  pub fn current_data_mut(&mut self) -> Option<&mut [D]> {
    let scale = self.current_scale;
    self.scale_data_mut(scale)
  }

  #[inline]
  pub fn buffer_data_mut(&mut self) -> Option<&mut [D]> {
    self.buffer.as_mut().map(|b| &mut *b.data)
  }

  // ===========================================================================
  // Scale allocation
  // ===========================================================================

  #[inline]
  fn finest_allocated_scale(&self) -> i32 {
    if self.min_scale == -1 {
      self.max_scale
    } else {
      self.min_scale
    }
  }

  /// Allocate mean data down to `new_min_scale`, filled with `init_data`.
  ///
  /// Intermediate scales get min/max copies; the new finest scale aliases
  /// its mean data.
  pub fn allocate_down_to(&mut self, new_min_scale: i32) {
    let new_min = new_min_scale.clamp(0, self.max_scale);
    let finest = self.finest_allocated_scale();

    if new_min < finest {
      let previous = finest as usize;
      if let Some(mean) = self.mean[previous].clone() {
        self.min[previous].get_or_insert_with(|| mean.clone());
        self.max[previous].get_or_insert(mean);
      }

      for scale in new_min..finest {
        let data = vec![self.init_data; self.num_voxels(scale)].into_boxed_slice();
        let s = scale as usize;
        if scale == new_min {
          self.min[s] = None;
          self.max[s] = None;
        } else {
          self.min[s] = Some(data.clone());
          self.max[s] = Some(data.clone());
        }
        self.mean[s] = Some(data);
      }
    }

    self.min_scale = new_min.min(finest);
  }

  /// Free every scale finer than `new_min_scale`.
  pub fn delete_up_to(&mut self, new_min_scale: i32) {
    if self.min_scale == -1 || new_min_scale <= self.min_scale {
      return;
    }
    let new_min = new_min_scale.min(self.max_scale);
    for scale in self.min_scale..new_min {
      let s = scale as usize;
      self.mean[s] = None;
      self.min[s] = None;
      self.max[s] = None;
    }
    self.min[new_min as usize] = None;
    self.max[new_min as usize] = None;
    self.min_scale = new_min;
    self.current_scale = self.current_scale.max(new_min);
  }

  // ===========================================================================
  // Integration counters
  // ===========================================================================

  /// Seed the current-scale counters from `init_data`.
  ///
  /// A block created under an observed free node starts fully observed.
  pub fn init_curr_count(&mut self) {
    let field = self.init_data.field();
    if field.is_observed() {
      self.curr_integr_count = field.weight() as u32;
      self.curr_observed_count = self.num_voxels(self.current_scale) as u32;
    } else {
      self.curr_integr_count = 0;
      self.curr_observed_count = 0;
    }
  }

  #[inline]
  pub fn incr_curr_integr_count(&mut self) {
    self.curr_integr_count = self.curr_integr_count.saturating_add(1);
  }

  #[inline]
  pub fn add_curr_observed(&mut self, count: u32) {
    self.curr_observed_count += count;
  }

  /// Start a trial at `scale`, one level away from the current scale.
  ///
  /// A finer buffer copies the current data down with the observed flag
  /// cleared; a coarser one starts from the existing coarser mean data.
  pub fn init_buffer(&mut self, scale: i32) {
    debug_assert!(
      (scale - self.current_scale).abs() == 1,
      "buffer scale {scale} not adjacent to current scale {}",
      self.current_scale
    );
    let scale = scale.clamp(0, self.max_scale);
    let data: Box<[D]> = if scale < self.current_scale {
      (0..self.num_voxels(scale))
        .map(|idx| {
          let mut data = self.current_data(self.voxel_at(idx, scale));
          data.field_mut().set_observed(false);
          data
        })
        .collect()
    } else {
      match self.scale_data(scale) {
        Some(data) => data.into(),
        None => vec![self.init_data; self.num_voxels(scale)].into_boxed_slice(),
      }
    };

    self.buffer = Some(ScaleBuffer {
      scale,
      data,
      integr_count: 0,
      observed_count: 0,
    });
  }

  /// Drop the trial buffer. Committed data is untouched.
  #[inline]
  pub fn reset_buffer(&mut self) {
    self.buffer = None;
  }

  /// Count one integration into the buffer.
  ///
  /// Integrations that did not fully project into the frame only count once
  /// the buffer already covers the current scale.
  pub fn incr_buffer_integr_count(&mut self, do_increment: bool) {
    let covers = self.buffer_covers_current();
    if let Some(buffer) = self.buffer.as_mut() {
      if do_increment || covers {
        buffer.integr_count = buffer.integr_count.saturating_add(1);
      }
    }
  }

  #[inline]
  pub fn add_buffer_observed(&mut self, count: u32) {
    if let Some(buffer) = self.buffer.as_mut() {
      buffer.observed_count += count;
    }
  }

  /// Scale-normalised observed volume of the buffer versus the current scale.
  fn buffer_covers_current(&self) -> bool {
    self.buffer.as_ref().is_some_and(|buffer| {
      let buffer_volume = buffer.observed_count as f64 * 8f64.powi(buffer.scale);
      let current_volume = self.curr_observed_count as f64 * 8f64.powi(self.current_scale);
      buffer_volume >= BUFFER_COVERAGE_RATIO * current_volume
    })
  }

  /// Commit the buffer if it qualifies. Returns true on a scale switch.
  pub fn switch_data(&mut self) -> bool {
    let qualifies = self
      .buffer
      .as_ref()
      .is_some_and(|b| b.integr_count >= BUFFER_MIN_INTEGRATIONS)
      && self.buffer_covers_current();
    if !qualifies {
      return false;
    }
    let Some(mut buffer) = self.buffer.take() else {
      return false;
    };

    let mut observed_count = buffer.observed_count;
    for data in buffer.data.iter_mut() {
      let field = data.field_mut();
      if field.weight() > 0.0 && !field.is_observed() {
        field.set_observed(true);
        observed_count += 1;
      }
    }

    let scale = buffer.scale as usize;
    if buffer.scale < self.current_scale {
      // The previous finest scale now needs its own min/max arrays.
      let previous = self.current_scale as usize;
      if let Some(mean) = self.mean[previous].clone() {
        self.min[previous].get_or_insert_with(|| mean.clone());
        self.max[previous].get_or_insert(mean);
      }
      self.mean[scale] = Some(buffer.data);
      self.min[scale] = None;
      self.max[scale] = None;
      self.min_scale = buffer.scale;
    } else {
      self.mean[scale] = Some(buffer.data);
      self.delete_up_to(buffer.scale);
    }

    self.current_scale = buffer.scale;
    self.curr_integr_count = buffer.integr_count;
    self.curr_observed_count = observed_count;
    true
  }

  // ===========================================================================
  // Up-propagation
  // ===========================================================================

  /// Recompute mean/min/max from the current scale up to the coarsest.
  pub fn propagate_to_coarsest_scale(&mut self) {
    if self.min_scale == -1 {
      return;
    }
    let size = self.base.size;
    let (start, max_scale) = (self.current_scale, self.max_scale);
    let Self { mean, min, max, .. } = self;

    for child_scale in start..max_scale {
      let parent_scale = (child_scale + 1) as usize;
      let child_edge = voxels_per_edge(size, child_scale) as usize;
      let parent_edge = child_edge / 2;

      let (mean_lower, mean_upper) = mean.split_at_mut(parent_scale);
      let (Some(child_mean), Some(parent_mean)) = (
        mean_lower[parent_scale - 1].as_deref(),
        mean_upper[0].as_deref_mut(),
      ) else {
        continue;
      };
      let (min_lower, min_upper) = min.split_at_mut(parent_scale);
      let child_min = min_lower[parent_scale - 1].as_deref().unwrap_or(child_mean);
      let mut parent_min = min_upper[0].as_deref_mut();
      let (max_lower, max_upper) = max.split_at_mut(parent_scale);
      let child_max = max_lower[parent_scale - 1].as_deref().unwrap_or(child_mean);
      let mut parent_max = max_upper[0].as_deref_mut();

      for pz in 0..parent_edge {
        for py in 0..parent_edge {
          for px in 0..parent_edge {
            let parent_idx = px + parent_edge * (py + parent_edge * pz);
            let mut idx = [0usize; 8];
            for (i, slot) in idx.iter_mut().enumerate() {
              let cx = 2 * px + (i & 1);
              let cy = 2 * py + ((i >> 1) & 1);
              let cz = 2 * pz + ((i >> 2) & 1);
              *slot = cx + child_edge * (cy + child_edge * cz);
            }

            parent_mean[parent_idx] = mean_of(&idx.map(|i| child_mean[i]));
            if let Some(parent_min) = parent_min.as_deref_mut() {
              parent_min[parent_idx] = min_of(&idx.map(|i| child_min[i]));
            }
            if let Some(parent_max) = parent_max.as_deref_mut() {
              parent_max[parent_idx] = max_of(&idx.map(|i| child_max[i]));
            }
          }
        }
      }
    }
  }
}

/// Summary array at `scale`, falling back to the mean it aliases.
#[inline]
fn summary_or_mean<'a, D>(
  summary: &'a [ScaleData<D>],
  mean: &'a [ScaleData<D>],
  scale: i32,
) -> Option<&'a [D]> {
  let s = scale as usize;
  summary[s].as_deref().or(mean[s].as_deref())
}

#[cfg(test)]
#[path = "block_test.rs"]
mod block_test;
