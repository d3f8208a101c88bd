use glam::IVec3;

use super::*;
use crate::data::{Occupancy, OccupancyData};

const BLOCK_SIZE: i32 = 8;

fn block() -> Block<OccupancyData> {
  Block::new(IVec3::new(8, 0, 16), BLOCK_SIZE, None, OccupancyData::default())
}

fn observed(occupancy: f32, weight: f32) -> OccupancyData {
  OccupancyData {
    field: Occupancy {
      occupancy,
      weight,
      observed: true,
    },
    ..Default::default()
  }
}

/// Put a block into the single-scale state at `scale`.
fn initialized(scale: i32) -> Block<OccupancyData> {
  let mut block = block();
  block.allocate_down_to(scale);
  block.set_current_scale(scale);
  block.init_curr_count();
  block
}

// =========================================================================
// Allocation
// =========================================================================

/// Fresh blocks only hold the coarsest voxel.
#[test]
fn test_new_block_is_uninitialized() {
  let block = block();
  assert_eq!(block.max_scale(), 3);
  assert_eq!(block.current_scale(), 3);
  assert_eq!(block.min_scale(), -1);
  assert!(!block.is_initialized());
  assert!(block.scale_data(3).is_some());
  assert!(block.scale_data(0).is_none());
  assert_eq!(block.data(block.coord(), 0), OccupancyData::default());
}

/// Allocating down fills new scales with init data and aliases the finest.
#[test]
fn test_allocate_down_to_fills_init_data() {
  let init = observed(-2.0, 3.0);
  let mut block = Block::new(IVec3::ZERO, BLOCK_SIZE, None, init);
  block.allocate_down_to(1);

  assert_eq!(block.min_scale(), 1);
  assert_eq!(block.scale_data(1).map(<[_]>::len), Some(64));
  assert_eq!(block.scale_data(2).map(<[_]>::len), Some(8));
  assert!(block.scale_data(0).is_none());
  assert_eq!(block.data(IVec3::new(7, 7, 7), 1), init);

  // Unallocated finer scale falls back to init data.
  assert_eq!(block.data(IVec3::new(7, 7, 7), 0), init);
}

/// Summaries at the finest scale follow writes to the mean data.
#[test]
fn test_finest_summary_aliases_mean() {
  let mut block = initialized(1);
  let voxel = IVec3::new(10, 2, 18);
  let idx = voxel_index(voxel, block.coord(), BLOCK_SIZE, 1);
  if let Some(data) = block.current_data_mut() {
    data[idx] = observed(1.5, 2.0);
  }
  assert_eq!(block.min_data(voxel, 1), observed(1.5, 2.0));
  assert_eq!(block.max_data(voxel, 1), observed(1.5, 2.0));
}

#[test]
fn test_delete_up_to_frees_finer_scales() {
  let mut block = initialized(0);
  block.delete_up_to(2);

  assert_eq!(block.min_scale(), 2);
  assert_eq!(block.current_scale(), 2);
  assert!(block.scale_data(0).is_none());
  assert!(block.scale_data(1).is_none());
  assert!(block.scale_data(2).is_some());

  // Deleting towards a finer scale is a no-op.
  block.delete_up_to(1);
  assert_eq!(block.min_scale(), 2);
}

/// Blocks created under an observed free node start fully observed.
#[test]
fn test_init_curr_count_from_observed_init_data() {
  let mut block = Block::new(IVec3::ZERO, BLOCK_SIZE, None, observed(-5.0, 12.0));
  block.allocate_down_to(2);
  block.set_current_scale(2);
  block.init_curr_count();
  assert_eq!(block.curr_integr_count(), 12);
  assert_eq!(block.curr_observed_count(), 8);

  let mut fresh = initialized(2);
  fresh.init_curr_count();
  assert_eq!(fresh.curr_integr_count(), 0);
  assert_eq!(fresh.curr_observed_count(), 0);
}

// =========================================================================
// Buffer lifecycle
// =========================================================================

/// A finer buffer copies the current data down, unobserved.
#[test]
fn test_finer_buffer_copies_down_unobserved() {
  let mut block = initialized(1);
  let voxel = IVec3::new(8, 0, 16);
  if let Some(data) = block.current_data_mut() {
    data[0] = observed(-3.0, 4.0);
  }
  block.init_buffer(0);

  let buffer = block.buffer().expect("buffer");
  assert_eq!(buffer.scale(), 0);
  assert_eq!(buffer.data().len(), 512);
  for offset in [IVec3::ZERO, IVec3::X, IVec3::Y, IVec3::ONE] {
    let idx = voxel_index(voxel + offset, block.coord(), BLOCK_SIZE, 0);
    let copied = buffer.data()[idx];
    assert_eq!(copied.field.occupancy, -3.0);
    assert_eq!(copied.field.weight, 4.0);
    assert!(!copied.field.observed);
  }
}

/// Commit requires 20 integrations; it fires exactly once.
#[test]
fn test_switch_data_requires_min_integrations() {
  let mut block = initialized(1);
  block.add_curr_observed(64);
  block.init_buffer(0);
  block.add_buffer_observed(512);

  for _ in 0..BUFFER_MIN_INTEGRATIONS - 1 {
    block.incr_buffer_integr_count(true);
    assert!(!block.switch_data());
  }
  block.incr_buffer_integr_count(true);
  assert!(block.switch_data());
  assert!(!block.switch_data(), "commit must happen exactly once");

  assert_eq!(block.current_scale(), 0);
  assert_eq!(block.min_scale(), 0);
  assert_eq!(block.buffer_scale(), None);
  assert_eq!(block.curr_integr_count(), BUFFER_MIN_INTEGRATIONS);
  assert!(block.scale_data(1).is_some(), "previous scale keeps its data");
}

/// Insufficient coverage blocks the commit regardless of the count.
#[test]
fn test_switch_data_requires_coverage() {
  let mut block = initialized(1);
  block.add_curr_observed(64);
  block.init_buffer(0);
  // 460.8 scale-0 voxels are needed (0.9 * 64 * 8).
  block.add_buffer_observed(460);

  for _ in 0..40 {
    block.incr_buffer_integr_count(true);
  }
  assert!(!block.switch_data());

  block.add_buffer_observed(1);
  assert!(block.switch_data());
}

/// Partial projections only count once the buffer covers the current scale.
#[test]
fn test_buffer_count_needs_coverage_without_projection() {
  let mut block = initialized(1);
  block.add_curr_observed(64);
  block.init_buffer(0);

  block.incr_buffer_integr_count(false);
  assert_eq!(block.buffer().map(ScaleBuffer::integr_count), Some(0));

  block.add_buffer_observed(512);
  block.incr_buffer_integr_count(false);
  assert_eq!(block.buffer().map(ScaleBuffer::integr_count), Some(1));
}

/// Committing to a coarser scale frees the finer ones.
#[test]
fn test_coarser_commit_deletes_finer_scales() {
  let mut block = initialized(0);
  block.add_curr_observed(100);
  block.init_buffer(1);
  block.add_buffer_observed(64);
  for _ in 0..BUFFER_MIN_INTEGRATIONS {
    block.incr_buffer_integr_count(true);
  }

  assert!(block.switch_data());
  assert_eq!(block.current_scale(), 1);
  assert_eq!(block.min_scale(), 1);
  assert!(block.scale_data(0).is_none());
}

/// Reverting discards the buffer and keeps committed data.
#[test]
fn test_reset_buffer_keeps_committed_data() {
  let mut block = initialized(1);
  if let Some(data) = block.current_data_mut() {
    data[5] = observed(2.0, 1.0);
  }
  let before: Vec<_> = block.scale_data(1).map(<[_]>::to_vec).unwrap_or_default();

  block.init_buffer(0);
  if let Some(buffer) = block.buffer_data_mut() {
    buffer.fill(observed(-1.0, 1.0));
  }
  block.reset_buffer();

  assert_eq!(block.buffer_scale(), None);
  assert_eq!(block.scale_data(1).map(<[_]>::to_vec), Some(before));
}

// =========================================================================
// Up-propagation
// =========================================================================

/// Coarsest scale summarises the finest data.
#[test]
fn test_propagate_to_coarsest_scale() {
  let mut block = initialized(0);
  if let Some(data) = block.current_data_mut() {
    data.fill(observed(-1.0, 2.0));
    data[0] = observed(3.0, 2.0);
    data[511] = observed(-4.0, 2.0);
  }
  block.propagate_to_coarsest_scale();

  let coord = block.coord();
  let max = block.max_data(coord, 3);
  let min = block.min_data(coord, 3);
  let mean = block.data(coord, 3);
  assert_eq!(max.field.occupancy, 3.0);
  assert!(max.field.observed);
  assert_eq!(min.field.occupancy, -4.0);
  assert!(!mean.field.observed);
  assert!(mean.field.occupancy > -4.0 && mean.field.occupancy < 3.0);
}

/// Unobserved voxels keep the coarse max unobserved.
#[test]
fn test_propagate_partial_observation() {
  let mut block = initialized(1);
  if let Some(data) = block.current_data_mut() {
    data[..32].fill(observed(-1.0, 1.0));
  }
  block.propagate_to_coarsest_scale();

  let max = block.max_data(block.coord(), 3);
  assert!(max.is_valid());
  assert!(!max.field.observed);
}
