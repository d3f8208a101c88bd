//! Frame fusion: carve the frustum, integrate measurements, propagate.
//!
//! # Flow
//!
//! ```text
//! depth image ──► VolumeCarver ──► VolumeCarverAllocation
//!                  (allocates)      node_list / block_list
//!                                          │
//!                                          ▼
//!                                   Updater (rayon)
//!                                   ├─ free nodes and their blocks
//!                                   ├─ integrate blocks
//!                                   └─ propagate to root, prune
//! ```
//!
//! [`MapIntegrator`] runs all three for one frame and keeps the frame counter
//! used as the octant timestamp.
//!
//! # Module Structure
//!
//! - [`carver`]: frustum allocation and per-block variance classification
//! - [`updater`]: parallel fusion and up-propagation
//! - [`propagator`]: node summaries from children

pub mod carver;
pub mod propagator;
pub mod updater;

use std::collections::HashSet;

use glam::Affine3A;
use web_time::Instant;

pub use carver::{VolumeCarver, VolumeCarverAllocation};
pub use updater::Updater;

use crate::data::{Occupancy, OccupancyConfig, UncertaintyModel, VoxelData};
use crate::error::Result;
use crate::image::{ColourImage, DepthImage, IdImage, SigmaImage};
use crate::map::Map;
use crate::metrics::FusionMetrics;
use crate::octree::{OctantId, Timestamp};
use crate::sensor::SensorModel;
use crate::threading::FusionPool;

/// Expected measurement variance inside a block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variance {
  /// The block lies entirely in front of the surface.
  Constant,
  /// The block may contain the surface.
  Gradient,
  /// The block lies entirely behind the surface.
  Undefined,
}

/// Images of one frame and the sensor pose they were taken from.
///
/// Colour and identifier images are registered to the depth image: they are
/// sampled at the depth pixel.
#[derive(Clone, Copy, Debug)]
pub struct Measurements<'a> {
  pub depth: &'a DepthImage,
  /// Per-pixel depth standard deviation. Modelled from depth when absent.
  pub sigma: Option<&'a SigmaImage>,
  pub colour: Option<&'a ColourImage>,
  pub id: Option<&'a IdImage>,
  /// Sensor frame to world frame.
  pub t_ws: Affine3A,
}

impl<'a> Measurements<'a> {
  pub fn new(depth: &'a DepthImage, t_ws: Affine3A) -> Self {
    Self {
      depth,
      sigma: None,
      colour: None,
      id: None,
      t_ws,
    }
  }

  pub fn with_sigma(mut self, sigma: &'a SigmaImage) -> Self {
    self.sigma = Some(sigma);
    self
  }

  pub fn with_colour(mut self, colour: &'a ColourImage) -> Self {
    self.colour = Some(colour);
    self
  }

  pub fn with_id(mut self, id: &'a IdImage) -> Self {
    self.id = Some(id);
    self
  }

  /// Every image must match the sensor resolution.
  pub fn validate<S: SensorModel + ?Sized>(&self, sensor: &S) -> Result<()> {
    let (width, height) = (sensor.width(), sensor.height());
    self.depth.check_dims(width, height)?;
    if let Some(sigma) = self.sigma {
      sigma.check_dims(width, height)?;
    }
    if let Some(colour) = self.colour {
      colour.check_dims(width, height)?;
    }
    if let Some(id) = self.id {
      id.check_dims(width, height)?;
    }
    Ok(())
  }

  /// Map frame to sensor frame.
  #[inline]
  pub fn t_sm(&self, t_wm: Affine3A) -> Affine3A {
    self.t_ws.inverse() * t_wm
  }
}

/// Surface band and uncertainty limits in metres, derived once per map.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MeasurementBounds {
  pub sigma_min: f32,
  pub sigma_max: f32,
  pub tau_min: f32,
  pub tau_max: f32,
  k_sigma: f32,
  k_tau: f32,
  model: UncertaintyModel,
  const_surface_thickness: bool,
}

impl MeasurementBounds {
  pub fn new(config: &OccupancyConfig, res: f32) -> Self {
    Self {
      sigma_min: config.sigma_min_factor * res,
      sigma_max: config.sigma_max_factor * res,
      tau_min: config.tau_min_factor * res,
      tau_max: config.tau_max_factor * res,
      k_sigma: config.k_sigma,
      k_tau: config.k_tau,
      model: config.uncertainty_model,
      const_surface_thickness: config.const_surface_thickness,
    }
  }

  /// Surface thickness at `depth`.
  #[inline]
  pub fn tau(&self, depth: f32) -> f32 {
    if self.const_surface_thickness {
      self.tau_max
    } else {
      (self.k_tau * depth).clamp(self.tau_min, self.tau_max)
    }
  }

  /// Three standard deviations at `depth`, from the pixel's sigma if known.
  #[inline]
  pub fn three_sigma(&self, depth: f32, sigma: Option<f32>) -> f32 {
    let sigma = sigma.unwrap_or_else(|| match self.model {
      UncertaintyModel::Linear => self.k_sigma * depth,
      UncertaintyModel::Quadratic => self.k_sigma * depth * depth,
    });
    3.0 * sigma.clamp(self.sigma_min, self.sigma_max)
  }
}

/// Counters of one fused frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
  /// Free nodes handed to the updater.
  pub nodes: usize,
  /// Blocks integrated with measurements.
  pub blocks: usize,
  /// Blocks updated as free space below free nodes.
  pub freed_blocks: usize,
  /// Nodes whose children were deleted.
  pub pruned_nodes: usize,
  /// Blocks that committed a new integration scale.
  pub scale_switches: usize,
  /// Size of the updated-octants set after the frame.
  pub updated_octants: usize,
}

/// Fuses frames into a map and stamps octants with the frame number.
#[derive(Debug, Default)]
pub struct MapIntegrator {
  pool: FusionPool,
  frame: Timestamp,
  metrics: FusionMetrics,
}

impl MapIntegrator {
  pub fn new(pool: FusionPool) -> Self {
    Self {
      pool,
      frame: 0,
      metrics: FusionMetrics::default(),
    }
  }

  /// Timestamp of the last fused frame, 0 before the first.
  #[inline]
  pub fn frame(&self) -> Timestamp {
    self.frame
  }

  #[inline]
  pub fn metrics(&self) -> &FusionMetrics {
    &self.metrics
  }

  /// Fuse one depth frame.
  ///
  /// When `updated` is given it receives every block, leaf node and
  /// propagated node the frame touched; pruned octants are removed again. A
  /// failed frame may leave newly allocated, unintegrated octants behind.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "integrator::integrate"))]
  pub fn integrate_depth<D, S>(
    &mut self,
    map: &mut Map<D>,
    sensor: &S,
    measurements: &Measurements<'_>,
    updated: Option<&mut HashSet<OctantId>>,
  ) -> Result<FrameStats>
  where
    D: VoxelData<Field = Occupancy>,
    S: SensorModel + ?Sized,
  {
    measurements.validate(sensor)?;
    self.frame += 1;
    let frame = self.frame;

    let carve_start = Instant::now();
    let allocation = VolumeCarver::new(map, sensor, measurements).carve()?;
    let carve_us = carve_start.elapsed().as_micros() as u64;

    let update_start = Instant::now();
    let updater = Updater::new(map, sensor, measurements, frame);
    let stats = self.pool.install(move || updater.update(&allocation, updated));
    let update_us = update_start.elapsed().as_micros() as u64;

    self.metrics.record_frame(&stats, carve_us, update_us);

    #[cfg(feature = "tracing")]
    tracing::debug!(
      frame,
      nodes = stats.nodes,
      blocks = stats.blocks,
      freed_blocks = stats.freed_blocks,
      pruned = stats.pruned_nodes,
      carve_us,
      update_us,
      "frame fused"
    );

    Ok(stats)
  }
}
