//! Field components: occupancy log-odds and truncated signed distance.

use std::fmt::Debug;

use super::config::{OccupancyConfig, TsdfConfig};
use crate::error::Result;

/// Which field a map stores. Fixed per data type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
  Occupancy,
  Tsdf,
}

/// Required field component of a voxel.
pub trait FieldData: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
  /// Field kind tag.
  const KIND: FieldKind;

  /// Integration parameters for this field.
  type Config: Clone + Debug + Default + Send + Sync;

  /// A voxel is valid once it received at least one measurement.
  fn is_valid(&self) -> bool;

  /// Scalar used by queries and summaries.
  fn field_value(&self) -> f32;

  /// Accumulated integration weight.
  fn weight(&self) -> f32;

  fn is_observed(&self) -> bool;

  fn set_observed(&mut self, observed: bool);

  /// Mean over the valid entries of `fields`; default if none is valid.
  fn mean_of(fields: &[Self]) -> Self;

  fn validate_config(config: &Self::Config) -> Result<()>;
}

// =============================================================================
// Occupancy
// =============================================================================

/// Occupancy log-odds with integration weight.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Occupancy {
  /// Mean log-odds of the fused samples.
  pub occupancy: f32,
  pub weight: f32,
  /// Set once the voxel has been fully observed at its current scale.
  pub observed: bool,
}

impl Occupancy {
  /// Fuse one log-odds sample as a weighted running mean.
  ///
  /// Returns true when this update observed the voxel for the first time.
  #[inline]
  pub fn update(&mut self, sample: f32, max_weight: f32) -> bool {
    self.occupancy = (self.occupancy * self.weight + sample) / (self.weight + 1.0);
    self.weight = (self.weight + 1.0).min(max_weight);
    let newly_observed = !self.observed;
    self.observed = true;
    newly_observed
  }
}

impl FieldData for Occupancy {
  const KIND: FieldKind = FieldKind::Occupancy;
  type Config = OccupancyConfig;

  #[inline]
  fn is_valid(&self) -> bool {
    self.weight > 0.0
  }

  #[inline]
  fn field_value(&self) -> f32 {
    self.occupancy * self.weight
  }

  #[inline]
  fn weight(&self) -> f32 {
    self.weight
  }

  #[inline]
  fn is_observed(&self) -> bool {
    self.observed
  }

  #[inline]
  fn set_observed(&mut self, observed: bool) {
    self.observed = observed;
  }

  fn mean_of(fields: &[Self]) -> Self {
    let mut occupancy = 0.0;
    let mut weight = 0.0;
    let mut count = 0;
    for field in fields.iter().filter(|f| f.is_valid()) {
      occupancy += field.occupancy;
      weight += field.weight;
      count += 1;
    }
    if count == 0 {
      return Self::default();
    }
    // Mean data is re-observed at the scale it gets committed to.
    Self {
      occupancy: occupancy / count as f32,
      weight: (weight / count as f32).ceil(),
      observed: false,
    }
  }

  #[inline]
  fn validate_config(config: &OccupancyConfig) -> Result<()> {
    config.validate()
  }
}

// =============================================================================
// TSDF
// =============================================================================

/// Truncated signed distance, normalised to `[-1, 1]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tsdf {
  pub tsdf: f32,
  pub weight: f32,
}

impl Default for Tsdf {
  fn default() -> Self {
    Self {
      tsdf: 1.0,
      weight: 0.0,
    }
  }
}

impl Tsdf {
  /// Fuse one truncated distance sample. Returns true on the first sample.
  #[inline]
  pub fn update(&mut self, sdf: f32, max_weight: f32) -> bool {
    let first = self.weight == 0.0;
    let sdf = sdf.clamp(-1.0, 1.0);
    self.tsdf = (self.tsdf * self.weight + sdf) / (self.weight + 1.0);
    self.weight = (self.weight + 1.0).min(max_weight);
    first
  }
}

impl FieldData for Tsdf {
  const KIND: FieldKind = FieldKind::Tsdf;
  type Config = TsdfConfig;

  #[inline]
  fn is_valid(&self) -> bool {
    self.weight > 0.0
  }

  #[inline]
  fn field_value(&self) -> f32 {
    self.tsdf
  }

  #[inline]
  fn weight(&self) -> f32 {
    self.weight
  }

  #[inline]
  fn is_observed(&self) -> bool {
    self.is_valid()
  }

  #[inline]
  fn set_observed(&mut self, _observed: bool) {}

  fn mean_of(fields: &[Self]) -> Self {
    let mut tsdf = 0.0;
    let mut weight = 0.0;
    let mut count = 0;
    for field in fields.iter().filter(|f| f.is_valid()) {
      tsdf += field.tsdf;
      weight += field.weight;
      count += 1;
    }
    if count == 0 {
      return Self::default();
    }
    Self {
      tsdf: tsdf / count as f32,
      weight: (weight / count as f32).ceil(),
    }
  }

  #[inline]
  fn validate_config(config: &TsdfConfig) -> Result<()> {
    config.validate()
  }
}
