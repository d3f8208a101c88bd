//! Field integration parameters.

use crate::error::{MapError, Result};

/// How measurement uncertainty grows with depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum UncertaintyModel {
  /// `sigma = k_sigma * depth`
  #[default]
  Linear,
  /// `sigma = k_sigma * depth^2`
  Quadratic,
}

/// Occupancy fusion parameters.
///
/// The `*_factor` fields are multiples of the map resolution.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct OccupancyConfig {
  /// Log-odds sample for free space.
  pub log_odd_min: f32,
  /// Upper clamp of a single occupied sample.
  pub log_odd_max: f32,
  /// Lower bound of `occupancy * weight`. Drives pruning.
  pub min_occupancy: f32,
  /// Upper bound of `occupancy * weight`.
  pub max_occupancy: f32,
  /// Scale used for blocks known to be free space.
  pub fs_integr_scale: i32,
  pub uncertainty_model: UncertaintyModel,
  pub k_sigma: f32,
  pub sigma_min_factor: f32,
  pub sigma_max_factor: f32,
  pub k_tau: f32,
  pub tau_min_factor: f32,
  pub tau_max_factor: f32,
  /// Use `tau_max` everywhere instead of the depth-dependent band.
  pub const_surface_thickness: bool,
}

impl OccupancyConfig {
  /// Defaults tuned for RGB-D cameras.
  pub const DEFAULT: Self = Self {
    log_odd_min: -5.015,
    log_odd_max: 5.015,
    min_occupancy: -100.0,
    max_occupancy: 100.0,
    fs_integr_scale: 1,
    uncertainty_model: UncertaintyModel::Linear,
    k_sigma: 0.052,
    sigma_min_factor: 1.0,
    sigma_max_factor: 3.0,
    k_tau: 0.026,
    tau_min_factor: 3.0,
    tau_max_factor: 12.0,
    const_surface_thickness: false,
  };

  /// Weight cap so that `min_occupancy` is reachable by free-space updates.
  #[inline]
  pub fn max_weight(&self) -> f32 {
    (self.min_occupancy / (0.97 * self.log_odd_min)).abs().floor()
  }

  /// Threshold below which a subtree counts as confidently free.
  #[inline]
  pub fn prune_threshold(&self) -> f32 {
    0.95 * self.min_occupancy
  }

  pub fn validate(&self) -> Result<()> {
    if !(self.log_odd_min < 0.0 && self.log_odd_max > 0.0) {
      return Err(MapError::invalid_config(
        "log_odd_min must be negative and log_odd_max positive",
      ));
    }
    if !(self.min_occupancy < 0.0 && self.max_occupancy > 0.0) {
      return Err(MapError::invalid_config(
        "min_occupancy must be negative and max_occupancy positive",
      ));
    }
    if self.max_weight() < 1.0 {
      return Err(MapError::invalid_config(
        "min_occupancy is too small for the configured log_odd_min",
      ));
    }
    if self.fs_integr_scale < 0 {
      return Err(MapError::invalid_config("fs_integr_scale must be >= 0"));
    }
    if self.sigma_min_factor <= 0.0 || self.sigma_max_factor < self.sigma_min_factor {
      return Err(MapError::invalid_config(
        "sigma factors must satisfy 0 < min <= max",
      ));
    }
    if self.tau_min_factor <= 0.0 || self.tau_max_factor < self.tau_min_factor {
      return Err(MapError::invalid_config(
        "tau factors must satisfy 0 < min <= max",
      ));
    }
    Ok(())
  }
}

impl Default for OccupancyConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}

/// TSDF fusion parameters.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TsdfConfig {
  /// Truncation band in multiples of the map resolution.
  pub truncation_boundary_factor: f32,
  pub max_weight: f32,
}

impl TsdfConfig {
  pub const DEFAULT: Self = Self {
    truncation_boundary_factor: 8.0,
    max_weight: 100.0,
  };

  pub fn validate(&self) -> Result<()> {
    if self.truncation_boundary_factor <= 0.0 || self.max_weight < 1.0 {
      return Err(MapError::invalid_config(
        "truncation band must be positive and max_weight >= 1",
      ));
    }
    Ok(())
  }
}

impl Default for TsdfConfig {
  fn default() -> Self {
    Self::DEFAULT
  }
}
