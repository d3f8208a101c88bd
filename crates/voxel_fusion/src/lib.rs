//! voxel_fusion - Multi-resolution occupancy mapping from depth sensors
//!
//! Depth frames are fused into a sparse octree of log-odds occupancy. Space
//! far from surfaces is stored in coarse nodes and blocks, surfaces at the
//! finest resolution the sensor supports at that distance.
//!
//! # Features
//!
//! - **Arena octree**: nodes and multi-scale voxel blocks behind generational
//!   handles
//! - **Volume carving**: frustum allocation driven by a min/max depth pyramid
//! - **Parallel fusion**: rayon block integration, adaptive block scale,
//!   up-propagation with pruning of uniform free space
//! - **Queries**: point, min/max, trilinear field and colour interpolation,
//!   field gradients
//!
//! # Example
//!
//! ```ignore
//! use voxel_fusion::{Map, MapConfig, MapIntegrator, Measurements, OccupancyConfig};
//!
//! let mut map: Map<OccupancyData> =
//!   Map::new(&MapConfig::centred(Vec3::splat(10.0), 0.05), OccupancyConfig::DEFAULT)?;
//! let camera = PinholeCamera::new(SensorConfig::default(), PinholeConfig::DEFAULT)?;
//! let mut integrator = MapIntegrator::default();
//!
//! integrator.integrate_depth(&mut map, &camera, &Measurements::new(&depth, t_ws), None)?;
//! let occupancy = visitor::get_field_interp_at_point(&map, point_w);
//! ```

pub mod data;
pub mod error;
pub mod image;
pub mod integrator;
pub mod map;
pub mod metrics;
pub mod octree;
pub mod sensor;
pub mod threading;
pub mod visitor;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export commonly used items
pub use data::{
  Data, FieldData, Occupancy, OccupancyColourData, OccupancyConfig, OccupancyData, Rgb,
  SemanticId, VoxelData,
};
pub use error::{MapError, Result};
pub use image::{ColourImage, DepthImage, IdImage, Image, SigmaImage};
pub use integrator::{FrameStats, MapIntegrator, Measurements};
pub use map::{Map, MapConfig};
pub use metrics::FusionMetrics;
pub use octree::{Octant, OctantId, Octree, OctreeConfig, Timestamp};
pub use sensor::{Lidar, LidarConfig, PinholeCamera, PinholeConfig, SensorConfig, SensorModel};
pub use threading::FusionPool;
