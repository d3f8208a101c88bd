//! Sparse multi-resolution octree.
//!
//! The tree is an arena of [`Octant`]s: interior [`Node`]s with up to eight
//! children and leaf [`Block`]s holding voxel data at several scales.
//!
//! # Scale Convention
//!
//! Scale 0 = finest (one voxel), higher scale = coarser.
//!
//! ```text
//! octant size  = 2^scale voxels
//! block depth  = log2(octree size / block size)
//! root depth   = 0
//! ```
//!
//! # Module Structure
//!
//! - [`arena`]: `Arena` - owns every octant, generational `OctantId` handles
//! - [`octant`]: `Node`, `Octant` and shared `OctantBase`
//! - [`block`]: `Block` - multi-scale voxel storage and the scale state machine
//! - [`tree`]: `Octree` - allocation primitives, AABB bookkeeping, iteration
//! - [`iter`]: depth-first iterators and their filters
//! - [`fetcher`]: point lookups
//! - [`geometry`]: child index and scale arithmetic

pub mod aabb;
pub mod arena;
pub mod block;
pub mod config;
pub mod fetcher;
pub mod geometry;
pub mod iter;
pub mod octant;
pub mod tree;

// Re-exports
pub use aabb::IAabb3;
pub use arena::{Arena, OctantId};
pub use block::{Block, ScaleBuffer, BUFFER_COVERAGE_RATIO, BUFFER_MIN_INTEGRATIONS};
pub use config::OctreeConfig;
pub use geometry::NUM_CHILDREN;
pub use iter::{
  AllOctants, BlocksOnly, InFrustum, LeavesOnly, NodesOnly, OctreeIter, TraversalFilter,
  UpdatedSince,
};
pub use octant::{Node, Octant, OctantBase, Timestamp};
pub use tree::Octree;
