//! Voxel data: a required field plus optional colour and identifier.
//!
//! Components are chosen through type parameters, never at runtime:
//!
//! ```ignore
//! type Plain = Data<Occupancy>;
//! type Coloured = Data<Occupancy, Rgb>;
//! type Semantic = Data<Occupancy, Rgb, SemanticId>;
//! ```
//!
//! Validity of a voxel depends on the field only.

pub mod colour;
pub mod config;
pub mod field;
pub mod id;

use std::fmt::Debug;

pub use colour::{ColourData, NoColour, Rgb};
pub use config::{OccupancyConfig, TsdfConfig, UncertaintyModel};
pub use field::{FieldData, FieldKind, Occupancy, Tsdf};
pub use id::{IdData, NoId, SemanticId};

/// Data stored per voxel (and per node for occupancy summaries).
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Data<F: FieldData, C: ColourData = NoColour, I: IdData = NoId> {
  pub field: F,
  pub colour: C,
  pub id: I,
}

/// Occupancy map data without colour or identifiers.
pub type OccupancyData = Data<Occupancy>;
/// Occupancy map data with colour.
pub type OccupancyColourData = Data<Occupancy, Rgb>;
/// TSDF map data without colour or identifiers.
pub type TsdfData = Data<Tsdf>;

/// Integration parameters of the field stored in `D`.
pub type FieldConfig<D> = <<D as VoxelData>::Field as FieldData>::Config;

/// Interface the octree needs from its voxel type.
pub trait VoxelData: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
  type Field: FieldData;
  type Colour: ColourData;
  type Id: IdData;

  fn field(&self) -> &Self::Field;
  fn field_mut(&mut self) -> &mut Self::Field;
  fn colour(&self) -> &Self::Colour;
  fn colour_mut(&mut self) -> &mut Self::Colour;
  fn id(&self) -> &Self::Id;
  fn id_mut(&mut self) -> &mut Self::Id;

  #[inline]
  fn is_valid(&self) -> bool {
    self.field().is_valid()
  }
}

impl<F: FieldData, C: ColourData, I: IdData> VoxelData for Data<F, C, I> {
  type Field = F;
  type Colour = C;
  type Id = I;

  #[inline]
  fn field(&self) -> &F {
    &self.field
  }
  #[inline]
  fn field_mut(&mut self) -> &mut F {
    &mut self.field
  }
  #[inline]
  fn colour(&self) -> &C {
    &self.colour
  }
  #[inline]
  fn colour_mut(&mut self) -> &mut C {
    &mut self.colour
  }
  #[inline]
  fn id(&self) -> &I {
    &self.id
  }
  #[inline]
  fn id_mut(&mut self) -> &mut I {
    &mut self.id
  }
}

// =============================================================================
// Up-propagation
// =============================================================================

/// Mean of the valid `children`. The result is unobserved.
pub fn mean_of<D: VoxelData>(children: &[D]) -> D {
  let fields: smallvec::SmallVec<[D::Field; 8]> = children.iter().map(|c| *c.field()).collect();
  let colours: smallvec::SmallVec<[D::Colour; 8]> = children
    .iter()
    .filter(|c| c.is_valid())
    .map(|c| *c.colour())
    .collect();

  let mut parent = D::default();
  *parent.field_mut() = D::Field::mean_of(&fields);
  *parent.colour_mut() = D::Colour::mean_of(&colours);
  if let Some(child) = children.iter().find(|c| c.is_valid()) {
    *parent.id_mut() = *child.id();
  }
  parent
}

/// Valid child with the largest field value.
///
/// Observed only when all eight children exist and are observed.
pub fn max_of<D: VoxelData>(children: &[D]) -> D {
  extreme_of(children, |candidate, best| candidate > best)
}

/// Valid child with the smallest field value.
///
/// Observed only when all eight children exist and are observed.
pub fn min_of<D: VoxelData>(children: &[D]) -> D {
  extreme_of(children, |candidate, best| candidate < best)
}

fn extreme_of<D: VoxelData>(children: &[D], better: impl Fn(f32, f32) -> bool) -> D {
  let mut best: Option<D> = None;
  for child in children.iter().filter(|c| c.is_valid()) {
    let replace = match &best {
      Some(current) => better(child.field().field_value(), current.field().field_value()),
      None => true,
    };
    if replace {
      best = Some(*child);
    }
  }

  let observed = children.len() == crate::octree::NUM_CHILDREN
    && children.iter().all(|c| c.field().is_observed());
  let mut parent = best.unwrap_or_default();
  parent.field_mut().set_observed(observed);
  parent
}

#[cfg(test)]
#[path = "data_test.rs"]
mod data_test;
