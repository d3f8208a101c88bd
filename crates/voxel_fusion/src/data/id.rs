//! Optional semantic identifier component.

use std::fmt::Debug;

/// Identifier component of a voxel. [`NoId`] compiles the component away.
pub trait IdData: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
  const ENABLED: bool;

  /// Store `id` unless it is [`SemanticId::NO_ID`].
  fn update(&mut self, id: u16);

  fn get(&self) -> Option<u16>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoId;

impl IdData for NoId {
  const ENABLED: bool = false;

  #[inline]
  fn update(&mut self, _id: u16) {}

  #[inline]
  fn get(&self) -> Option<u16> {
    None
  }
}

/// Instance or class identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SemanticId(pub u16);

impl SemanticId {
  /// Pixel carries no identifier.
  pub const NO_ID: u16 = 0;
  /// Voxel never received an identifier.
  pub const NOT_MAPPED: u16 = u16::MAX;
}

impl Default for SemanticId {
  fn default() -> Self {
    Self(Self::NOT_MAPPED)
  }
}

impl IdData for SemanticId {
  const ENABLED: bool = true;

  #[inline]
  fn update(&mut self, id: u16) {
    if id != Self::NO_ID {
      self.0 = id;
    }
  }

  #[inline]
  fn get(&self) -> Option<u16> {
    (self.0 != Self::NOT_MAPPED).then_some(self.0)
  }
}
