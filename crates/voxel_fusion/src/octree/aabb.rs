//! Integer axis-aligned bounding box in voxel coordinates.

use glam::IVec3;

/// Voxel-space bounding box.
///
/// `min` is inclusive, `max` is exclusive. An empty box has `min > max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IAabb3 {
	/// Minimum corner (inclusive).
	pub min: IVec3,
	/// Maximum corner (exclusive).
	pub max: IVec3,
}

impl IAabb3 {
	/// Box containing nothing. Extending it yields the extended region.
	pub const EMPTY: Self = Self {
		min: IVec3::MAX,
		max: IVec3::MIN,
	};

	/// Create a new AABB from min and max corners.
	///
	/// # Panics
	/// Debug-asserts that min <= max on all axes.
	pub fn new(min: IVec3, max: IVec3) -> Self {
		debug_assert!(
			min.cmple(max).all(),
			"AABB min must be <= max on all axes"
		);
		Self { min, max }
	}

	/// Cube of edge `size` with minimum corner `coord`.
	#[inline]
	pub fn from_octant(coord: IVec3, size: i32) -> Self {
		Self::new(coord, coord + size)
	}

	#[inline]
	pub fn is_empty(&self) -> bool {
		self.min.cmpge(self.max).any()
	}

	/// Grow to include the cube at `coord` with edge `size`.
	#[inline]
	pub fn extend(&mut self, coord: IVec3, size: i32) {
		self.min = self.min.min(coord);
		self.max = self.max.max(coord + size);
	}

	/// Check if this AABB contains a voxel.
	#[inline]
	pub fn contains(&self, voxel: IVec3) -> bool {
		voxel.cmpge(self.min).all() && voxel.cmplt(self.max).all()
	}

	/// Check if this AABB contains the whole cube at `coord`.
	#[inline]
	pub fn contains_octant(&self, coord: IVec3, size: i32) -> bool {
		coord.cmpge(self.min).all() && (coord + size).cmple(self.max).all()
	}

	/// Edge lengths, zero when empty.
	#[inline]
	pub fn size(&self) -> IVec3 {
		if self.is_empty() {
			IVec3::ZERO
		} else {
			self.max - self.min
		}
	}
}

impl Default for IAabb3 {
	fn default() -> Self {
		Self::EMPTY
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_empty() {
		let aabb = IAabb3::EMPTY;
		assert!(aabb.is_empty());
		assert!(!aabb.contains(IVec3::ZERO));
		assert_eq!(aabb.size(), IVec3::ZERO);
	}

	#[test]
	fn test_extend_from_empty() {
		let mut aabb = IAabb3::EMPTY;
		aabb.extend(IVec3::new(8, 0, 16), 8);
		assert_eq!(aabb, IAabb3::new(IVec3::new(8, 0, 16), IVec3::new(16, 8, 24)));
		assert!(!aabb.is_empty());
	}

	#[test]
	fn test_extend_grows() {
		let mut aabb = IAabb3::from_octant(IVec3::ZERO, 8);
		aabb.extend(IVec3::splat(24), 8);
		assert_eq!(aabb.min, IVec3::ZERO);
		assert_eq!(aabb.max, IVec3::splat(32));
	}

	#[test]
	fn test_contains() {
		let aabb = IAabb3::from_octant(IVec3::ZERO, 8);

		// Inside
		assert!(aabb.contains(IVec3::splat(7)));

		// Max corner is exclusive
		assert!(!aabb.contains(IVec3::splat(8)));
		assert!(!aabb.contains(IVec3::splat(-1)));
	}

	#[test]
	fn test_contains_octant() {
		let aabb = IAabb3::from_octant(IVec3::ZERO, 16);
		assert!(aabb.contains_octant(IVec3::splat(8), 8));
		assert!(!aabb.contains_octant(IVec3::splat(12), 8));
	}
}
