//! Optional colour component.

use std::fmt::Debug;

use glam::Vec3;

/// Colour component of a voxel. [`NoColour`] compiles the component away.
pub trait ColourData: Copy + Default + Debug + PartialEq + Send + Sync + 'static {
  const ENABLED: bool;

  /// Fuse one RGB sample.
  fn update(&mut self, rgb: [u8; 3], max_weight: u16);

  /// Weighted mean of `colours`.
  fn mean_of(colours: &[Self]) -> Self;

  /// Colour as `[0, 255]` floats, if stored.
  fn to_vec3(&self) -> Option<Vec3>;
}

/// No colour stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NoColour;

impl ColourData for NoColour {
  const ENABLED: bool = false;

  #[inline]
  fn update(&mut self, _rgb: [u8; 3], _max_weight: u16) {}

  #[inline]
  fn mean_of(_colours: &[Self]) -> Self {
    NoColour
  }

  #[inline]
  fn to_vec3(&self) -> Option<Vec3> {
    None
  }
}

/// 8-bit RGB with its own fusion weight.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rgb {
  pub rgb: [u8; 3],
  pub weight: u16,
}

impl ColourData for Rgb {
  const ENABLED: bool = true;

  fn update(&mut self, rgb: [u8; 3], max_weight: u16) {
    let w = self.weight as f32;
    for (channel, sample) in self.rgb.iter_mut().zip(rgb) {
      let fused = (*channel as f32 * w + sample as f32) / (w + 1.0);
      *channel = fused.round().clamp(0.0, 255.0) as u8;
    }
    self.weight = (self.weight + 1).min(max_weight.max(1));
  }

  fn mean_of(colours: &[Self]) -> Self {
    let mut sum = Vec3::ZERO;
    let mut weight = 0u32;
    for colour in colours.iter().filter(|c| c.weight > 0) {
      sum += Vec3::from_array(colour.rgb.map(f32::from)) * colour.weight as f32;
      weight += colour.weight as u32;
    }
    if weight == 0 {
      return Self::default();
    }
    let mean = (sum / weight as f32).round();
    Self {
      rgb: [mean.x as u8, mean.y as u8, mean.z as u8],
      weight: (weight / colours.len().max(1) as u32).max(1) as u16,
    }
  }

  #[inline]
  fn to_vec3(&self) -> Option<Vec3> {
    (self.weight > 0).then(|| Vec3::from_array(self.rgb.map(f32::from)))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_rgb_update_running_mean() {
    let mut colour = Rgb::default();
    colour.update([100, 0, 200], 10);
    assert_eq!(colour.rgb, [100, 0, 200]);
    colour.update([200, 100, 0], 10);
    assert_eq!(colour.rgb, [150, 50, 100]);
    assert_eq!(colour.weight, 2);
  }

  #[test]
  fn test_rgb_mean_ignores_unweighted() {
    let a = Rgb {
      rgb: [10, 20, 30],
      weight: 1,
    };
    let mean = Rgb::mean_of(&[a, Rgb::default()]);
    assert_eq!(mean.rgb, [10, 20, 30]);
  }
}
