//! Dense row-major images consumed by fusion.

pub mod pooling;

use glam::IVec2;

pub use pooling::{DensePoolingImage, KnownStatus, PixelRect, PoolingPixel};

use crate::error::{MapError, Result};

/// Depth values in metres (pinhole: z-depth, LiDAR: range).
pub type DepthImage = Image<f32>;
/// Per-pixel depth standard deviation in metres.
pub type SigmaImage = Image<f32>;
/// 8-bit RGB.
pub type ColourImage = Image<[u8; 3]>;
/// Per-pixel semantic identifiers.
pub type IdImage = Image<u16>;

/// Dense image of `width * height` pixels, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Image<T> {
  width: u32,
  height: u32,
  data: Vec<T>,
}

impl<T: Copy> Image<T> {
  /// Image with every pixel set to `value`.
  pub fn new(width: u32, height: u32, value: T) -> Self {
    Self {
      width,
      height,
      data: vec![value; width as usize * height as usize],
    }
  }

  /// Wrap existing row-major pixels.
  pub fn from_vec(width: u32, height: u32, data: Vec<T>) -> Result<Self> {
    let expected = width as usize * height as usize;
    if data.len() != expected {
      return Err(MapError::invalid_config(format!(
        "image data has {} pixels, expected {expected}",
        data.len()
      )));
    }
    Ok(Self {
      width,
      height,
      data,
    })
  }

  /// Image computed per pixel from `f(x, y)`.
  pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> T) -> Self {
    let mut data = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
      for x in 0..width {
        data.push(f(x, y));
      }
    }
    Self {
      width,
      height,
      data,
    }
  }

  #[inline]
  pub fn width(&self) -> u32 {
    self.width
  }

  #[inline]
  pub fn height(&self) -> u32 {
    self.height
  }

  #[inline]
  pub fn dims(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  #[inline]
  fn offset(&self, x: u32, y: u32) -> usize {
    debug_assert!(x < self.width && y < self.height, "pixel ({x}, {y}) out of bounds");
    y as usize * self.width as usize + x as usize
  }

  #[inline]
  pub fn get(&self, x: u32, y: u32) -> T {
    self.data[self.offset(x, y)]
  }

  /// Pixel value, `None` outside the image.
  #[inline]
  pub fn pixel(&self, px: IVec2) -> Option<T> {
    if px.x < 0 || px.y < 0 || px.x as u32 >= self.width || px.y as u32 >= self.height {
      return None;
    }
    Some(self.get(px.x as u32, px.y as u32))
  }

  #[inline]
  pub fn set(&mut self, x: u32, y: u32, value: T) {
    let offset = self.offset(x, y);
    self.data[offset] = value;
  }

  #[inline]
  pub fn as_slice(&self) -> &[T] {
    &self.data
  }

  /// Error unless the image is `width * height`.
  pub fn check_dims(&self, width: u32, height: u32) -> Result<()> {
    if self.dims() != (width, height) {
      return Err(MapError::ImageSizeMismatch {
        expected: (width, height),
        actual: self.dims(),
      });
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_row_major_layout() {
    let image = Image::from_fn(3, 2, |x, y| x + 10 * y);
    assert_eq!(image.as_slice(), &[0, 1, 2, 10, 11, 12]);
    assert_eq!(image.get(2, 1), 12);
  }

  #[test]
  fn test_pixel_bounds() {
    let image = Image::new(4, 4, 1.0f32);
    assert_eq!(image.pixel(IVec2::new(3, 3)), Some(1.0));
    assert_eq!(image.pixel(IVec2::new(4, 0)), None);
    assert_eq!(image.pixel(IVec2::new(0, -1)), None);
  }

  #[test]
  fn test_from_vec_checks_len() {
    assert!(Image::from_vec(2, 2, vec![0u8; 3]).is_err());
    assert!(Image::from_vec(2, 2, vec![0u8; 4]).is_ok());
  }

  #[test]
  fn test_check_dims() {
    let image = Image::new(8, 6, 0u16);
    assert!(image.check_dims(8, 6).is_ok());
    assert!(matches!(
      image.check_dims(6, 8),
      Err(MapError::ImageSizeMismatch { .. })
    ));
  }
}
