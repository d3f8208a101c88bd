//! Min/max pyramid over a depth image.
//!
//! Level `l` stores, per `2^l x 2^l` tile, the min and max valid depth and how
//! many of its pixels are valid. A query for a pixel rectangle picks the
//! level whose tiles are at least as large as the rectangle, so it combines
//! at most 2x2 tiles. Tiles may extend past the rectangle, which keeps the
//! bounds conservative.
//!
//! ```text
//! level 2  [      ][      ]
//! level 1  [  ][  ][  ][  ]
//! level 0  [][][][][][][][]
//! ```

use glam::IVec2;

use super::DepthImage;

/// Inclusive pixel rectangle a projected octant covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelRect {
  pub min: IVec2,
  pub max: IVec2,
  /// The projection extended past the image and was clamped.
  pub clipped: bool,
}

impl PixelRect {
  /// Whole image of `width * height`.
  pub fn full(width: u32, height: u32, clipped: bool) -> Self {
    Self {
      min: IVec2::ZERO,
      max: IVec2::new(width as i32 - 1, height as i32 - 1),
      clipped,
    }
  }
}

/// How much of a rectangle has valid depth.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KnownStatus {
  /// Every pixel is valid.
  Known,
  /// Some pixels are valid.
  PartKnown,
  /// No pixel is valid.
  Unknown,
}

/// Conservative depth bounds over a rectangle.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoolingPixel {
  pub min: f32,
  pub max: f32,
  pub known: KnownStatus,
  /// The octant's projection crossed the image border.
  pub crossing: bool,
}

#[derive(Clone, Copy, Debug)]
struct Tile {
  min: f32,
  max: f32,
  valid: u32,
  total: u32,
}

impl Tile {
  const EMPTY: Self = Self {
    min: f32::INFINITY,
    max: f32::NEG_INFINITY,
    valid: 0,
    total: 0,
  };

  #[inline]
  fn merge(&mut self, other: &Tile) {
    self.min = self.min.min(other.min);
    self.max = self.max.max(other.max);
    self.valid += other.valid;
    self.total += other.total;
  }
}

#[derive(Clone, Debug)]
struct Level {
  width: i32,
  height: i32,
  tiles: Vec<Tile>,
}

impl Level {
  #[inline]
  fn tile(&self, x: i32, y: i32) -> &Tile {
    &self.tiles[(y * self.width + x) as usize]
  }
}

/// Depth pyramid answering conservative rectangle queries.
#[derive(Clone, Debug)]
pub struct DensePoolingImage {
  width: u32,
  height: u32,
  levels: Vec<Level>,
}

impl DensePoolingImage {
  /// Build the pyramid. Depths below `near_plane` or non-finite are invalid.
  ///
  /// Any `f32` image pools the same way, e.g. a sigma image with a zero
  /// threshold.
  #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, name = "pooling::build"))]
  pub fn new(depth: &DepthImage, near_plane: f32) -> Self {
    let (width, height) = depth.dims();
    let base = Level {
      width: width as i32,
      height: height as i32,
      tiles: depth
        .as_slice()
        .iter()
        .map(|&d| {
          if d.is_finite() && d >= near_plane {
            Tile {
              min: d,
              max: d,
              valid: 1,
              total: 1,
            }
          } else {
            Tile {
              total: 1,
              ..Tile::EMPTY
            }
          }
        })
        .collect(),
    };

    let mut levels = vec![base];
    while let Some(prev) = levels.last().filter(|l| l.width > 1 || l.height > 1) {
      let w = (prev.width + 1) / 2;
      let h = (prev.height + 1) / 2;
      let mut tiles = Vec::with_capacity((w * h) as usize);
      for y in 0..h {
        for x in 0..w {
          let mut tile = Tile::EMPTY;
          for (dx, dy) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            let (cx, cy) = (2 * x + dx, 2 * y + dy);
            if cx < prev.width && cy < prev.height {
              tile.merge(prev.tile(cx, cy));
            }
          }
          tiles.push(tile);
        }
      }
      levels.push(Level {
        width: w,
        height: h,
        tiles,
      });
    }

    Self {
      width,
      height,
      levels,
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

  /// Conservative min/max depth and validity over `rect`.
  pub fn conservative_pixel(&self, rect: PixelRect) -> PoolingPixel {
    let extent = rect.max - rect.min + IVec2::ONE;
    let side = extent.max_element().max(1) as u32;
    let level = (side.next_power_of_two().trailing_zeros() as usize).min(self.levels.len() - 1);
    let pyramid = &self.levels[level];

    let last = IVec2::new(pyramid.width - 1, pyramid.height - 1);
    let lo = (rect.min.max(IVec2::ZERO) >> level as i32).min(last);
    let hi = (rect.max.max(IVec2::ZERO) >> level as i32).min(last);

    let mut tile = Tile::EMPTY;
    for y in lo.y..=hi.y {
      for x in lo.x..=hi.x {
        tile.merge(pyramid.tile(x, y));
      }
    }

    let known = if tile.valid == 0 {
      KnownStatus::Unknown
    } else if tile.valid == tile.total {
      KnownStatus::Known
    } else {
      KnownStatus::PartKnown
    };
    PoolingPixel {
      min: tile.min,
      max: tile.max,
      known,
      crossing: rect.clipped,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::image::Image;

  fn rect(min: (i32, i32), max: (i32, i32)) -> PixelRect {
    PixelRect {
      min: IVec2::new(min.0, min.1),
      max: IVec2::new(max.0, max.1),
      clipped: false,
    }
  }

  #[test]
  fn test_single_pixel_query() {
    let depth = Image::from_fn(8, 8, |x, y| 1.0 + x as f32 + 10.0 * y as f32);
    let pooling = DensePoolingImage::new(&depth, 0.1);
    let pixel = pooling.conservative_pixel(rect((3, 2), (3, 2)));
    assert_eq!(pixel.min, 24.0);
    assert_eq!(pixel.max, 24.0);
    assert_eq!(pixel.known, KnownStatus::Known);
  }

  /// Query bounds always enclose the exact bounds of the rectangle.
  #[test]
  fn test_bounds_are_conservative() {
    let depth = Image::from_fn(13, 7, |x, y| 0.5 + (x * 7 + y * 3) as f32 * 0.1);
    let pooling = DensePoolingImage::new(&depth, 0.1);
    for (min, max) in [((0, 0), (12, 6)), ((2, 1), (5, 4)), ((7, 3), (12, 3))] {
      let r = rect(min, max);
      let mut exact_min = f32::INFINITY;
      let mut exact_max = f32::NEG_INFINITY;
      for y in min.1..=max.1 {
        for x in min.0..=max.0 {
          let d = depth.get(x as u32, y as u32);
          exact_min = exact_min.min(d);
          exact_max = exact_max.max(d);
        }
      }
      let pixel = pooling.conservative_pixel(r);
      assert!(pixel.min <= exact_min);
      assert!(pixel.max >= exact_max);
    }
  }

  #[test]
  fn test_known_status() {
    let depth = Image::from_fn(8, 8, |x, _| if x < 4 { 0.0 } else { 2.0 });
    let pooling = DensePoolingImage::new(&depth, 0.1);

    assert_eq!(
      pooling.conservative_pixel(rect((0, 0), (1, 1))).known,
      KnownStatus::Unknown
    );
    assert_eq!(
      pooling.conservative_pixel(rect((4, 0), (7, 3))).known,
      KnownStatus::Known
    );
    let mixed = pooling.conservative_pixel(rect((0, 0), (7, 7)));
    assert_eq!(mixed.known, KnownStatus::PartKnown);
    assert_eq!((mixed.min, mixed.max), (2.0, 2.0));
  }

  #[test]
  fn test_crossing_follows_clipping() {
    let depth = Image::new(4, 4, 1.0f32);
    let pooling = DensePoolingImage::new(&depth, 0.1);
    assert!(pooling.conservative_pixel(PixelRect::full(4, 4, true)).crossing);
    assert!(!pooling.conservative_pixel(PixelRect::full(4, 4, false)).crossing);
  }
}
