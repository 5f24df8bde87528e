use std::borrow::Cow;

use crate::error::{Error, Result};

pub const MIN_BIT_DEPTH: u8 = 8;
pub const MAX_BIT_DEPTH: u8 = 16;
pub const MAX_PLANES: usize = 4;

/// A single sample grid of a [`Picture`].
///
/// Samples are stored as `u16` regardless of bit depth. Rows may be padded,
/// `stride` is the distance in samples between the starts of two rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plane {
    data: Vec<u16>,
    width: usize,
    height: usize,
    stride: usize,
}

impl Plane {
    /// Creates a zero-filled plane.
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Plane {
            data: vec![0; width * height],
            width,
            height,
            stride: width,
        }
    }

    /// Wraps tightly packed sample data.
    ///
    /// # Errors
    /// - If `data.len()` is not `width * height`
    pub fn from_vec(width: usize, height: usize, data: Vec<u16>) -> Result<Self> {
        Self::with_stride(width, height, width, data)
    }

    /// Wraps sample data whose rows are `stride` samples apart.
    ///
    /// # Errors
    /// - If `stride < width`
    /// - If `data` is too short to hold `height` rows
    pub fn with_stride(width: usize, height: usize, stride: usize, data: Vec<u16>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidPicture(format!(
                "plane must not be empty, got {width}x{height}"
            )));
        }
        if stride < width {
            return Err(Error::InvalidPicture(format!(
                "stride {stride} is smaller than width {width}"
            )));
        }
        let needed = stride * (height - 1) + width;
        if data.len() < needed {
            return Err(Error::InvalidPicture(format!(
                "plane needs {needed} samples, got {}",
                data.len()
            )));
        }
        Ok(Plane {
            data,
            width,
            height,
            stride,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &[u16] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }

    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [u16] {
        let start = y * self.stride;
        &mut self.data[start..start + self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u16]> + '_ {
        (0..self.height).map(move |y| self.row(y))
    }

    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> u16 {
        self.data[y * self.stride + x]
    }

    /// Borrows a rectangular part of this plane.
    ///
    /// # Errors
    /// - If the region is not fully contained in the plane
    pub fn view(&self, region: Region) -> Result<PlaneView<'_>> {
        if !region.fits(self.width, self.height) {
            return Err(Error::RegionOutOfBounds {
                x: region.x,
                y: region.y,
                width: region.width,
                height: region.height,
                plane_width: self.width,
                plane_height: self.height,
            });
        }
        Ok(PlaneView {
            plane: self,
            region,
        })
    }

    #[must_use]
    pub fn full_view(&self) -> PlaneView<'_> {
        PlaneView {
            plane: self,
            region: Region::new(0, 0, self.width, self.height),
        }
    }
}

/// A rectangle in sample coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl Region {
    #[must_use]
    pub const fn new(x: usize, y: usize, width: usize, height: usize) -> Self {
        Region {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub const fn fits(&self, width: usize, height: usize) -> bool {
        self.x + self.width <= width && self.y + self.height <= height
    }

    /// Splits a `width`x`height` area into tiles in row-major order. Tiles on
    /// the right and bottom edge are truncated to the area.
    #[must_use]
    pub fn tile(width: usize, height: usize, tile_width: usize, tile_height: usize) -> Vec<Region> {
        let tile_width = tile_width.max(1);
        let tile_height = tile_height.max(1);
        let count = width.div_ceil(tile_width) * height.div_ceil(tile_height);
        let mut tiles = Vec::with_capacity(count);
        for y in (0..height).step_by(tile_height) {
            for x in (0..width).step_by(tile_width) {
                tiles.push(Region::new(
                    x,
                    y,
                    tile_width.min(width - x),
                    tile_height.min(height - y),
                ));
            }
        }
        tiles
    }
}

/// A non-owning view into a rectangular part of a [`Plane`].
#[derive(Debug, Clone, Copy)]
pub struct PlaneView<'a> {
    plane: &'a Plane,
    region: Region,
}

impl<'a> PlaneView<'a> {
    #[must_use]
    pub fn width(&self) -> usize {
        self.region.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.region.height
    }

    #[must_use]
    pub fn region(&self) -> Region {
        self.region
    }

    /// Row `y` of the view, relative to the top of the region.
    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &'a [u16] {
        let row = self.plane.row(self.region.y + y);
        &row[self.region.x..self.region.x + self.region.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &'a [u16]> + '_ {
        (0..self.region.height).map(move |y| self.row(y))
    }
}

/// Per-sample validity flags at luma resolution. `false` samples are left
/// out of every accumulation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    data: Vec<bool>,
    width: usize,
    height: usize,
}

impl Mask {
    /// # Errors
    /// - If `data.len()` is not `width * height`
    pub fn new(width: usize, height: usize, data: Vec<bool>) -> Result<Self> {
        if data.len() != width * height {
            return Err(Error::InvalidPicture(format!(
                "mask needs {} entries, got {}",
                width * height,
                data.len()
            )));
        }
        Ok(Mask {
            data,
            width,
            height,
        })
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    #[must_use]
    pub fn row(&self, y: usize) -> &[bool] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    #[must_use]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    /// Samples with both masks valid.
    #[must_use]
    pub fn intersect(&self, other: &Mask) -> Mask {
        debug_assert_eq!(self.width, other.width);
        debug_assert_eq!(self.height, other.height);
        Mask {
            data: self
                .data
                .iter()
                .zip(&other.data)
                .map(|(&a, &b)| a && b)
                .collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Nearest-neighbour resampling to another plane size, used for
    /// subsampled chroma planes.
    #[must_use]
    pub fn resample(&self, width: usize, height: usize) -> Mask {
        if width == self.width && height == self.height {
            return self.clone();
        }
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let sy = (y * self.height / height).min(self.height - 1);
            for x in 0..width {
                let sx = (x * self.width / width).min(self.width - 1);
                data.push(self.get(sx, sy));
            }
        }
        Mask {
            data,
            width,
            height,
        }
    }
}

/// A decoded picture: up to four planes sharing one bit depth, plus an
/// optional validity mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    planes: Vec<Plane>,
    bit_depth: u8,
    mask: Option<Mask>,
}

impl Picture {
    /// # Errors
    /// - If there are no planes or more than four
    /// - If any plane is empty or larger than the first one
    /// - If the bit depth is outside of 8..=16
    /// - If any sample exceeds the range of the bit depth
    pub fn new(planes: Vec<Plane>, bit_depth: u8) -> Result<Self> {
        if planes.is_empty() || planes.len() > MAX_PLANES {
            return Err(Error::InvalidPicture(format!(
                "expected 1 to {MAX_PLANES} planes, got {}",
                planes.len()
            )));
        }
        let (width, height) = (planes[0].width(), planes[0].height());
        for (i, plane) in planes.iter().enumerate() {
            if plane.width() == 0 || plane.height() == 0 {
                return Err(Error::InvalidPicture(format!("plane {i} is empty")));
            }
            if plane.width() > width || plane.height() > height {
                return Err(Error::InvalidPicture(format!(
                    "plane {i} is {}x{}, larger than the first plane's {width}x{height}",
                    plane.width(),
                    plane.height()
                )));
            }
        }
        if !(MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&bit_depth) {
            return Err(Error::InvalidPicture(format!(
                "bit depth {bit_depth} is not supported"
            )));
        }
        let max = max_value(bit_depth);
        for (i, plane) in planes.iter().enumerate() {
            if plane.rows().flatten().any(|&s| u32::from(s) > max) {
                return Err(Error::InvalidPicture(format!(
                    "plane {i} has samples above {max}"
                )));
            }
        }
        Ok(Picture {
            planes,
            bit_depth,
            mask: None,
        })
    }

    /// Builds a single-plane picture from packed samples.
    ///
    /// # Errors
    /// See [`Plane::from_vec`] and [`Picture::new`].
    pub fn gray(width: usize, height: usize, bit_depth: u8, data: Vec<u16>) -> Result<Self> {
        Self::new(vec![Plane::from_vec(width, height, data)?], bit_depth)
    }

    /// Attaches a validity mask. The mask must match the first plane.
    ///
    /// # Errors
    /// - If the mask size differs from the first plane
    pub fn with_mask(mut self, mask: Mask) -> Result<Self> {
        if mask.width() != self.width() || mask.height() != self.height() {
            return Err(Error::InvalidPicture(format!(
                "mask is {}x{}, picture is {}x{}",
                mask.width(),
                mask.height(),
                self.width(),
                self.height()
            )));
        }
        self.mask = Some(mask);
        Ok(self)
    }

    #[must_use]
    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    #[must_use]
    pub fn plane(&self, index: usize) -> &Plane {
        &self.planes[index]
    }

    #[must_use]
    pub fn num_planes(&self) -> usize {
        self.planes.len()
    }

    #[must_use]
    pub fn width(&self) -> usize {
        self.planes[0].width()
    }

    #[must_use]
    pub fn height(&self) -> usize {
        self.planes[0].height()
    }

    #[must_use]
    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    #[must_use]
    pub fn max_value(&self) -> u32 {
        max_value(self.bit_depth)
    }

    #[must_use]
    pub fn mask(&self) -> Option<&Mask> {
        self.mask.as_ref()
    }

    /// Integer ratio between the first plane and plane `index`, per axis.
    #[must_use]
    pub fn subsampling(&self, index: usize) -> (usize, usize) {
        let plane = &self.planes[index];
        (
            self.width().div_ceil(plane.width()),
            self.height().div_ceil(plane.height()),
        )
    }

    /// The mask resampled to plane `index`, if the picture has one.
    #[must_use]
    pub fn plane_mask(&self, index: usize) -> Option<Cow<'_, Mask>> {
        let mask = self.mask.as_ref()?;
        let plane = &self.planes[index];
        if plane.width() == mask.width() && plane.height() == mask.height() {
            Some(Cow::Borrowed(mask))
        } else {
            Some(Cow::Owned(mask.resample(plane.width(), plane.height())))
        }
    }

    /// Same shape, bit depth and mask, new plane contents.
    pub(crate) fn with_planes(&self, planes: Vec<Plane>) -> Self {
        debug_assert_eq!(planes.len(), self.planes.len());
        Picture {
            planes,
            bit_depth: self.bit_depth,
            mask: self.mask.clone(),
        }
    }

    /// Checks that `other` can be compared against `self`.
    ///
    /// # Errors
    /// - If the plane count, bit depth or any plane size differ
    pub fn check_compatible(&self, other: &Picture) -> Result<()> {
        if self.planes.len() != other.planes.len() {
            return Err(Error::PlaneCountMismatch {
                reference: self.planes.len(),
                distorted: other.planes.len(),
            });
        }
        if self.bit_depth != other.bit_depth {
            return Err(Error::BitDepthMismatch {
                reference: self.bit_depth,
                distorted: other.bit_depth,
            });
        }
        for (i, (a, b)) in self.planes.iter().zip(&other.planes).enumerate() {
            if a.width() != b.width() || a.height() != b.height() {
                return Err(Error::DimensionMismatch {
                    plane: i,
                    ref_width: a.width(),
                    ref_height: a.height(),
                    dist_width: b.width(),
                    dist_height: b.height(),
                });
            }
        }
        Ok(())
    }
}

#[must_use]
pub const fn max_value(bit_depth: u8) -> u32 {
    (1u32 << bit_depth) - 1
}

/// Validity mask of plane `index` for a reference/distorted pair: samples
/// valid in both pictures. `None` when neither picture has a mask.
pub(crate) fn joint_plane_mask(a: &Picture, b: &Picture, index: usize) -> Option<Mask> {
    match (a.plane_mask(index), b.plane_mask(index)) {
        (Some(ma), Some(mb)) => Some(ma.intersect(&mb)),
        (Some(m), None) | (None, Some(m)) => Some(m.into_owned()),
        (None, None) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strided_rows_skip_padding() {
        let data: Vec<u16> = (0..12).collect();
        let plane = Plane::with_stride(3, 3, 4, data).unwrap();
        assert_eq!(plane.row(1), &[4, 5, 6]);
        assert_eq!(plane.get(2, 2), 10);
    }

    #[test]
    fn view_rejects_regions_outside_the_plane() {
        let plane = Plane::new(8, 8);
        assert!(plane.view(Region::new(4, 4, 4, 4)).is_ok());
        let err = plane.view(Region::new(5, 0, 4, 1)).unwrap_err();
        assert!(matches!(err, Error::RegionOutOfBounds { x: 5, .. }));
    }

    #[test]
    fn view_rows_are_relative() {
        let data: Vec<u16> = (0..16).collect();
        let plane = Plane::from_vec(4, 4, data).unwrap();
        let view = plane.view(Region::new(1, 2, 2, 2)).unwrap();
        assert_eq!(view.row(0), &[9, 10]);
        assert_eq!(view.row(1), &[13, 14]);
    }

    #[test]
    fn tiles_cover_the_area_once() {
        let tiles = Region::tile(10, 7, 4, 3);
        assert_eq!(tiles.len(), 9);
        let area: usize = tiles.iter().map(|t| t.width * t.height).sum();
        assert_eq!(area, 70);
        assert_eq!(tiles[8], Region::new(8, 6, 2, 1));
    }

    #[test]
    fn samples_above_bit_depth_are_rejected() {
        assert!(Picture::gray(2, 1, 8, vec![0, 256]).is_err());
        assert!(Picture::gray(2, 1, 10, vec![0, 1023]).is_ok());
        assert!(Picture::gray(2, 1, 7, vec![0, 1]).is_err());
    }

    #[test]
    fn empty_and_oversized_planes_are_rejected() {
        let err = Picture::new(vec![Plane::new(0, 0)], 8).unwrap_err();
        assert!(matches!(err, Error::InvalidPicture(_)));
        let err = Picture::new(vec![Plane::new(4, 4), Plane::new(2, 0)], 8).unwrap_err();
        assert!(matches!(err, Error::InvalidPicture(_)));
        let err = Picture::new(vec![Plane::new(4, 4), Plane::new(8, 4)], 8).unwrap_err();
        assert!(matches!(err, Error::InvalidPicture(_)));
        let pic = Picture::new(vec![Plane::new(5, 3), Plane::new(3, 2)], 8).unwrap();
        assert_eq!(pic.subsampling(1), (2, 2));
    }

    #[test]
    fn chroma_masks_are_resampled() {
        let luma = Plane::new(4, 4);
        let chroma = Plane::new(2, 2);
        let mut flags = vec![true; 16];
        flags[0] = false;
        let pic = Picture::new(vec![luma, chroma.clone(), chroma], 8)
            .unwrap()
            .with_mask(Mask::new(4, 4, flags).unwrap())
            .unwrap();
        assert_eq!(pic.subsampling(1), (2, 2));
        let mask = pic.plane_mask(1).unwrap();
        assert_eq!(mask.width(), 2);
        assert!(!mask.get(0, 0));
        assert!(mask.get(1, 1));
    }

    #[test]
    fn compatibility_reports_the_first_mismatch() {
        let a = Picture::gray(4, 4, 8, vec![0; 16]).unwrap();
        let b = Picture::gray(4, 2, 8, vec![0; 8]).unwrap();
        let c = Picture::gray(4, 4, 10, vec![0; 16]).unwrap();
        assert!(matches!(
            a.check_compatible(&b),
            Err(Error::DimensionMismatch { plane: 0, .. })
        ));
        assert!(matches!(
            a.check_compatible(&c),
            Err(Error::BitDepthMismatch { .. })
        ));
    }
}
