//! Block-wise pixel-shift search between the two pictures.
//!
//! The luma plane is divided into `B`x`B` blocks (truncated on the right and
//! bottom edge). Each block of the distorted picture is matched against the
//! reference within a `[-R, R]` window on both axes; the offset with the
//! lowest SAD wins. Offsets that would move the block out of the picture are
//! dropped from the candidate set, `(0, 0)` is always a candidate.

use crate::distortion::block_sad;
use crate::error::Result;
use crate::kernels::KernelTable;
use crate::picture::{Mask, Picture, Plane};
use crate::pool::WorkerPool;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShiftVector {
    pub dx: i32,
    pub dy: i32,
}

impl ShiftVector {
    pub const ZERO: ShiftVector = ShiftVector { dx: 0, dy: 0 };

    #[must_use]
    pub const fn new(dx: i32, dy: i32) -> Self {
        ShiftVector { dx, dy }
    }

    #[must_use]
    pub const fn magnitude_sq(self) -> i64 {
        (self.dx as i64) * (self.dx as i64) + (self.dy as i64) * (self.dy as i64)
    }
}

/// One shift vector per luma block, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShiftMap {
    block: usize,
    blocks_x: usize,
    blocks_y: usize,
    vectors: Vec<ShiftVector>,
}

impl ShiftMap {
    /// A map of zero vectors, used when the search is disabled.
    #[must_use]
    pub fn zero(width: usize, height: usize, block: usize) -> Self {
        let blocks_x = width.div_ceil(block);
        let blocks_y = height.div_ceil(block);
        ShiftMap {
            block,
            blocks_x,
            blocks_y,
            vectors: vec![ShiftVector::ZERO; blocks_x * blocks_y],
        }
    }

    #[must_use]
    pub fn block(&self) -> usize {
        self.block
    }

    #[must_use]
    pub fn blocks_x(&self) -> usize {
        self.blocks_x
    }

    #[must_use]
    pub fn blocks_y(&self) -> usize {
        self.blocks_y
    }

    #[must_use]
    pub fn vectors(&self) -> &[ShiftVector] {
        &self.vectors
    }

    /// Vector of block `(bx, by)`.
    #[must_use]
    pub fn get(&self, bx: usize, by: usize) -> ShiftVector {
        self.vectors[by * self.blocks_x + bx]
    }

    /// Vector of the block covering luma sample `(x, y)`.
    #[must_use]
    pub fn vector_at(&self, x: usize, y: usize) -> ShiftVector {
        self.get(
            (x / self.block).min(self.blocks_x - 1),
            (y / self.block).min(self.blocks_y - 1),
        )
    }

    /// Number of blocks with a non-zero vector.
    #[must_use]
    pub fn moved_blocks(&self) -> usize {
        self.vectors.iter().filter(|v| **v != ShiftVector::ZERO).count()
    }
}

/// Offsets in `[-radius, radius]` that keep `[origin + d, origin + d + len)`
/// inside `[0, size)`.
fn legal_range(origin: usize, len: usize, size: usize, radius: usize) -> (i32, i32) {
    let lo = -(origin.min(radius) as i32);
    let hi = (size - origin - len).min(radius) as i32;
    (lo, hi)
}

fn search_block(
    kernels: &KernelTable,
    reference: &Plane,
    distorted: &Plane,
    mask: Option<&Mask>,
    (x0, y0): (usize, usize),
    (bw, bh): (usize, usize),
    radius: usize,
) -> ShiftVector {
    let (x_lo, x_hi) = legal_range(x0, bw, reference.width(), radius);
    let (y_lo, y_hi) = legal_range(y0, bh, reference.height(), radius);

    let mut best = (u64::MAX, i64::MAX, ShiftVector::ZERO);
    for dy in y_lo..=y_hi {
        for dx in x_lo..=x_hi {
            let v = ShiftVector::new(dx, dy);
            let rx = (x0 as i64 + i64::from(dx)) as usize;
            let ry = (y0 as i64 + i64::from(dy)) as usize;
            let cost =
                block_sad(kernels, reference, (rx, ry), distorted, (x0, y0), (bw, bh), mask);
            let magnitude = v.magnitude_sq();
            // strictly better only, so the first candidate in scan order keeps ties
            if (cost, magnitude) < (best.0, best.1) {
                best = (cost, magnitude, v);
            }
        }
    }
    best.2
}

/// Finds the shift of every luma block of `distorted` relative to
/// `reference`. Block rows are searched in parallel.
///
/// Samples of `distorted` that `mask` marks invalid do not count towards
/// the matching cost; a block without valid samples keeps the zero vector.
///
/// # Errors
/// - If a worker task fails
pub fn search(
    pool: &WorkerPool,
    kernels: &KernelTable,
    reference: &Plane,
    distorted: &Plane,
    mask: Option<&Mask>,
    radius: usize,
    block: usize,
) -> Result<ShiftMap> {
    let (width, height) = (reference.width(), reference.height());
    let mut map = ShiftMap::zero(width, height, block);
    if radius == 0 {
        return Ok(map);
    }
    let block_rows: Vec<usize> = (0..map.blocks_y).collect();
    let rows = pool.map(&block_rows, |&by| {
        let y0 = by * block;
        let bh = block.min(height - y0);
        Ok((0..width)
            .step_by(block)
            .map(|x0| {
                let bw = block.min(width - x0);
                search_block(kernels, reference, distorted, mask, (x0, y0), (bw, bh), radius)
            })
            .collect::<Vec<_>>())
    })?;
    map.vectors = rows.concat();
    Ok(map)
}

fn shifted(coord: usize, delta: i32, size: usize) -> usize {
    (coord as i64 + i64::from(delta)).clamp(0, size as i64 - 1) as usize
}

/// Resamples `reference` along `map`: sample `(x, y)` of the result is the
/// reference sample at `(x + dx, y + dy)` of the block covering it.
/// Subsampled planes use the luma vector divided by their ratio.
///
/// # Errors
/// - If a worker task fails
pub fn compensate(
    pool: &WorkerPool,
    reference: &Picture,
    map: &ShiftMap,
    tile_rows: usize,
) -> Result<Picture> {
    if map.moved_blocks() == 0 {
        return Ok(reference.clone());
    }
    let planes = reference
        .planes()
        .iter()
        .enumerate()
        .map(|(i, plane)| {
            let (sx, sy) = reference.subsampling(i);
            let (w, h) = (plane.width(), plane.height());
            let bands = pool.for_each_region(w, h, w, tile_rows, |region| {
                let mut out = Vec::with_capacity(region.width * region.height);
                for y in region.y..region.y + region.height {
                    for x in 0..w {
                        let v = map.vector_at(x * sx, y * sy);
                        let src_x = shifted(x, v.dx / sx as i32, w);
                        let src_y = shifted(y, v.dy / sy as i32, h);
                        out.push(plane.get(src_x, src_y));
                    }
                }
                Ok(out)
            })?;
            Plane::from_vec(w, h, bands.concat())
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(reference.with_planes(planes))
}
