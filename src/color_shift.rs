//! Global per-plane color shift estimation.
//!
//! For every plane a single affine model `target ≈ gain * source + offset`
//! is fit by least squares over all valid samples. The sums are collected per
//! row band on the pool and solved once; the model is then applied to the
//! source picture. There is no iteration.

use std::ops::Range;

use log::debug;
use num_traits::{clamp, ToPrimitive};

use crate::error::Result;
use crate::kernels::{KernelTable, Moments};
use crate::picture::{joint_plane_mask, Mask, Picture, Plane};
use crate::pool::WorkerPool;

/// Affine correction of one plane. `gain` is always positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorModel {
    pub gain: f64,
    pub offset: f64,
}

impl Default for ColorModel {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl ColorModel {
    pub const IDENTITY: ColorModel = ColorModel {
        gain: 1.0,
        offset: 0.0,
    };

    #[must_use]
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// `clamp(round(sample * gain + offset), 0, max_value)`
    #[inline]
    #[must_use]
    pub fn apply(&self, sample: u16, max_value: u32) -> u16 {
        let v = f64::from(sample).mul_add(self.gain, self.offset).round();
        clamp(v, 0.0, f64::from(max_value)).to_u16().unwrap_or(0)
    }

    /// Closed-form least squares solution of `sum_b ≈ gain * sum_a + offset`
    /// (`a` is the source, `b` the target).
    ///
    /// Falls back to the identity when the source has no variance or the fit
    /// would not have a positive gain.
    #[must_use]
    pub fn fit(m: &Moments) -> Self {
        let n = i128::from(m.count);
        let sx = i128::from(m.sum_a);
        let sy = i128::from(m.sum_b);
        let var = n * i128::from(m.sum_aa) - sx * sx;
        if n == 0 || var == 0 {
            debug!("color shift fit degenerate (n = {n}, flat source), using identity");
            return Self::IDENTITY;
        }
        let cov = n * i128::from(m.sum_ab) - sx * sy;
        let gain = cov as f64 / var as f64;
        if !(gain.is_finite() && gain > 0.0) {
            debug!("color shift fit gave gain {gain}, using identity");
            return Self::IDENTITY;
        }
        let offset = (sy as f64 - gain * sx as f64) / n as f64;
        ColorModel { gain, offset }
    }
}

/// Maximal runs of `true` in a mask row.
fn valid_runs(flags: &[bool]) -> impl Iterator<Item = Range<usize>> + '_ {
    let mut x = 0;
    std::iter::from_fn(move || {
        while x < flags.len() && !flags[x] {
            x += 1;
        }
        if x == flags.len() {
            return None;
        }
        let start = x;
        while x < flags.len() && flags[x] {
            x += 1;
        }
        Some(start..x)
    })
}

fn plane_moments(
    pool: &WorkerPool,
    kernels: &KernelTable,
    source: &Plane,
    target: &Plane,
    mask: Option<&Mask>,
    tile_rows: usize,
) -> Result<Moments> {
    let (width, height) = (source.width(), source.height());
    let parts = pool.for_each_region(width, height, width, tile_rows, |region| {
        let vs = source.view(region)?;
        let vt = target.view(region)?;
        let mut m = Moments::default();
        for y in 0..region.height {
            let (rs, rt) = (vs.row(y), vt.row(y));
            match mask {
                Some(mask) => {
                    for run in valid_runs(mask.row(region.y + y)) {
                        m += (kernels.row_moments)(&rs[run.clone()], &rt[run]);
                    }
                }
                None => m += (kernels.row_moments)(rs, rt),
            }
        }
        Ok(m)
    })?;
    Ok(parts.into_iter().sum())
}

/// Fits one model per plane mapping `source` onto `target`.
///
/// # Errors
/// - If the pictures are not compatible
pub fn estimate(
    pool: &WorkerPool,
    kernels: &KernelTable,
    source: &Picture,
    target: &Picture,
    tile_rows: usize,
) -> Result<Vec<ColorModel>> {
    source.check_compatible(target)?;
    (0..source.num_planes())
        .map(|i| {
            let mask = joint_plane_mask(source, target, i);
            let m = plane_moments(
                pool,
                kernels,
                source.plane(i),
                target.plane(i),
                mask.as_ref(),
                tile_rows,
            )?;
            Ok(ColorModel::fit(&m))
        })
        .collect()
}

/// Applies `models` (one per plane) and returns the corrected picture.
///
/// # Errors
/// - If a worker task fails
pub fn apply(
    pool: &WorkerPool,
    picture: &Picture,
    models: &[ColorModel],
    tile_rows: usize,
) -> Result<Picture> {
    let max = picture.max_value();
    let planes = picture
        .planes()
        .iter()
        .zip(models)
        .map(|(plane, model)| {
            if model.is_identity() {
                return Ok(plane.clone());
            }
            let (width, height) = (plane.width(), plane.height());
            let bands = pool.for_each_region(width, height, width, tile_rows, |region| {
                let view = plane.view(region)?;
                Ok(view
                    .rows()
                    .flat_map(|row| row.iter().map(|&s| model.apply(s, max)))
                    .collect::<Vec<u16>>())
            })?;
            Plane::from_vec(width, height, bands.concat())
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(picture.with_planes(planes))
}
