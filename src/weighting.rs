//! Latitude weighting for equirectangular pictures (WS-PSNR).
//!
//! Row `y` of an `H` row picture covers latitude
//! `(y + 0.5 - H / 2) * PI / H`; its samples are weighted with the cosine of
//! that latitude so that the oversampled polar rows count less.

use std::f64::consts::PI;
use std::iter::Sum;
use std::ops::Add;

use crate::error::Result;
use crate::kernels::KernelTable;
use crate::picture::{Mask, Plane};
use crate::pool::WorkerPool;

/// Weight of a (possibly fractional) row position.
#[inline]
#[must_use]
pub fn latitude_weight(y: f64, height: usize) -> f64 {
    let h = height as f64;
    ((y + 0.5 - h / 2.0) * PI / h).cos()
}

#[must_use]
pub fn row_weights(height: usize) -> Vec<f64> {
    (0..height).map(|y| latitude_weight(y as f64, height)).collect()
}

/// Weighted squared error and the total weight of the samples it covers.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightedAccumulator {
    pub wssd: f64,
    pub weight: f64,
    pub count: u64,
}

impl WeightedAccumulator {
    #[must_use]
    pub fn mse(&self) -> Option<f64> {
        (self.count > 0 && self.weight > 0.0).then(|| self.wssd / self.weight)
    }
}

impl Add for WeightedAccumulator {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        WeightedAccumulator {
            wssd: self.wssd + rhs.wssd,
            weight: self.weight + rhs.weight,
            count: self.count + rhs.count,
        }
    }
}

impl Sum for WeightedAccumulator {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

/// Row-weighted squared error between two planes. `weights` holds one
/// weight per row; all ones gives the plain MSE.
///
/// Row bands run on the pool and are merged in band order, so the result
/// does not depend on scheduling.
///
/// # Errors
/// - If a band falls outside either plane
pub fn weighted_plane_distortion(
    pool: &WorkerPool,
    kernels: &KernelTable,
    a: &Plane,
    b: &Plane,
    mask: Option<&Mask>,
    weights: &[f64],
    tile_rows: usize,
) -> Result<WeightedAccumulator> {
    debug_assert_eq!(weights.len(), a.height());
    let parts = pool.for_each_region(a.width(), a.height(), a.width(), tile_rows, |region| {
        let va = a.view(region)?;
        let vb = b.view(region)?;
        let mut acc = WeightedAccumulator::default();
        for y in 0..region.height {
            let row = match mask {
                Some(mask) => {
                    (kernels.row_diff_masked)(va.row(y), vb.row(y), mask.row(region.y + y))
                }
                None => (kernels.row_diff)(va.row(y), vb.row(y)),
            };
            let w = weights[region.y + y];
            acc = acc
                + WeightedAccumulator {
                    wssd: row.ssd as f64 * w,
                    weight: row.count as f64 * w,
                    count: row.count,
                };
        }
        Ok(acc)
    })?;
    Ok(parts.into_iter().sum())
}

/// Latitude-weighted distortion of one plane pair; its MSE gives the
/// plane's WS-PSNR.
///
/// # Errors
/// See [`weighted_plane_distortion`].
pub fn plane_ws_distortion(
    pool: &WorkerPool,
    kernels: &KernelTable,
    a: &Plane,
    b: &Plane,
    mask: Option<&Mask>,
    tile_rows: usize,
) -> Result<WeightedAccumulator> {
    let weights = row_weights(a.height());
    weighted_plane_distortion(pool, kernels, a, b, mask, &weights, tile_rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::plane_distortion_parallel;
    use crate::score::{psnr_score, Score};

    fn wspsnr(pool: &WorkerPool, a: &Plane, b: &Plane, tile_rows: usize) -> (Score, u64) {
        let kernels = KernelTable::detected();
        let acc = plane_ws_distortion(pool, kernels, a, b, None, tile_rows).unwrap();
        (psnr_score(acc.mse(), 255), acc.count)
    }

    #[test]
    fn weights_are_symmetric_and_peak_at_the_equator() {
        let w = row_weights(10);
        for y in 0..5 {
            assert!((w[y] - w[9 - y]).abs() < 1e-12);
        }
        assert!(w[4] > w[0]);
        assert!(w.iter().all(|&v| v > 0.0 && v <= 1.0));
    }

    #[test]
    fn uniform_error_gives_plain_psnr() {
        let pool = WorkerPool::new(3).unwrap();
        let kernels = KernelTable::detected();
        let a = Plane::from_vec(32, 16, (0..512).map(|i| (i % 200) as u16).collect()).unwrap();
        let b = Plane::from_vec(32, 16, (0..512).map(|i| (i % 200) as u16 + 3).collect()).unwrap();

        let plain = plane_distortion_parallel(&pool, kernels, &a, &b, None, 5).unwrap();
        let plain = psnr_score(plain.mse(), 255).value().unwrap();
        let (weighted, count) = wspsnr(&pool, &a, &b, 5);
        assert_eq!(count, 512);
        assert!((weighted.value().unwrap() - plain).abs() < 1e-9);
    }

    #[test]
    fn polar_errors_weigh_less() {
        let pool = WorkerPool::new(2).unwrap();
        let a = Plane::new(8, 8);
        let mut polar = Plane::new(8, 8);
        polar.row_mut(0).fill(10);
        let mut equator = Plane::new(8, 8);
        equator.row_mut(4).fill(10);
        let (p, _) = wspsnr(&pool, &a, &polar, 2);
        let (e, _) = wspsnr(&pool, &a, &equator, 2);
        assert!(p.value().unwrap() > e.value().unwrap());
    }

    #[test]
    fn identical_planes_are_infinite() {
        let pool = WorkerPool::new(2).unwrap();
        let a = Plane::new(16, 8);
        let (score, _) = wspsnr(&pool, &a, &a, 4);
        assert_eq!(score, Score::Infinite);
    }
}
