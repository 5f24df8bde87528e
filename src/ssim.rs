//! Structural similarity over a sliding square window.
//!
//! Windows start at multiples of the stride and are only evaluated when they
//! lie completely inside the plane; partial windows on the right and bottom
//! edge are skipped, identically for both pictures. Windows touching a
//! masked-out sample are skipped as well. Window statistics come from exact
//! integer sums, so every kernel tier produces the same score.

use crate::error::Result;
use crate::kernels::{KernelTable, Moments};
use crate::picture::{Mask, Plane};
use crate::pool::WorkerPool;
use crate::score::Score;
use crate::weighting::latitude_weight;

const K1: f64 = 0.01;
const K2: f64 = 0.03;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SsimParams {
    pub window: usize,
    pub stride: usize,
    pub max_value: u32,
    /// Weight windows by the latitude of their center row.
    pub spherical: bool,
}

/// Similarity of one window from its sums.
#[must_use]
pub fn window_ssim(m: &Moments, max_value: u32) -> f64 {
    let n = m.count as f64;
    let range = f64::from(max_value);
    let c1 = (K1 * range).powi(2);
    let c2 = (K2 * range).powi(2);

    let mu_a = m.sum_a as f64 / n;
    let mu_b = m.sum_b as f64 / n;
    let var_a = m.sum_aa as f64 / n - mu_a * mu_a;
    let var_b = m.sum_bb as f64 / n - mu_b * mu_b;
    let cov = m.sum_ab as f64 / n - mu_a * mu_b;

    let num = (2.0 * mu_a * mu_b + c1) * (2.0 * cov + c2);
    let den = (mu_a * mu_a + mu_b * mu_b + c1) * (var_a + var_b + c2);
    num / den
}

#[derive(Debug, Clone, Copy, Default)]
struct WindowSums {
    weighted: f64,
    weight: f64,
    windows: u64,
}

/// Mean SSIM of a plane pair and the number of windows it averages.
///
/// # Errors
/// - If a worker task fails
pub fn plane_ssim(
    pool: &WorkerPool,
    kernels: &KernelTable,
    a: &Plane,
    b: &Plane,
    mask: Option<&Mask>,
    params: &SsimParams,
) -> Result<(Score, u64)> {
    let win = params.window;
    if a.width() < win || a.height() < win {
        return Ok((Score::NoData, 0));
    }
    let origins_y: Vec<usize> = (0..=a.height() - win).step_by(params.stride).collect();
    let origins_x: Vec<usize> = (0..=a.width() - win).step_by(params.stride).collect();

    let rows = pool.map(&origins_y, |&oy| {
        let weight = if params.spherical {
            latitude_weight(oy as f64 + (win as f64 - 1.0) / 2.0, a.height())
        } else {
            1.0
        };
        let mut sums = WindowSums::default();
        for &ox in &origins_x {
            if let Some(mask) = mask {
                let covered = (oy..oy + win).all(|y| mask.row(y)[ox..ox + win].iter().all(|&v| v));
                if !covered {
                    continue;
                }
            }
            let m: Moments = (oy..oy + win)
                .map(|y| (kernels.row_moments)(&a.row(y)[ox..ox + win], &b.row(y)[ox..ox + win]))
                .sum();
            sums.weighted += window_ssim(&m, params.max_value) * weight;
            sums.weight += weight;
            sums.windows += 1;
        }
        Ok(sums)
    })?;

    let total = rows.into_iter().fold(WindowSums::default(), |acc, r| WindowSums {
        weighted: acc.weighted + r.weighted,
        weight: acc.weight + r.weight,
        windows: acc.windows + r.windows,
    });
    if total.windows == 0 || total.weight <= 0.0 {
        return Ok((Score::NoData, 0));
    }
    Ok((Score::Finite(total.weighted / total.weight), total.windows))
}
