//! Immersive-video PSNR.
//!
//! A frame goes through a fixed sequence of stages, each one finishing on the
//! pool before the next starts:
//!
//! 1. global color shift: the affine per-plane model is fit and applied
//! 2. correspondence search: every luma block finds its best offset and the
//!    reference is resampled along the resulting shift map
//! 3. weighted accumulation of the squared error against the resampled
//!    reference, optionally latitude weighted
//! 4. per-plane PSNR and the combined score, both from the squared error
//!
//! In bidirectional mode the pipeline runs a second time with the roles of
//! the pictures swapped and the larger error of every plane is kept.

use std::borrow::Cow;
use std::fmt;

use log::debug;

use crate::color_shift::{self, ColorModel};
use crate::config::{ColorShiftDirection, Config, MetricKind};
use crate::correspondence::{self, ShiftMap};
use crate::error::Result;
use crate::kernels::KernelTable;
use crate::picture::{joint_plane_mask, Picture};
use crate::pool::WorkerPool;
use crate::score::MetricResult;
use crate::weighting::{row_weights, weighted_plane_distortion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Init,
    ColorShiftEstimate,
    CorrespondenceSearch,
    WeightedAccumulate,
    Finalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match *self {
            Self::Init => "init",
            Self::ColorShiftEstimate => "color shift estimate",
            Self::CorrespondenceSearch => "correspondence search",
            Self::WeightedAccumulate => "weighted accumulate",
            Self::Finalize => "finalize",
        })
    }
}

/// Everything one IV-PSNR evaluation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct IvPsnrOutput {
    pub result: MetricResult,
    /// Color models of the reference to distorted direction, one per plane.
    pub color_models: Vec<ColorModel>,
    /// Luma shift map of the reference to distorted direction.
    pub shift_map: ShiftMap,
}

struct Pass {
    mse: Vec<Option<f64>>,
    samples: u64,
    color_models: Vec<ColorModel>,
    shift_map: ShiftMap,
}

/// IV-PSNR pipeline bound to a configuration, a pool and a kernel table.
#[derive(Debug, Clone, Copy)]
pub struct IvPsnr<'a> {
    config: &'a Config,
    pool: &'a WorkerPool,
    kernels: &'static KernelTable,
}

impl<'a> IvPsnr<'a> {
    #[must_use]
    pub fn new(config: &'a Config, pool: &'a WorkerPool, kernels: &'static KernelTable) -> Self {
        IvPsnr {
            config,
            pool,
            kernels,
        }
    }

    /// # Errors
    /// - If the pictures are not compatible
    /// - If a worker task fails
    pub fn compute(&self, reference: &Picture, distorted: &Picture) -> Result<IvPsnrOutput> {
        let forward = self.run(reference, distorted)?;
        let mse = if self.config.bidirectional {
            let backward = self.run(distorted, reference)?;
            forward
                .mse
                .iter()
                .zip(&backward.mse)
                .map(|(&f, &b)| larger_error(f, b))
                .collect()
        } else {
            forward.mse
        };

        let weights = self.config.weights_for(mse.len());
        let result = MetricResult::combine_mse(
            MetricKind::IvPsnr,
            &mse,
            forward.samples,
            &weights,
            reference.max_value(),
        );
        Ok(IvPsnrOutput {
            result,
            color_models: forward.color_models,
            shift_map: forward.shift_map,
        })
    }

    fn run(&self, reference: &Picture, distorted: &Picture) -> Result<Pass> {
        let config = self.config;
        let tile_rows = config.tile_rows;

        self.enter(Stage::Init, reference);
        reference.check_compatible(distorted)?;

        self.enter(Stage::ColorShiftEstimate, reference);
        let (reference, distorted, color_models) = if config.color_shift {
            match config.color_shift_direction {
                ColorShiftDirection::ReferenceToDistorted => {
                    let models = self.fit(reference, distorted)?;
                    let corrected = color_shift::apply(self.pool, reference, &models, tile_rows)?;
                    (Cow::Owned(corrected), Cow::Borrowed(distorted), models)
                }
                ColorShiftDirection::DistortedToReference => {
                    let models = self.fit(distorted, reference)?;
                    let corrected = color_shift::apply(self.pool, distorted, &models, tile_rows)?;
                    (Cow::Borrowed(reference), Cow::Owned(corrected), models)
                }
            }
        } else {
            (
                Cow::Borrowed(reference),
                Cow::Borrowed(distorted),
                vec![ColorModel::IDENTITY; reference.num_planes()],
            )
        };
        debug!("color models: {color_models:?}");

        self.enter(Stage::CorrespondenceSearch, &reference);
        let luma_mask = joint_plane_mask(&reference, &distorted, 0);
        let shift_map = correspondence::search(
            self.pool,
            self.kernels,
            reference.plane(0),
            distorted.plane(0),
            luma_mask.as_ref(),
            config.search_radius,
            config.search_block,
        )?;
        debug!(
            "{} of {} blocks shifted",
            shift_map.moved_blocks(),
            shift_map.vectors().len()
        );
        let compensated = correspondence::compensate(self.pool, &reference, &shift_map, tile_rows)?;

        self.enter(Stage::WeightedAccumulate, &compensated);
        let mut samples = 0;
        let mut mse = Vec::with_capacity(compensated.num_planes());
        for i in 0..compensated.num_planes() {
            let (a, b) = (compensated.plane(i), distorted.plane(i));
            let weights = if config.spherical {
                row_weights(a.height())
            } else {
                vec![1.0; a.height()]
            };
            let mask = joint_plane_mask(&compensated, &distorted, i);
            let acc = weighted_plane_distortion(
                self.pool,
                self.kernels,
                a,
                b,
                mask.as_ref(),
                &weights,
                tile_rows,
            )?;
            samples += acc.count;
            mse.push(acc.mse());
        }

        self.enter(Stage::Finalize, &compensated);
        debug!("plane errors: {mse:?}");

        Ok(Pass {
            mse,
            samples,
            color_models,
            shift_map,
        })
    }

    fn fit(&self, source: &Picture, target: &Picture) -> Result<Vec<ColorModel>> {
        color_shift::estimate(self.pool, self.kernels, source, target, self.config.tile_rows)
    }

    fn enter(&self, stage: Stage, picture: &Picture) {
        debug!(
            "IV-PSNR stage {stage} ({}x{}, {} planes, {:?})",
            picture.width(),
            picture.height(),
            picture.num_planes(),
            self.kernels.tier()
        );
    }
}

/// Larger of two plane errors; a plane without data on one side yields the
/// other.
fn larger_error(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::picture::{Mask, Plane};
    use crate::score::Score;

    fn noise(seed: u64, width: usize, height: usize) -> Vec<u16> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..width * height).map(|_| rng.gen_range(16..=235)).collect()
    }

    fn compute(config: &Config, a: &Picture, b: &Picture) -> IvPsnrOutput {
        let pool = WorkerPool::new(4).unwrap();
        IvPsnr::new(config, &pool, KernelTable::detected())
            .compute(a, b)
            .unwrap()
    }

    #[test]
    fn identical_pictures_are_infinite() {
        let pic = Picture::gray(40, 24, 8, noise(1, 40, 24)).unwrap();
        let out = compute(&Config::default(), &pic, &pic);
        assert_eq!(out.result.combined, Score::Infinite);
        assert_eq!(out.result.samples, 40 * 24);
        assert_eq!(out.shift_map.moved_blocks(), 0);
    }

    #[test]
    fn global_color_shift_is_forgiven() {
        let data: Vec<u16> = noise(2, 32, 32).iter().map(|&v| v / 2 * 2).collect();
        let halved = data.iter().map(|&v| v / 2 + 10).collect();
        let reference = Picture::gray(32, 32, 8, data).unwrap();
        let distorted = Picture::gray(32, 32, 8, halved).unwrap();
        let config = Config::default().with_bidirectional(false);
        let out = compute(&config, &reference, &distorted);
        assert_eq!(out.result.combined, Score::Infinite);
        assert!((out.color_models[0].gain - 0.5).abs() < 1e-12);

        let plain = compute(&config.with_color_shift(false), &reference, &distorted);
        assert!(plain.result.combined.value().unwrap() < 20.0);
    }

    #[test]
    fn small_shifts_are_forgiven() {
        let (w, h) = (48, 32);
        let reference = Plane::from_vec(w, h, noise(3, w, h)).unwrap();
        let shifted: Vec<u16> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .map(|(x, y)| reference.get((x + 1).min(w - 1), y))
            .collect();
        let reference = Picture::new(vec![reference], 8).unwrap();
        let distorted = Picture::gray(w, h, 8, shifted).unwrap();

        let config = Config::default().with_color_shift(false);
        let iv = compute(&config, &reference, &distorted).result.combined;
        let none = compute(&config.with_search_radius(0), &reference, &distorted).result.combined;
        assert!(iv.value().unwrap() > none.value().unwrap());
    }

    #[test]
    fn bidirectional_scores_are_symmetric() {
        let a = Picture::gray(32, 16, 8, noise(4, 32, 16)).unwrap();
        let b = Picture::gray(32, 16, 8, noise(5, 32, 16)).unwrap();
        let config = Config::default();
        let ab = compute(&config, &a, &b).result.combined.value().unwrap();
        let ba = compute(&config, &b, &a).result.combined.value().unwrap();
        assert!((ab - ba).abs() < 1e-9);
    }

    #[test]
    fn error_free_chroma_keeps_the_score_finite() {
        let (w, h) = (16, 16);
        let luma = noise(7, w, h);
        let chroma = Plane::from_vec(8, 8, noise(8, 8, 8)).unwrap();
        let make = |offset: u16| {
            let luma = Plane::from_vec(w, h, luma.iter().map(|&v| v + offset).collect()).unwrap();
            Picture::new(vec![luma, chroma.clone(), chroma.clone()], 8).unwrap()
        };
        let config = Config::default()
            .with_color_shift(false)
            .with_search_radius(0);
        let out = compute(&config, &make(0), &make(5));
        assert_eq!(out.result.planes[1], Score::Infinite);
        assert_eq!(out.result.planes[2], Score::Infinite);
        let expected = 10.0 * (255.0f64 * 255.0 * 6.0 / 100.0).log10();
        assert!((out.result.combined.value().unwrap() - expected).abs() < 1e-9);
    }

    #[test]
    fn the_larger_error_wins() {
        assert_eq!(larger_error(Some(4.0), Some(9.0)), Some(9.0));
        assert_eq!(larger_error(Some(0.0), Some(1.5)), Some(1.5));
        assert_eq!(larger_error(None, Some(2.0)), Some(2.0));
        assert_eq!(larger_error(Some(2.0), None), Some(2.0));
        assert_eq!(larger_error(None, None), None);
    }

    #[test]
    fn fully_masked_planes_have_no_data() {
        let pic = Picture::gray(8, 8, 8, noise(6, 8, 8))
            .unwrap()
            .with_mask(Mask::new(8, 8, vec![false; 64]).unwrap())
            .unwrap();
        let out = compute(&Config::default(), &pic, &pic);
        assert_eq!(out.result.planes, vec![Score::NoData]);
        assert_eq!(out.result.combined, Score::NoData);
        assert_eq!(out.result.samples, 0);
    }
}
