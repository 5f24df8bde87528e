use log::{debug, warn};

use crate::config::{Config, MetricKind};
use crate::distortion::picture_distortion;
use crate::error::{Error, Result};
use crate::ivpsnr::IvPsnr;
use crate::kernels::KernelTable;
use crate::picture::{joint_plane_mask, Picture};
use crate::pool::WorkerPool;
use crate::score::{MetricResult, Score};
use crate::ssim::{plane_ssim, SsimParams};
use crate::weighting::plane_ws_distortion;

/// Source of pictures for [`Evaluator::evaluate_sequence`].
pub trait PictureProvider {
    /// Returns the next picture, or `None` at the end of the sequence.
    ///
    /// # Errors
    /// - If the picture cannot be produced
    fn load_frame(&mut self) -> Result<Option<Picture>>;

    /// Hands a picture back once the evaluator is done with it.
    fn release_frame(&mut self, picture: Picture) {
        drop(picture);
    }
}

/// [`PictureProvider`] over any iterator of pictures.
#[derive(Debug, Clone)]
pub struct IterProvider<I> {
    iter: I,
}

impl<I: Iterator<Item = Picture>> IterProvider<I> {
    pub fn new(iter: impl IntoIterator<IntoIter = I>) -> Self {
        IterProvider {
            iter: iter.into_iter(),
        }
    }
}

impl<I: Iterator<Item = Picture>> PictureProvider for IterProvider<I> {
    fn load_frame(&mut self) -> Result<Option<Picture>> {
        Ok(self.iter.next())
    }
}

/// All metric results of one frame, in the configured order.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FrameReport {
    pub index: u64,
    pub results: Vec<MetricResult>,
}

impl FrameReport {
    #[must_use]
    pub fn get(&self, kind: MetricKind) -> Option<&MetricResult> {
        self.results.iter().find(|r| r.kind == kind)
    }
}

/// Aggregate of one metric over a sequence.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricSummary {
    pub kind: MetricKind,
    /// Mean of the finite combined scores, `None` if there were none.
    pub mean: Option<f64>,
    pub finite_frames: u64,
    pub infinite_frames: u64,
    pub no_data_frames: u64,
}

impl MetricSummary {
    fn collect<'a>(kind: MetricKind, results: impl Iterator<Item = &'a MetricResult>) -> Self {
        let mut summary = MetricSummary {
            kind,
            mean: None,
            finite_frames: 0,
            infinite_frames: 0,
            no_data_frames: 0,
        };
        let mut sum = 0.0;
        for result in results.filter(|r| r.kind == kind) {
            match result.combined {
                Score::Finite(v) => {
                    sum += v;
                    summary.finite_frames += 1;
                }
                Score::Infinite => summary.infinite_frames += 1,
                Score::NoData => summary.no_data_frames += 1,
            }
        }
        if summary.finite_frames > 0 {
            summary.mean = Some(sum / summary.finite_frames as f64);
        }
        summary
    }
}

/// Outcome of [`Evaluator::evaluate_sequence`].
///
/// A failing frame does not discard the others: its error lands in
/// `failures`, tagged with the frame index, and the summaries cover the
/// frames in `frames`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SequenceReport {
    pub frames: Vec<FrameReport>,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub failures: Vec<Error>,
    pub summaries: Vec<MetricSummary>,
}

impl SequenceReport {
    #[must_use]
    pub fn summary(&self, kind: MetricKind) -> Option<&MetricSummary> {
        self.summaries.iter().find(|s| s.kind == kind)
    }

    /// True when every frame pair was evaluated.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Computes the configured metrics for picture pairs.
///
/// Owns the worker pool and the selected kernel table; both live as long as
/// the evaluator.
#[derive(Debug)]
pub struct Evaluator {
    config: Config,
    pool: WorkerPool,
    kernels: &'static KernelTable,
}

impl Evaluator {
    /// # Errors
    /// - If the configuration is invalid
    /// - If the worker pool cannot be started
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let pool = WorkerPool::new(config.threads)?;
        let kernels = KernelTable::select(config.max_isa);
        debug!(
            "evaluator ready: {} threads, {:?} kernels, metrics {:?}",
            pool.threads(),
            kernels.tier(),
            config.metrics
        );
        Ok(Evaluator {
            config,
            pool,
            kernels,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    #[must_use]
    pub fn kernels(&self) -> &'static KernelTable {
        self.kernels
    }

    /// Computes every configured metric for one picture pair.
    ///
    /// # Errors
    /// - If the pictures are not compatible with each other or with the
    ///   configured bit depth
    /// - If a worker task fails
    ///
    /// Errors are tagged with the frame `index`.
    pub fn evaluate_frame(
        &self,
        index: u64,
        reference: &Picture,
        distorted: &Picture,
    ) -> Result<FrameReport> {
        self.frame_results(reference, distorted)
            .map(|results| FrameReport { index, results })
            .map_err(|e| e.in_frame(index))
    }

    fn frame_results(
        &self,
        reference: &Picture,
        distorted: &Picture,
    ) -> Result<Vec<MetricResult>> {
        reference.check_compatible(distorted)?;
        if let Some(expected) = self.config.bit_depth {
            if reference.bit_depth() != expected {
                return Err(Error::InvalidPicture(format!(
                    "configured bit depth is {expected}, pictures have {}",
                    reference.bit_depth()
                )));
            }
        }
        let weights = self.config.weights_for(reference.num_planes());
        let max_value = reference.max_value();
        self.config
            .metrics
            .iter()
            .map(|&kind| match kind {
                MetricKind::Psnr => {
                    let (mse, samples) = self.psnr(reference, distorted)?;
                    Ok(MetricResult::combine_mse(kind, &mse, samples, &weights, max_value))
                }
                MetricKind::WsPsnr => {
                    let (mse, samples) = self.wspsnr(reference, distorted)?;
                    Ok(MetricResult::combine_mse(kind, &mse, samples, &weights, max_value))
                }
                MetricKind::Ssim => {
                    let (planes, windows) = self.ssim(reference, distorted)?;
                    Ok(MetricResult::average(kind, planes, windows, &weights))
                }
                MetricKind::IvPsnr => IvPsnr::new(&self.config, &self.pool, self.kernels)
                    .compute(reference, distorted)
                    .map(|out| out.result),
            })
            .collect()
    }

    fn psnr(&self, reference: &Picture, distorted: &Picture) -> Result<(Vec<Option<f64>>, u64)> {
        let acc = picture_distortion(
            &self.pool,
            self.kernels,
            reference,
            distorted,
            self.config.tile_rows,
        )?;
        let samples = acc.iter().map(|a| a.count).sum();
        Ok((acc.iter().map(|a| a.mse()).collect(), samples))
    }

    fn wspsnr(&self, reference: &Picture, distorted: &Picture) -> Result<(Vec<Option<f64>>, u64)> {
        let mut samples = 0;
        let mut mse = Vec::with_capacity(reference.num_planes());
        for i in 0..reference.num_planes() {
            let mask = joint_plane_mask(reference, distorted, i);
            let acc = plane_ws_distortion(
                &self.pool,
                self.kernels,
                reference.plane(i),
                distorted.plane(i),
                mask.as_ref(),
                self.config.tile_rows,
            )?;
            samples += acc.count;
            mse.push(acc.mse());
        }
        Ok((mse, samples))
    }

    fn ssim(&self, reference: &Picture, distorted: &Picture) -> Result<(Vec<Score>, u64)> {
        let params = SsimParams {
            window: self.config.ssim_window,
            stride: self.config.ssim_stride,
            max_value: reference.max_value(),
            spherical: self.config.spherical,
        };
        let mut windows = 0;
        let mut planes = Vec::with_capacity(reference.num_planes());
        for i in 0..reference.num_planes() {
            let mask = joint_plane_mask(reference, distorted, i);
            let (score, count) = plane_ssim(
                &self.pool,
                self.kernels,
                reference.plane(i),
                distorted.plane(i),
                mask.as_ref(),
                &params,
            )?;
            windows += count;
            planes.push(score);
        }
        Ok((planes, windows))
    }

    /// Evaluates frame pairs until either provider runs out.
    ///
    /// A frame that fails to evaluate is recorded in
    /// [`SequenceReport::failures`] and the sequence goes on. A provider
    /// that fails to load a frame ends the sequence; its error is recorded
    /// the same way and every frame evaluated so far is kept.
    #[must_use]
    pub fn evaluate_sequence<R, D>(&self, reference: &mut R, distorted: &mut D) -> SequenceReport
    where
        R: PictureProvider + ?Sized,
        D: PictureProvider + ?Sized,
    {
        let mut frames = Vec::new();
        let mut failures = Vec::new();
        for index in 0.. {
            let a = match reference.load_frame() {
                Ok(a) => a,
                Err(e) => {
                    failures.push(stop(e.in_frame(index)));
                    break;
                }
            };
            let b = match distorted.load_frame() {
                Ok(b) => b,
                Err(e) => {
                    if let Some(a) = a {
                        reference.release_frame(a);
                    }
                    failures.push(stop(e.in_frame(index)));
                    break;
                }
            };
            let (a, b) = match (a, b) {
                (Some(a), Some(b)) => (a, b),
                (a, b) => {
                    if a.is_some() || b.is_some() {
                        warn!("sequences differ in length, stopping after {index} frames");
                    }
                    if let Some(a) = a {
                        reference.release_frame(a);
                    }
                    if let Some(b) = b {
                        distorted.release_frame(b);
                    }
                    break;
                }
            };
            let report = self.evaluate_frame(index, &a, &b);
            reference.release_frame(a);
            distorted.release_frame(b);
            match report {
                Ok(report) => frames.push(report),
                Err(e) => {
                    warn!("{e}");
                    failures.push(e);
                }
            }
        }

        let summaries = self
            .config
            .metrics
            .iter()
            .map(|&kind| MetricSummary::collect(kind, frames.iter().flat_map(|f| &f.results)))
            .collect();
        SequenceReport {
            frames,
            failures,
            summaries,
        }
    }
}

fn stop(error: Error) -> Error {
    warn!("stopping the sequence: {error}");
    error
}
