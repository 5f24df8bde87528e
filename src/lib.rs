#![deny(clippy::all)]
#![warn(clippy::nursery)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::default_trait_access)]
#![allow(clippy::inconsistent_struct_constructor)]
#![allow(clippy::inline_always)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::redundant_closure_for_method_calls)]
#![allow(clippy::similar_names)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::use_self)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::default_numeric_fallback)]
#![warn(clippy::exit)]
#![warn(clippy::float_cmp_const)]
#![warn(clippy::if_then_some_else_none)]
#![warn(clippy::lossy_float_literal)]
#![warn(clippy::map_err_ignore)]
#![warn(clippy::mem_forget)]
#![warn(clippy::mod_module_files)]
#![warn(clippy::multiple_inherent_impl)]
#![warn(clippy::rc_buffer)]
#![warn(clippy::rc_mutex)]
#![warn(clippy::rest_pat_in_fully_bound_structs)]
#![warn(clippy::same_name_method)]
#![warn(clippy::str_to_string)]
#![warn(clippy::string_to_string)]
#![warn(clippy::undocumented_unsafe_blocks)]
#![warn(clippy::unnecessary_self_imports)]
#![warn(clippy::unneeded_field_pattern)]
#![warn(clippy::verbose_file_reads)]

mod color_shift;
mod config;
mod correspondence;
mod distortion;
mod error;
mod evaluator;
mod ivpsnr;
mod kernels;
mod picture;
mod pool;
mod score;
mod ssim;
mod weighting;
mod yuv;

pub use color_shift::ColorModel;
pub use config::{ColorShiftDirection, Config, MetricKind, MAX_SEARCH_RADIUS, MAX_SSIM_WINDOW};
pub use correspondence::{ShiftMap, ShiftVector};
pub use distortion::{picture_distortion, plane_distortion};
pub use error::{Error, Result};
pub use evaluator::{
    Evaluator, FrameReport, IterProvider, MetricSummary, PictureProvider, SequenceReport,
};
pub use ivpsnr::{IvPsnr, IvPsnrOutput};
pub use kernels::{DiffAccumulator, IsaTier, KernelTable, Moments};
pub use picture::{
    max_value, Mask, Picture, Plane, PlaneView, Region, MAX_BIT_DEPTH, MIN_BIT_DEPTH,
};
pub use pool::{TaskHandle, WorkerPool};
pub use score::{psnr_score, MetricResult, Score};
pub use ssim::{window_ssim, SsimParams};
pub use weighting::{latitude_weight, row_weights, WeightedAccumulator};
pub use yuvxyb::{Pixel, Yuv};

fn compute_single(
    kind: MetricKind,
    config: Config,
    reference: &Picture,
    distorted: &Picture,
) -> Result<MetricResult> {
    let evaluator = Evaluator::new(config.with_metrics(&[kind]))?;
    let mut report = evaluator.evaluate_frame(0, reference, distorted)?;
    report
        .results
        .pop()
        .ok_or_else(|| Error::InvalidConfig {
            field: "metrics",
            reason: format!("{} produced no result", kind.name()),
        })
}

/// Computes the PSNR of `distorted` against `reference`, per plane and
/// combined.
///
/// # Errors
/// - If the pictures differ in plane count, plane size or bit depth
pub fn compute_frame_psnr(reference: &Picture, distorted: &Picture) -> Result<MetricResult> {
    compute_single(MetricKind::Psnr, Config::default(), reference, distorted)
}

/// Computes the WS-PSNR of two equirectangular pictures.
///
/// # Errors
/// - If the pictures differ in plane count, plane size or bit depth
pub fn compute_frame_wspsnr(reference: &Picture, distorted: &Picture) -> Result<MetricResult> {
    compute_single(MetricKind::WsPsnr, Config::default(), reference, distorted)
}

/// Computes the mean SSIM with the default 8x8 window and stride 4.
///
/// # Errors
/// - If the pictures differ in plane count, plane size or bit depth
pub fn compute_frame_ssim(reference: &Picture, distorted: &Picture) -> Result<MetricResult> {
    compute_single(MetricKind::Ssim, Config::default(), reference, distorted)
}

/// Computes the IV-PSNR for a given reference picture and the distorted
/// version of that picture, with the default search radius, block size,
/// color correction and bidirectional evaluation.
///
/// # Errors
/// - If the pictures differ in plane count, plane size or bit depth
pub fn compute_frame_ivpsnr(reference: &Picture, distorted: &Picture) -> Result<MetricResult> {
    compute_single(MetricKind::IvPsnr, Config::default(), reference, distorted)
}

/// Converts two YUV frames and computes their IV-PSNR.
///
/// # Errors
/// - If either frame cannot be converted
/// - See [`compute_frame_ivpsnr`]
pub fn compute_frame_ivpsnr_yuv<T: Pixel>(
    reference: &Yuv<T>,
    distorted: &Yuv<T>,
) -> Result<MetricResult> {
    let reference = Picture::try_from(reference)?;
    let distorted = Picture::try_from(distorted)?;
    compute_frame_ivpsnr(&reference, &distorted)
}
