use crate::error::{Error, Result};
use crate::kernels::IsaTier;

pub const MAX_SEARCH_RADIUS: usize = 16;
pub const MAX_SSIM_WINDOW: usize = 64;

/// The metrics an [`Evaluator`](crate::Evaluator) can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum MetricKind {
    Psnr,
    WsPsnr,
    Ssim,
    IvPsnr,
}

impl MetricKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Psnr => "PSNR",
            Self::WsPsnr => "WS-PSNR",
            Self::Ssim => "SSIM",
            Self::IvPsnr => "IV-PSNR",
        }
    }
}

/// Which picture the estimated color model is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ColorShiftDirection {
    /// Fit `distorted ≈ gain * reference + offset` and correct the reference.
    #[default]
    ReferenceToDistorted,
    /// Fit `reference ≈ gain * distorted + offset` and correct the distorted
    /// picture.
    DistortedToReference,
}

/// Process-wide settings, built once and shared by reference with every
/// component.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// Metrics computed for every frame, in report order.
    pub metrics: Vec<MetricKind>,
    /// Correspondence search radius `R`, offsets span `[-R, R]` on both axes.
    pub search_radius: usize,
    /// Edge length of the luma blocks sharing one shift vector. `1` searches
    /// every sample separately.
    pub search_block: usize,
    pub ssim_window: usize,
    pub ssim_stride: usize,
    /// Apply equirectangular latitude weights (WS-PSNR style) to IV-PSNR and
    /// SSIM. WS-PSNR is always weighted.
    pub spherical: bool,
    /// Expected bit depth of the input pictures, unchecked when `None`.
    pub bit_depth: Option<u8>,
    /// Worker thread count, `0` picks the number of logical cores.
    pub threads: usize,
    pub color_shift: bool,
    pub color_shift_direction: ColorShiftDirection,
    /// Evaluate IV-PSNR in both directions and keep the lower score.
    pub bidirectional: bool,
    /// Per-plane weights of the combined score. Empty selects 4:1:1 for three
    /// planes and uniform weights otherwise.
    pub plane_weights: Vec<f64>,
    /// Highest kernel tier to use; the detected tier is used when unset or
    /// when the requested tier is not supported by the CPU.
    pub max_isa: Option<IsaTier>,
    /// Rows per worker task for row-tiled stages.
    pub tile_rows: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            metrics: vec![MetricKind::IvPsnr],
            search_radius: 2,
            search_block: 4,
            ssim_window: 8,
            ssim_stride: 4,
            spherical: false,
            bit_depth: None,
            threads: 0,
            color_shift: true,
            color_shift_direction: ColorShiftDirection::ReferenceToDistorted,
            bidirectional: true,
            plane_weights: Vec::new(),
            max_isa: None,
            tile_rows: 32,
        }
    }
}

impl Config {
    #[must_use]
    pub fn with_metrics(mut self, metrics: &[MetricKind]) -> Self {
        self.metrics = metrics.to_vec();
        self
    }

    #[must_use]
    pub fn with_search_radius(mut self, radius: usize) -> Self {
        self.search_radius = radius;
        self
    }

    #[must_use]
    pub fn with_search_block(mut self, block: usize) -> Self {
        self.search_block = block;
        self
    }

    #[must_use]
    pub fn with_ssim_window(mut self, window: usize, stride: usize) -> Self {
        self.ssim_window = window;
        self.ssim_stride = stride;
        self
    }

    #[must_use]
    pub fn with_spherical(mut self, spherical: bool) -> Self {
        self.spherical = spherical;
        self
    }

    #[must_use]
    pub fn with_bit_depth(mut self, bit_depth: u8) -> Self {
        self.bit_depth = Some(bit_depth);
        self
    }

    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    #[must_use]
    pub fn with_color_shift(mut self, enabled: bool) -> Self {
        self.color_shift = enabled;
        self
    }

    #[must_use]
    pub fn with_color_shift_direction(mut self, direction: ColorShiftDirection) -> Self {
        self.color_shift_direction = direction;
        self
    }

    #[must_use]
    pub fn with_bidirectional(mut self, bidirectional: bool) -> Self {
        self.bidirectional = bidirectional;
        self
    }

    #[must_use]
    pub fn with_plane_weights(mut self, weights: &[f64]) -> Self {
        self.plane_weights = weights.to_vec();
        self
    }

    #[must_use]
    pub fn with_max_isa(mut self, tier: IsaTier) -> Self {
        self.max_isa = Some(tier);
        self
    }

    /// Checks every knob. Called by [`Evaluator::new`](crate::Evaluator::new)
    /// before any frame is touched.
    ///
    /// # Errors
    /// - If any value is out of its supported range
    pub fn validate(&self) -> Result<()> {
        if self.metrics.is_empty() {
            return Err(invalid("metrics", "at least one metric must be selected"));
        }
        if self.search_radius > MAX_SEARCH_RADIUS {
            return Err(invalid(
                "search_radius",
                format!("{} exceeds {MAX_SEARCH_RADIUS}", self.search_radius),
            ));
        }
        if self.search_block == 0 {
            return Err(invalid("search_block", "must be at least 1"));
        }
        if !(2..=MAX_SSIM_WINDOW).contains(&self.ssim_window) {
            return Err(invalid(
                "ssim_window",
                format!("{} is outside of 2..={MAX_SSIM_WINDOW}", self.ssim_window),
            ));
        }
        if self.ssim_stride == 0 || self.ssim_stride > self.ssim_window {
            return Err(invalid(
                "ssim_stride",
                format!("{} is outside of 1..={}", self.ssim_stride, self.ssim_window),
            ));
        }
        if let Some(depth) = self.bit_depth {
            if !(crate::picture::MIN_BIT_DEPTH..=crate::picture::MAX_BIT_DEPTH).contains(&depth) {
                return Err(invalid("bit_depth", format!("{depth} is not supported")));
            }
        }
        if self.plane_weights.len() > crate::picture::MAX_PLANES {
            return Err(invalid("plane_weights", "more weights than planes"));
        }
        if self
            .plane_weights
            .iter()
            .any(|w| !w.is_finite() || *w < 0.0)
        {
            return Err(invalid("plane_weights", "weights must be finite and >= 0"));
        }
        if !self.plane_weights.is_empty() && self.plane_weights.iter().all(|&w| w == 0.0) {
            return Err(invalid("plane_weights", "at least one weight must be > 0"));
        }
        if self.tile_rows == 0 {
            return Err(invalid("tile_rows", "must be at least 1"));
        }
        Ok(())
    }

    /// Weights used to combine `planes` per-plane scores.
    #[must_use]
    pub fn weights_for(&self, planes: usize) -> Vec<f64> {
        if self.plane_weights.is_empty() {
            return if planes == 3 {
                vec![4.0, 1.0, 1.0]
            } else {
                vec![1.0; planes]
            };
        }
        (0..planes)
            .map(|i| self.plane_weights.get(i).copied().unwrap_or(0.0))
            .collect()
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidConfig {
        field,
        reason: reason.into(),
    }
}
