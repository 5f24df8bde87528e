use crate::config::MetricKind;

/// One metric value.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Score {
    Finite(f64),
    /// PSNR of identical content.
    Infinite,
    /// Every sample was excluded, there is nothing to measure.
    NoData,
}

impl Score {
    /// The score as a number, `f64::INFINITY` for [`Score::Infinite`].
    #[must_use]
    pub fn value(self) -> Option<f64> {
        match self {
            Self::Finite(v) => Some(v),
            Self::Infinite => Some(f64::INFINITY),
            Self::NoData => None,
        }
    }

    #[must_use]
    pub fn is_infinite(self) -> bool {
        self == Self::Infinite
    }
}

/// `10 * log10(max² / mse)`. Zero error is [`Score::Infinite`], no samples
/// is [`Score::NoData`].
#[must_use]
pub fn psnr_score(mse: Option<f64>, max_value: u32) -> Score {
    match mse {
        None => Score::NoData,
        Some(mse) if mse <= 0.0 => Score::Infinite,
        Some(mse) => {
            let max = f64::from(max_value);
            Score::Finite(10.0 * (max * max / mse).log10())
        }
    }
}

/// Result of one metric for one frame.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricResult {
    pub kind: MetricKind,
    pub planes: Vec<Score>,
    pub combined: Score,
    /// Number of samples (SSIM: windows) the score was computed over.
    pub samples: u64,
}

impl MetricResult {
    /// Combines per-plane mean squared errors of a PSNR-like metric.
    ///
    /// The combined score is the PSNR of the weighted MSE, so an error-free
    /// plane lowers the combined error without hiding the error of the
    /// others. It is infinite only when every weighted plane is error-free.
    /// Planes without data or with zero weight are left out.
    #[must_use]
    pub fn combine_mse(
        kind: MetricKind,
        mse: &[Option<f64>],
        samples: u64,
        weights: &[f64],
        max_value: u32,
    ) -> Self {
        let mut weight_sum = 0.0;
        let mut error_sum = 0.0;
        for (&plane, &weight) in mse.iter().zip(weights) {
            if let Some(plane) = plane.filter(|_| weight > 0.0) {
                error_sum += plane * weight;
                weight_sum += weight;
            }
        }
        let combined = (weight_sum > 0.0).then(|| error_sum / weight_sum);
        MetricResult {
            kind,
            planes: mse.iter().map(|&m| psnr_score(m, max_value)).collect(),
            combined: psnr_score(combined, max_value),
            samples,
        }
    }

    /// Weighted mean of per-plane scores, for metrics without an error
    /// domain such as SSIM.
    #[must_use]
    pub fn average(kind: MetricKind, planes: Vec<Score>, samples: u64, weights: &[f64]) -> Self {
        let mut weight_sum = 0.0;
        let mut value_sum = 0.0;
        let mut infinite = false;
        for (&score, &weight) in planes.iter().zip(weights) {
            if weight <= 0.0 {
                continue;
            }
            match score {
                Score::Finite(v) => {
                    value_sum += v * weight;
                    weight_sum += weight;
                }
                Score::Infinite => infinite = true,
                Score::NoData => (),
            }
        }
        let combined = if weight_sum > 0.0 {
            Score::Finite(value_sum / weight_sum)
        } else if infinite {
            Score::Infinite
        } else {
            Score::NoData
        };
        MetricResult {
            kind,
            planes,
            combined,
            samples,
        }
    }
}
