use thiserror::Error;

/// Errors raised while validating inputs or running a metric pipeline.
///
/// Configuration errors are reported before any frame is processed. Resource
/// errors come from the worker pool and, when they happen inside a frame's
/// pipeline, are wrapped in [`Error::Frame`] so the caller knows which frame
/// failed. Numeric degeneracies (for example a flat reference channel in the
/// color-shift fit) are never reported; they fall back to a neutral model.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration value for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("invalid picture: {0}")]
    InvalidPicture(String),

    #[error(
        "plane {plane} dimensions do not match: \
         {ref_width}x{ref_height} vs {dist_width}x{dist_height}"
    )]
    DimensionMismatch {
        plane: usize,
        ref_width: usize,
        ref_height: usize,
        dist_width: usize,
        dist_height: usize,
    },

    #[error("bit depth does not match: {reference} vs {distorted}")]
    BitDepthMismatch { reference: u8, distorted: u8 },

    #[error("plane count does not match: {reference} vs {distorted}")]
    PlaneCountMismatch { reference: usize, distorted: usize },

    #[error(
        "region {width}x{height}+{x}+{y} is outside of the {plane_width}x{plane_height} plane"
    )]
    RegionOutOfBounds {
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        plane_width: usize,
        plane_height: usize,
    },

    #[error("worker task panicked: {0}")]
    TaskPanicked(String),

    #[error("worker task result was lost")]
    TaskLost,

    #[error("could not build the worker pool: {0}")]
    ThreadPool(String),

    #[error("frame {index}: {source}")]
    Frame {
        index: u64,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attaches the frame identity to an error raised inside a frame pipeline.
    #[must_use]
    pub fn in_frame(self, index: u64) -> Self {
        match self {
            // already tagged
            Self::Frame { .. } => self,
            other => Self::Frame {
                index,
                source: Box::new(other),
            },
        }
    }

    /// Returns `true` for errors caused by invalid configuration or
    /// mismatched inputs, as opposed to failures while computing.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        match *self {
            Self::InvalidConfig { .. }
            | Self::InvalidPicture(_)
            | Self::DimensionMismatch { .. }
            | Self::BitDepthMismatch { .. }
            | Self::PlaneCountMismatch { .. } => true,
            Self::Frame { ref source, .. } => source.is_configuration(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_tag_is_applied_once() {
        let err = Error::TaskLost.in_frame(3).in_frame(7);
        match err {
            Error::Frame { index, ref source } => {
                assert_eq!(index, 3);
                assert_eq!(**source, Error::TaskLost);
            }
            _ => panic!("expected frame error"),
        }
        assert_eq!(err.to_string(), "frame 3: worker task result was lost");
    }

    #[test]
    fn configuration_errors_are_classified() {
        let err = Error::BitDepthMismatch {
            reference: 8,
            distorted: 10,
        };
        assert!(err.is_configuration());
        assert!(err.in_frame(0).is_configuration());
        assert!(!Error::TaskPanicked("boom".to_owned()).is_configuration());
    }
}
