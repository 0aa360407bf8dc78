use std::{path::PathBuf, time::Duration};

use job_queue::JobError;
use sensor_analysis::CalibrationError;
use tone_map::TonemapError;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("failed to decode '{}': {source}", .path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: image_fmt::ReadError,
    },

    #[error("metadata mismatch: {0}")]
    MetadataMismatch(String),

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("alignment failed: {0}")]
    AlignmentFailure(String),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("unsupported tonemap operator '{0}'")]
    UnsupportedOperator(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("failed to write '{}': {message}", .path.display())]
    WriteFailure { path: PathBuf, message: String },

    #[error("image {index} is {found:?}, expected {expected:?}")]
    DimensionMismatch {
        index: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    /// A pixel buffer whose length doesn't match the stack dimensions.
    #[error("image {index} has {found} pixels, expected {expected}")]
    PixelCountMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("merge exceeded its {0:?} time budget")]
    Timeout(Duration),

    #[error("merge was canceled")]
    Canceled,

    #[error("merge job panicked: {0}")]
    Panicked(String),

    #[error("bad config: {0}")]
    Config(String),
}

impl MergeError {
    /// A stable tag naming the kind of failure.
    pub fn kind(&self) -> &'static str {
        match self {
            MergeError::Decode { .. } => "DecodeError",
            MergeError::MetadataMismatch(_) => "MetadataMismatch",
            MergeError::InsufficientData(_) => "InsufficientData",
            MergeError::AlignmentFailure(_) => "AlignmentFailure",
            MergeError::UnsupportedFormat(_) => "UnsupportedFormat",
            MergeError::UnsupportedOperator(_) => "UnsupportedOperator",
            MergeError::InvalidParameter(_) => "InvalidParameter",
            MergeError::WriteFailure { .. } => "WriteFailure",
            MergeError::DimensionMismatch { .. } | MergeError::PixelCountMismatch { .. } => {
                "DimensionMismatch"
            }
            MergeError::Timeout(_) => "Timeout",
            MergeError::Canceled => "Canceled",
            MergeError::Panicked(_) => "Panicked",
            MergeError::Config(_) => "Config",
        }
    }
}

impl From<CalibrationError> for MergeError {
    fn from(e: CalibrationError) -> Self {
        match e {
            CalibrationError::InsufficientData(msg) => MergeError::InsufficientData(msg),
            CalibrationError::MismatchedInputs { .. } => MergeError::MetadataMismatch(e.to_string()),
            CalibrationError::PixelCountMismatch { .. } | CalibrationError::Solver(_) => {
                MergeError::InsufficientData(e.to_string())
            }
            CalibrationError::InvalidExposureTime(_) => MergeError::InvalidParameter(e.to_string()),
        }
    }
}

impl From<TonemapError> for MergeError {
    fn from(e: TonemapError) -> Self {
        match e {
            TonemapError::UnsupportedOperator(name) => MergeError::UnsupportedOperator(name),
            TonemapError::InvalidParameter { .. } | TonemapError::DimensionMismatch { .. } => {
                MergeError::InvalidParameter(e.to_string())
            }
        }
    }
}

impl From<JobError> for MergeError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::TimedOut(budget) => MergeError::Timeout(budget),
            JobError::Canceled => MergeError::Canceled,
            JobError::Panicked(msg) => MergeError::Panicked(msg),
        }
    }
}
