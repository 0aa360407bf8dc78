//! Merges bracketed LDR exposures of a static scene into a relative
//! radiance map, with optional alignment and tone-mapped preview.

pub mod align;
pub mod config;
pub mod error;
pub mod exposure;
pub mod merge;
pub mod output;
pub mod pipeline;
pub mod source;
pub mod synthetic;

pub use config::MergeConfig;
pub use error::MergeError;
pub use merge::{ExposureStack, LdrSample, Method, RadianceMap};
pub use pipeline::{InputSource, MergeRequest, MergeResult, PreviewRequest};

/// A decoded input image along with what we know about how it was shot.
#[derive(Debug)]
pub struct SourceImage {
    pub pixels: Vec<[u8; 3]>,
    pub info: ImageInfo,
}

#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub filename: String,
    pub full_filepath: String,

    pub width: usize,
    pub height: usize,

    pub exif: ExifExposure,
}

/// Exposure-related EXIF fields.  Zero or otherwise invalid values are
/// left as `None`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ExifExposure {
    /// `ExposureTime`, in seconds.
    pub exposure_time: Option<f32>,
    /// `ShutterSpeedValue`, in APEX units.
    pub shutter_speed: Option<f32>,
    pub fnumber: Option<f32>,
    pub iso: Option<u32>,
}
