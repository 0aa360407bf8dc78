//! Working out how long each image in a stack was exposed.
//!
//! Per image, the first of these that is available wins:
//!
//! 1. an explicit time override (seconds),
//! 2. an explicit EV override (`t = 2^EV`),
//! 3. EXIF `ExposureTime`,
//! 4. EXIF `ShutterSpeedValue` (APEX, `t = 2^-v`),
//! 5. an estimate from the image's brightness relative to the rest of
//!    the stack.

use log::{info, warn};
use serde::Serialize;

use crate::{ExifExposure, MergeError, SourceImage};

/// Where a resolved exposure time came from.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExposureSource {
    TimeOverride,
    EvOverride,
    ExifExposureTime,
    ExifShutterSpeed,
    Brightness,
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize)]
pub struct ResolvedExposure {
    pub time: f32,
    pub source: ExposureSource,
}

/// Caller-supplied per-image exposure values, in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExposureOverrides {
    pub times: Option<Vec<f32>>,
    pub evs: Option<Vec<f32>>,
}

impl ExposureOverrides {
    /// Checks the override lists against the number of images.  Meant to
    /// run before anything is decoded.
    pub fn validate(&self, image_count: usize) -> Result<(), MergeError> {
        for (name, list) in [("exposure time", &self.times), ("EV", &self.evs)] {
            if let Some(list) = list {
                if list.len() != image_count {
                    return Err(MergeError::MetadataMismatch(format!(
                        "got {} {} values for {} images",
                        list.len(),
                        name,
                        image_count
                    )));
                }
            }
        }

        if let Some(times) = &self.times {
            if let Some(t) = times.iter().find(|t| !(t.is_finite() && **t > 0.0)) {
                return Err(MergeError::InvalidParameter(format!(
                    "exposure time must be positive and finite, got {}",
                    t
                )));
            }
        }
        if let Some(evs) = &self.evs {
            if let Some(ev) = evs.iter().find(|ev| !ev_to_time(**ev).is_finite()) {
                return Err(MergeError::InvalidParameter(format!(
                    "EV {} is out of range",
                    ev
                )));
            }
        }
        Ok(())
    }
}

/// `t = 2^EV`.
pub fn ev_to_time(ev: f32) -> f32 {
    let t = 2.0f32.powf(ev);
    if t > 0.0 {
        t
    } else {
        f32::NAN
    }
}

/// The exposure time recorded in EXIF, if any.  With `normalize`, the
/// time is scaled by `ISO / N^2` so stacks bracketed by aperture or
/// sensitivity compare correctly.
pub fn exif_exposure(exif: &ExifExposure, normalize: bool) -> Option<(f32, ExposureSource)> {
    let (time, source) = if let Some(t) = exif.exposure_time {
        (t, ExposureSource::ExifExposureTime)
    } else if let Some(apex) = exif.shutter_speed {
        (2.0f32.powf(-apex), ExposureSource::ExifShutterSpeed)
    } else {
        return None;
    };

    let mut time = time as f64;
    if normalize {
        if let Some(iso) = exif.iso {
            time *= iso as f64;
        }
        if let Some(n) = exif.fnumber {
            time /= n as f64 * n as f64;
        }
    }
    let time = time as f32;

    if time.is_finite() && time > 0.0 {
        Some((time, source))
    } else {
        None
    }
}

/// Mean Rec.601 luma of an image, in [0, 255].
pub fn mean_luma(pixels: &[[u8; 3]]) -> f64 {
    if pixels.is_empty() {
        return 0.0;
    }
    let sum: f64 = pixels
        .iter()
        .map(|p| 0.299 * p[0] as f64 + 0.587 * p[1] as f64 + 0.114 * p[2] as f64)
        .sum();
    sum / pixels.len() as f64
}

/// Turns per-image mean lumas into rough exposure times.
///
/// Lumas are min-max normalized across the stack to `b` in [0, 1], and
/// mapped to `1 / (4000 - 3996 b)`: the darkest image gets 1/4000 s and
/// the brightest 1/4 s.
pub fn brightness_times(lumas: &[f64]) -> Vec<f32> {
    let lo = lumas.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = lumas.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = (hi - lo).max(1e-9);
    lumas
        .iter()
        .map(|&l| {
            let b = (l - lo) / range;
            (1.0 / (4000.0 - b * 3996.0)) as f32
        })
        .collect()
}

/// Resolves an exposure time for every image, in input order.
pub fn resolve_exposures(
    images: &[SourceImage],
    overrides: &ExposureOverrides,
    normalize: bool,
) -> Result<Vec<ResolvedExposure>, MergeError> {
    overrides.validate(images.len())?;

    // Brightness estimates are relative to the whole stack, so compute
    // them for everyone up front.
    let lumas: Vec<f64> = images.iter().map(|img| mean_luma(&img.pixels)).collect();
    let estimates = brightness_times(&lumas);

    let mut resolved = Vec::with_capacity(images.len());
    for (i, img) in images.iter().enumerate() {
        let exposure = if let Some(times) = &overrides.times {
            ResolvedExposure {
                time: times[i],
                source: ExposureSource::TimeOverride,
            }
        } else if let Some(evs) = &overrides.evs {
            ResolvedExposure {
                time: ev_to_time(evs[i]),
                source: ExposureSource::EvOverride,
            }
        } else if let Some((time, source)) = exif_exposure(&img.info.exif, normalize) {
            ResolvedExposure {
                time: time,
                source: source,
            }
        } else {
            warn!(
                "No exposure data for '{}', estimating from brightness",
                img.info.filename
            );
            ResolvedExposure {
                time: estimates[i],
                source: ExposureSource::Brightness,
            }
        };

        info!(
            "'{}': exposure time {} s ({:?})",
            img.info.filename, exposure.time, exposure.source
        );
        resolved.push(exposure);
    }

    Ok(resolved)
}
