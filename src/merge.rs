use std::{fmt, str::FromStr};

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use sensor_analysis::{calibrate_debevec, calibrate_robertson, hat_weight, ResponseCurve};

use crate::{config::CalibrationConfig, MergeError};

/// Response recovery and merging algorithm.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Debevec,
    Robertson,
}

impl Default for Method {
    fn default() -> Method {
        Method::Debevec
    }
}

impl FromStr for Method {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Method, MergeError> {
        match s.to_ascii_lowercase().as_str() {
            "debevec" => Ok(Method::Debevec),
            "robertson" => Ok(Method::Robertson),
            _ => Err(MergeError::InvalidParameter(format!(
                "unknown merge method '{}'",
                s
            ))),
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match *self {
            Method::Debevec => "debevec",
            Method::Robertson => "robertson",
        })
    }
}

/// One 8-bit exposure of the scene.
#[derive(Debug, Clone)]
pub struct LdrSample {
    pub name: String,
    pub pixels: Vec<[u8; 3]>,
    /// Exposure time in seconds.
    pub time: f32,
    /// Position in the caller's input list.
    pub input_index: usize,
}

impl LdrSample {
    pub fn new(name: String, pixels: Vec<[u8; 3]>, time: f32) -> LdrSample {
        LdrSample {
            name: name,
            pixels: pixels,
            time: time,
            input_index: 0,
        }
    }
}

/// Same-sized exposures of one scene, sorted by ascending exposure time.
#[derive(Debug, Clone)]
pub struct ExposureStack {
    width: usize,
    height: usize,
    samples: Vec<LdrSample>,
}

impl ExposureStack {
    /// Builds a stack from samples given in input order.
    ///
    /// Each sample's `input_index` is set to its position in `samples`,
    /// then the samples are stably sorted by exposure time.
    pub fn new(
        width: usize,
        height: usize,
        mut samples: Vec<LdrSample>,
    ) -> Result<ExposureStack, MergeError> {
        for (i, sample) in samples.iter_mut().enumerate() {
            if sample.pixels.len() != width * height {
                return Err(MergeError::PixelCountMismatch {
                    index: i,
                    expected: width * height,
                    found: sample.pixels.len(),
                });
            }
            if !(sample.time.is_finite() && sample.time > 0.0) {
                return Err(MergeError::InvalidParameter(format!(
                    "exposure time of '{}' must be positive, got {}",
                    sample.name, sample.time
                )));
            }
            sample.input_index = i;
        }
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));

        Ok(ExposureStack {
            width: width,
            height: height,
            samples: samples,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[LdrSample] {
        &self.samples
    }

    pub fn samples_mut(&mut self) -> &mut [LdrSample] {
        &mut self.samples
    }

    /// Exposure times in stack (ascending) order.
    pub fn times(&self) -> Vec<f32> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// Exposure times in the caller's original order.
    pub fn times_in_input_order(&self) -> Vec<f32> {
        let mut times = vec![0.0; self.samples.len()];
        for s in self.samples.iter() {
            times[s.input_index] = s.time;
        }
        times
    }

    fn pixel_slices(&self) -> Vec<&[[u8; 3]]> {
        self.samples.iter().map(|s| &s.pixels[..]).collect()
    }
}

/// Relative scene radiance, linear RGB.
#[derive(Debug, Clone, PartialEq)]
pub struct RadianceMap {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f32; 3]>,
}

/// Recovers the camera response from the stack.
pub fn calibrate(
    stack: &ExposureStack,
    method: Method,
    config: &CalibrationConfig,
) -> Result<ResponseCurve, MergeError> {
    if stack.len() < 2 {
        return Err(MergeError::InsufficientData(format!(
            "merging needs at least 2 exposures, got {}",
            stack.len()
        )));
    }

    info!("Recovering response curve ({})", method);
    let images = stack.pixel_slices();
    let times = stack.times();
    let curve = match method {
        Method::Debevec => calibrate_debevec(&images, &times, &config.debevec())?,
        Method::Robertson => calibrate_robertson(&images, &times, &config.robertson())?,
    };
    Ok(curve)
}

/// Merges the stack into a radiance map using `curve`.
///
/// Pixels clipped in every exposure fall back to a single exposure:
/// the shortest if they are mostly bright, else the longest.
pub fn merge_radiance(
    stack: &ExposureStack,
    curve: &ResponseCurve,
    method: Method,
) -> Result<RadianceMap, MergeError> {
    if stack.is_empty() {
        return Err(MergeError::InsufficientData("empty exposure stack".into()));
    }

    info!("Merging {} exposures ({})", stack.len(), method);
    let (width, height) = (stack.width, stack.height);
    let samples = &stack.samples;
    let log_times: Vec<f32> = samples.iter().map(|s| s.time.ln()).collect();
    let shortest = 0;
    let longest = samples.len() - 1;

    let mut pixels = vec![[0.0f32; 3]; width * height];
    pixels
        .par_chunks_mut(width.max(1))
        .enumerate()
        .for_each(|(y, row)| {
            for (x, out) in row.iter_mut().enumerate() {
                let i = y * width + x;
                for chan in 0..3 {
                    let mut num = 0.0f32;
                    let mut den = 0.0f32;
                    let mut z_sum = 0u32;
                    for (s, sample) in samples.iter().enumerate() {
                        let z = sample.pixels[i][chan];
                        let w = hat_weight(z);
                        z_sum += z as u32;
                        match method {
                            Method::Debevec => {
                                num += w * (curve.log_exposure(chan, z) - log_times[s]);
                                den += w;
                            }
                            Method::Robertson => {
                                num += w * sample.time * curve.linear(chan, z);
                                den += w * sample.time * sample.time;
                            }
                        }
                    }

                    let radiance = if den > 0.0 {
                        match method {
                            Method::Debevec => (num / den).exp(),
                            Method::Robertson => num / den,
                        }
                    } else {
                        // Everything is clipped.
                        let s = if z_sum >= 128 * samples.len() as u32 {
                            shortest
                        } else {
                            longest
                        };
                        let z = samples[s].pixels[i][chan];
                        match method {
                            Method::Debevec => (curve.log_exposure(chan, z) - log_times[s]).exp(),
                            Method::Robertson => curve.linear(chan, z) / samples[s].time,
                        }
                    };

                    out[chan] = if radiance.is_nan() {
                        0.0
                    } else {
                        radiance.max(0.0).min(f32::MAX)
                    };
                }
            }
        });

    Ok(RadianceMap {
        width: width,
        height: height,
        pixels: pixels,
    })
}
