use log::debug;
use rayon::prelude::*;

use crate::{check_inputs, hat_weight, CalibrationError, ResponseCurve};

/// Pixels per partial sum.  Fixed so that summation order, and thus the
/// result, does not depend on the thread count.
const CHUNK_SIZE: usize = 1 << 14;

/// Floor applied to the linear response before taking its log.
const MIN_RESPONSE: f32 = 1e-6;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RobertsonParams {
    pub max_iterations: usize,
    /// Stop once the mean absolute change of the response drops below
    /// this.
    pub threshold: f32,
}

impl Default for RobertsonParams {
    fn default() -> RobertsonParams {
        RobertsonParams {
            max_iterations: 30,
            threshold: 0.01,
        }
    }
}

/// Recovers a response curve with the iterative method of Robertson et
/// al.
///
/// Works on every pixel of the stack.  The result is normalized so that
/// pixel value 128 maps to a log exposure of zero.  Values no pixel
/// landed on are interpolated from their observed neighbours, and the
/// curve never decreases.
pub fn calibrate_robertson(
    images: &[&[[u8; 3]]],
    times: &[f32],
    params: &RobertsonParams,
) -> Result<ResponseCurve, CalibrationError> {
    check_inputs(images, times)?;

    let curves: Vec<Result<[f32; 256], CalibrationError>> = (0..3usize)
        .into_par_iter()
        .map(|chan| solve_channel(images, times, chan, params))
        .collect();

    let mut log_exposure = [[0.0f32; 256]; 3];
    for (chan, curve) in curves.into_iter().enumerate() {
        let curve = curve?;
        for (entry, f) in log_exposure[chan].iter_mut().zip(curve.iter()) {
            *entry = f.max(MIN_RESPONSE).ln();
        }
    }

    Ok(ResponseCurve::new(log_exposure))
}

/// Returns the linear response of one channel.
fn solve_channel(
    images: &[&[[u8; 3]]],
    times: &[f32],
    chan: usize,
    params: &RobertsonParams,
) -> Result<[f32; 256], CalibrationError> {
    let pixel_count = images[0].len();

    let mut response = [0.0f32; 256];
    for (z, f) in response.iter_mut().enumerate() {
        *f = z.max(1) as f32 / 128.0;
    }

    for iteration in 0..params.max_iterations.max(1) {
        let chunk_count = (pixel_count + CHUNK_SIZE - 1) / CHUNK_SIZE;
        let partials: Vec<([f64; 256], [u32; 256], bool)> = (0..chunk_count)
            .into_par_iter()
            .map(|chunk| {
                let start = chunk * CHUNK_SIZE;
                let end = (start + CHUNK_SIZE).min(pixel_count);
                accumulate(images, times, chan, &response, start..end)
            })
            .collect();

        let mut sums = [0.0f64; 256];
        let mut counts = [0u32; 256];
        let mut any_weight = false;
        for (s, c, w) in partials.iter() {
            for m in 0..256 {
                sums[m] += s[m];
                counts[m] += c[m];
            }
            any_weight |= *w;
        }
        if !any_weight {
            return Err(CalibrationError::InsufficientData(format!(
                "every pixel is clipped in channel {}",
                chan
            )));
        }

        let mut next = response;
        let mut observed = [false; 256];
        for m in 0..256 {
            if counts[m] > 0 {
                next[m] = (sums[m] / counts[m] as f64) as f32;
                observed[m] = true;
            }
        }
        fill_unobserved(&mut next, &observed);
        let mid = next[128];
        if mid > 0.0 && mid.is_finite() {
            for f in next.iter_mut() {
                *f /= mid;
            }
        }

        let change = next
            .iter()
            .zip(response.iter())
            .map(|(a, b)| (a - b).abs())
            .sum::<f32>()
            / 256.0;
        response = next;

        debug!(
            "Robertson channel {}: iteration {}, mean change {}",
            chan, iteration, change
        );
        if change < params.threshold {
            break;
        }
    }

    Ok(response)
}

/// Fills the bins no pixel landed in from their observed neighbours, then
/// raises every bin to at least the one below it.
fn fill_unobserved(response: &mut [f32; 256], observed: &[bool; 256]) {
    let known: Vec<usize> = (0..256).filter(|&z| observed[z]).collect();
    let (first, last) = match (known.first(), known.last()) {
        (Some(&first), Some(&last)) => (first, last),
        _ => return,
    };

    // Outside the observed range, scale proportionally to the pixel value.
    for z in 0..first {
        response[z] = response[first] * z.max(1) as f32 / first as f32;
    }
    for z in (last + 1)..256 {
        response[z] = response[last] * z as f32 / last.max(1) as f32;
    }
    for pair in known.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        for z in (a + 1)..b {
            let frac = (z - a) as f32 / (b - a) as f32;
            response[z] = response[a] + (response[b] - response[a]) * frac;
        }
    }

    let mut floor = response[0];
    for f in response.iter_mut() {
        *f = f.max(floor);
        floor = *f;
    }
}

/// Estimates the radiance of each pixel in `range` from the current
/// response and accumulates `E * t` into the bin of every sample.
fn accumulate(
    images: &[&[[u8; 3]]],
    times: &[f32],
    chan: usize,
    response: &[f32; 256],
    range: std::ops::Range<usize>,
) -> ([f64; 256], [u32; 256], bool) {
    let mut sums = [0.0f64; 256];
    let mut counts = [0u32; 256];
    let mut any_weight = false;

    for i in range {
        let mut num = 0.0f64;
        let mut den = 0.0f64;
        for (img, &t) in images.iter().zip(times) {
            let z = img[i][chan];
            let w = hat_weight(z) as f64;
            let t = t as f64;
            num += w * t * response[z as usize] as f64;
            den += w * t * t;
        }
        if den <= 0.0 {
            continue;
        }
        any_weight = true;

        let radiance = num / den;
        for (img, &t) in images.iter().zip(times) {
            let z = img[i][chan] as usize;
            sums[z] += radiance * t as f64;
            counts[z] += 1;
        }
    }

    (sums, counts, any_weight)
}
