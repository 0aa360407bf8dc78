use log::debug;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::{check_inputs, hat_weight, sample_locations, CalibrationError, ResponseCurve};

/// Systems whose smallest singular value falls below this fraction of
/// the largest are treated as rank deficient.
const RANK_EPSILON: f64 = 1e-12;

/// The pixel value pinned to `g = 0`.
const ANCHOR: usize = 128;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DebevecParams {
    /// Number of pixel locations fed into the solver.
    pub samples: usize,
    /// Smoothness weight.
    pub lambda: f32,
}

impl Default for DebevecParams {
    fn default() -> DebevecParams {
        DebevecParams {
            samples: 70,
            lambda: 10.0,
        }
    }
}

/// Recovers a response curve with the method of Debevec and Malik.
///
/// `images` are the pixel buffers of the stack (all the same size) and
/// `times` their exposure times in seconds.  Each channel is solved as
/// an independent weighted least-squares system over a fixed subsample
/// of pixel locations.
pub fn calibrate_debevec(
    images: &[&[[u8; 3]]],
    times: &[f32],
    params: &DebevecParams,
) -> Result<ResponseCurve, CalibrationError> {
    check_inputs(images, times)?;

    let locations = sample_locations(images[0].len(), params.samples.max(1));
    let curves: Vec<Result<[f32; 256], CalibrationError>> = (0..3usize)
        .into_par_iter()
        .map(|chan| solve_channel(images, times, &locations, chan, params.lambda))
        .collect();

    let mut log_exposure = [[0.0f32; 256]; 3];
    for (chan, curve) in curves.into_iter().enumerate() {
        log_exposure[chan] = curve?;
    }

    Ok(ResponseCurve::new(log_exposure))
}

fn solve_channel(
    images: &[&[[u8; 3]]],
    times: &[f32],
    locations: &[usize],
    chan: usize,
    lambda: f32,
) -> Result<[f32; 256], CalibrationError> {
    // Locations where every sample is clipped tell us nothing.
    let usable: Vec<usize> = locations
        .iter()
        .copied()
        .filter(|&i| images.iter().any(|img| hat_weight(img[i][chan]) > 0.0))
        .collect();
    if usable.is_empty() {
        return Err(CalibrationError::InsufficientData(format!(
            "no usable sample locations in channel {}",
            chan
        )));
    }

    let unknowns = 256 + usable.len();
    let rows = usable.len() * images.len() + 1 + 254;
    let mut a = DMatrix::<f64>::zeros(rows, unknowns);
    let mut b = DVector::<f64>::zeros(rows);

    let mut row = 0;
    for (i, &loc) in usable.iter().enumerate() {
        for (img, &t) in images.iter().zip(times) {
            let z = img[loc][chan] as usize;
            let w = hat_weight(z as u8) as f64;
            a[(row, z)] = w;
            a[(row, 256 + i)] = -w;
            b[row] = w * (t as f64).ln();
            row += 1;
        }
    }

    a[(row, ANCHOR)] = 1.0;
    row += 1;

    for k in 1..255 {
        let w = lambda as f64 * hat_weight(k as u8) as f64;
        a[(row, k - 1)] = w;
        a[(row, k)] = -2.0 * w;
        a[(row, k + 1)] = w;
        row += 1;
    }
    debug_assert_eq!(row, rows);

    let svd = a.svd(true, true);
    let max_sv = svd.singular_values.iter().copied().fold(0.0f64, f64::max);
    let min_sv = svd
        .singular_values
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);
    debug!(
        "Debevec channel {}: {} locations, singular values [{:e}, {:e}]",
        chan,
        usable.len(),
        min_sv,
        max_sv
    );
    if !(max_sv > 0.0) || min_sv / max_sv < RANK_EPSILON {
        return Err(CalibrationError::InsufficientData(format!(
            "response system for channel {} is rank deficient",
            chan
        )));
    }

    let x = svd
        .solve(&b, max_sv * RANK_EPSILON)
        .map_err(CalibrationError::Solver)?;

    let mut curve = [0.0f32; 256];
    for (z, entry) in curve.iter_mut().enumerate() {
        *entry = x[z] as f32;
    }
    if curve.iter().any(|v| !v.is_finite()) {
        return Err(CalibrationError::Solver("non-finite response curve"));
    }

    Ok(curve)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{camera, gradient_stack};

    fn merged_log_radiance(curve: &ResponseCurve, zs: &[u8], times: &[f32]) -> f32 {
        let mut num = 0.0;
        let mut den = 0.0;
        for (&z, &t) in zs.iter().zip(times) {
            let w = hat_weight(z);
            num += w * (curve.log_exposure(0, z) - t.ln());
            den += w;
        }
        num / den
    }

    #[test]
    fn uniform_mid_gray_is_monotonic() {
        let times = [0.25, 1.0, 4.0];
        let stack: Vec<Vec<[u8; 3]>> = times
            .iter()
            .map(|&t| {
                let z = camera(0.2, t);
                vec![[z, z, z]; 32 * 32]
            })
            .collect();
        let images: Vec<&[[u8; 3]]> = stack.iter().map(|v| &v[..]).collect();

        let curve = calibrate_debevec(&images, &times, &DebevecParams::default()).unwrap();

        assert!(curve.is_finite());
        assert!(curve.is_monotonic(1e-3));
        assert!(curve.log_exposure(0, 65) < curve.log_exposure(0, 123));
        assert!(curve.log_exposure(0, 123) < curve.log_exposure(0, 230));
        assert!(curve.log_exposure(0, 128).abs() < 0.05);
    }

    #[test]
    fn gradient_preserves_radiance_ratios() {
        let times = [0.25, 1.0, 4.0];
        let stack = gradient_stack(64, 64, &times);
        let images: Vec<&[[u8; 3]]> = stack.iter().map(|v| &v[..]).collect();

        let curve = calibrate_debevec(&images, &times, &DebevecParams::default()).unwrap();
        assert!(curve.is_monotonic(1e-3));

        let zs = |e: f32| -> Vec<u8> { times.iter().map(|&t| camera(e, t)).collect() };
        let reference = merged_log_radiance(&curve, &zs(0.1), &times);
        for &e in &[0.01f32, 0.03, 0.3, 1.0] {
            let ratio = merged_log_radiance(&curve, &zs(e), &times) - reference;
            assert!(
                (ratio - (e / 0.1).ln()).abs() < 0.1,
                "radiance {}: log ratio {}",
                e,
                ratio
            );
        }
    }

    #[test]
    fn channels_are_independent() {
        let times = [0.25, 1.0, 4.0];
        let stack: Vec<Vec<[u8; 3]>> = gradient_stack(32, 32, &times)
            .into_iter()
            .map(|img| img.into_iter().map(|[z, _, _]| [z, z / 2, z]).collect())
            .collect();
        let images: Vec<&[[u8; 3]]> = stack.iter().map(|v| &v[..]).collect();

        let curve = calibrate_debevec(&images, &times, &DebevecParams::default()).unwrap();
        assert_eq!(curve.channel(0), curve.channel(2));
        assert_ne!(curve.channel(0), curve.channel(1));
    }

    #[test]
    fn deterministic() {
        let times = [0.25, 1.0, 4.0];
        let stack = gradient_stack(48, 48, &times);
        let images: Vec<&[[u8; 3]]> = stack.iter().map(|v| &v[..]).collect();

        let a = calibrate_debevec(&images, &times, &DebevecParams::default()).unwrap();
        let b = calibrate_debevec(&images, &times, &DebevecParams::default()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn single_image_is_insufficient() {
        let img = vec![[100u8; 3]; 16];
        let result = calibrate_debevec(&[&img], &[1.0], &DebevecParams::default());
        assert!(matches!(result, Err(CalibrationError::InsufficientData(_))));
    }

    #[test]
    fn equal_times_are_insufficient() {
        let img = vec![[100u8; 3]; 16];
        let result = calibrate_debevec(&[&img, &img], &[0.5, 0.5], &DebevecParams::default());
        assert!(matches!(result, Err(CalibrationError::InsufficientData(_))));
    }

    #[test]
    fn fully_clipped_stack_is_insufficient() {
        let black = vec![[0u8; 3]; 16];
        let white = vec![[255u8; 3]; 16];
        let result = calibrate_debevec(&[&black, &white], &[0.1, 1.0], &DebevecParams::default());
        assert!(matches!(result, Err(CalibrationError::InsufficientData(_))));
    }
}
