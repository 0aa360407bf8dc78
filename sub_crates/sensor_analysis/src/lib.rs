//! A crate for recovering camera response curves from bracketed
//! exposures.

mod debevec;
mod histogram;
mod response_curve;
mod robertson;
mod sampling;
mod weight;

pub use debevec::{calibrate_debevec, DebevecParams};
pub use histogram::Histogram;
pub use response_curve::ResponseCurve;
pub use robertson::{calibrate_robertson, RobertsonParams};
pub use sampling::sample_locations;
pub use weight::hat_weight;

/// Minimum spread of `ln t` across a stack for calibration to have
/// anything to work with.
const MIN_LOG_TIME_SPAN: f32 = 1e-6;

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("got {images} images but {times} exposure times")]
    MismatchedInputs { images: usize, times: usize },

    #[error("image {index} has {found} pixels, expected {expected}")]
    PixelCountMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("invalid exposure time {0}")]
    InvalidExposureTime(f32),

    #[error("solver failed: {0}")]
    Solver(&'static str),
}

/// Checks the invariants shared by all calibration methods.
fn check_inputs(images: &[&[[u8; 3]]], times: &[f32]) -> Result<(), CalibrationError> {
    if images.len() != times.len() {
        return Err(CalibrationError::MismatchedInputs {
            images: images.len(),
            times: times.len(),
        });
    }
    if images.len() < 2 {
        return Err(CalibrationError::InsufficientData(format!(
            "calibration needs at least 2 images, got {}",
            images.len()
        )));
    }

    let expected = images[0].len();
    for (i, img) in images.iter().enumerate() {
        if img.len() != expected {
            return Err(CalibrationError::PixelCountMismatch {
                index: i,
                expected: expected,
                found: img.len(),
            });
        }
    }
    if expected == 0 {
        return Err(CalibrationError::InsufficientData(
            "images have no pixels".into(),
        ));
    }

    if let Some(&t) = times.iter().find(|t| !(t.is_finite() && **t > 0.0)) {
        return Err(CalibrationError::InvalidExposureTime(t));
    }
    let (min, max) = times
        .iter()
        .map(|t| t.ln())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if max - min < MIN_LOG_TIME_SPAN {
        return Err(CalibrationError::InsufficientData(
            "all exposure times are equal".into(),
        ));
    }

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_model() {
        assert_eq!(test_util::camera(0.2, 0.25), 65);
        assert_eq!(test_util::camera(0.2, 1.0), 123);
        assert_eq!(test_util::camera(0.2, 4.0), 230);
        assert_eq!(test_util::camera(100.0, 1.0), 255);
    }

    #[test]
    fn check_inputs_rejects_bad_stacks() {
        let a = vec![[128u8; 3]; 4];
        let b = vec![[128u8; 3]; 5];

        assert!(matches!(
            check_inputs(&[&a], &[1.0]),
            Err(CalibrationError::InsufficientData(_))
        ));
        assert!(matches!(
            check_inputs(&[&a, &a], &[1.0]),
            Err(CalibrationError::MismatchedInputs { images: 2, times: 1 })
        ));
        assert!(matches!(
            check_inputs(&[&a, &b], &[1.0, 2.0]),
            Err(CalibrationError::PixelCountMismatch { index: 1, .. })
        ));
        assert!(matches!(
            check_inputs(&[&a, &a], &[1.0, 0.0]),
            Err(CalibrationError::InvalidExposureTime(_))
        ));
        assert!(matches!(
            check_inputs(&[&a, &a], &[0.5, 0.5]),
            Err(CalibrationError::InsufficientData(_))
        ));
        assert!(check_inputs(&[&a, &a], &[0.5, 1.0]).is_ok());
    }
}
