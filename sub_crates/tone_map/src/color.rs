/// Offset that keeps the log of black pixels finite.
const LOG_DELTA: f64 = 1e-6;

/// Rec.709 relative luminance.
#[inline(always)]
pub fn luminance(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// The geometric mean of the given luminances, `exp(mean(ln(delta + L)))`.
///
/// Summed sequentially in f64 so the result does not depend on thread
/// scheduling.
pub fn log_average(luminances: &[f32]) -> f32 {
    if luminances.is_empty() {
        return 0.0;
    }
    let sum: f64 = luminances
        .iter()
        .map(|&l| (LOG_DELTA + l.max(0.0) as f64).ln())
        .sum();
    (sum / luminances.len() as f64).exp() as f32
}

/// Clips `v` to [0, 1], applies `v^inv_gamma`, and quantizes to 8 bits
/// with rounding.  NaN maps to black.
#[inline]
pub fn encode_gamma(v: f32, inv_gamma: f32) -> u8 {
    let v = if v.is_nan() { 0.0 } else { v.max(0.0).min(1.0) };
    (v.powf(inv_gamma) * 255.0 + 0.5) as u8
}

/// Scales `rgb` so its luminance becomes `target`, given its current
/// luminance `lum`.  Black stays black.
#[inline]
pub(crate) fn rescale(rgb: [f32; 3], lum: f32, target: f32) -> [f32; 3] {
    if !(lum > 0.0) {
        return [0.0; 3];
    }
    let s = target / lum;
    [rgb[0] * s, rgb[1] * s, rgb[2] * s]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn luminance_of_white() {
        assert!((luminance([1.0, 1.0, 1.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn log_average_of_constant() {
        let l = log_average(&[0.5; 10]);
        assert!((l - 0.5).abs() < 1e-5);
        assert_eq!(log_average(&[]), 0.0);
    }

    #[test]
    fn log_average_is_geometric() {
        let l = log_average(&[0.01, 1.0]);
        assert!((l - 0.1).abs() < 1e-4);
    }

    #[test]
    fn gamma_encoding() {
        assert_eq!(encode_gamma(0.0, 1.0 / 2.2), 0);
        assert_eq!(encode_gamma(1.0, 1.0 / 2.2), 255);
        assert_eq!(encode_gamma(7.5, 1.0 / 2.2), 255);
        assert_eq!(encode_gamma(-1.0, 1.0 / 2.2), 0);
        assert_eq!(encode_gamma(f32::NAN, 1.0 / 2.2), 0);
        assert_eq!(encode_gamma(0.5, 1.0), 128);
    }

    #[test]
    fn rescale_black() {
        assert_eq!(rescale([0.0; 3], 0.0, 1.0), [0.0; 3]);
        assert_eq!(rescale([1.0, 2.0, 4.0], 2.0, 1.0), [0.5, 1.0, 2.0]);
    }
}
