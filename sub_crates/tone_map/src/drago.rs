use rayon::prelude::*;

use crate::color::{log_average, luminance, rescale};

/// Drago et al.'s adaptive logarithmic mapping.
///
/// World luminance is first normalized by its log-average.  `bias`
/// controls how the log base varies between 2 (dark) and 10 (bright).
pub fn apply(pixels: &[[f32; 3]], width: usize, bias: f32) -> Vec<[f32; 3]> {
    let lum: Vec<f32> = pixels.par_iter().map(|&p| luminance(p)).collect();
    let avg = log_average(&lum);
    let norm = if avg > 0.0 { 1.0 / avg } else { 0.0 };

    let lw_max = lum.iter().fold(0.0f32, |m, &l| m.max(l * norm));
    if !(lw_max > 0.0) {
        return vec![[0.0; 3]; pixels.len()];
    }
    let log_max = (lw_max + 1.0).log10();
    let exponent = bias.ln() / 0.5f32.ln();

    let mut out = vec![[0.0f32; 3]; pixels.len()];
    out.par_chunks_mut(width)
        .zip(pixels.par_chunks(width).zip(lum.par_chunks(width)))
        .for_each(|(out_row, (row, lum_row))| {
            for ((o, &p), &l) in out_row.iter_mut().zip(row).zip(lum_row) {
                let lw = l * norm;
                let base = (2.0 + 8.0 * (lw / lw_max).powf(exponent)).ln();
                let ld = (lw + 1.0).ln() / (log_max * base);
                *o = rescale(p, l, ld);
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brightest_maps_to_one() {
        let pixels = [[0.1f32; 3], [1.0; 3], [10.0; 3], [100.0; 3]];
        let out = apply(&pixels, 2, 0.85);
        assert!((luminance(out[3]) - 1.0).abs() < 1e-3);
        for w in out.windows(2) {
            assert!(luminance(w[0]) < luminance(w[1]));
        }
    }

    #[test]
    fn higher_bias_darkens_mid_tones() {
        let pixels = [[0.1f32; 3], [1.0; 3], [10.0; 3], [100.0; 3]];
        let high = apply(&pixels, 2, 0.95);
        let low = apply(&pixels, 2, 0.5);
        assert!(luminance(high[1]) < luminance(low[1]));
    }
}
