use rayon::prelude::*;

use crate::color::{log_average, luminance, rescale};

/// Reinhard et al.'s global photographic operator.
///
/// Luminance is scaled so the log-average lands on `key`, then
/// compressed with `L / (1 + L)`.
pub fn apply(pixels: &[[f32; 3]], width: usize, key: f32) -> Vec<[f32; 3]> {
    let lum: Vec<f32> = pixels.par_iter().map(|&p| luminance(p)).collect();
    let avg = log_average(&lum);
    let scale = if avg > 0.0 { key / avg } else { 0.0 };

    let mut out = vec![[0.0f32; 3]; pixels.len()];
    out.par_chunks_mut(width)
        .zip(pixels.par_chunks(width).zip(lum.par_chunks(width)))
        .for_each(|(out_row, (row, lum_row))| {
            for ((o, &p), &l) in out_row.iter_mut().zip(row).zip(lum_row) {
                let lm = l * scale;
                *o = rescale(p, l, lm / (1.0 + lm));
            }
        });
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_average_maps_to_key() {
        // A uniform image sits exactly at its log-average.
        let out = apply(&[[2.0; 3]; 4], 2, 0.18);
        let expected = 0.18 / 1.18;
        for p in out {
            assert!((luminance(p) - expected).abs() < 1e-4);
        }
    }

    #[test]
    fn bright_values_approach_one() {
        let mut pixels = vec![[0.01f32; 3]; 15];
        pixels.push([1.0e4; 3]);
        let out = apply(&pixels, 4, 0.18);
        assert!(luminance(out[15]) > 0.99);
        assert!(luminance(out[15]) <= 1.0);
    }
}
