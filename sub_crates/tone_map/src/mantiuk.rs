use rayon::prelude::*;

use crate::{
    color::luminance,
    pyramid::{LaplacianPyramid, Plane},
};

const MAX_LEVELS: usize = 8;

/// Smallest dimension of the base band.
const MIN_BASE_SIZE: usize = 8;

/// Dynamic range, in decades, that the low-pass band is squeezed into.
const BASE_RANGE: f32 = 2.0;

/// Luminance floor so black pixels have a finite log.
const MIN_LUMINANCE: f32 = 1e-6;

/// A simplified take on Mantiuk et al.'s contrast-domain operator.
///
/// The log10 luminance is split into a Laplacian pyramid.  The detail
/// bands are scaled by `contrast` and the base band is linearly
/// compressed so that it spans at most `BASE_RANGE` decades.  Color is
/// restored as `(c / L)^saturation * Ld`.
pub fn apply(
    pixels: &[[f32; 3]],
    width: usize,
    height: usize,
    contrast: f32,
    saturation: f32,
) -> Vec<[f32; 3]> {
    let lum: Vec<f32> = pixels.par_iter().map(|&p| luminance(p)).collect();
    let log_lum: Vec<f32> = lum
        .par_iter()
        .map(|&l| l.max(MIN_LUMINANCE).log10())
        .collect();

    let mut pyramid = LaplacianPyramid::build(
        &Plane::new(width, height, log_lum),
        MAX_LEVELS,
        MIN_BASE_SIZE,
    );

    let (lo, hi) = pyramid
        .base
        .data
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if hi - lo > BASE_RANGE {
        let scale = BASE_RANGE / (hi - lo);
        for v in pyramid.base.data.iter_mut() {
            *v = hi + (*v - hi) * scale;
        }
    }

    let mapped = pyramid.collapse(contrast);
    let max = mapped.data.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));

    let mut out = vec![[0.0f32; 3]; pixels.len()];
    out.par_chunks_mut(width)
        .zip(pixels.par_chunks(width))
        .zip(lum.par_chunks(width).zip(mapped.data.par_chunks(width)))
        .for_each(|((out_row, row), (lum_row, mapped_row))| {
            for (((o, &p), &l), &v) in out_row.iter_mut().zip(row).zip(lum_row).zip(mapped_row) {
                if !(l > 0.0) {
                    continue;
                }
                let ld = 10.0f32.powf(v - max);
                *o = [
                    (p[0].max(0.0) / l).powf(saturation) * ld,
                    (p[1].max(0.0) / l).powf(saturation) * ld,
                    (p[2].max(0.0) / l).powf(saturation) * ld,
                ];
            }
        });
    out
}
