//! Median threshold bitmap alignment.
//!
//! Each image is reduced to a bitmap of "brighter than its own median",
//! which is largely independent of exposure.  Offsets are found
//! coarse-to-fine over an image pyramid by testing the 9 neighbours of
//! the doubled offset from the level above.

use log::{debug, warn};
use rayon::prelude::*;
use serde::Serialize;

use sensor_analysis::Histogram;

use crate::{config::AlignConfig, merge::ExposureStack, MergeError};

/// Pyramid levels smaller than this in either dimension aren't used.
const MIN_LEVEL_SIZE: usize = 8;

/// Offsets tested around the current estimate, no-shift first so it
/// wins ties.
const NEIGHBOURS: [(i32, i32); 9] = [
    (0, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
    (-1, 0),
    (1, 0),
    (-1, 1),
    (0, 1),
    (1, 1),
];

/// Integer translation that maps an image onto the reference:
/// `aligned(x, y) = image(x - dx, y - dy)`.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Offset {
    pub dx: i32,
    pub dy: i32,
}

impl Offset {
    pub fn new(dx: i32, dy: i32) -> Offset {
        Offset { dx: dx, dy: dy }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0 && self.dy == 0
    }
}

/// An 8-bit grayscale image.
#[derive(Debug, Clone)]
struct Gray {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl Gray {
    fn from_rgb(pixels: &[[u8; 3]], width: usize, height: usize) -> Gray {
        Gray {
            width: width,
            height: height,
            data: pixels
                .iter()
                .map(|p| ((54 * p[0] as u32 + 183 * p[1] as u32 + 19 * p[2] as u32) >> 8) as u8)
                .collect(),
        }
    }

    /// Half resolution, 2x2 box filtered.
    fn downsample(&self) -> Gray {
        let width = self.width / 2;
        let height = self.height / 2;
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            let row0 = &self.data[(2 * y * self.width)..];
            let row1 = &self.data[((2 * y + 1) * self.width)..];
            for x in 0..width {
                let sum = row0[2 * x] as u32
                    + row0[2 * x + 1] as u32
                    + row1[2 * x] as u32
                    + row1[2 * x + 1] as u32;
                data.push((sum / 4) as u8);
            }
        }
        Gray {
            width: width,
            height: height,
            data: data,
        }
    }
}

/// Threshold and exclusion bitmaps of one pyramid level.
struct Bitmaps {
    width: usize,
    height: usize,
    threshold: Vec<bool>,
    /// False for pixels too close to the median to be trusted.
    mask: Vec<bool>,
}

impl Bitmaps {
    fn new(gray: &Gray, exclusion: u8) -> Bitmaps {
        let median = Histogram::from_iter(gray.data.iter().copied(), 256).median() as i32;
        let exclusion = exclusion as i32;
        Bitmaps {
            width: gray.width,
            height: gray.height,
            threshold: gray.data.iter().map(|&v| v as i32 > median).collect(),
            mask: gray
                .data
                .iter()
                .map(|&v| (v as i32 - median).abs() > exclusion)
                .collect(),
        }
    }

    /// Fraction of mismatching pixels over the overlap when `other` is
    /// shifted by `offset`.
    fn mismatch(&self, other: &Bitmaps, offset: Offset) -> f64 {
        let mut mismatches = 0usize;
        let mut overlap = 0usize;
        for y in 0..self.height {
            let sy = y as i64 - offset.dy as i64;
            if sy < 0 || sy >= other.height as i64 {
                continue;
            }
            let sy = sy as usize;
            for x in 0..self.width {
                let sx = x as i64 - offset.dx as i64;
                if sx < 0 || sx >= other.width as i64 {
                    continue;
                }
                let a = y * self.width + x;
                let b = sy * other.width + sx as usize;
                overlap += 1;
                if self.mask[a] && other.mask[b] && self.threshold[a] != other.threshold[b] {
                    mismatches += 1;
                }
            }
        }
        if overlap == 0 {
            1.0
        } else {
            mismatches as f64 / overlap as f64
        }
    }
}

fn pyramid_depth(width: usize, height: usize, max_levels: usize) -> usize {
    let mut levels = 1;
    while levels < max_levels
        && (width >> levels) >= MIN_LEVEL_SIZE
        && (height >> levels) >= MIN_LEVEL_SIZE
    {
        levels += 1;
    }
    levels
}

fn build_pyramid(gray: Gray, levels: usize, exclusion: u8) -> Vec<Bitmaps> {
    let mut grays = vec![gray];
    for _ in 1..levels {
        let next = grays[grays.len() - 1].downsample();
        grays.push(next);
    }
    grays.iter().map(|g| Bitmaps::new(g, exclusion)).collect()
}

fn search(
    ref_pyramid: &[Bitmaps],
    image: &[[u8; 3]],
    width: usize,
    height: usize,
    config: &AlignConfig,
) -> Offset {
    let pyramid = build_pyramid(
        Gray::from_rgb(image, width, height),
        ref_pyramid.len(),
        config.exclusion,
    );

    let mut offset = Offset::default();
    for level in (0..ref_pyramid.len()).rev() {
        let base = Offset::new(offset.dx * 2, offset.dy * 2);
        let mut best = base;
        let mut best_score = f64::INFINITY;
        for &(dx, dy) in NEIGHBOURS.iter() {
            let candidate = Offset::new(base.dx + dx, base.dy + dy);
            let score = ref_pyramid[level].mismatch(&pyramid[level], candidate);
            if score < best_score {
                best_score = score;
                best = candidate;
            }
        }
        offset = best;
    }
    offset
}

/// Shifts an image by `offset`, replicating border pixels into the
/// uncovered area.  Dimensions are preserved.
pub fn translate(pixels: &[[u8; 3]], width: usize, height: usize, offset: Offset) -> Vec<[u8; 3]> {
    if offset.is_zero() || pixels.is_empty() {
        return pixels.to_vec();
    }
    let clamp = |v: i64, max: usize| v.max(0).min(max as i64 - 1) as usize;

    let mut out = vec![[0u8; 3]; width * height];
    out.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let sy = clamp(y as i64 - offset.dy as i64, height);
        for (x, p) in row.iter_mut().enumerate() {
            let sx = clamp(x as i64 - offset.dx as i64, width);
            *p = pixels[sy * width + sx];
        }
    });
    out
}

/// Computes an offset for every sample of the stack relative to its
/// middle exposure.
pub fn compute_offsets(stack: &ExposureStack, config: &AlignConfig) -> Result<Vec<Offset>, MergeError> {
    let (width, height) = (stack.width(), stack.height());
    let samples = stack.samples();
    if samples.is_empty() {
        return Ok(Vec::new());
    }
    if width < MIN_LEVEL_SIZE || height < MIN_LEVEL_SIZE {
        return Err(MergeError::AlignmentFailure(format!(
            "{}x{} is too small to align",
            width, height
        )));
    }

    let reference = samples.len() / 2;
    let levels = pyramid_depth(width, height, config.max_levels.max(1));
    let ref_pyramid = build_pyramid(
        Gray::from_rgb(&samples[reference].pixels, width, height),
        levels,
        config.exclusion,
    );
    debug!("Aligning to sample {} with {} pyramid levels", reference, levels);

    Ok(samples
        .par_iter()
        .enumerate()
        .map(|(i, sample)| {
            if i == reference {
                Offset::default()
            } else {
                search(&ref_pyramid, &sample.pixels, width, height, config)
            }
        })
        .collect())
}

/// Aligns the stack in place.  Alignment is best-effort: on failure a
/// warning is logged and the stack is left untouched.
///
/// Returns the offsets applied, in stack order.
pub fn align_stack(stack: &mut ExposureStack, config: &AlignConfig) -> Vec<Offset> {
    let offsets = match compute_offsets(stack, config) {
        Ok(offsets) => offsets,
        Err(e) => {
            warn!("{}; merging unaligned images", e);
            return vec![Offset::default(); stack.len()];
        }
    };

    let (width, height) = (stack.width(), stack.height());
    for (sample, &offset) in stack.samples_mut().iter_mut().zip(offsets.iter()) {
        if !offset.is_zero() {
            debug!("Shifting exposure {} s by {:?}", sample.time, offset);
            sample.pixels = translate(&sample.pixels, width, height, offset);
        }
    }
    offsets
}
