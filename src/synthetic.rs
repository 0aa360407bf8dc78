//! Synthetic scenes and a simple simulated camera, for exercising the
//! merge pipeline without real photographs.

use std::path::Path;

use crate::MergeError;

/// A gamma 2.2 camera that clips at 1.0.
pub fn camera_response(radiance: f32, time: f32) -> u8 {
    let v = (radiance * time).min(1.0).max(0.0);
    (v.powf(1.0 / 2.2) * 255.0).round() as u8
}

/// Photographs `scene` with the given exposure time.
pub fn render(scene: &[[f32; 3]], time: f32) -> Vec<[u8; 3]> {
    scene
        .iter()
        .map(|p| {
            [
                camera_response(p[0], time),
                camera_response(p[1], time),
                camera_response(p[2], time),
            ]
        })
        .collect()
}

pub fn uniform_scene(width: usize, height: usize, radiance: f32) -> Vec<[f32; 3]> {
    vec![[radiance; 3]; width * height]
}

/// A gray log-radiance ramp over 3 decades, from `10^-2.5` at the first
/// pixel to `10^0.5` at the last, in raster order.
pub fn gradient_scene(width: usize, height: usize) -> Vec<[f32; 3]> {
    let n = width * height;
    (0..n)
        .map(|i| {
            let t = if n > 1 { i as f32 / (n - 1) as f32 } else { 0.0 };
            [10.0f32.powf(-2.5 + 3.0 * t); 3]
        })
        .collect()
}

/// Index of the pixel in `gradient_scene(width, height)` closest to
/// `radiance`.
pub fn gradient_index(width: usize, height: usize, radiance: f32) -> usize {
    let n = width * height;
    if n < 2 {
        return 0;
    }
    let t = ((radiance.log10() + 2.5) / 3.0).max(0.0).min(1.0);
    (t * (n - 1) as f32).round() as usize
}

/// A gray scene with texture at several scales, suitable for alignment.
pub fn textured_scene(width: usize, height: usize) -> Vec<[f32; 3]> {
    let mut scene = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let (x, y) = (x as f32, y as f32);
            let e = 0.3
                + 0.25 * (x / 3.1).sin() * (y / 4.3).cos()
                + 0.2 * ((x + 2.0 * y) / 7.7).sin()
                + 0.1 * ((3.0 * x - y) / 2.3).cos();
            scene.push([e.max(0.0); 3]);
        }
    }
    scene
}

/// Writes 8-bit pixels as a PNG.
pub fn write_png(path: &Path, pixels: &[[u8; 3]], width: usize, height: usize) -> Result<(), MergeError> {
    let write_err = |message: String| MergeError::WriteFailure {
        path: path.to_path_buf(),
        message: message,
    };
    let raw: Vec<u8> = pixels.iter().flat_map(|p| p.iter().copied()).collect();
    let img = image::RgbImage::from_raw(width as u32, height as u32, raw)
        .ok_or_else(|| write_err("pixel count doesn't match dimensions".into()))?;
    img.save_with_format(path, image::ImageFormat::Png)
        .map_err(|e| write_err(e.to_string()))
}
