//! Reading and writing of Radiance .hdr (RGBE) image files.

mod error;
mod rle;
mod trifloat;

use std::io::{BufRead, Write};

pub use error::ReadError;
pub use trifloat::{decode as decode_rgbe, encode as encode_rgbe};

/// Scanline widths outside this range can't be run-length encoded.
const RLE_MIN_WIDTH: usize = 8;
const RLE_MAX_WIDTH: usize = 0x7fff;

/// Largest image `read_hdr()` accepts, in pixels.
pub const MAX_PIXELS: usize = 1 << 28;

/// Pixels reserved up front.  Anything beyond this grows as scanlines
/// actually arrive, so a lying header can't force a huge allocation.
const PREALLOC_PIXELS: usize = 1 << 20;

/// How scanlines are laid out in the written file.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Encoding {
    /// Uncompressed RGBE quads.
    Flat,

    /// New-style per-component run-length encoding.  Falls back to
    /// flat scanlines for widths that the format can't encode.
    RunLength,
}

/// A decoded .hdr image, in scanline order starting at the top.
#[derive(Debug, Clone)]
pub struct HdrImage {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<[f32; 3]>,
}

/// Writes a run-length encoded .hdr file.
pub fn write_hdr<W: Write>(
    out: &mut W,
    image: &[[f32; 3]],
    width: usize,
    height: usize,
) -> std::io::Result<()> {
    write_hdr_with(out, image, width, height, Encoding::RunLength)
}

pub fn write_hdr_with<W: Write>(
    out: &mut W,
    image: &[[f32; 3]],
    width: usize,
    height: usize,
    encoding: Encoding,
) -> std::io::Result<()> {
    assert_eq!(image.len(), width * height);

    out.write_all(b"#?RADIANCE\n")?;
    out.write_all(b"FORMAT=32-bit_rle_rgbe\n\n")?;
    out.write_all(format!("-Y {} +X {}\n", height, width).as_bytes())?;

    let use_rle =
        encoding == Encoding::RunLength && (RLE_MIN_WIDTH..=RLE_MAX_WIDTH).contains(&width);

    if width == 0 {
        out.flush()?;
        return Ok(());
    }

    let mut component = vec![0u8; width];
    for scanline in image.chunks_exact(width) {
        let quads: Vec<[u8; 4]> = scanline.iter().map(|&p| trifloat::encode(p)).collect();
        if use_rle {
            out.write_all(&[2, 2, (width >> 8) as u8, (width & 0xff) as u8])?;
            for c in 0..4 {
                for (dst, quad) in component.iter_mut().zip(quads.iter()) {
                    *dst = quad[c];
                }
                rle::write_component(out, &component)?;
            }
        } else {
            for quad in quads.iter() {
                out.write_all(quad)?;
            }
        }
    }
    out.flush()?;

    Ok(())
}

/// Reads a .hdr file with either flat or new-style run-length encoded
/// scanlines.
pub fn read_hdr<R: BufRead>(input: &mut R) -> Result<HdrImage, ReadError> {
    let (width, height) = read_header(input)?;
    let pixel_count = match width.checked_mul(height) {
        Some(count) if count <= MAX_PIXELS && width <= MAX_PIXELS => count,
        _ => return Err(ReadError::TooLarge),
    };

    let mut pixels = Vec::with_capacity(pixel_count.min(PREALLOC_PIXELS));
    let mut quads = vec![[0u8; 4]; width];
    for _ in 0..height {
        read_scanline(input, &mut quads)?;
        pixels.extend(quads.iter().map(|&q| trifloat::decode(q)));
    }

    Ok(HdrImage {
        width: width,
        height: height,
        pixels: pixels,
    })
}

fn read_line<R: BufRead>(input: &mut R) -> Result<String, ReadError> {
    let mut line = Vec::new();
    input.read_until(b'\n', &mut line)?;
    if line.last() != Some(&b'\n') {
        return Err(ReadError::BadHeader);
    }
    line.pop();
    String::from_utf8(line).map_err(|_| ReadError::BadHeader)
}

fn read_header<R: BufRead>(input: &mut R) -> Result<(usize, usize), ReadError> {
    let magic = read_line(input)?;
    if !(magic.starts_with("#?RADIANCE") || magic.starts_with("#?RGBE")) {
        return Err(ReadError::UnknownFormat);
    }

    // Header variables, terminated by an empty line.
    loop {
        let line = read_line(input)?;
        if line.is_empty() {
            break;
        }
        if let Some(format) = line.strip_prefix("FORMAT=") {
            if format.trim() != "32-bit_rle_rgbe" {
                return Err(ReadError::UnsupportedFeature);
            }
        }
    }

    // Resolution string.  Only the standard orientation is supported.
    let resolution = read_line(input)?;
    let parts: Vec<&str> = resolution.split_whitespace().collect();
    match parts[..] {
        ["-Y", h, "+X", w] => {
            let height = h.parse::<usize>().map_err(|_| ReadError::BadHeader)?;
            let width = w.parse::<usize>().map_err(|_| ReadError::BadHeader)?;
            Ok((width, height))
        }
        [_, _, _, _] => Err(ReadError::UnsupportedFeature),
        _ => Err(ReadError::BadHeader),
    }
}

fn read_scanline<R: BufRead>(input: &mut R, quads: &mut [[u8; 4]]) -> Result<(), ReadError> {
    let width = quads.len();
    if width == 0 {
        return Ok(());
    }

    let mut first = [0u8; 4];
    input.read_exact(&mut first)?;

    let is_rle = (RLE_MIN_WIDTH..=RLE_MAX_WIDTH).contains(&width)
        && first[0] == 2
        && first[1] == 2
        && first[2] & 0x80 == 0;
    if !is_rle {
        quads[0] = first;
        for quad in quads[1..].iter_mut() {
            input.read_exact(quad)?;
        }
        return Ok(());
    }

    if ((first[2] as usize) << 8 | first[3] as usize) != width {
        return Err(ReadError::BadScanline);
    }
    let mut component = vec![0u8; width];
    for c in 0..4 {
        rle::read_component(input, &mut component)?;
        for (quad, &v) in quads.iter_mut().zip(component.iter()) {
            quad[c] = v;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: usize, height: usize) -> Vec<[f32; 3]> {
        (0..(width * height))
            .map(|i| {
                let x = (i % width) as f32;
                let y = (i / width) as f32;
                [x * 0.25, 1.0, y * 8.0 + 0.5]
            })
            .collect()
    }

    fn round_trip(image: &[[f32; 3]], width: usize, height: usize, encoding: Encoding) -> HdrImage {
        let mut data = Vec::new();
        write_hdr_with(&mut data, image, width, height, encoding).unwrap();
        read_hdr(&mut std::io::Cursor::new(data)).unwrap()
    }

    #[test]
    fn header_layout() {
        let mut data = Vec::new();
        write_hdr(&mut data, &[[1.0, 1.0, 1.0]; 6], 3, 2).unwrap();
        let text = String::from_utf8_lossy(&data);
        assert!(text.starts_with("#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 2 +X 3\n"));
    }

    #[test]
    fn flat_round_trip() {
        let image = gradient(5, 3);
        let decoded = round_trip(&image, 5, 3, Encoding::Flat);
        assert_eq!(decoded.width, 5);
        assert_eq!(decoded.height, 3);
        let expected: Vec<_> = image.iter().map(|&p| decode_rgbe(encode_rgbe(p))).collect();
        assert_eq!(decoded.pixels, expected);
    }

    #[test]
    fn rle_round_trip() {
        let image = gradient(40, 4);
        let decoded = round_trip(&image, 40, 4, Encoding::RunLength);
        let expected: Vec<_> = image.iter().map(|&p| decode_rgbe(encode_rgbe(p))).collect();
        assert_eq!(decoded.pixels, expected);
    }

    #[test]
    fn rle_is_smaller_for_flat_regions() {
        let image = vec![[0.5f32, 0.25, 0.125]; 64 * 16];
        let mut flat = Vec::new();
        let mut rle = Vec::new();
        write_hdr_with(&mut flat, &image, 64, 16, Encoding::Flat).unwrap();
        write_hdr_with(&mut rle, &image, 64, 16, Encoding::RunLength).unwrap();
        assert!(rle.len() < flat.len() / 4);
        let decoded = read_hdr(&mut std::io::Cursor::new(rle)).unwrap();
        assert!(decoded.pixels.iter().all(|&p| p == [0.5, 0.25, 0.125]));
    }

    #[test]
    fn narrow_images_stay_flat() {
        let image = gradient(4, 2);
        let mut data = Vec::new();
        write_hdr(&mut data, &image, 4, 2).unwrap();
        let header_len = b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n\n-Y 2 +X 4\n".len();
        assert_eq!(data.len(), header_len + 4 * 2 * 4);
    }

    #[test]
    fn rejects_foreign_data() {
        let result = read_hdr(&mut std::io::Cursor::new(b"P6\n2 2\n255\n".to_vec()));
        assert!(matches!(result, Err(ReadError::UnknownFormat)));
    }

    #[test]
    fn rejects_truncated_data() {
        let mut data = Vec::new();
        write_hdr(&mut data, &gradient(16, 4), 16, 4).unwrap();
        data.truncate(data.len() - 10);
        let result = read_hdr(&mut std::io::Cursor::new(data));
        assert!(matches!(result, Err(ReadError::IO(_))));
    }

    #[test]
    fn rejects_oversized_header() {
        let resolutions = [
            "-Y 4000000000 +X 4000000000",
            "-Y 0 +X 4000000000",
            "-Y 16385 +X 16384",
        ];
        for resolution in resolutions {
            let data = format!("#?RADIANCE\n\n{}\n", resolution).into_bytes();
            let result = read_hdr(&mut std::io::Cursor::new(data));
            assert!(matches!(result, Err(ReadError::TooLarge)), "{}", resolution);
        }
    }

    #[test]
    fn large_header_without_data_is_truncated() {
        // Within the limit, but the scanlines never arrive.
        let data = b"#?RADIANCE\n\n-Y 10000 +X 10000\n\x80\x80\x80\x81".to_vec();
        let result = read_hdr(&mut std::io::Cursor::new(data));
        assert!(matches!(result, Err(ReadError::IO(_))));
    }

    #[test]
    fn rejects_flipped_orientation() {
        let data = b"#?RADIANCE\n\n+Y 1 +X 1\n\x80\x80\x80\x81".to_vec();
        let result = read_hdr(&mut std::io::Cursor::new(data));
        assert!(matches!(result, Err(ReadError::UnsupportedFeature)));
    }
}
