use std::io::Read;

use crate::{error::ReadError, Image, ImageBuf};

pub fn load<R: Read>(reader: R) -> Result<Image, ReadError> {
    let mut decoder = png::Decoder::new(reader);
    // Palette -> RGB(A), and sub-byte grayscale -> 8 bits.
    decoder.set_transformations(png::Transformations::EXPAND);
    let mut reader = decoder.read_info()?;

    let mut pixel_data = vec![0u8; reader.output_buffer_size()];
    let info = reader.next_frame(&mut pixel_data)?;
    pixel_data.truncate(info.buffer_size());

    let dimensions = (info.width as usize, info.height as usize);

    fn be16(c: &[u8]) -> u16 {
        u16::from_be_bytes([c[0], c[1]])
    }

    use png::{BitDepth::*, ColorType::*};
    let data = match (info.color_type, info.bit_depth) {
        (Rgb, Eight) => ImageBuf::Rgb8(
            pixel_data
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        (Rgb, Sixteen) => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(6)
                .map(|c| [be16(&c[0..2]), be16(&c[2..4]), be16(&c[4..6])])
                .collect(),
        ),
        (Rgba, Eight) => ImageBuf::Rgb8(
            pixel_data
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        (Rgba, Sixteen) => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(8)
                .map(|c| [be16(&c[0..2]), be16(&c[2..4]), be16(&c[4..6])])
                .collect(),
        ),
        (Grayscale, Eight) => ImageBuf::Rgb8(pixel_data.iter().map(|&c| [c, c, c]).collect()),
        (Grayscale, Sixteen) => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(2)
                .map(|c| {
                    let v = be16(c);
                    [v, v, v]
                })
                .collect(),
        ),
        (GrayscaleAlpha, Eight) => ImageBuf::Rgb8(
            pixel_data
                .chunks_exact(2)
                .map(|c| [c[0], c[0], c[0]])
                .collect(),
        ),
        (GrayscaleAlpha, Sixteen) => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(4)
                .map(|c| {
                    let v = be16(&c[0..2]);
                    [v, v, v]
                })
                .collect(),
        ),

        _ => return Err(ReadError::UnsupportedFeature),
    };

    Ok(Image {
        dimensions: dimensions,
        data: data,
    })
}
