use std::io::Read;

use crate::{error::ReadError, Image, ImageBuf};

pub fn load<R: Read>(reader: R) -> Result<Image, ReadError> {
    let mut decoder = jpeg_decoder::Decoder::new(reader);
    decoder.read_info()?;

    let info = decoder.info().ok_or(ReadError::Corrupt)?;
    let dimensions = (info.width as usize, info.height as usize);
    let pixel_count = dimensions.0 * dimensions.1;
    let pixel_format = info.pixel_format;

    let pixel_data = decoder.decode()?;

    use jpeg_decoder::PixelFormat::*;
    let bytes_per_pixel = match pixel_format {
        RGB24 => 3,
        L8 => 1,
        L16 => 2,
        _ => return Err(ReadError::UnsupportedFeature),
    };
    if pixel_data.len() != pixel_count * bytes_per_pixel {
        return Err(ReadError::Corrupt);
    }

    let data = match pixel_format {
        RGB24 => ImageBuf::Rgb8(
            pixel_data
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        L8 => ImageBuf::Rgb8(pixel_data.iter().map(|&c| [c, c, c]).collect()),
        // NOTE: jpeg-decoder doesn't document the endianness of its
        // 16-bit buffers, but its code writes them native endian.
        _ => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(2)
                .map(|c| {
                    let v = u16::from_ne_bytes([c[0], c[1]]);
                    [v, v, v]
                })
                .collect(),
        ),
    };

    Ok(Image {
        dimensions: dimensions,
        data: data,
    })
}
