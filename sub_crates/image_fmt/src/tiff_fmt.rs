use std::io::{Read, Seek};

use tiff::{decoder::DecodingResult, ColorType};

use crate::{error::ReadError, Image, ImageBuf};

pub fn load<R: Read + Seek>(reader: R) -> Result<Image, ReadError> {
    let mut decoder =
        tiff::decoder::Decoder::new(reader)?.with_limits(tiff::decoder::Limits::unlimited());

    let (width, height) = decoder.dimensions()?;
    let dimensions = (width as usize, height as usize);
    let colortype = decoder.colortype()?;
    let data = decoder.read_image()?;

    let data = match (colortype, data) {
        (ColorType::RGB(_), DecodingResult::U8(pixel_data)) => ImageBuf::Rgb8(
            pixel_data
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        (ColorType::RGB(_), DecodingResult::U16(pixel_data)) => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        (ColorType::RGBA(_), DecodingResult::U8(pixel_data)) => ImageBuf::Rgb8(
            pixel_data
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        (ColorType::RGBA(_), DecodingResult::U16(pixel_data)) => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(4)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
        ),
        (ColorType::Gray(_), DecodingResult::U8(pixel_data)) => {
            ImageBuf::Rgb8(pixel_data.iter().map(|&c| [c, c, c]).collect())
        }
        (ColorType::Gray(_), DecodingResult::U16(pixel_data)) => {
            ImageBuf::Rgb16(pixel_data.iter().map(|&c| [c, c, c]).collect())
        }
        (ColorType::GrayA(_), DecodingResult::U8(pixel_data)) => ImageBuf::Rgb8(
            pixel_data
                .chunks_exact(2)
                .map(|c| [c[0], c[0], c[0]])
                .collect(),
        ),
        (ColorType::GrayA(_), DecodingResult::U16(pixel_data)) => ImageBuf::Rgb16(
            pixel_data
                .chunks_exact(2)
                .map(|c| [c[0], c[0], c[0]])
                .collect(),
        ),

        _ => return Err(ReadError::UnsupportedFeature),
    };

    Ok(Image {
        dimensions: dimensions,
        data: data,
    })
}
