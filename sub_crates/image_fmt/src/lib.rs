//! Decoding of 8/16-bit LDR source images into RGB pixel buffers.

mod error;
mod jpeg_fmt;
mod png_fmt;
mod tiff_fmt;

use std::io::{Read, Seek, SeekFrom};

pub use error::ReadError;

#[derive(Debug, Clone)]
pub enum ImageBuf {
    /// 8-bit unsigned RGB channels.
    Rgb8(Vec<[u8; 3]>),

    /// 16-bit unsigned RGB channels.
    Rgb16(Vec<[u16; 3]>),
}

impl ImageBuf {
    pub fn len(&self) -> usize {
        match self {
            ImageBuf::Rgb8(ref data) => data.len(),
            ImageBuf::Rgb16(ref data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Converts to 8 bits per channel, rounding 16-bit values to the
    /// nearest 8-bit value.
    pub fn to_rgb8(self) -> Vec<[u8; 3]> {
        match self {
            ImageBuf::Rgb8(data) => data,
            ImageBuf::Rgb16(data) => data
                .iter()
                .map(|p| p.map(|c| ((c as u32 * 255 + 32767) / 65535) as u8))
                .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Image {
    pub dimensions: (usize, usize),
    pub data: ImageBuf,
}

impl Image {
    pub fn width(&self) -> usize {
        self.dimensions.0
    }

    pub fn height(&self) -> usize {
        self.dimensions.1
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
enum Format {
    Jpeg,
    Png,
    Tiff,
}

fn sniff_format(magic: &[u8]) -> Option<Format> {
    if magic.starts_with(&[0xff, 0xd8]) {
        Some(Format::Jpeg)
    } else if magic.starts_with(&[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a]) {
        Some(Format::Png)
    } else if magic.starts_with(b"II*\0") || magic.starts_with(b"MM\0*") {
        Some(Format::Tiff)
    } else {
        None
    }
}

/// Loads a JPEG, PNG, or TIFF image, detecting the format from the
/// file's leading bytes.
pub fn load<R: Read + Seek>(mut reader: R) -> Result<Image, ReadError> {
    let mut magic = [0u8; 8];
    let mut filled = 0;
    while filled < magic.len() {
        match reader.read(&mut magic[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    reader.seek(SeekFrom::Start(0))?;

    let image = match sniff_format(&magic[..filled]) {
        Some(Format::Jpeg) => jpeg_fmt::load(&mut reader)?,
        Some(Format::Png) => png_fmt::load(&mut reader)?,
        Some(Format::Tiff) => tiff_fmt::load(&mut reader)?,
        None => return Err(ReadError::UnknownFormat),
    };

    if image.data.len() != image.dimensions.0 * image.dimensions.1 {
        return Err(ReadError::Corrupt);
    }

    Ok(image)
}
