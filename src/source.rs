use std::{
    fs::File,
    io::{BufRead, BufReader, Seek},
    path::{Path, PathBuf},
};

use crate::{ExifExposure, ImageInfo, MergeError, SourceImage};

/// File extensions picked up when scanning an input directory.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

pub fn load_image(path: &Path) -> Result<SourceImage, MergeError> {
    let decode_err = |e: image_fmt::ReadError| MergeError::Decode {
        path: path.to_path_buf(),
        source: e,
    };

    // Load image.
    let img = {
        let file = File::open(path).map_err(|e| decode_err(e.into()))?;
        image_fmt::load(BufReader::new(file)).map_err(decode_err)?
    };
    let (width, height) = img.dimensions;
    let pixels = img.data.to_rgb8();

    // Get exposure metadata from EXIF data.
    let exif = {
        let file = File::open(path).map_err(|e| decode_err(e.into()))?;
        read_exif(&mut BufReader::new(file))
    };

    // Fill in image info.
    let image_info = ImageInfo {
        filename: path
            .file_name()
            .map(|p| p.to_string_lossy().into())
            .unwrap_or_else(|| "".into()),
        full_filepath: path.to_string_lossy().into(),

        width: width,
        height: height,

        exif: exif,
    };

    Ok(SourceImage {
        pixels: pixels,
        info: image_info,
    })
}

/// Reads the exposure-related EXIF fields from an image container.
///
/// Files without EXIF, or with EXIF we can't parse, simply yield no
/// values.
pub fn read_exif<R: BufRead + Seek>(reader: &mut R) -> ExifExposure {
    let img_exif = match exif::Reader::new().read_from_container(reader) {
        Ok(img_exif) => img_exif,
        Err(_) => return ExifExposure::default(),
    };
    let field = |tag| {
        img_exif
            .get_field(tag, exif::In::PRIMARY)
            .map(|f| &f.value)
    };

    ExifExposure {
        exposure_time: field(exif::Tag::ExposureTime)
            .and_then(value_as_f64)
            .filter(|&t| t.is_finite() && t > 0.0)
            .map(|t| t as f32),
        shutter_speed: field(exif::Tag::ShutterSpeedValue)
            .and_then(value_as_f64)
            .filter(|v| v.is_finite())
            .map(|v| v as f32),
        fnumber: field(exif::Tag::FNumber)
            .and_then(value_as_f64)
            .filter(|&n| n.is_finite() && n > 0.0)
            .map(|n| n as f32),
        iso: field(exif::Tag::PhotographicSensitivity)
            .and_then(|v| v.get_uint(0))
            .filter(|&n| n != 0),
    }
}

/// The first component of a numeric EXIF value.  Rationals with a zero
/// denominator are treated as missing.
fn value_as_f64(value: &exif::Value) -> Option<f64> {
    match value {
        exif::Value::Rational(v) => v
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| r.to_f64()),
        exif::Value::SRational(v) => v
            .first()
            .filter(|r| r.denom != 0)
            .map(|r| r.to_f64()),
        exif::Value::Float(v) => v.first().map(|&f| f as f64),
        exif::Value::Double(v) => v.first().copied(),
        exif::Value::Short(v) => v.first().map(|&n| n as f64),
        exif::Value::Long(v) => v.first().map(|&n| n as f64),
        _ => None,
    }
}

/// Lists the image files directly inside `dir`, sorted by file name.
pub fn list_image_files(dir: &Path) -> Result<Vec<PathBuf>, MergeError> {
    let read_err = |e: std::io::Error| MergeError::Decode {
        path: dir.to_path_buf(),
        source: e.into(),
    };

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(read_err)? {
        let entry = entry.map_err(read_err)?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                IMAGE_EXTENSIONS.iter().any(|&known| known == e)
            })
            .unwrap_or(false);
        if is_image {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    if files.is_empty() {
        return Err(MergeError::InsufficientData(format!(
            "no images found in '{}'",
            dir.display()
        )));
    }
    Ok(files)
}
